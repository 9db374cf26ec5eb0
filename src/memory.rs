use std::fmt;

/// Default size of the address space, in bytes.
pub const MEMORY_SIZE: usize = 256;
/// Most values the call/argument stack can hold at once.
pub const STACK_CAPACITY: usize = 256;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemoryError {
    OutOfBounds { addr: usize, size: usize },
    StackUnderflow,
    StackOverflow,
}

impl std::error::Error for MemoryError {}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { addr, size } => write!(
                f,
                "memory access out of bounds: address {addr} is outside 0..{size}"
            ),
            Self::StackUnderflow => write!(f, "stack underflow"),
            Self::StackOverflow => {
                write!(f, "stack overflow: more than {STACK_CAPACITY} values pushed")
            }
        }
    }
}

/// Flat byte-addressed memory with a separate call/argument stack.
pub struct Memory {
    data: Box<[u8]>,
    /// Grows upwards, top of stack is the last element.
    stack: Vec<u8>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Memory {
            data: vec![0; size].into_boxed_slice(),
            stack: Vec::with_capacity(STACK_CAPACITY),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn read(&self, addr: usize) -> Result<u8, MemoryError> {
        self.data
            .get(addr)
            .copied()
            .ok_or(MemoryError::OutOfBounds {
                addr,
                size: self.size(),
            })
    }

    /// Stores the low 8 bits of `val`.
    pub fn write(&mut self, addr: usize, val: u16) -> Result<(), MemoryError> {
        let size = self.size();
        let cell = self
            .data
            .get_mut(addr)
            .ok_or(MemoryError::OutOfBounds { addr, size })?;
        *cell = (val & 0xFF) as u8;
        Ok(())
    }

    pub fn push(&mut self, val: u8) -> Result<(), MemoryError> {
        if self.stack.len() >= STACK_CAPACITY {
            return Err(MemoryError::StackOverflow);
        }
        self.stack.push(val);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u8, MemoryError> {
        self.stack.pop().ok_or(MemoryError::StackUnderflow)
    }

    pub fn peek(&self) -> Result<u8, MemoryError> {
        self.stack.last().copied().ok_or(MemoryError::StackUnderflow)
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Stack contents, bottom first.
    pub fn stack(&self) -> &[u8] {
        &self.stack
    }

    /// Zero every byte and empty the stack.
    pub fn reset(&mut self) {
        self.data.fill(0);
        self.stack.clear();
    }
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new(MEMORY_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_zeroed() {
        let mem = Memory::default();
        assert_eq!(mem.size(), 256);
        assert!((0..256).all(|addr| mem.read(addr) == Ok(0)));
    }

    #[test]
    fn write_masks_to_a_byte() {
        let mut mem = Memory::default();
        mem.write(16, 0x1FF).unwrap();
        assert_eq!(mem.read(16), Ok(0xFF));
        mem.write(17, 256).unwrap();
        assert_eq!(mem.read(17), Ok(0));
    }

    #[test]
    fn out_of_bounds_access_fails() {
        let mut mem = Memory::new(16);
        assert_eq!(
            mem.read(16),
            Err(MemoryError::OutOfBounds { addr: 16, size: 16 })
        );
        assert_eq!(
            mem.write(300, 1),
            Err(MemoryError::OutOfBounds {
                addr: 300,
                size: 16
            })
        );
        assert_eq!(mem.read(15), Ok(0));
    }

    #[test]
    fn stack_is_last_in_first_out() {
        let mut mem = Memory::default();
        mem.push(1).unwrap();
        mem.push(2).unwrap();
        assert_eq!(mem.peek(), Ok(2));
        assert_eq!(mem.pop(), Ok(2));
        assert_eq!(mem.pop(), Ok(1));
        assert_eq!(mem.pop(), Err(MemoryError::StackUnderflow));
        assert_eq!(mem.peek(), Err(MemoryError::StackUnderflow));
    }

    #[test]
    fn stack_has_fixed_capacity() {
        let mut mem = Memory::default();
        for i in 0..STACK_CAPACITY {
            mem.push(i as u8).unwrap();
        }
        assert_eq!(mem.push(0), Err(MemoryError::StackOverflow));
        assert_eq!(mem.stack_depth(), STACK_CAPACITY);
    }

    #[test]
    fn reset_clears_data_and_stack() {
        let mut mem = Memory::default();
        mem.write(0, 9).unwrap();
        mem.push(3).unwrap();
        mem.reset();
        assert_eq!(mem.read(0), Ok(0));
        assert_eq!(mem.stack_depth(), 0);
    }
}
