use std::fmt;

use crate::isa::Opcode;
use crate::memory::{Memory, MemoryError};

/// Fatal error raised while running a program.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RuntimeError {
    Memory { pc: usize, source: MemoryError },
    /// Instruction needs an operand byte but the program carries none.
    MissingOperand { pc: usize, op: Opcode },
    /// Program still references a label that was never resolved.
    UnresolvedLabel { pc: usize, label: String },
    ProgramTooLarge { len: usize },
    /// Return address of a `CALL` does not fit in a byte.
    AddressOverflow { pc: usize },
    /// Memory is too small to hold the I/O region.
    MemoryTooSmall { size: usize },
}

impl std::error::Error for RuntimeError {}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory { pc, source } => write!(f, "{source} (at instruction {pc})"),
            Self::MissingOperand { pc, op } => {
                write!(f, "{op} at instruction {pc} requires an operand")
            }
            Self::UnresolvedLabel { pc, label } => {
                write!(f, "unresolved label in program: {label} at position {pc}")
            }
            Self::ProgramTooLarge { len } => write!(
                f,
                "program has {len} instructions, at most {} can be addressed",
                crate::isa::MAX_PROGRAM_LEN
            ),
            Self::AddressOverflow { pc } => write!(
                f,
                "return address of call at instruction {pc} does not fit in a byte"
            ),
            Self::MemoryTooSmall { size } => write!(
                f,
                "memory of {size} bytes cannot hold the I/O addresses (need at least {})",
                crate::isa::IO_OUTPUT_COUNT as usize + 1
            ),
        }
    }
}

/// Non-fatal condition reported during execution.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Warning {
    /// `DIV` with B == 0. The result was defined as 0.
    DivisionByZero { pc: usize },
    /// `RET` with nothing on the stack. Execution halted.
    ReturnUnderflow { pc: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DivisionByZero { pc } => {
                write!(f, "division by zero at instruction {pc}, result set to 0")
            }
            Self::ReturnUnderflow { pc } => write!(
                f,
                "return with empty stack at instruction {pc}, halting execution"
            ),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    Idle,
    Running,
    Halted,
}

/// Register state of the machine. Memory is borrowed per instruction.
pub struct Cpu {
    /// Primary register (accumulator)
    a: u8,
    /// Secondary register
    b: u8,
    /// Program counter, in instructions
    pc: usize,
    zero: bool,
    carry: bool,
    status: Status,
    warnings: Vec<Warning>,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            a: 0,
            b: 0,
            pc: 0,
            zero: false,
            carry: false,
            status: Status::Idle,
            warnings: Vec::new(),
        }
    }

    pub fn a(&self) -> u8 {
        self.a
    }

    pub fn b(&self) -> u8 {
        self.b
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    pub fn zero(&self) -> bool {
        self.zero
    }

    pub fn carry(&self) -> bool {
        self.carry
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }

    pub fn start(&mut self) {
        self.status = Status::Running;
    }

    pub fn halt(&mut self) {
        self.status = Status::Halted;
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Back to power-on state.
    pub fn reset(&mut self) {
        *self = Cpu::new();
    }

    #[inline]
    fn set_a(&mut self, val: u8) {
        self.a = val;
        self.zero = val == 0;
    }

    #[inline]
    fn operand(&self, op: Opcode, operand: Option<u8>) -> Result<u8, RuntimeError> {
        operand.ok_or(RuntimeError::MissingOperand { pc: self.pc, op })
    }

    fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Perform a single instruction. Every instruction except a taken jump, `CALL` and
    /// `RET` advances the program counter by one afterwards.
    pub fn execute(
        &mut self,
        mem: &mut Memory,
        op: Opcode,
        operand: Option<u8>,
    ) -> Result<(), RuntimeError> {
        let pc = self.pc;
        let mem_err = |source| RuntimeError::Memory { pc, source };

        match op {
            Opcode::Nop => {}
            Opcode::Lda => {
                let val = self.operand(op, operand)?;
                self.set_a(val);
            }
            Opcode::Ldb => self.b = self.operand(op, operand)?,
            Opcode::LdaMem => {
                let addr = self.operand(op, operand)?;
                let val = mem.read(addr as usize).map_err(mem_err)?;
                self.set_a(val);
            }
            Opcode::LdbMem => {
                let addr = self.operand(op, operand)?;
                self.b = mem.read(addr as usize).map_err(mem_err)?;
            }
            Opcode::Sta => {
                let addr = self.operand(op, operand)?;
                mem.write(addr as usize, self.a as u16).map_err(mem_err)?;
            }
            Opcode::Stb => {
                let addr = self.operand(op, operand)?;
                mem.write(addr as usize, self.b as u16).map_err(mem_err)?;
            }
            Opcode::Add => self.set_a(self.a.wrapping_add(self.b)),
            Opcode::Sub => self.set_a(self.a.wrapping_sub(self.b)),
            Opcode::Mul => self.set_a(self.a.wrapping_mul(self.b)),
            Opcode::Div => {
                let res = match self.a.checked_div(self.b) {
                    Some(res) => res,
                    None => {
                        self.warn(Warning::DivisionByZero { pc });
                        0
                    }
                };
                self.set_a(res);
            }
            Opcode::And => self.set_a(self.a & self.b),
            Opcode::Or => self.set_a(self.a | self.b),
            Opcode::Xor => self.set_a(self.a ^ self.b),
            Opcode::Shl => {
                self.carry = self.a & 0x80 != 0;
                self.set_a(self.a << 1);
            }
            Opcode::Shr => {
                self.carry = self.a & 0x01 != 0;
                self.set_a(self.a >> 1);
            }
            Opcode::Cmp => {
                self.zero = self.a == self.b;
                self.carry = self.a < self.b;
            }
            Opcode::Jmp => {
                self.pc = self.operand(op, operand)? as usize;
                return Ok(());
            }
            Opcode::Jz | Opcode::Jnz => {
                let target = self.operand(op, operand)?;
                // Taken when the flag matches the instruction
                if self.zero == (op == Opcode::Jz) {
                    self.pc = target as usize;
                    return Ok(());
                }
            }
            Opcode::Push => mem.push(self.a).map_err(mem_err)?,
            Opcode::Pop => {
                let val = mem.pop().map_err(mem_err)?;
                self.set_a(val);
            }
            Opcode::PopParam => {
                let ret = mem.pop().map_err(mem_err)?;
                let val = mem.pop().map_err(mem_err)?;
                mem.push(ret).map_err(mem_err)?;
                self.set_a(val);
            }
            Opcode::Call => {
                let target = self.operand(op, operand)?;
                let ret = u8::try_from(pc + 1).map_err(|_| RuntimeError::AddressOverflow { pc })?;
                mem.push(ret).map_err(mem_err)?;
                self.pc = target as usize;
                return Ok(());
            }
            Opcode::Ret => {
                match mem.pop() {
                    Ok(ret) => self.pc = ret as usize,
                    Err(MemoryError::StackUnderflow) => {
                        self.warn(Warning::ReturnUnderflow { pc });
                        self.halt();
                    }
                    Err(source) => return Err(mem_err(source)),
                }
                return Ok(());
            }
            Opcode::Halt => self.halt(),
        }

        self.pc += 1;
        Ok(())
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new()
    }
}
