use crate::isa::{Opcode, Program, IO_INPUT, IO_OUTPUT, IO_OUTPUT_COUNT, MAX_PROGRAM_LEN};
use crate::memory::{Memory, MEMORY_SIZE};
use crate::runtime::{Cpu, RuntimeError, Status, Warning};

/// A CPU wired to its memory, running one loaded program.
pub struct Computer {
    cpu: Cpu,
    memory: Memory,
    program: Program,
    /// Values written to the output address since the program was loaded
    outputs: Vec<u8>,
}

impl Computer {
    pub fn new() -> Self {
        Computer {
            cpu: Cpu::new(),
            memory: Memory::new(MEMORY_SIZE),
            program: Program::new(),
            outputs: Vec::new(),
        }
    }

    /// Memory must reach at least up to the output counter.
    pub fn with_memory_size(size: usize) -> Result<Self, RuntimeError> {
        if size <= IO_OUTPUT_COUNT as usize {
            return Err(RuntimeError::MemoryTooSmall { size });
        }
        Ok(Computer {
            memory: Memory::new(size),
            ..Computer::new()
        })
    }

    /// Replace the current program and power-cycle the machine. Input must be set
    /// after loading.
    pub fn load_program(&mut self, program: Program) -> Result<(), RuntimeError> {
        if program.len() > MAX_PROGRAM_LEN {
            return Err(RuntimeError::ProgramTooLarge { len: program.len() });
        }
        log::debug!("loaded {} instructions", program.len());
        self.program = program;
        self.cpu.reset();
        self.memory.reset();
        self.outputs.clear();
        Ok(())
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Run until the program halts or the program counter leaves the program.
    ///
    /// A halted machine starts over from the first instruction. Memory, registers and
    /// recorded outputs carry over.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        if self.cpu.status() == Status::Halted {
            self.cpu.set_pc(0);
            self.cpu.start();
        }
        while self.step()? {}
        Ok(())
    }

    /// Execute a single instruction. Returns whether the machine can keep going.
    pub fn step(&mut self) -> Result<bool, RuntimeError> {
        if self.cpu.status() == Status::Idle {
            self.check_resolved()?;
            self.cpu.start();
        }
        if !self.cpu.is_running() {
            return Ok(false);
        }

        let pc = self.cpu.pc();
        let Some(instr) = self.program.get(pc) else {
            // Ran off the end of the program
            self.cpu.halt();
            return Ok(false);
        };
        let (op, operand) = (instr.op, instr.byte());
        log::trace!("{pc:>3}: {instr}");

        self.cpu.execute(&mut self.memory, op, operand)?;
        if matches!(op, Opcode::Sta | Opcode::Stb) && operand == Some(IO_OUTPUT) {
            self.record_output(pc)?;
        }
        Ok(self.cpu.is_running())
    }

    /// Move the value just stored to the output address into the output list.
    fn record_output(&mut self, pc: usize) -> Result<(), RuntimeError> {
        let mem_err = |source| RuntimeError::Memory { pc, source };
        let val = self.memory.read(IO_OUTPUT as usize).map_err(mem_err)?;
        self.outputs.push(val);
        self.memory.write(IO_OUTPUT as usize, 0).map_err(mem_err)?;
        let count = self.memory.read(IO_OUTPUT_COUNT as usize).map_err(mem_err)?;
        self.memory
            .write(IO_OUTPUT_COUNT as usize, count as u16 + 1)
            .map_err(mem_err)?;
        log::debug!("output: {val}");
        Ok(())
    }

    fn check_resolved(&self) -> Result<(), RuntimeError> {
        match self
            .program
            .iter()
            .enumerate()
            .find_map(|(pc, instr)| instr.label().map(|label| (pc, label)))
        {
            Some((pc, label)) => Err(RuntimeError::UnresolvedLabel {
                pc,
                label: label.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Write a value to the input address.
    pub fn set_input(&mut self, val: u8) -> Result<(), RuntimeError> {
        self.memory
            .write(IO_INPUT as usize, val as u16)
            .map_err(|source| RuntimeError::Memory {
                pc: self.cpu.pc(),
                source,
            })
    }

    /// Most recent output, if any.
    pub fn output(&self) -> Option<u8> {
        self.outputs.last().copied()
    }

    pub fn get_all_outputs(&self) -> &[u8] {
        &self.outputs
    }

    pub fn warnings(&self) -> &[Warning] {
        self.cpu.warnings()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }
}

impl Default for Computer {
    fn default() -> Self {
        Computer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{Instruction, Label};
    use crate::memory::MemoryError;
    use Opcode::*;

    fn run(program: Program) -> Computer {
        let mut computer = Computer::new();
        computer.load_program(program).unwrap();
        computer.run().unwrap();
        computer
    }

    #[test]
    fn zero_is_a_valid_output() {
        let computer = run(vec![
            Instruction::with(Lda, 0),
            Instruction::with(Sta, IO_OUTPUT),
            Instruction::with(Lda, 5),
            Instruction::with(Sta, IO_OUTPUT),
            Instruction::bare(Halt),
        ]);
        assert_eq!(computer.get_all_outputs(), &[0, 5]);
        assert_eq!(computer.output(), Some(5));
        assert_eq!(computer.memory().read(IO_OUTPUT_COUNT as usize), Ok(2));
        assert_eq!(computer.memory().read(IO_OUTPUT as usize), Ok(0));
    }

    #[test]
    fn stb_also_emits_output() {
        let computer = run(vec![
            Instruction::with(Ldb, 9),
            Instruction::with(Stb, IO_OUTPUT),
        ]);
        assert_eq!(computer.get_all_outputs(), &[9]);
        assert_eq!(computer.cpu().status(), Status::Halted);
    }

    #[test]
    fn input_is_readable_by_programs() {
        let mut computer = Computer::new();
        computer
            .load_program(vec![
                Instruction::with(LdaMem, IO_INPUT),
                Instruction::with(Ldb, 2),
                Instruction::bare(Mul),
                Instruction::with(Sta, IO_OUTPUT),
                Instruction::bare(Halt),
            ])
            .unwrap();
        computer.set_input(21).unwrap();
        computer.run().unwrap();
        assert_eq!(computer.output(), Some(42));
    }

    #[test]
    fn stepping_stops_at_halt() {
        let mut computer = Computer::new();
        computer
            .load_program(vec![Instruction::bare(Nop), Instruction::bare(Halt)])
            .unwrap();
        assert_eq!(computer.cpu().status(), Status::Idle);
        assert_eq!(computer.step(), Ok(true));
        assert_eq!(computer.step(), Ok(false));
        assert_eq!(computer.step(), Ok(false));
        assert_eq!(computer.cpu().pc(), 2);
    }

    #[test]
    fn run_after_halt_starts_over() {
        let mut computer = Computer::new();
        computer
            .load_program(vec![
                Instruction::with(Lda, 7),
                Instruction::with(Sta, IO_OUTPUT),
                Instruction::bare(Halt),
            ])
            .unwrap();
        computer.run().unwrap();
        computer.run().unwrap();
        assert_eq!(computer.get_all_outputs(), &[7, 7]);
        assert_eq!(computer.cpu().status(), Status::Halted);
    }

    #[test]
    fn unresolved_label_is_rejected_before_running() {
        let mut computer = Computer::new();
        computer
            .load_program(vec![
                Instruction::with(Lda, 1),
                Instruction::with(Sta, IO_OUTPUT),
                Instruction::to_label(Jmp, Label::new("L3")),
            ])
            .unwrap();
        assert_eq!(
            computer.run(),
            Err(RuntimeError::UnresolvedLabel {
                pc: 2,
                label: "L3".into()
            })
        );
        assert!(computer.get_all_outputs().is_empty());
    }

    #[test]
    fn loading_clears_previous_run() {
        let mut computer = run(vec![Instruction::with(Lda, 3), Instruction::with(Sta, IO_OUTPUT)]);
        computer.load_program(vec![Instruction::bare(Halt)]).unwrap();
        assert!(computer.get_all_outputs().is_empty());
        assert_eq!(computer.memory().read(IO_OUTPUT_COUNT as usize), Ok(0));
    }

    #[test]
    fn oversized_programs_are_refused() {
        let mut computer = Computer::new();
        let program = vec![Instruction::bare(Nop); MAX_PROGRAM_LEN + 1];
        assert_eq!(
            computer.load_program(program),
            Err(RuntimeError::ProgramTooLarge {
                len: MAX_PROGRAM_LEN + 1
            })
        );
    }

    #[test]
    fn memory_size_is_configurable() {
        assert!(matches!(
            Computer::with_memory_size(64),
            Err(RuntimeError::MemoryTooSmall { size: 64 })
        ));
        let mut computer = Computer::with_memory_size(1024).unwrap();
        assert_eq!(computer.memory().size(), 1024);
        computer
            .load_program(vec![Instruction::with(Sta, 255), Instruction::bare(Halt)])
            .unwrap();
        assert_eq!(computer.run(), Ok(()));
    }

    #[test]
    fn runtime_errors_carry_their_position() {
        let mut computer = Computer::new();
        computer
            .load_program(vec![Instruction::bare(Nop), Instruction::bare(Pop)])
            .unwrap();
        assert_eq!(
            computer.run(),
            Err(RuntimeError::Memory {
                pc: 1,
                source: MemoryError::StackUnderflow
            })
        );
    }
}
