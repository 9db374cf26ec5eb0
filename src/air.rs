use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::Result;

use crate::error;
use crate::isa::{Instruction, Label, Opcode, Operand, Program, MAX_PROGRAM_LEN};

pub(crate) type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Assembly intermediate representation: instructions whose jump targets may still be
/// symbolic, together with the labels bound so far.
pub struct Air {
    ast: Vec<Instruction>,
    /// Label -> instruction index
    labels: FxMap<Label, usize>,
    /// Instructions waiting for a label to be resolved
    fixups: Vec<(usize, Label)>,
}

impl Air {
    pub fn new() -> Self {
        Air {
            ast: Vec::new(),
            labels: FxMap::default(),
            fixups: Vec::new(),
        }
    }

    pub fn emit(&mut self, op: Opcode, operand: Option<u8>) {
        self.ast.push(Instruction::new(op, operand));
    }

    /// Emit an instruction targeting `label`, to be patched by [`Air::backpatch`].
    pub fn emit_to(&mut self, op: Opcode, label: Label) {
        self.fixups.push((self.ast.len(), label.clone()));
        self.ast.push(Instruction::to_label(op, label));
    }

    /// Bind `label` to the position of the next emitted instruction.
    pub fn bind(&mut self, label: Label) -> Result<()> {
        let pos = self.ast.len();
        if let Some(prev) = self.labels.insert(label.clone(), pos) {
            return Err(error::compile_duplicate_label(&label, prev, pos));
        }
        Ok(())
    }

    pub fn labels(&self) -> impl Iterator<Item = (&Label, usize)> {
        self.labels.iter().map(|(label, pos)| (label, *pos))
    }

    pub fn get(&self, idx: usize) -> &Instruction {
        &self.ast[idx]
    }

    pub fn len(&self) -> usize {
        self.ast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ast.is_empty()
    }

    /// Use labels filled during code generation to resolve every pending operand, then
    /// terminate the program with `HALT`.
    pub fn backpatch(mut self) -> Result<Program> {
        if self.ast.len() + 1 > MAX_PROGRAM_LEN {
            return Err(error::compile_program_too_large(self.ast.len() + 1));
        }
        for (idx, label) in &self.fixups {
            let Some(&pos) = self.labels.get(label) else {
                return Err(error::compile_undefined_label(label, *idx));
            };
            log::trace!("patching {} at {idx} -> {pos}", self.ast[*idx].op);
            // Bounded by MAX_PROGRAM_LEN above
            self.ast[*idx].operand = Some(Operand::Byte(pos as u8));
        }
        self.ast.push(Instruction::bare(Opcode::Halt));
        Ok(self.ast)
    }
}

impl Default for Air {
    fn default() -> Self {
        Air::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;

    #[test]
    fn forward_and_backward_references_resolve() {
        let mut air = Air::new();
        let start = Label::new("L0");
        let end = Label::new("L1");
        air.bind(start.clone()).unwrap();
        air.emit(Opcode::Lda, Some(1));
        air.emit_to(Opcode::Jz, end.clone());
        air.emit_to(Opcode::Jmp, start);
        air.bind(end).unwrap();

        let program = air.backpatch().unwrap();
        assert_eq!(
            program,
            vec![
                Instruction::with(Opcode::Lda, 1),
                Instruction::with(Opcode::Jz, 3),
                Instruction::with(Opcode::Jmp, 0),
                Instruction::bare(Opcode::Halt),
            ]
        );
    }

    #[test]
    fn resolved_targets_lie_inside_program() {
        let mut air = Air::new();
        air.emit_to(Opcode::Jmp, Label::new("end"));
        air.emit(Opcode::Nop, None);
        air.bind(Label::new("end")).unwrap();
        let program = air.backpatch().unwrap();
        for instr in &program {
            if let Some(target) = instr.byte() {
                assert!((target as usize) < program.len());
            }
        }
        // Label bound at the very end points at the appended HALT
        assert_eq!(program[0].byte(), Some(2));
        assert_eq!(program[2].op, Opcode::Halt);
    }

    #[test]
    fn undefined_label_fails() {
        let mut air = Air::new();
        air.emit_to(Opcode::Jmp, Label::new("nowhere"));
        let err = air.backpatch().unwrap_err();
        assert_eq!(code(&err), "compile::undefined_label");
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn labels_bind_once() {
        let mut air = Air::new();
        air.bind(Label::new("L0")).unwrap();
        let err = air.bind(Label::new("L0")).unwrap_err();
        assert_eq!(code(&err), "compile::duplicate_label");
    }

    #[test]
    fn oversized_program_is_rejected() {
        let mut air = Air::new();
        for _ in 0..MAX_PROGRAM_LEN {
            air.emit(Opcode::Nop, None);
        }
        let err = air.backpatch().unwrap_err();
        assert_eq!(code(&err), "compile::program_too_large");
    }
}
