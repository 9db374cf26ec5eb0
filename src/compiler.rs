use miette::Result;

use crate::air::{Air, FxMap};
use crate::error;
use crate::isa::{Label, Opcode, Program, IO_OUTPUT, VARIABLE_BASE, VARIABLE_LIMIT};
use crate::parser::{Ast, Atom, BinOp, Call, Cond, Expr, FuncDef, Name, Parser, Stmt, StmtKind};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reg {
    A,
    B,
}

/// Signature of a user function, collected before any code is generated.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Function {
    pub label: Label,
    pub params: Vec<String>,
    /// First and last source line of the definition
    pub lines: (usize, usize),
}

/// Lowers SimpleScript source into a resolved [`Program`].
///
/// A single value may compile any number of sources. Each call to [`Compiler::compile`]
/// starts from a clean slate, and the tables it builds stay readable until the next call.
pub struct Compiler {
    /// Variable name -> memory address, in allocation order
    variables: FxMap<String, u8>,
    next_var: usize,
    functions: FxMap<String, Function>,
    label_counter: usize,
    air: Air,
    src: String,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            variables: FxMap::default(),
            next_var: VARIABLE_BASE as usize,
            functions: FxMap::default(),
            label_counter: 0,
            air: Air::new(),
            src: String::new(),
        }
    }

    /// Drop everything learnt from the previous compilation.
    pub fn reset(&mut self) {
        *self = Compiler::new();
    }

    pub fn compile(&mut self, src: &str) -> Result<Program> {
        self.reset();
        self.src = src.to_string();

        let ast = Parser::new(src).parse()?;
        for (name, def) in &ast.functions {
            self.functions.insert(
                name.clone(),
                Function {
                    label: Label::function(name),
                    params: def.params.iter().map(|p| p.text.clone()).collect(),
                    lines: def.lines,
                },
            );
        }
        self.allocate_in_source_order(&ast)?;

        // Function bodies live in front of the main program, which jumps over them
        if !ast.functions.is_empty() {
            let main = Label::new("main");
            self.air.emit_to(Opcode::Jmp, main.clone());
            for def in ast.functions.values() {
                self.compile_function(def)?;
            }
            self.air.bind(main)?;
        }
        self.compile_block(&ast.main)?;

        log::debug!(
            "generated {} instructions, {} variables, {} labels",
            self.air.len(),
            self.variables.len(),
            self.air.labels().count()
        );
        let air = std::mem::take(&mut self.air);
        air.backpatch()
    }

    /// Variables of the last compilation, in allocation order.
    pub fn variables(&self) -> impl Iterator<Item = (&str, u8)> {
        self.variables.iter().map(|(name, addr)| (name.as_str(), *addr))
    }

    pub fn address_of(&self, name: &str) -> Option<u8> {
        self.variables.get(name).copied()
    }

    pub fn functions(&self) -> &FxMap<String, Function> {
        &self.functions
    }

    /// Fresh control-flow label, unique within one compilation.
    pub fn generate_label(&mut self) -> Label {
        let label = Label::new(format!("L{}", self.label_counter));
        self.label_counter += 1;
        label
    }

    /// Address of `name`, allocating the next free one on first use.
    pub fn allocate_variable(&mut self, name: &Name, line: usize) -> Result<u8> {
        if let Some(addr) = self.variables.get(&name.text) {
            return Ok(*addr);
        }
        if self.next_var > VARIABLE_LIMIT as usize {
            return Err(error::compile_out_of_variables(
                name.span, &self.src, line, &name.text,
            ));
        }
        let addr = self.next_var as u8;
        self.next_var += 1;
        self.variables.insert(name.text.clone(), addr);
        log::trace!("variable {} at {addr}", name.text);
        Ok(addr)
    }

    /// Hand out addresses to every assignment target and parameter in the order they
    /// appear in the source, so function bodies see globals assigned by the main program.
    fn allocate_in_source_order(&mut self, ast: &Ast) -> Result<()> {
        let mut names = Vec::new();
        for def in ast.functions.values() {
            names.extend(def.params.iter().map(|param| (def.lines.0, param)));
            collect_targets(&def.body, &mut names);
        }
        collect_targets(&ast.main, &mut names);
        // Stable, so parameters keep their declaration order
        names.sort_by_key(|(line, _)| *line);
        for (line, name) in names {
            self.allocate_variable(name, line)?;
        }
        Ok(())
    }

    fn compile_function(&mut self, def: &FuncDef) -> Result<()> {
        log::debug!("compiling function {} (lines {}-{})", def.name.text, def.lines.0, def.lines.1);
        self.air.bind(Label::function(&def.name.text))?;
        // Arguments sit beneath the return address in declaration order
        for param in &def.params {
            let addr = self.allocate_variable(param, def.lines.0)?;
            self.air.emit(Opcode::PopParam, None);
            self.air.emit(Opcode::Sta, Some(addr));
        }
        self.compile_block(&def.body)?;
        self.air.emit(Opcode::Ret, None);
        Ok(())
    }

    fn compile_block(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                // Allocated first so `x = x + 1` is valid on a fresh `x`
                let addr = self.allocate_variable(target, line)?;
                self.compile_expr(value, line)?;
                self.air.emit(Opcode::Sta, Some(addr));
            }
            StmtKind::Print(value) => {
                self.compile_expr(value, line)?;
                self.air.emit(Opcode::Sta, Some(IO_OUTPUT));
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let else_label = self.generate_label();
                self.compile_condition(cond, else_label.clone(), line)?;
                self.compile_block(then)?;
                match otherwise {
                    Some(otherwise) => {
                        let end_label = self.generate_label();
                        self.air.emit_to(Opcode::Jmp, end_label.clone());
                        self.air.bind(else_label)?;
                        self.compile_block(otherwise)?;
                        self.air.bind(end_label)?;
                    }
                    None => self.air.bind(else_label)?,
                }
            }
            StmtKind::While { cond, body } => {
                let start_label = self.generate_label();
                let end_label = self.generate_label();
                self.air.bind(start_label.clone())?;
                self.compile_condition(cond, end_label.clone(), line)?;
                self.compile_block(body)?;
                self.air.emit_to(Opcode::Jmp, start_label);
                self.air.bind(end_label)?;
            }
            StmtKind::Call(call) => self.compile_call(call, line)?,
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.compile_expr(value, line)?;
                }
                self.air.emit(Opcode::Ret, None);
            }
        }
        Ok(())
    }

    /// Leave the value of `expr` in A.
    fn compile_expr(&mut self, expr: &Expr, line: usize) -> Result<()> {
        match expr {
            Expr::Atom(atom) => self.load_operand(atom, Reg::A, line),
            Expr::Binary { op, lhs, rhs } => {
                self.load_operand(lhs, Reg::A, line)?;
                self.load_operand(rhs, Reg::B, line)?;
                let op = match op {
                    BinOp::Add => Opcode::Add,
                    BinOp::Sub => Opcode::Sub,
                    BinOp::Mul => Opcode::Mul,
                    BinOp::Div => Opcode::Div,
                };
                self.air.emit(op, None);
                Ok(())
            }
            Expr::Call(call) => self.compile_call(call, line),
        }
    }

    fn compile_call(&mut self, call: &Call, line: usize) -> Result<()> {
        let name = &call.name.text;
        let Some(func) = self.functions.get(name) else {
            return Err(error::name_undefined_fn(call.name.span, &self.src, line, name));
        };
        if func.params.len() != call.args.len() {
            return Err(error::compile_arity(
                call.span,
                &self.src,
                line,
                name,
                func.params.len(),
                call.args.len(),
            ));
        }
        let label = func.label.clone();
        for arg in call.args.iter().rev() {
            self.compile_expr(arg, line)?;
            self.air.emit(Opcode::Push, None);
        }
        self.air.emit_to(Opcode::Call, label);
        Ok(())
    }

    /// Emit a comparison that jumps to `target` when `cond` does not hold.
    pub fn compile_condition(&mut self, cond: &Cond, target: Label, line: usize) -> Result<()> {
        self.emit_compare(cond, target, false, line)
    }

    /// Emit a comparison that jumps to `target` when `cond` holds.
    pub fn compile_condition_inverse(
        &mut self,
        cond: &Cond,
        target: Label,
        line: usize,
    ) -> Result<()> {
        self.emit_compare(cond, target, true, line)
    }

    fn emit_compare(&mut self, cond: &Cond, target: Label, jump_if: bool, line: usize) -> Result<()> {
        self.load_operand(&cond.lhs, Reg::A, line)?;
        self.load_operand(&cond.rhs, Reg::B, line)?;
        self.air.emit(Opcode::Cmp, None);
        // Zero flag is set iff the operands are equal
        let holds_on_zero = !cond.negated;
        let jump = if holds_on_zero == jump_if {
            Opcode::Jz
        } else {
            Opcode::Jnz
        };
        self.air.emit_to(jump, target);
        Ok(())
    }

    /// Load a literal or a variable into `reg`. Reading a variable that was never
    /// assigned is an error.
    pub fn load_operand(&mut self, atom: &Atom, reg: Reg, line: usize) -> Result<()> {
        match atom {
            Atom::Int(val) => {
                let op = match reg {
                    Reg::A => Opcode::Lda,
                    Reg::B => Opcode::Ldb,
                };
                self.air.emit(op, Some(*val));
            }
            Atom::Var(name) => {
                let Some(addr) = self.address_of(&name.text) else {
                    return Err(error::name_undefined_var(
                        name.span, &self.src, line, &name.text,
                    ));
                };
                let op = match reg {
                    Reg::A => Opcode::LdaMem,
                    Reg::B => Opcode::LdbMem,
                };
                self.air.emit(op, Some(addr));
            }
        }
        Ok(())
    }
}

/// Assignment targets of `stmts` and their nested blocks, with their source line.
fn collect_targets<'s>(stmts: &'s [Stmt], out: &mut Vec<(usize, &'s Name)>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Assign { target, .. } => out.push((stmt.line, target)),
            StmtKind::If {
                then, otherwise, ..
            } => {
                collect_targets(then, out);
                if let Some(otherwise) = otherwise {
                    collect_targets(otherwise, out);
                }
            }
            StmtKind::While { body, .. } => collect_targets(body, out),
            StmtKind::Print(_) | StmtKind::Call(_) | StmtKind::Return(_) => {}
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;
    use crate::isa::Instruction;

    fn compile(src: &str) -> Program {
        Compiler::new().compile(src).unwrap()
    }

    fn compile_err(src: &str) -> String {
        code(&Compiler::new().compile(src).unwrap_err())
    }

    #[test]
    fn assignment_is_load_store_halt() {
        let mut compiler = Compiler::new();
        let program = compiler.compile("x = 42").unwrap();
        let x = compiler.address_of("x").unwrap();
        assert!(x >= VARIABLE_BASE);
        assert_eq!(
            program,
            vec![
                Instruction::with(Opcode::Lda, 42),
                Instruction::with(Opcode::Sta, x),
                Instruction::bare(Opcode::Halt),
            ]
        );
    }

    #[test]
    fn print_goes_through_output_address() {
        let mut compiler = Compiler::new();
        let program = compiler.compile("x = 42\nprint x").unwrap();
        let x = compiler.address_of("x").unwrap();
        assert_eq!(
            program,
            vec![
                Instruction::with(Opcode::Lda, 42),
                Instruction::with(Opcode::Sta, x),
                Instruction::with(Opcode::LdaMem, x),
                Instruction::with(Opcode::Sta, IO_OUTPUT),
                Instruction::bare(Opcode::Halt),
            ]
        );
    }

    #[test]
    fn variables_are_allocated_in_order() {
        let mut compiler = Compiler::new();
        compiler.compile("a = 1\nb = 2\na = 3\nc = a + b").unwrap();
        assert_eq!(
            compiler.variables().collect::<Vec<_>>(),
            [("a", 16), ("b", 17), ("c", 18)]
        );
    }

    #[test]
    fn compile_starts_from_scratch() {
        let mut compiler = Compiler::new();
        let first = compiler.compile("a = 1\nwhile a != 3\n  a = a + 1").unwrap();
        let second = compiler.compile("a = 1\nwhile a != 3\n  a = a + 1").unwrap();
        assert_eq!(first, second);
        compiler.compile("z = 1").unwrap();
        assert_eq!(compiler.address_of("a"), None);
        assert_eq!(compiler.address_of("z"), Some(VARIABLE_BASE));
    }

    #[test]
    fn while_loop_shape() {
        let program = compile("i = 0\nwhile i != 3:\n    i = i + 1\n");
        let ops: Vec<_> = program.iter().map(|i| i.op).collect();
        use Opcode::*;
        assert_eq!(
            ops,
            [Lda, Sta, LdaMem, Ldb, Cmp, Jz, LdaMem, Ldb, Add, Sta, Jmp, Halt]
        );
        // Exit jumps past the back edge, back edge returns to the condition
        assert_eq!(program[5].byte(), Some(11));
        assert_eq!(program[10].byte(), Some(2));
    }

    #[test]
    fn if_else_shape() {
        let program = compile("x = 1\nif x == 1\n  print 1\nelse\n  print 2\nprint 3");
        use Opcode::*;
        let ops: Vec<_> = program.iter().map(|i| i.op).collect();
        assert_eq!(
            ops,
            [Lda, Sta, LdaMem, Ldb, Cmp, Jnz, Lda, Sta, Jmp, Lda, Sta, Lda, Sta, Halt]
        );
        assert_eq!(program[5].byte(), Some(9));
        assert_eq!(program[8].byte(), Some(11));
    }

    #[test]
    fn if_without_else_has_no_jump() {
        let program = compile("x = 1\nif x != 1\n  print 1");
        assert!(!program.iter().any(|i| i.op == Opcode::Jmp));
        assert_eq!(program[5].op, Opcode::Jz);
        assert_eq!(program[5].byte(), Some(8));
    }

    #[test]
    fn condition_polarities() {
        let mut compiler = Compiler::new();
        let cond = Cond {
            lhs: Atom::Int(1),
            rhs: Atom::Int(2),
            negated: false,
        };
        let label = compiler.generate_label();
        compiler.compile_condition(&cond, label.clone(), 1).unwrap();
        compiler.compile_condition_inverse(&cond, label.clone(), 1).unwrap();
        assert_eq!(compiler.air.get(3).op, Opcode::Jnz);
        assert_eq!(compiler.air.get(7).op, Opcode::Jz);
    }

    #[test]
    fn functions_are_guarded_and_pop_params() {
        let mut compiler = Compiler::new();
        let program = compiler
            .compile("def add(a, b):\n    return a + b\nx = add(2, 3)\nprint x")
            .unwrap();
        use Opcode::*;
        let ops: Vec<_> = program.iter().map(|i| i.op).collect();
        assert_eq!(
            ops,
            [
                Jmp, PopParam, Sta, PopParam, Sta, LdaMem, LdbMem, Add, Ret, Ret, // function
                Lda, Push, Lda, Push, Call, Sta, LdaMem, Sta, Halt, // main
            ]
        );
        assert_eq!(program[0].byte(), Some(10));
        assert_eq!(program[14].byte(), Some(1));
        // Arguments pushed in reverse
        assert_eq!(program[10].byte(), Some(3));
        assert_eq!(program[12].byte(), Some(2));
        assert_eq!(compiler.functions()["add"].params, ["a", "b"]);
    }

    #[test]
    fn addresses_follow_source_order() {
        let mut compiler = Compiler::new();
        compiler
            .compile("x = 42\nprint x\ndef f(a)\n    return a\nprint f(x)")
            .unwrap();
        assert_eq!(compiler.variables().collect::<Vec<_>>(), [("x", 16), ("a", 17)]);
    }

    #[test]
    fn functions_read_globals() {
        let mut compiler = Compiler::new();
        let program = compiler
            .compile("total = 5\ndef show()\n    print total\nshow()")
            .unwrap();
        let total = compiler.address_of("total").unwrap();
        assert_eq!(total, 16);
        // Body follows the guard jump
        assert_eq!(program[1], Instruction::with(Opcode::LdaMem, total));
    }

    #[test]
    fn no_guard_without_functions() {
        let program = compile("print 7");
        assert_eq!(program[0], Instruction::with(Opcode::Lda, 7));
    }

    #[test]
    fn every_target_is_in_range() {
        let src = "\
def twice(n)
    return n + n
i = 0
while i != 4
    if i == 2
        print twice(i)
    else
        print i
    i = i + 1
";
        let program = compile(src);
        for instr in &program {
            assert!(instr.label().is_none());
            if instr.op.is_control_flow() && instr.op != Opcode::Ret {
                let target = instr.byte().unwrap() as usize;
                assert!(target < program.len(), "{instr} out of range");
            }
        }
    }

    #[test]
    fn name_and_arity_errors() {
        assert_eq!(compile_err("print y"), "name::undefined_variable");
        assert_eq!(compile_err("x = y + 1"), "name::undefined_variable");
        assert_eq!(compile_err("while q != 1\n  print 1"), "name::undefined_variable");
        assert_eq!(compile_err("x = f(1)"), "name::undefined_function");
        assert_eq!(
            compile_err("def f(a)\n  return a\nx = f(1, 2)"),
            "compile::arity"
        );
        assert_eq!(compile_err("def f(a)\n  return a\nf()"), "compile::arity");
    }

    #[test]
    fn self_reference_on_first_assignment_is_allowed() {
        let mut compiler = Compiler::new();
        let program = compiler.compile("x = x + 1").unwrap();
        let x = compiler.address_of("x").unwrap();
        assert_eq!(program[0], Instruction::with(Opcode::LdaMem, x));
    }

    #[test]
    fn variables_stop_before_io_region() {
        let src: String = (0..=(VARIABLE_LIMIT - VARIABLE_BASE) as usize + 1)
            .map(|i| format!("v{i} = 0\n"))
            .collect();
        assert_eq!(compile_err(&src), "compile::out_of_variables");
    }

    #[test]
    fn long_programs_are_rejected() {
        let src = "x = 1\n".repeat(200);
        assert_eq!(compile_err(&src), "compile::program_too_large");
    }
}
