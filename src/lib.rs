// Source language
mod lexer;
pub mod parser;
pub use parser::{Ast, Parser};
pub mod compiler;
pub use compiler::{Compiler, Function};
mod air;
pub use air::Air;

// Machine
pub mod isa;
pub use isa::{Instruction, Opcode, Program};
pub mod memory;
pub use memory::{Memory, MemoryError};
mod runtime;
pub use runtime::{Cpu, RuntimeError, Status, Warning};
mod computer;
pub use computer::Computer;

// Byte assembler
pub mod asm;

pub mod error;
pub mod output;
mod span;
pub use span::Span;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
