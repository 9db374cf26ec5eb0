use std::fmt;
use std::str::FromStr;

/// Address of the byte the machine reads input from.
pub const IO_INPUT: u8 = 0xF0;
/// Writing to this address emits one unit of output.
pub const IO_OUTPUT: u8 = 0xF1;
/// Count of outputs recorded so far, maintained by the computer.
pub const IO_OUTPUT_COUNT: u8 = 0xF2;

/// First address handed out to user variables. Everything below is reserved.
pub const VARIABLE_BASE: u8 = 16;
/// Last address a variable may occupy before running into the I/O region.
pub const VARIABLE_LIMIT: u8 = IO_INPUT - 1;

/// Jump and call operands are a single byte, which bounds the length of a program.
pub const MAX_PROGRAM_LEN: usize = 256;

/// Every instruction the machine understands.
///
/// The numeric value of each variant is its byte encoding, shared with the assembler.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x00,
    /// Load immediate into A
    Lda = 0x01,
    /// Load immediate into B
    Ldb = 0x02,
    Add = 0x03,
    Sub = 0x04,
    /// Store A to memory
    Sta = 0x05,
    Jmp = 0x06,
    /// Jump if the zero flag is set
    Jz = 0x07,
    And = 0x08,
    Or = 0x09,
    Xor = 0x0A,
    Shl = 0x0B,
    Shr = 0x0C,
    Cmp = 0x0D,
    /// Jump if the zero flag is clear
    Jnz = 0x0E,
    /// Load A from memory
    LdaMem = 0x0F,
    /// Load B from memory
    LdbMem = 0x10,
    Mul = 0x11,
    Div = 0x12,
    /// Store B to memory
    Stb = 0x13,
    Push = 0x20,
    Pop = 0x21,
    Call = 0x22,
    Ret = 0x23,
    /// Pop the argument sitting beneath the return address into A
    PopParam = 0x24,
    Halt = 0xFF,
}

impl Opcode {
    pub const ALL: [Opcode; 26] = [
        Opcode::Nop,
        Opcode::Lda,
        Opcode::Ldb,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Sta,
        Opcode::Jmp,
        Opcode::Jz,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::Cmp,
        Opcode::Jnz,
        Opcode::LdaMem,
        Opcode::LdbMem,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Stb,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Call,
        Opcode::Ret,
        Opcode::PopParam,
        Opcode::Halt,
    ];

    /// Byte encoding of the opcode.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Lda => "LDA",
            Opcode::Ldb => "LDB",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Sta => "STA",
            Opcode::Jmp => "JMP",
            Opcode::Jz => "JZ",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            Opcode::Shl => "SHL",
            Opcode::Shr => "SHR",
            Opcode::Cmp => "CMP",
            Opcode::Jnz => "JNZ",
            Opcode::LdaMem => "LDA_MEM",
            Opcode::LdbMem => "LDB_MEM",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Stb => "STB",
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::PopParam => "POP_PARAM",
            Opcode::Halt => "HALT",
        }
    }

    /// Whether the instruction is followed by an operand byte.
    pub fn takes_operand(self) -> bool {
        matches!(
            self,
            Opcode::Lda
                | Opcode::Ldb
                | Opcode::LdaMem
                | Opcode::LdbMem
                | Opcode::Sta
                | Opcode::Stb
                | Opcode::Jmp
                | Opcode::Jz
                | Opcode::Jnz
                | Opcode::Call
        )
    }

    /// Instructions that set the program counter themselves.
    pub fn is_control_flow(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Jz | Opcode::Jnz | Opcode::Call | Opcode::Ret
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Failure to turn text or bytes back into an [`Opcode`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum DecodeError {
    UnknownMnemonic(String),
    UnknownOpcode(u8),
    /// Byte stream ended where an operand was expected.
    TruncatedOperand { addr: usize, opcode: Opcode },
}

impl std::error::Error for DecodeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMnemonic(name) => write!(f, "unknown instruction '{name}'"),
            Self::UnknownOpcode(byte) => write!(f, "unknown opcode 0x{byte:02X}"),
            Self::TruncatedOperand { addr, opcode } => {
                write!(f, "{opcode} at 0x{addr:02X} is missing its operand byte")
            }
        }
    }
}

impl FromStr for Opcode {
    type Err = DecodeError;

    /// Mnemonics are matched case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .into_iter()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(s))
            .ok_or_else(|| DecodeError::UnknownMnemonic(s.to_string()))
    }
}

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .into_iter()
            .find(|op| op.code() == byte)
            .ok_or(DecodeError::UnknownOpcode(byte))
    }
}

/// Symbolic jump target, only present while a program is being built.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label(name.into())
    }

    /// Entry point label of a user function.
    pub fn function(name: &str) -> Self {
        Label(format!("func_{name}"))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    Byte(u8),
    Label(Label),
}

/// One (mnemonic, operand) pair of a program.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub op: Opcode,
    pub operand: Option<Operand>,
}

impl Instruction {
    pub fn new(op: Opcode, operand: Option<u8>) -> Self {
        Instruction {
            op,
            operand: operand.map(Operand::Byte),
        }
    }

    pub fn bare(op: Opcode) -> Self {
        Instruction { op, operand: None }
    }

    pub fn with(op: Opcode, operand: u8) -> Self {
        Instruction {
            op,
            operand: Some(Operand::Byte(operand)),
        }
    }

    pub fn to_label(op: Opcode, label: Label) -> Self {
        Instruction {
            op,
            operand: Some(Operand::Label(label)),
        }
    }

    /// Resolved operand byte, if any. `None` for a label that has not been patched.
    pub fn byte(&self) -> Option<u8> {
        match self.operand {
            Some(Operand::Byte(val)) => Some(val),
            _ => None,
        }
    }

    pub fn label(&self) -> Option<&Label> {
        match &self.operand {
            Some(Operand::Label(label)) => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            None => write!(f, "{}", self.op),
            Some(Operand::Byte(val)) => write!(f, "{} {}", self.op, val),
            Some(Operand::Label(label)) => write!(f, "{} {}", self.op, label),
        }
    }
}

/// A fully resolved, executable sequence of instructions.
pub type Program = Vec<Instruction>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_bytes_are_unique() {
        for (i, a) in Opcode::ALL.iter().enumerate() {
            for b in &Opcode::ALL[i + 1..] {
                assert_ne!(a.code(), b.code(), "{a} and {b} share an encoding");
            }
        }
    }

    #[test]
    fn mnemonics_parse_case_insensitively() {
        assert_eq!("lda_mem".parse::<Opcode>(), Ok(Opcode::LdaMem));
        assert_eq!("Pop_Param".parse::<Opcode>(), Ok(Opcode::PopParam));
        assert_eq!(
            "FOO".parse::<Opcode>(),
            Err(DecodeError::UnknownMnemonic("FOO".into()))
        );
    }

    #[test]
    fn bytes_decode_to_opcodes() {
        assert_eq!(Opcode::try_from(0x0E), Ok(Opcode::Jnz));
        assert_eq!(Opcode::try_from(0xFF), Ok(Opcode::Halt));
        assert_eq!(Opcode::try_from(0x30), Err(DecodeError::UnknownOpcode(0x30)));
    }

    #[test]
    fn display_matches_listing_format() {
        assert_eq!(Instruction::with(Opcode::Sta, 241).to_string(), "STA 241");
        assert_eq!(Instruction::bare(Opcode::Halt).to_string(), "HALT");
        assert_eq!(
            Instruction::to_label(Opcode::Call, Label::function("sq")).to_string(),
            "CALL func_sq"
        );
    }
}
