use miette::Result;

use crate::air::FxMap;
use crate::error;
use crate::isa::{DecodeError, Instruction, Opcode};
use crate::lexer::{is_id, is_id_start};
use crate::span::Span;

/// Starts a comment running to the end of the line.
pub const ASM_COMMENT: char = ';';

/// Word of an assembly line and where it sits in the source.
type Word<'a> = (&'a str, Span);

/// One non-empty line after the first pass.
struct AsmLine<'a> {
    op: Opcode,
    /// Span of the mnemonic
    span: Span,
    operand: Option<Word<'a>>,
}

/// Two-pass assembler from `LABEL: MNEMONIC OPERAND` text to a flat byte array.
pub struct Assembler<'a> {
    /// Reference to the source file
    src: &'a str,
    lines: Vec<AsmLine<'a>>,
    /// Label -> byte address
    labels: FxMap<&'a str, usize>,
}

impl<'a> Assembler<'a> {
    /// First pass: decode mnemonics, check operand counts and assign every label its
    /// byte address.
    pub fn new(src: &'a str) -> Result<Self> {
        let mut asm = Assembler {
            src,
            lines: Vec::new(),
            labels: FxMap::default(),
        };
        let mut addr = 0;
        let mut offs = 0;
        for raw in src.split('\n') {
            let base = offs;
            offs += raw.len() + 1;
            let code = match raw.find(ASM_COMMENT) {
                Some(pos) => &raw[..pos],
                None => raw,
            };
            // Everything before the first `:` names a label
            let (code, base) = match code.find(':') {
                Some(pos) => {
                    let colon = Span::from_range(base + pos..base + pos + 1);
                    let (name, span) = match words(&code[..pos], base)[..] {
                        [(name, span)] if is_label(name) => (name, span),
                        [] => return Err(error::asm_unknown_label(colon, src)),
                        [(_, first), .., (_, last)] => {
                            let span = Span::from_range(first.offs()..last.offs() + last.len());
                            return Err(error::asm_unknown_label(span, src));
                        }
                        [(_, span)] => return Err(error::asm_unknown_label(span, src)),
                    };
                    if asm.labels.insert(name, addr).is_some() {
                        return Err(error::asm_duplicate_label(span, src));
                    }
                    (&code[pos + 1..], base + pos + 1)
                }
                None => (code, base),
            };
            let mut words = words(code, base).into_iter();

            let Some((mnemonic, span)) = words.next() else {
                continue;
            };
            let op: Opcode = mnemonic
                .parse()
                .map_err(|_| error::asm_unknown_mnemonic(span, src))?;
            let operand = words.next();
            if let Some((_, extra)) = words.next() {
                return Err(error::asm_unexpected_operand(extra, src));
            }
            match (op.takes_operand(), operand) {
                (true, None) => return Err(error::asm_missing_operand(span, src)),
                (false, Some((_, extra))) => {
                    return Err(error::asm_unexpected_operand(extra, src))
                }
                _ => {}
            }

            addr += if op.takes_operand() { 2 } else { 1 };
            asm.lines.push(AsmLine { op, span, operand });
        }
        log::debug!(
            "assembler: {} instructions, {} labels, {addr} bytes",
            asm.lines.len(),
            asm.labels.len()
        );
        Ok(asm)
    }

    /// Second pass: emit opcode bytes and resolved operands.
    pub fn emit(self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        for line in &self.lines {
            bytes.push(line.op.code());
            if let Some(operand) = line.operand {
                bytes.push(self.resolve(operand)?);
            }
            log::trace!("{} at {}", line.op, line.span.offs());
        }
        Ok(bytes)
    }

    fn resolve(&self, (word, span): Word) -> Result<u8> {
        let val = if word.starts_with(|c: char| c.is_ascii_digit()) {
            parse_number(word).ok_or_else(|| error::asm_unknown_label(span, self.src))?
        } else {
            match self.labels.get(word) {
                Some(addr) => *addr as u64,
                None => return Err(error::asm_unknown_label(span, self.src)),
            }
        };
        u8::try_from(val).map_err(|_| error::asm_operand_range(span, self.src))
    }
}

/// Assemble source text into machine bytes.
pub fn assemble(src: &str) -> Result<Vec<u8>> {
    Assembler::new(src)?.emit()
}

/// Decode machine bytes back into instructions, paired with their byte address.
pub fn disassemble(bytes: &[u8]) -> std::result::Result<Vec<(usize, Instruction)>, DecodeError> {
    let mut out = Vec::new();
    let mut addr = 0;
    while let Some(&byte) = bytes.get(addr) {
        let op = Opcode::try_from(byte)?;
        let operand = if op.takes_operand() {
            let val = bytes
                .get(addr + 1)
                .copied()
                .ok_or(DecodeError::TruncatedOperand { addr, opcode: op })?;
            Some(val)
        } else {
            None
        };
        out.push((addr, Instruction::new(op, operand)));
        addr += if operand.is_some() { 2 } else { 1 };
    }
    Ok(out)
}

fn is_label(name: &str) -> bool {
    name.starts_with(is_id_start) && name.chars().all(is_id)
}

/// Decimal or `0x` hexadecimal.
fn parse_number(word: &str) -> Option<u64> {
    match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => word.parse().ok(),
    }
}

/// Whitespace separated words of `text`, which starts at byte `base` of the source.
fn words(text: &str, base: usize) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    let mut start = None;
    let ends = text.char_indices().chain(std::iter::once((text.len(), ' ')));
    for (i, c) in ends {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                words.push((&text[s..i], Span::from_range(base + s..base + i)));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    words
}
