// Heavily inspired by the cursor in `rustc_lexer` and adapted to suit the project.
// See https://doc.rust-lang.org/beta/nightly-rustc/src/rustc_lexer/cursor.rs.html

use std::str::Chars;

/// Peekable iterator over a char sequence.
#[derive(Clone)]
pub struct Cursor<'a> {
    /// Length of input when the current token started
    len_remaining: usize,
    /// Iterator over chars in a &str
    chars: Chars<'a>,
    /// Byte offset of the input from the start of the source
    base: usize,
    input_len: usize,
}

impl<'a> Cursor<'a> {
    /// `base` is the byte offset of `input` within the whole source, so token spans can
    /// be reported against the source rather than the line.
    pub fn new(input: &'a str, base: usize) -> Cursor<'a> {
        Cursor {
            len_remaining: input.len(),
            chars: input.chars(),
            base,
            input_len: input.len(),
        }
    }

    /// Peek at the next char without consuming it.
    pub fn first(&self) -> char {
        self.chars.clone().next().unwrap_or('\0')
    }

    pub fn is_eof(&self) -> bool {
        self.chars.as_str().is_empty()
    }

    /// Advance by one character
    pub fn bump(&mut self) -> Option<char> {
        self.chars.next()
    }

    /// Consume chars while `pred` holds.
    pub fn take_while(&mut self, mut pred: impl FnMut(char) -> bool) {
        while pred(self.first()) && !self.is_eof() {
            self.bump();
        }
    }

    /// Bytes consumed since the start of the current token.
    pub fn pos_in_token(&self) -> usize {
        self.len_remaining - self.chars.as_str().len()
    }

    /// Absolute source offset of the start of the current token.
    pub fn token_start(&self) -> usize {
        self.base + self.input_len - self.len_remaining
    }

    /// Start a new token at the current position.
    pub fn reset_pos(&mut self) {
        self.len_remaining = self.chars.as_str().len();
    }
}
