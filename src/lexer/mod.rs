use std::fmt;

use crate::lexer::cursor::Cursor;
use crate::span::Span;

pub mod cursor;

/// Marks the rest of a line as a comment.
pub const COMMENT: char = '#';

/// A non-blank source line with its comment removed.
#[derive(Clone, Copy, Debug)]
pub struct Line<'a> {
    /// 1-based line number within the source
    pub number: usize,
    /// Leading whitespace, in columns
    pub indent: usize,
    /// Trimmed content
    pub text: &'a str,
    /// Location of `text` within the source
    pub span: Span,
}

impl<'a> Line<'a> {
    pub fn tokens(&self) -> Vec<Token> {
        tokenize(self.text, self.span.offs()).collect()
    }
}

/// Split source into its meaningful lines, dropping blank lines and comments.
pub fn preprocess(src: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut offs = 0;
    for (i, raw) in src.split('\n').enumerate() {
        let start = offs;
        offs += raw.len() + 1;

        let code = match raw.find(COMMENT) {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let code = code.trim_end();
        let text = code.trim_start();
        if text.is_empty() {
            continue;
        }
        let indent_bytes = code.len() - text.len();
        lines.push(Line {
            number: i + 1,
            indent: code[..indent_bytes].chars().count(),
            text,
            span: Span::from_range(start + indent_bytes..start + code.len()),
        });
    }
    lines
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Ident,
    /// Unsigned decimal literal
    Int,
    Plus,
    Minus,
    Star,
    Slash,
    /// `=`
    Assign,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// Any of `<`, `>`, `<=`, `>=`
    Relational,
    LParen,
    RParen,
    Comma,
    Colon,
    Unknown,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer literal",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Assign => "=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Relational => "relational operator",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Unknown => "unknown token",
        };
        f.write_str(s)
    }
}

/// Test if a character may start an identifier.
pub(crate) fn is_id_start(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '_')
}

/// Test if a character may continue an identifier.
pub(crate) fn is_id(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
}

/// Tokens of `input`, which starts at byte `base` of the source.
pub fn tokenize(input: &str, base: usize) -> impl Iterator<Item = Token> + '_ {
    let mut cursor = Cursor::new(input, base);
    std::iter::from_fn(move || {
        cursor.take_while(char::is_whitespace);
        cursor.reset_pos();
        if cursor.is_eof() {
            None
        } else {
            Some(cursor.advance_token())
        }
    })
}

impl Cursor<'_> {
    pub fn advance_token(&mut self) -> Token {
        let start = self.token_start();
        let first_char = match self.bump() {
            Some(c) => c,
            None => return Token::new(TokenKind::Unknown, Span::from_range(start..start)),
        };
        let kind = match first_char {
            c if c.is_ascii_digit() => {
                self.take_while(|c| c.is_ascii_digit());
                // `12abc` is neither a number nor a name
                if is_id(self.first()) {
                    self.take_while(is_id);
                    TokenKind::Unknown
                } else {
                    TokenKind::Int
                }
            }
            c if is_id_start(c) => {
                self.take_while(is_id);
                TokenKind::Ident
            }
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '=' => match self.first() {
                '=' => {
                    self.bump();
                    TokenKind::EqEq
                }
                _ => TokenKind::Assign,
            },
            '!' => match self.first() {
                '=' => {
                    self.bump();
                    TokenKind::NotEq
                }
                _ => TokenKind::Unknown,
            },
            '<' | '>' => {
                if self.first() == '=' {
                    self.bump();
                }
                TokenKind::Relational
            }
            _ => TokenKind::Unknown,
        };
        let token = Token::new(kind, Span::from_range(start..start + self.pos_in_token()));
        self.reset_pos();
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input, 0).map(|tok| tok.kind).collect()
    }

    #[test]
    fn tokenizes_statements() {
        use TokenKind::*;
        assert_eq!(kinds("x = a + 12"), [Ident, Assign, Ident, Plus, Int]);
        assert_eq!(kinds("while i != 5:"), [Ident, Ident, NotEq, Int, Colon]);
        assert_eq!(kinds("if a==b"), [Ident, Ident, EqEq, Ident]);
        assert_eq!(kinds("f(a, 2)"), [Ident, LParen, Ident, Comma, Int, RParen]);
        assert_eq!(kinds("a <= b > c"), [Ident, Relational, Ident, Relational, Ident]);
        assert_eq!(kinds("3x ! $"), [Unknown, Unknown, Unknown]);
    }

    #[test]
    fn spans_are_absolute() {
        let src = "    total = x";
        let toks: Vec<_> = tokenize(&src[4..], 4).collect();
        assert_eq!(toks[0].span.as_range(), 4..9);
        assert_eq!(&src[toks[2].span.as_range()], "x");
    }

    #[test]
    fn preprocess_strips_comments_and_blank_lines() {
        let src = "# header\nx = 1  # trailing\n\n  \nif x == 1\n    print x\n";
        let lines = preprocess(src);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "x = 1");
        assert_eq!(lines[0].number, 2);
        assert_eq!(lines[0].indent, 0);
        assert_eq!(lines[2].text, "print x");
        assert_eq!(lines[2].indent, 4);
        assert_eq!(&src[lines[2].span.as_range()], "print x");
    }

    #[test]
    fn handles_crlf_line_endings() {
        let lines = preprocess("x = 1\r\n  y = 2\r\n");
        assert_eq!(lines[0].text, "x = 1");
        assert_eq!(lines[1].text, "y = 2");
        assert_eq!(lines[1].indent, 2);
    }
}
