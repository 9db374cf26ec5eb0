use miette::Result;

use crate::air::FxMap;
use crate::error;
use crate::lexer::{preprocess, Line, Token, TokenKind};
use crate::span::Span;

const KEYWORDS: [&str; 6] = ["print", "if", "else", "while", "def", "return"];

fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Identifier together with where it was written.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Name {
    pub text: String,
    pub span: Span,
}

/// Operand of an expression: loaded into a register with a single instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Atom {
    /// Literal, already reduced modulo 256
    Int(u8),
    Var(Name),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Call {
    pub name: Name,
    pub args: Vec<Expr>,
    /// Whole call expression
    pub span: Span,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Expr {
    Atom(Atom),
    Binary { op: BinOp, lhs: Atom, rhs: Atom },
    Call(Call),
}

/// `lhs == rhs`, or `lhs != rhs` when `negated`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Cond {
    pub lhs: Atom,
    pub rhs: Atom,
    pub negated: bool,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    /// 1-based source line
    pub line: usize,
    pub span: Span,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StmtKind {
    Assign { target: Name, value: Expr },
    Print(Expr),
    If {
        cond: Cond,
        then: Vec<Stmt>,
        otherwise: Option<Vec<Stmt>>,
    },
    While { cond: Cond, body: Vec<Stmt> },
    Call(Call),
    Return(Option<Expr>),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FuncDef {
    pub name: Name,
    pub params: Vec<Name>,
    pub body: Vec<Stmt>,
    /// First and last source line of the definition
    pub lines: (usize, usize),
}

/// Parsed program: function definitions and the statements of the main program.
#[derive(Debug, Default)]
pub struct Ast {
    pub functions: FxMap<String, FuncDef>,
    pub main: Vec<Stmt>,
}

/// Turns SimpleScript source into an [`Ast`], following indentation to find blocks.
pub struct Parser<'a> {
    src: &'a str,
    lines: Vec<Line<'a>>,
    /// Index of the next unconsumed line
    pos: usize,
    functions: FxMap<String, FuncDef>,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Self {
        Parser {
            src,
            lines: preprocess(src),
            pos: 0,
            functions: FxMap::default(),
        }
    }

    pub fn parse(mut self) -> Result<Ast> {
        let Some(indent) = self.lines.first().map(|line| line.indent) else {
            return Ok(Ast::default());
        };
        let main = self.parse_block(indent, true)?;
        // A line dedented past the top-level block
        if let Some(line) = self.lines.get(self.pos) {
            return Err(error::syntax_unexpected_indent(line.span, self.src, line.number));
        }
        log::debug!(
            "parsed {} top-level statements and {} functions",
            main.len(),
            self.functions.len()
        );
        Ok(Ast {
            functions: self.functions,
            main,
        })
    }

    /// Parse lines at `indent` until one is indented less.
    fn parse_block(&mut self, indent: usize, top_level: bool) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while let Some(line) = self.lines.get(self.pos).copied() {
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(error::syntax_unexpected_indent(line.span, self.src, line.number));
            }
            self.pos += 1;
            if let Some(stmt) = self.parse_stmt(line, top_level)? {
                stmts.push(stmt);
            }
        }
        Ok(stmts)
    }

    /// Parse the block owned by `header`, which must be indented deeper than it.
    fn parse_body(&mut self, header: Line) -> Result<Vec<Stmt>> {
        match self.lines.get(self.pos).copied() {
            Some(next) if next.indent > header.indent => {
                let indent = next.indent;
                self.parse_block(indent, false)
            }
            _ => Err(error::syntax_expected_block(
                header.span,
                self.src,
                header.number,
            )),
        }
    }

    /// `else` alone on its line, with the optional header colon.
    fn is_else(&self, line: Line) -> bool {
        match strip_colon(&line.tokens()) {
            [tok] => tok.kind == TokenKind::Ident && self.text(tok.span) == "else",
            _ => false,
        }
    }

    /// Returns `None` for definitions, which are stored aside.
    fn parse_stmt(&mut self, line: Line, top_level: bool) -> Result<Option<Stmt>> {
        let toks = line.tokens();
        let first = toks[0];
        let keyword = match first.kind {
            TokenKind::Ident => self.text(first.span),
            _ => "",
        };
        let kind = match keyword {
            "print" => StmtKind::Print(self.parse_expr(&toks[1..], line)?),
            "if" => {
                let cond = self.parse_cond(strip_colon(&toks[1..]), line)?;
                let then = self.parse_body(line)?;
                let otherwise = match self.lines.get(self.pos).copied() {
                    Some(next) if next.indent == line.indent && self.is_else(next) => {
                        self.pos += 1;
                        Some(self.parse_body(next)?)
                    }
                    _ => None,
                };
                StmtKind::If {
                    cond,
                    then,
                    otherwise,
                }
            }
            "else" => {
                return Err(error::syntax_else_without_if(line.span, self.src, line.number))
            }
            "while" => {
                let cond = self.parse_cond(strip_colon(&toks[1..]), line)?;
                let body = self.parse_body(line)?;
                StmtKind::While { cond, body }
            }
            "def" => {
                if !top_level {
                    return Err(error::syntax_nested_def(line.span, self.src, line.number));
                }
                self.parse_def(&toks, line)?;
                return Ok(None);
            }
            "return" => match toks.len() {
                1 => StmtKind::Return(None),
                _ => StmtKind::Return(Some(self.parse_expr(&toks[1..], line)?)),
            },
            _ => match toks.get(1).map(|tok| tok.kind) {
                Some(TokenKind::Assign) if first.kind == TokenKind::Ident => {
                    if toks.len() < 3 {
                        return Err(error::syntax_invalid_assignment(
                            line.span,
                            self.src,
                            line.number,
                        ));
                    }
                    let target = self.name(first);
                    let value = self.parse_expr(&toks[2..], line)?;
                    StmtKind::Assign { target, value }
                }
                Some(TokenKind::LParen) if first.kind == TokenKind::Ident => {
                    match self.parse_expr(&toks, line)? {
                        Expr::Call(call) => StmtKind::Call(call),
                        _ => {
                            return Err(error::syntax_unknown_stmt(
                                line.span,
                                self.src,
                                line.number,
                            ))
                        }
                    }
                }
                _ if toks.iter().any(|tok| tok.kind == TokenKind::Assign) => {
                    return Err(error::syntax_invalid_assignment(
                        line.span,
                        self.src,
                        line.number,
                    ))
                }
                _ => return Err(error::syntax_unknown_stmt(line.span, self.src, line.number)),
            },
        };
        Ok(Some(Stmt {
            kind,
            line: line.number,
            span: line.span,
        }))
    }

    /// `def name(a, b):` followed by its body.
    fn parse_def(&mut self, toks: &[Token], line: Line) -> Result<()> {
        let invalid = || error::syntax_invalid_def(line.span, self.src, line.number);
        let toks = strip_colon(toks);
        let (name_tok, rest) = match toks.get(1..) {
            Some([name, rest @ ..]) if name.kind == TokenKind::Ident => (*name, rest),
            _ => return Err(invalid()),
        };
        let name = self.name(name_tok);
        if is_keyword(&name.text) {
            return Err(invalid());
        }
        let inner = match rest {
            [open, inner @ .., close]
                if open.kind == TokenKind::LParen && close.kind == TokenKind::RParen =>
            {
                inner
            }
            _ => return Err(invalid()),
        };

        let mut params: Vec<Name> = Vec::new();
        if !inner.is_empty() {
            for chunk in inner.split(|tok| tok.kind == TokenKind::Comma) {
                let param = match chunk {
                    [tok] if tok.kind == TokenKind::Ident => self.name(*tok),
                    _ => return Err(invalid()),
                };
                if is_keyword(&param.text) {
                    return Err(invalid());
                }
                if params.iter().any(|p| p.text == param.text) {
                    return Err(error::syntax_duplicate_param(
                        param.span,
                        self.src,
                        line.number,
                        &param.text,
                    ));
                }
                params.push(param);
            }
        }

        if self.functions.contains_key(&name.text) {
            return Err(error::syntax_duplicate_function(
                name.span,
                self.src,
                line.number,
                &name.text,
            ));
        }

        let body = self.parse_body(line)?;
        let last = self.lines[self.pos - 1].number;
        self.functions.insert(
            name.text.clone(),
            FuncDef {
                name,
                params,
                body,
                lines: (line.number, last),
            },
        );
        Ok(())
    }

    /// Only `a == b` and `a != b` are conditions.
    fn parse_cond(&self, toks: &[Token], line: Line) -> Result<Cond> {
        match toks {
            [lhs, op, rhs] if matches!(op.kind, TokenKind::EqEq | TokenKind::NotEq) => Ok(Cond {
                lhs: self.parse_atom(*lhs, line)?,
                rhs: self.parse_atom(*rhs, line)?,
                negated: op.kind == TokenKind::NotEq,
            }),
            [] => Err(error::syntax_unsupported_condition(
                line.span,
                self.src,
                line.number,
            )),
            _ => {
                let has_cmp = toks
                    .iter()
                    .any(|tok| matches!(tok.kind, TokenKind::EqEq | TokenKind::NotEq));
                if has_cmp {
                    // Comparison present, but its sides are not plain operands
                    Err(error::syntax_invalid_expr(covering(toks), self.src, line.number))
                } else {
                    Err(error::syntax_unsupported_condition(
                        covering(toks),
                        self.src,
                        line.number,
                    ))
                }
            }
        }
    }

    fn parse_expr(&self, toks: &[Token], line: Line) -> Result<Expr> {
        let invalid = || {
            let span = if toks.is_empty() {
                line.span
            } else {
                covering(toks)
            };
            error::syntax_invalid_expr(span, self.src, line.number)
        };
        match toks {
            [atom] => Ok(Expr::Atom(self.parse_atom(*atom, line)?)),
            [lhs, op, rhs] if bin_op(op.kind).is_some() => Ok(Expr::Binary {
                op: bin_op(op.kind).ok_or_else(invalid)?,
                lhs: self.parse_atom(*lhs, line)?,
                rhs: self.parse_atom(*rhs, line)?,
            }),
            [name, open, inner @ .., close]
                if name.kind == TokenKind::Ident
                    && open.kind == TokenKind::LParen
                    && close.kind == TokenKind::RParen =>
            {
                let name = self.name(*name);
                if is_keyword(&name.text) {
                    return Err(invalid());
                }
                let mut args = Vec::new();
                for arg in split_args(inner).ok_or_else(invalid)? {
                    args.push(self.parse_expr(arg, line)?);
                }
                Ok(Expr::Call(Call {
                    name,
                    args,
                    span: covering(toks),
                }))
            }
            _ => Err(invalid()),
        }
    }

    fn parse_atom(&self, tok: Token, line: Line) -> Result<Atom> {
        let text = self.text(tok.span);
        match tok.kind {
            TokenKind::Int => Ok(Atom::Int(reduce_literal(text))),
            TokenKind::Ident if !is_keyword(text) => Ok(Atom::Var(self.name(tok))),
            TokenKind::Unknown if text.starts_with(|c: char| c.is_ascii_digit()) => Err(
                error::syntax_bad_literal(tok.span, self.src, line.number),
            ),
            _ => Err(error::syntax_invalid_expr(tok.span, self.src, line.number)),
        }
    }

    fn text(&self, span: Span) -> &'a str {
        &self.src[span.as_range()]
    }

    fn name(&self, tok: Token) -> Name {
        Name {
            text: self.text(tok.span).to_string(),
            span: tok.span,
        }
    }
}

/// Header lines may end in an optional `:`.
fn strip_colon(toks: &[Token]) -> &[Token] {
    match toks {
        [rest @ .., last] if last.kind == TokenKind::Colon => rest,
        _ => toks,
    }
}

fn bin_op(kind: TokenKind) -> Option<BinOp> {
    match kind {
        TokenKind::Plus => Some(BinOp::Add),
        TokenKind::Minus => Some(BinOp::Sub),
        TokenKind::Star => Some(BinOp::Mul),
        TokenKind::Slash => Some(BinOp::Div),
        _ => None,
    }
}

/// Decimal literal reduced modulo 256, so arbitrarily long literals are accepted.
fn reduce_literal(digits: &str) -> u8 {
    digits
        .bytes()
        .fold(0u16, |acc, d| (acc * 10 + (d - b'0') as u16) % 256) as u8
}

/// Span from the first to the last token.
fn covering(toks: &[Token]) -> Span {
    match (toks.first(), toks.last()) {
        (Some(first), Some(last)) => Span::from_range(first.span.offs()..last.span.as_range().end),
        _ => Span::default(),
    }
}

/// Split call arguments on commas that are not nested in parentheses.
/// Returns `None` for an empty argument such as in `f(a,)`.
fn split_args(toks: &[Token]) -> Option<Vec<&[Token]>> {
    if toks.is_empty() {
        return Some(Vec::new());
    }
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, tok) in toks.iter().enumerate() {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.checked_sub(1)?,
            TokenKind::Comma if depth == 0 => {
                args.push(&toks[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(&toks[start..]);
    if depth != 0 || args.iter().any(|arg| arg.is_empty()) {
        return None;
    }
    Some(args)
}
