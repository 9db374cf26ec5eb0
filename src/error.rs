use miette::{miette, LabeledSpan, Report, Severity};

use crate::isa::{Label, MAX_PROGRAM_LEN};
use crate::span::Span;

/// Error code attached to a diagnostic, or an empty string if it has none.
pub fn code(report: &Report) -> String {
    report
        .code()
        .map(|code| code.to_string())
        .unwrap_or_default()
}

// Syntax errors

pub fn syntax_unknown_stmt(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::unknown_statement",
        help = "statements are assignments, calls, or start with print, if, else, while, def or return",
        labels = vec![LabeledSpan::at(span, "unknown statement")],
        "Unknown statement at line {line}: {}",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn syntax_invalid_assignment(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::invalid_assignment",
        help = "assignments look like `name = value` or `name = a + b`",
        labels = vec![LabeledSpan::at(span, "malformed assignment")],
        "Invalid assignment at line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_invalid_expr(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::invalid_expression",
        help = "expressions are a literal, a variable, `a OP b` with OP one of + - * /, or a call",
        labels = vec![LabeledSpan::at(span, "malformed expression")],
        "Invalid expression at line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_unsupported_condition(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::unsupported_condition",
        help = "only `a == b` and `a != b` are supported",
        labels = vec![LabeledSpan::at(span, "unsupported condition")],
        "Unsupported condition at line {line}: {}",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn syntax_bad_literal(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::bad_literal",
        help = "integer literals are unsigned decimal numbers",
        labels = vec![LabeledSpan::at(span, "invalid literal")],
        "Invalid integer literal at line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_unexpected_indent(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::unexpected_indent",
        help = "only lines following if, else, while or def may be indented further",
        labels = vec![LabeledSpan::at(span, "unexpected indent")],
        "Unexpected indent at line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_expected_block(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::expected_block",
        help = "indent the lines that belong to this statement",
        labels = vec![LabeledSpan::at(span, "block header")],
        "Expected an indented block after line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_else_without_if(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::else_without_if",
        help = "`else` must line up with the `if` it belongs to",
        labels = vec![LabeledSpan::at(span, "dangling else")],
        "Else without matching if at line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_nested_def(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::nested_def",
        help = "move the function definition to the top level",
        labels = vec![LabeledSpan::at(span, "nested definition")],
        "Functions may only be defined at the top level (line {line})",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_duplicate_function(span: Span, src: &str, line: usize, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::duplicate_function",
        help = "function names must be unique",
        labels = vec![LabeledSpan::at(span, "redefined here")],
        "Function '{name}' defined twice (line {line})",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_duplicate_param(span: Span, src: &str, line: usize, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::duplicate_parameter",
        help = "parameter names must be unique within a definition",
        labels = vec![LabeledSpan::at(span, "duplicate parameter")],
        "Parameter '{name}' listed twice at line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn syntax_invalid_def(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "syntax::invalid_definition",
        help = "definitions look like `def name(a, b):`",
        labels = vec![LabeledSpan::at(span, "malformed definition")],
        "Invalid function definition at line {line}",
    )
    .with_source_code(src.to_string())
}

// Name errors

pub fn name_undefined_var(span: Span, src: &str, line: usize, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "name::undefined_variable",
        help = "assign a value to the variable before reading it",
        labels = vec![LabeledSpan::at(span, "undefined variable")],
        "Unknown variable '{name}' at line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn name_undefined_fn(span: Span, src: &str, line: usize, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "name::undefined_function",
        help = "define the function with `def` before running the program",
        labels = vec![LabeledSpan::at(span, "undefined function")],
        "Unknown function '{name}' at line {line}",
    )
    .with_source_code(src.to_string())
}

// Compile errors

pub fn compile_arity(
    span: Span,
    src: &str,
    line: usize,
    name: &str,
    expected: usize,
    found: usize,
) -> Report {
    miette!(
        severity = Severity::Error,
        code = "compile::arity",
        help = "pass exactly one argument per declared parameter",
        labels = vec![LabeledSpan::at(span, "wrong number of arguments")],
        "Function '{name}' expects {expected} argument(s) but got {found} at line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn compile_out_of_variables(span: Span, src: &str, line: usize, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "compile::out_of_variables",
        help = "reuse existing variables; addresses from 0xF0 up are reserved for I/O",
        labels = vec![LabeledSpan::at(span, "no address left")],
        "No memory left for variable '{name}' at line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn compile_undefined_label(label: &Label, idx: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "compile::undefined_label",
        help = "every jump target must be bound before the program is finished",
        "Undefined label: {label} (referenced by instruction {idx})",
    )
}

pub fn compile_duplicate_label(label: &Label, prev: usize, pos: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "compile::duplicate_label",
        "Label {label} bound twice, at {prev} and {pos}",
    )
}

pub fn compile_program_too_large(len: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "compile::program_too_large",
        help = "split the work into fewer statements; jump targets are a single byte",
        "Program needs {len} instructions, at most {MAX_PROGRAM_LEN} are addressable",
    )
}

// Assembler errors

pub fn asm_unknown_mnemonic(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::unknown_mnemonic",
        help = "check the list of available instructions",
        labels = vec![LabeledSpan::at(span, "unknown instruction")],
        "Unknown instruction: {}",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn asm_missing_operand(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::missing_operand",
        help = "this instruction needs an address, value, or label",
        labels = vec![LabeledSpan::at(span, "operand expected")],
        "Missing operand",
    )
    .with_source_code(src.to_string())
}

pub fn asm_unexpected_operand(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::unexpected_operand",
        help = "this instruction takes no operand",
        labels = vec![LabeledSpan::at(span, "unexpected operand")],
        "Unexpected operand",
    )
    .with_source_code(src.to_string())
}

pub fn asm_unknown_label(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::unknown_label",
        help = "labels are declared as `NAME:` at the start of a line",
        labels = vec![LabeledSpan::at(span, "unknown label")],
        "Unknown label or invalid value: {}",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn asm_operand_range(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::operand_range",
        help = "operands range from 0 to 255",
        labels = vec![LabeledSpan::at(span, "out-of-range operand")],
        "Operand does not fit in a byte",
    )
    .with_source_code(src.to_string())
}

pub fn asm_duplicate_label(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::duplicate_label",
        help = "labels are only allowed once per file",
        labels = vec![LabeledSpan::at(span, "duplicate label")],
        "Duplicate label",
    )
    .with_source_code(src.to_string())
}
