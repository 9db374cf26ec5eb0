use simplescript::error::code;
use simplescript::isa::IO_OUTPUT;
use simplescript::{Compiler, Computer, Opcode, Status, Warning};

fn outputs(src: &str) -> Vec<u8> {
    run(src).get_all_outputs().to_vec()
}

fn run(src: &str) -> Computer {
    let program = Compiler::new().compile(src).unwrap();
    let mut computer = Computer::new();
    computer.load_program(program).unwrap();
    computer.run().unwrap();
    computer
}

#[test]
fn literals_print_modulo_256() {
    for literal in [0u32, 7, 255, 256, 300, 1000, 65535] {
        let src = format!("v = {literal}\nprint v");
        assert_eq!(outputs(&src), [(literal % 256) as u8], "literal {literal}");
    }
}

#[test]
fn arithmetic_wraps_and_floors() {
    let cases = [
        ("+", 200u8, 100u8, 44u8),
        ("-", 3, 5, 254),
        ("*", 16, 17, 16),
        ("/", 17, 5, 3),
        ("/", 4, 9, 0),
    ];
    for (op, a, b, expected) in cases {
        let src = format!("a = {a}\nb = {b}\nc = a {op} b\nprint c");
        assert_eq!(outputs(&src), [expected], "{a} {op} {b}");
    }
}

#[test]
fn division_by_zero_yields_zero_and_warning() {
    let computer = run("a = 9\nb = 0\nprint a / b\nprint 1");
    assert_eq!(computer.get_all_outputs(), &[0, 1]);
    assert!(matches!(
        computer.warnings(),
        [Warning::DivisionByZero { .. }]
    ));
    assert_eq!(computer.cpu().status(), Status::Halted);
}

#[test]
fn counting_loop() {
    let src = "counter = 1\nwhile counter != 5:\n    print counter\n    counter = counter + 1\n";
    assert_eq!(outputs(src), [1, 2, 3, 4]);
}

#[test]
fn nested_blocks() {
    let src = "\
i = 0
total = 0
while i != 3
    j = 0
    while j != 3
        if i == j
            total = total + 10
        else
            total = total + 1
        j = j + 1
    i = i + 1
print total
";
    assert_eq!(outputs(src), [36]);
}

#[test]
fn while_with_false_condition_never_runs() {
    assert_eq!(outputs("x = 5\nwhile x != 5\n    print x\nprint 1"), [1]);
}

#[test]
fn functions_and_nested_calls() {
    let src = "\
def add(a, b):
    return a + b

def square(n):
    return n * n

def show(v):
    print v

print add(2, 3)
print square(add(1, 2))
print add(square(3), 1)
show(42)
";
    let computer = run(src);
    assert_eq!(computer.get_all_outputs(), &[5, 9, 10, 42]);
    // Every call returned and popped its arguments
    assert_eq!(computer.memory().stack_depth(), 0);
    assert!(computer.warnings().is_empty());
}

#[test]
fn functions_see_globals() {
    assert_eq!(outputs("total = 5\ndef show()\n    print total\nshow()"), [5]);

    let src = "\
def bump()
    count = count + 1
count = 0
bump()
bump()
print count
";
    assert_eq!(outputs(src), [2]);
}

#[test]
fn early_return_skips_rest_of_body() {
    let src = "\
def pick(x):
    if x == 0
        return 100
    return x
print pick(0)
print pick(7)
";
    assert_eq!(outputs(src), [100, 7]);
}

#[test]
fn return_at_top_level_halts() {
    let computer = run("print 1\nreturn\nprint 2");
    assert_eq!(computer.get_all_outputs(), &[1]);
    assert!(matches!(
        computer.warnings(),
        [Warning::ReturnUnderflow { .. }]
    ));
}

#[test]
fn output_counter_tracks_prints() {
    let computer = run("print 0\nprint 0\nprint 3");
    assert_eq!(computer.get_all_outputs(), &[0, 0, 3]);
    assert_eq!(computer.memory().read(0xF2), Ok(3));
    assert_eq!(computer.memory().read(IO_OUTPUT as usize), Ok(0));
}

#[test]
fn comments_and_blank_lines_are_ignored() {
    let src = "# setup\n\nx = 2   # two\n\n\n# output\nprint x\n";
    let program = Compiler::new().compile(src).unwrap();
    assert_eq!(program.len(), 5);
    assert_eq!(program.last().map(|i| i.op), Some(Opcode::Halt));
}

#[test]
fn compile_errors_name_their_kind() {
    let err = |src: &str| code(&Compiler::new().compile(src).unwrap_err());
    assert_eq!(err("x = 1\nif x > 0\n    print x"), "syntax::unsupported_condition");
    assert_eq!(err("print missing"), "name::undefined_variable");
    assert_eq!(err("go()"), "name::undefined_function");
    assert_eq!(err("def f(a)\n    return a\nprint f()"), "compile::arity");
}
