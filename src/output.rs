use std::cell::RefCell;
use std::str::Chars;

use colored::{ColoredString, Colorize};

use crate::isa::Instruction;
use crate::runtime::{Cpu, Warning};

/// Where a line of run-time output goes.
#[derive(Clone, Copy, Debug)]
pub enum Output {
    /// Program output, to stdout
    Normal,
    /// Execution trace and machine state, to stderr
    Trace,
}

struct Decolored<'a> {
    chars: Chars<'a>,
}

impl Output {
    thread_local! {
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }
    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    pub fn print_str(&self, string: &str) {
        match self {
            Self::Normal => print!("{}", string),
            Self::Trace => {
                if Self::is_minimal() {
                    eprint_colorless(string);
                } else {
                    eprint!("{}", ColoredString::from(string).blue());
                }
            }
        }
    }

    /// One value written by the program to the output address.
    pub fn print_value(&self, value: u8) {
        if Self::is_minimal() {
            self.print_str(&format!("{value}\n"));
            return;
        }
        self.print_str(&format!("{:>12} ", "Output".bold()));
        self.print_integer(value);
        self.print_str("\n");
    }

    pub fn print_warning(&self, warning: &Warning) {
        if Self::is_minimal() {
            eprintln!("warning: {warning}");
        } else {
            eprintln!("{:>12} {warning}", "Warning".yellow().bold());
        }
    }

    /// Instruction about to be executed, with the register state before it runs.
    pub fn print_trace(&self, pc: usize, instr: &Instruction, cpu: &Cpu) {
        let flags = format!("Z{} C{}", cpu.zero() as u8, cpu.carry() as u8);
        if Self::is_minimal() {
            self.print_str(&format!(
                "{pc} {instr} A={} B={} {flags}\n",
                cpu.a(),
                cpu.b()
            ));
            return;
        }
        self.print_str(&format!(
            "\x1b[2m{pc:>3}\x1b[0m  {:<14} \x1b[2mA\x1b[0m {:>3}  \x1b[2mB\x1b[0m {:>3}  {flags}\n",
            instr.to_string(),
            cpu.a(),
            cpu.b()
        ));
    }

    pub fn print_registers(&self, cpu: &Cpu) {
        if Self::is_minimal() {
            self.print_str(&format!("A {}\n", cpu.a()));
            self.print_str(&format!("B {}\n", cpu.b()));
            self.print_str(&format!("PC {}\n", cpu.pc()));
            self.print_str(&format!("ZC {}{}\n", cpu.zero() as u8, cpu.carry() as u8));
            return;
        }

        self.print_str("\x1b[2m┌──────────────────────────────────┐\x1b[0m\n");
        self.print_str("\x1b[2m│       \x1b[3mhex   uint   int   char\x1b[0m\x1b[2m │\x1b[0m\n");
        for (name, value) in [("A", cpu.a()), ("B", cpu.b())] {
            self.print_str("\x1b[2m│\x1b[0m");
            self.print_str(&format!(" \x1b[1m{name}\x1b[0m   "));
            self.print_integer(value);
            self.print_str("    \x1b[2m│\x1b[0m\n");
        }
        self.print_str("\x1b[2m│\x1b[0m");
        self.print_str(&format!(" \x1b[1mPC\x1b[0m  {:>4}", cpu.pc()));
        self.print_str("              ");
        self.print_str(&format!(
            " \x1b[1mZC\x1b[0m  {}{}",
            cpu.zero() as u8,
            cpu.carry() as u8
        ));
        self.print_str("  \x1b[2m│\x1b[0m\n");
        self.print_str("\x1b[2m└──────────────────────────────────┘\x1b[0m\n");
    }

    pub fn print_integer(&self, value: u8) {
        if Self::is_minimal() {
            self.print_str(&format!("{value}"));
            return;
        }
        self.print_str(&format!("0x{:02x}  ", value));
        self.print_str(&format!("{:-5}  ", value));
        self.print_str(&format!("{:-4}  ", value as i8));
        self.print_char_display(value);
    }

    fn print_char_display(&self, value: u8) {
        debug_assert!(
            !Self::is_minimal(),
            "`print_char_display` should not be called if `--minimal`"
        );
        self.print_str("  ");
        // Print 3 characters
        match value {
            0x00 => self.print_str("NUL"),
            0x09 => self.print_str("HT "),
            0x0a => self.print_str("LF "),
            0x0d => self.print_str("CR "),
            0x1b => self.print_str("ESC"),
            0x7f => self.print_str("DEL"),
            0x20 => self.print_str("[_]"),
            0x21..=0x7e => self.print_str(&format!("{:<3}", value as char)),
            0x00..=0x7f => self.print_str("\x1b[2m───\x1b[0m"),
            0x80.. => self.print_str("\x1b[2m┄┄┄\x1b[0m"),
        }
    }
}

impl<'a> Decolored<'a> {
    pub fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl<'a> Iterator for Decolored<'a> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Skip everything between '\x1b' and 'm' (inclusive)
            if ch == '\x1b' {
                while self.chars.next().is_some_and(|ch| ch != 'm') {}
                continue;
            }
            return Some(ch);
        }
        None
    }
}

fn eprint_colorless(string: &str) {
    let plain: String = Decolored::new(string).collect();
    eprint!("{plain}");
}
