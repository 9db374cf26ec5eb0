use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, IntoDiagnostic, Result};

use simplescript::output::Output;
use simplescript::{asm, env, Compiler, Computer};

/// SimpleScript compiler and 8-bit machine emulator.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.ss` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a `.ss` file and run it on the emulator
    Run {
        /// `.ss` file to run
        name: PathBuf,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
        /// Print every instruction with the registers before it executes
        #[arg(short, long)]
        trace: bool,
        /// Size of the address space in bytes
        #[arg(long)]
        memory_size: Option<usize>,
        /// Value placed at the input address before running
        #[arg(short, long)]
        input: Option<u8>,
        /// Stop with an error after this many instructions
        #[arg(long)]
        max_steps: Option<u64>,
    },
    /// Check a `.ss` or `.asm` file without running or writing output
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Write the compiled instruction listing of a `.ss` file
    Compile {
        /// `.ss` file to compile
        name: PathBuf,
        /// Destination of the `.ssb` listing
        dest: Option<PathBuf>,
    },
    /// Assemble a `.asm` file into raw machine bytes
    Asm {
        /// `.asm` file to assemble
        name: PathBuf,
        /// Destination of the `.bin` file
        dest: Option<PathBuf>,
    },
    /// Place a watch on a `.ss` or `.asm` file to receive constant compiler updates
    Watch {
        /// File to watch
        name: PathBuf,
    },
}

struct RunOptions {
    trace: bool,
    memory_size: usize,
    input: Option<u8>,
    max_steps: Option<u64>,
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    env_logger::init();
    env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(simplescript::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run {
                name,
                minimal,
                trace,
                memory_size,
                input,
                max_steps,
            } => {
                Output::set_minimal(minimal);
                let opts = RunOptions {
                    trace: trace || env::is_trace_enabled(),
                    memory_size: memory_size.unwrap_or_else(env::memory_size),
                    input,
                    max_steps,
                };
                run(&name, &opts)
            }
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let contents = fs::read_to_string(&name).into_diagnostic()?;
                check(&name, &contents)?;
                message(Green, "Success", "no errors found!");
                Ok(())
            }
            Command::Compile { name, dest } => {
                file_message(Green, "Compiling", &name);
                let contents = fs::read_to_string(&name).into_diagnostic()?;
                let program = Compiler::new().compile(&contents)?;

                let out_file_name = dest.unwrap_or_else(|| name.with_extension("ssb"));
                let mut file = fs::File::create(&out_file_name).into_diagnostic()?;
                for instr in &program {
                    writeln!(file, "{instr}").into_diagnostic()?;
                }

                message(Green, "Finished", &format!("{} instructions", program.len()));
                file_message(Green, "Saved", &out_file_name);
                Ok(())
            }
            Command::Asm { name, dest } => {
                file_message(Green, "Assembling", &name);
                let contents = fs::read_to_string(&name).into_diagnostic()?;
                let bytes = asm::assemble(&contents)?;

                let out_file_name = dest.unwrap_or_else(|| name.with_extension("bin"));
                fs::write(&out_file_name, &bytes).into_diagnostic()?;

                for (i, row) in bytes.chunks(16).enumerate() {
                    let hex: Vec<String> = row.iter().map(|b| format!("{b:02X}")).collect();
                    println!("{:04X}: {}", i * 16, hex.join(" "));
                }
                message(Green, "Finished", &format!("{} bytes", bytes.len()));
                file_message(Green, "Saved", &out_file_name);
                Ok(())
            }
            Command::Watch { name } => {
                if !name.exists() {
                    bail!("File does not exist. Exiting...")
                }
                // Vim breaks if watching a single file
                let folder_path = match name.parent() {
                    Some(pth) if pth.is_dir() => pth.to_path_buf(),
                    _ => Path::new(".").to_path_buf(),
                };

                // Clear screen and move cursor to top left
                print!("\x1B[2J\x1B[2;1H");
                file_message(Green, "Watching", &name);
                message(Cyan, "Help", "press CTRL+C to exit");

                let mut watcher = Hotwatch::new_with_custom_delay(Duration::from_millis(500))
                    .into_diagnostic()?;

                watcher
                    .watch(folder_path, move |event: Event| match event.kind {
                        // Watch remove for vim changes
                        EventKind::Modify(_) | EventKind::Remove(_) => {
                            print!("\x1B[2J\x1B[2;1H");
                            file_message(Green, "Watching", &name);
                            message(Green, "Re-checking", "file change detected");
                            message(Cyan, "Help", "press CTRL+C to exit");

                            sleep(Duration::from_millis(50));

                            let contents = match fs::read_to_string(&name) {
                                Ok(cts) => cts,
                                Err(e) => {
                                    eprintln!("{e}. Exiting...");
                                    std::process::exit(1)
                                }
                            };
                            match check(&name, &contents) {
                                Ok(()) => message(Green, "Success", "no errors found!"),
                                Err(e) => println!("\n{:?}", e),
                            }
                            Flow::Continue
                        }
                        _ => Flow::Continue,
                    })
                    .into_diagnostic()?;
                watcher.run();
                Ok(())
            }
        }
    } else if let Some(path) = args.path {
        let opts = RunOptions {
            trace: env::is_trace_enabled(),
            memory_size: env::memory_size(),
            input: None,
            max_steps: None,
        };
        run(&path, &opts)
    } else {
        println!("\n~ simplescript v{VERSION} ~");
        println!("{}", LOGO.truecolor(255, 183, 197).bold());
        println!("{SHORT_INFO}");
        std::process::exit(0);
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

/// Status line, silenced by `--minimal`.
fn message(color: MsgColor, left: &str, right: &str) {
    if Output::is_minimal() {
        return;
    }
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

/// Assemble `.asm` files, compile everything else.
fn check(name: &Path, contents: &str) -> Result<()> {
    if name.extension().is_some_and(|ext| ext == "asm") {
        asm::assemble(contents)?;
    } else {
        Compiler::new().compile(contents)?;
    }
    Ok(())
}

fn run(name: &Path, opts: &RunOptions) -> Result<()> {
    match name.extension().and_then(|ext| ext.to_str()) {
        Some("ss") => {}
        Some(_) => bail!("File has unknown extension. Exiting..."),
        None => bail!("File has no extension. Exiting..."),
    }

    file_message(MsgColor::Green, "Compiling", name);
    let contents = fs::read_to_string(name).into_diagnostic()?;
    let program = Compiler::new().compile(&contents)?;

    let mut computer = Computer::with_memory_size(opts.memory_size).into_diagnostic()?;
    computer.load_program(program).into_diagnostic()?;
    if let Some(input) = opts.input {
        computer.set_input(input).into_diagnostic()?;
    }

    message(MsgColor::Green, "Running", "compiled program");
    let mut steps = 0;
    loop {
        if opts.max_steps.is_some_and(|max| steps >= max) {
            bail!(
                code = "run::step_limit",
                help = "raise --max-steps or check the loop conditions",
                "Program did not halt within {steps} steps"
            );
        }
        if opts.trace {
            let pc = computer.cpu().pc();
            if let Some(instr) = computer.program().get(pc) {
                Output::Trace.print_trace(pc, instr, computer.cpu());
            }
        }
        let seen = computer.get_all_outputs().len();
        let running = computer.step().into_diagnostic()?;
        for &val in &computer.get_all_outputs()[seen..] {
            Output::Normal.print_value(val);
        }
        steps += 1;
        if !running {
            break;
        }
    }

    for warning in computer.warnings() {
        Output::Trace.print_warning(warning);
    }
    if opts.trace {
        Output::Trace.print_registers(computer.cpu());
    }
    file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

const LOGO: &str = r#"
     _                 _                     _       _
 ___(_)_ __ ___  _ __ | | ___  ___  ___ _ __(_)_ __ | |_
/ __| | '_ ` _ \| '_ \| |/ _ \/ __|/ __| '__| | '_ \| __|
\__ \ | | | | | | |_) | |  __/\__ \ (__| |  | | |_) | |_
|___/_|_| |_| |_| .__/|_|\___||___/\___|_|  |_| .__/ \__|
                |_|                           |_|"#;

const SHORT_INFO: &str = r"
Welcome to simplescript, a compiler for the SimpleScript language
and an emulator for the 8-bit machine it targets.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
