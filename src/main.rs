//! dcpu-emu - CLI Entry Point
//!
//! Commands:
//! - `dcpu-emu run <program>` - Run an assembly source or hex image
//! - `dcpu-emu debug <program>` - Interactive debugger
//! - `dcpu-emu asm <source>` - Assemble to a hex image
//! - `dcpu-emu disasm <image>` - Disassemble a hex image

use clap::{Parser, Subcommand};
use dcpu::asm::{assemble_program, disassemble, disassemble_instruction, load_image, save_image};
use dcpu::{Computer, ComputerError, MachineConfig, Registers, Word};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dcpu-emu")]
#[command(version = "0.1.0")]
#[command(about = "A 16-bit virtual computer: assembler, CPU emulator and memory-mapped devices")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program for a fixed number of instructions
    Run {
        /// Path to the .asm source or hex image to execute
        program: String,
        /// Number of instructions to execute
        #[arg(short, long, default_value = "10000")]
        max_cycles: u64,
        /// Print every executed instruction
        #[arg(short, long)]
        trace: bool,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
        /// Machine configuration (JSON)
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Interactive debugger
    Debug {
        /// Path to the .asm source or hex image to debug
        program: String,
        /// Machine configuration (JSON)
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Assemble source to a hex image
    Asm {
        /// Path to the source file
        source: String,
        /// Output image file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble a hex image to readable text
    Disasm {
        /// Path to the image file
        image: String,
    },
    /// Run the built-in self-test
    Test,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Run {
            program,
            max_cycles,
            trace,
            json,
            config,
        }) => {
            run_program(&program, max_cycles, trace, json, config.as_deref());
        }
        Some(Commands::Debug { program, config }) => {
            debug_program(&program, config.as_deref());
        }
        Some(Commands::Asm { source, output }) => {
            assemble_file(&source, output);
        }
        Some(Commands::Disasm { image }) => {
            disassemble_file(&image);
        }
        Some(Commands::Test) => {
            run_self_test();
        }
        None => {
            println!("dcpu-emu v0.1.0");
            println!("A 16-bit virtual computer");
            println!();
            println!("Use --help for available commands");
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_with(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("❌ {context}: {err}");
    std::process::exit(1);
}

/// Load a program: `.asm` files are assembled, anything else is read as a
/// hex image.
fn load_words(path: &str, announce: bool) -> Vec<Word> {
    let words = if path.ends_with(".asm") {
        let source = std::fs::read_to_string(path).unwrap_or_else(|e| exit_with("Failed to read file", e));
        let program = assemble_program(&source).unwrap_or_else(|e| exit_with("Assembly error", e));
        if announce {
            println!("📝 Assembled {} words", program.words.len());
        }
        program.words
    } else {
        let words = load_image(path).unwrap_or_else(|e| exit_with("Failed to load image", e));
        if announce {
            println!("📂 Loaded {} words", words.len());
        }
        words
    };

    if words.is_empty() {
        exit_with("Nothing to execute", path);
    }
    words
}

fn build_computer(config: Option<&str>, words: &[Word]) -> Computer {
    let config = match config {
        Some(path) => MachineConfig::load(path).unwrap_or_else(|e| exit_with("Failed to load config", e)),
        None => MachineConfig::default(),
    };
    let mut computer = Computer::with_config(config).unwrap_or_else(|e| exit_with("Failed to build machine", e));
    if let Err(e) = computer.load_image(words) {
        exit_with("Failed to load program", e);
    }
    computer
}

#[derive(Serialize)]
struct RunReport<'a> {
    cycles: u64,
    registers: &'a Registers,
    clock_ticks: u32,
    pending_keys: usize,
    fault: Option<String>,
}

fn run_program(path: &str, max_cycles: u64, trace: bool, json: bool, config: Option<&str>) {
    if !json {
        println!("🔧 Running: {path}");
    }
    let words = load_words(path, !json);
    let mut computer = build_computer(config, &words);
    let frame = computer.config().cycles_per_frame.max(1);

    if !json {
        println!();
        println!("━━━ Execution ━━━");
    }

    let mut fault: Option<ComputerError> = None;
    for cycle in 0..max_cycles {
        let pc = computer.registers().pc;
        match computer.step() {
            Ok(_) => {
                if trace {
                    let window: Vec<Word> = (0..3u16)
                        .filter_map(|i| computer.cpu.mem.peek(usize::from(pc.wrapping_add(i))).ok())
                        .collect();
                    let (text, _) = disassemble_instruction(&window);
                    println!("{pc:04x}: {text:<24} {}", computer.registers());
                }
            }
            Err(e) => {
                fault = Some(e);
                break;
            }
        }
        if (cycle + 1) % frame == 0 {
            if let Err(e) = computer.tick_devices() {
                fault = Some(e);
                break;
            }
        }
    }

    if json {
        let report = RunReport {
            cycles: computer.cpu.cycles,
            registers: computer.registers(),
            clock_ticks: computer.clock().ticks(),
            pending_keys: computer.keyboard().pending(),
            fault: fault.as_ref().map(ToString::to_string),
        };
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => exit_with("Failed to encode report", e),
        }
    } else {
        println!();
        println!("━━━ Result ━━━");
        println!("Cycles: {}", computer.cpu.cycles);
        println!("Registers: {}", computer.registers());
        println!("Clock ticks: {}", computer.clock().ticks());
        if computer.cpu.cycles >= max_cycles {
            println!();
            println!("⚠️  Reached max cycles limit ({max_cycles}). Use --max-cycles to increase.");
        }
    }

    if let Some(e) = fault {
        exit_with(&format!("CPU fault at PC={:04x}", computer.registers().pc), e);
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &str, config: Option<&str>) {
    use dcpu::tui::run_debugger;

    println!("🔍 Loading: {path}");
    let words = load_words(path, true);
    let computer = build_computer(config, &words);

    println!("🚀 Launching debugger...");
    println!();

    if let Err(e) = run_debugger(computer, words) {
        exit_with("Debugger error", e);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str, _config: Option<&str>) {
    exit_with("Debugger unavailable", "built without the `tui` feature");
}

fn assemble_file(source_path: &str, output: Option<String>) {
    let out_path = output.unwrap_or_else(|| {
        source_path
            .strip_suffix(".asm")
            .map(|stem| format!("{stem}.hex"))
            .unwrap_or_else(|| format!("{source_path}.hex"))
    });

    println!("📝 Assembling: {source_path} → {out_path}");

    let source = std::fs::read_to_string(source_path).unwrap_or_else(|e| exit_with("Failed to read file", e));
    let program = assemble_program(&source).unwrap_or_else(|e| exit_with("Assembly error", e));

    println!("✓ Assembled {} words", program.words.len());
    for (label, addr) in &program.labels {
        tracing::debug!(label = label.as_str(), addr = format_args!("{addr:#06x}"), "label");
    }

    if let Err(e) = save_image(&out_path, &program.words) {
        exit_with("Failed to save image", e);
    }

    println!("✓ Saved to {out_path}");
}

fn disassemble_file(image_path: &str) {
    println!("📖 Disassembling: {image_path}");
    println!();

    let words = load_image(image_path).unwrap_or_else(|e| exit_with("Failed to load image", e));
    println!("{}", disassemble(&words));
}

fn run_self_test() {
    use dcpu::cpu::{CpuError, Register};
    use dcpu::asm::{assemble, AssemblerError};

    println!("━━━ dcpu-emu Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;
    let mut check = |name: &str, ok: bool| {
        if ok {
            println!("{name}... ✓");
            passed += 1;
        } else {
            println!("{name}... ✗");
            failed += 1;
        }
    };

    let run = |source: &str, cycles: u64| -> Result<Computer, ComputerError> {
        let mut computer = Computer::new()?;
        computer.load_assembly(source)?;
        computer.run(cycles)?;
        Ok(computer)
    };

    check(
        "Label round-trip",
        assemble(":loop SET A, 1\nADD A, 1\nSET PC, loop").is_ok_and(|w| w.len() == 3 && w[2] == 0),
    );

    check(
        "Addition overflow",
        run("SET A, 0xFFFF\nADD A, 1", 2)
            .is_ok_and(|c| c.registers().get(Register::A) == 0 && c.registers().ex == 1),
    );

    check(
        "Subtraction underflow",
        run("SET A, 0\nSUB A, 1", 2)
            .is_ok_and(|c| c.registers().get(Register::A) == 0xFFFF && c.registers().ex == 0xFFFF),
    );

    check(
        "Literal write guard",
        matches!(
            run("SET 5, A", 1),
            Err(ComputerError::CpuError(CpuError::IllegalWrite { .. }))
        ),
    );

    check(
        "Stack push/pop",
        run("SET PUSH, 0x1234\nSET B, POP", 2)
            .is_ok_and(|c| c.registers().get(Register::B) == 0x1234 && c.registers().sp == 0xFFFF),
    );

    check(
        "Undefined label",
        matches!(assemble("SET PC, nowhere"), Err(AssemblerError::UndefinedLabel { .. })),
    );

    check("Keyboard buffering", {
        let result = (|| -> Result<Vec<Word>, ComputerError> {
            let mut c = Computer::new()?;
            c.load_assembly("SET A, [0xF010]\nSET B, [0xF010]\nSET C, [0xF010]")?;
            c.key_down(Word::from(b'X'))?;
            c.key_down(Word::from(b'Y'))?;
            c.run(3)?;
            Ok([Register::A, Register::B, Register::C]
                .map(|r| c.registers().get(r))
                .to_vec())
        })();
        result.is_ok_and(|keys| keys == [Word::from(b'X'), Word::from(b'Y'), 0])
    });

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {passed} passed, {failed} failed");

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}
