use std::io::{self, Write};

use clap::Parser;
use clap_num::maybe_hex;
use itertools::Itertools;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use rv32emu::disasm::disasm;
use rv32emu::elf_utils::load_elf;
use rv32emu::encode::{btype_imm_fields, itype, rstype};
use rv32emu::hart::{Hart, StepOutcome, Trap};
use rv32emu::mem::{AddressSpace, DEFAULT_SIZE};
use rv32emu::opcodes::{ECALL, FUNCT3_ADD, FUNCT3_ADDI, FUNCT3_BLT, OP, OP_BRANCH, OP_IMM};

/// Emulate a 32-bit RISC-V machine with a tiny OS surface: syscalls, a
/// heap, a memory-mapped timer and console, and software breakpoints
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to input executable file (runs a built-in demo when omitted)
    input: Option<String>,

    /// Address space size in bytes (use 0x prefix for hexadecimal)
    #[arg(short, long, value_parser=maybe_hex::<u32>, default_value_t = DEFAULT_SIZE)]
    memory: u32,

    /// Instruction quantum before the context is flagged as yielded
    /// (0 disables preemption)
    #[arg(short, long, default_value_t = 0)]
    quantum: u32,

    /// Maximum number of steps before giving up
    #[arg(short, long, default_value_t = 10_000_000)]
    steps: u64,

    /// Begin in the interactive debugger instead of free-running
    #[arg(short, long)]
    debug: bool,

    /// Print each instruction before it executes
    #[arg(short, long)]
    trace: bool,
}

/// Forward buffered guest console output to stdout
fn drain(mem: &mut AddressSpace) {
    let out = mem.drain_console();
    if !out.is_empty() {
        print!("{out}");
        io::stdout().flush().unwrap();
    }
}

/// The built-in demo: sum 1..100 in a loop, print the result through
/// the print syscall, exit cleanly. Returns the entry point.
fn load_demo(mem: &mut AddressSpace) -> u32 {
    let (blt_hi, blt_lo) = btype_imm_fields(-8);
    let program = [
        itype(0, 0, FUNCT3_ADDI, 5, OP_IMM),    // addi x5, x0, 0
        itype(1, 0, FUNCT3_ADDI, 6, OP_IMM),    // addi x6, x0, 1
        itype(101, 0, FUNCT3_ADDI, 7, OP_IMM),  // addi x7, x0, 101
        rstype(0, 6, 5, FUNCT3_ADD, 5, OP),     // add  x5, x5, x6
        itype(1, 6, FUNCT3_ADDI, 6, OP_IMM),    // addi x6, x6, 1
        rstype(blt_hi, 7, 6, FUNCT3_BLT, blt_lo, OP_BRANCH), // blt x6, x7, -8
        itype(0, 5, FUNCT3_ADDI, 10, OP_IMM),   // addi x10, x5, 0
        itype(1, 0, FUNCT3_ADDI, 17, OP_IMM),   // addi x17, x0, 1
        ECALL,                                  // print_u32(a0)
        itype(0, 0, FUNCT3_ADDI, 10, OP_IMM),   // addi x10, x0, 0
        itype(0, 0, FUNCT3_ADDI, 17, OP_IMM),   // addi x17, x0, 0
        ECALL,                                  // exit(0)
    ];
    for (n, word) in program.iter().enumerate() {
        mem.store32(4 * n as u32, *word).unwrap();
    }
    mem.set_text_end(4 * program.len() as u32);
    0
}

fn run(hart: &mut Hart, mem: &mut AddressSpace, max_steps: u64, trace: bool) {
    for _ in 0..max_steps {
        if trace {
            if let Ok(word) = mem.load32(hart.pc()) {
                println!("pc=0x{:08x}  {}", hart.pc(), disasm(word));
            }
        }
        let outcome = hart.step(mem);
        drain(mem);
        if let StepOutcome::Halted(trap) = outcome {
            match trap {
                Trap::None => println!(
                    "[exit] code={} instret={} cycles={}",
                    hart.exit_code(),
                    hart.instret(),
                    hart.cycles()
                ),
                trap => println!(
                    "[trap] {trap:?} at pc=0x{:x} (exit code {})",
                    hart.pc(),
                    hart.exit_code()
                ),
            }
            return;
        }
    }
    println!("[run] step budget exhausted at pc=0x{:x}", hart.pc());
}

fn print_help() {
    println!(
        "commands:\n\
         \x20 c             continue until halt or breakpoint\n\
         \x20 s [n]         single-step n instructions (default 1)\n\
         \x20 b <addr>      toggle a software breakpoint (EBREAK patch)\n\
         \x20 r             show registers\n\
         \x20 m <addr> [n]  dump n words from addr (default 8)\n\
         \x20 d [k]         disassemble k words ahead of pc (default 4)\n\
         \x20 q             quit debugger\n\
         \x20 h             help"
    );
}

fn dump_words(mem: &AddressSpace, addr: u32, count: u32) {
    let listing = (0..count)
        .map(|n| {
            let a = addr.wrapping_add(4 * n);
            match mem.load32(a) {
                Ok(word) => format!("  0x{a:08x}: 0x{word:08x}  {}", disasm(word)),
                Err(fault) => format!("  0x{a:08x}: <{fault}>"),
            }
        })
        .join("\n");
    println!("{listing}");
}

fn repl(hart: &mut Hart, mem: &mut AddressSpace, max_steps: u64) {
    print_help();
    let mut editor = DefaultEditor::new().expect("readline init should work");
    loop {
        let line = match editor.readline(&format!("(dbg) pc=0x{:x} > ", hart.pc())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("readline error: {err}");
                break;
            }
        };
        let _ = editor.add_history_entry(line.as_str());
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or("");
        match command {
            "c" => {
                let mut steps = 0;
                while !hart.halted() && steps < max_steps {
                    hart.step(mem);
                    drain(mem);
                    steps += 1;
                }
            }
            "s" => {
                let n: u64 = words.next().and_then(|w| w.parse().ok()).unwrap_or(1);
                for _ in 0..n {
                    if hart.halted() {
                        break;
                    }
                    hart.step(mem);
                    drain(mem);
                }
                if let Ok(word) = mem.load32(hart.pc()) {
                    println!("next: 0x{:08x}  {}", hart.pc(), disasm(word));
                }
            }
            "b" => match words.next().map(maybe_hex::<u32>) {
                Some(Ok(addr)) => match mem.toggle_break(addr) {
                    Ok(true) => println!("+ bp 0x{addr:x}"),
                    Ok(false) => println!("- bp 0x{addr:x}"),
                    Err(fault) => println!("cannot set breakpoint: {fault}"),
                },
                _ => println!("usage: b <addr>"),
            },
            "r" => {
                println!("pc=0x{:x}", hart.pc());
                print!("{}", hart.registers());
            }
            "m" => match words.next().map(maybe_hex::<u32>) {
                Some(Ok(addr)) => {
                    let count = words.next().and_then(|w| w.parse().ok()).unwrap_or(8);
                    dump_words(mem, addr, count);
                }
                _ => println!("usage: m <addr> [n]"),
            },
            "d" => {
                let count = words.next().and_then(|w| w.parse().ok()).unwrap_or(4);
                dump_words(mem, hart.pc(), count);
            }
            "q" => break,
            "h" | "?" => print_help(),
            "" => continue,
            _ => println!("unknown command; type 'h' for help"),
        }
        if hart.halted() {
            println!(
                "[halted] exit_code={} last_trap={:?}",
                hart.exit_code(),
                hart.last_trap()
            );
        }
    }
}

fn main() {
    let args = Args::parse();

    let mut mem = AddressSpace::new(args.memory);
    let entry = match &args.input {
        Some(path) => match load_elf(&mut mem, path) {
            Ok(entry) => {
                println!("[elf] loaded '{path}' entry=0x{entry:x}");
                entry
            }
            Err(err) => {
                eprintln!("error loading executable: {err}");
                std::process::exit(1);
            }
        },
        None => {
            println!("[demo] no executable given; running the built-in sum demo");
            load_demo(&mut mem)
        }
    };

    let mut hart = Hart::new(entry);
    hart.set_quantum(args.quantum);

    if args.debug {
        repl(&mut hart, &mut mem, args.steps);
    } else {
        run(&mut hart, &mut mem, args.steps, args.trace);
    }
}
