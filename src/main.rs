use std::path::Path;
use std::process::exit;

use clap::{App, Arg};

use micro86::asm::Assembler;
use micro86::cpu::R;
use micro86::disasm;
use micro86::machine::{Machine, MachineState};
use micro86::tools;

/// runaway guests are cut off after this many instructions
const STEP_LIMIT: usize = 100_000_000;

fn main() {
    env_logger::init();

    let matches = App::new("micro86")
        .version("0.1.0")
        .about("8086 real mode assembler, disassembler and emulator")
        .arg(
            Arg::with_name("assemble")
                .short("a")
                .value_name("FILE")
                .takes_value(true)
                .help("Assembly source input"),
        )
        .arg(
            Arg::with_name("input")
                .short("i")
                .value_name("FILE")
                .takes_value(true)
                .help("Assembly source input"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .value_name("FILE")
                .takes_value(true)
                .help("Binary output path (default: input stem + .bin)"),
        )
        .arg(
            Arg::with_name("disassemble")
                .short("d")
                .help("Disassemble the produced binary"),
        )
        .arg(
            Arg::with_name("execute")
                .short("e")
                .help("Execute the produced binary (default)"),
        )
        .arg(Arg::with_name("INPUT").help("Assembly source input").index(1))
        .get_matches();

    let input = match matches
        .value_of("assemble")
        .or_else(|| matches.value_of("input"))
        .or_else(|| matches.value_of("INPUT"))
    {
        Some(f) => f.to_string(),
        None => {
            eprintln!("micro86: no input file (try --help)");
            exit(1);
        }
    };

    let source = match tools::read_text(&input) {
        Ok(s) => s,
        Err(why) => {
            eprintln!("micro86: could not read {}: {}", input, why);
            exit(1);
        }
    };

    // labels resolve against the execution load base so absolute
    // references (MOV DX, msg and DB label words) are valid at runtime
    let binary = match Assembler::with_origin(disasm::DEFAULT_BASE).assemble(&source) {
        Ok(data) => data,
        Err(errors) => {
            for e in &errors {
                eprintln!("{}", e);
            }
            eprintln!("micro86: {}: {} error(s), no output written", input, errors.len());
            exit(1);
        }
    };

    let output = matches
        .value_of("output")
        .map(str::to_string)
        .unwrap_or_else(|| default_output(&input));
    if let Err(why) = tools::write_binary(&output, &binary) {
        eprintln!("micro86: could not write {}: {}", output, why);
        exit(1);
    }
    println!("# {} -> {} ({} bytes)", input, output, binary.len());

    if matches.is_present("disassemble") {
        println!("{}", disasm::listing(&binary, disasm::DEFAULT_BASE));
    }

    if matches.is_present("execute") || !matches.is_present("disassemble") {
        run_binary(&binary);
    }
}

/// derives the output path from the input base name
fn default_output(input: &str) -> String {
    let stem = Path::new(input)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "out".to_string());
    format!("{}.bin", stem)
}

fn run_binary(binary: &[u8]) {
    let mut machine = Machine::default();
    if let Err(why) = machine.load_rom(binary) {
        eprintln!("micro86: {}", why);
        exit(1);
    }
    let result = machine.run(STEP_LIMIT);

    println!();
    print_registers(&machine);
    println!(
        "{} instructions executed, {} cycles",
        machine.cpu.instruction_count, machine.cpu.cycle_count
    );

    match result {
        Ok(()) => {
            if machine.state == MachineState::Halted {
                println!("machine halted");
            }
        }
        Err(why) => {
            eprintln!("micro86: {}", why);
            exit(1);
        }
    }
}

fn print_registers(machine: &Machine) {
    let c = &machine.cpu;
    println!(
        "AX={:04X} BX={:04X} CX={:04X} DX={:04X}",
        c.get_r16(R::AX),
        c.get_r16(R::BX),
        c.get_r16(R::CX),
        c.get_r16(R::DX)
    );
    println!(
        "SP={:04X} BP={:04X} SI={:04X} DI={:04X}",
        c.get_r16(R::SP),
        c.get_r16(R::BP),
        c.get_r16(R::SI),
        c.get_r16(R::DI)
    );
    println!(
        "CS={:04X} DS={:04X} ES={:04X} SS={:04X} IP={:04X}",
        c.get_r16(R::CS),
        c.get_r16(R::DS),
        c.get_r16(R::ES),
        c.get_r16(R::SS),
        c.regs.ip
    );
    println!("flags: {}", c.regs.flags);
}
