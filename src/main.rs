//! Paging Simulator - Main Entry Point
//!
//! Usage: paging-sim [OPTIONS] [script_file]
//!
//! Arguments:
//!   script_file - Commands to run, one per line (stdin when omitted)
//!
//! Options:
//!   -m, --mode <1|2>     Start in simple translation (1) or demand paging (2)
//!   --processes <n>      Number of processes
//!   --pages <n>          Pages per process
//!   --frames <n>         RAM frames
//!   --swap <n>           Swap blocks
//!   -v, --verbose        Log every translation and resolution step
//!   -h, --help           Print help information

use std::env;
use std::io::{self, Read};
use std::process;

use log::LevelFilter;

use paging_sim::io::{execute, parse_script, read_script, Command};
use paging_sim::{logger, Mode, Session, SimConfig, SimResult};

/// Command-line configuration
struct Config {
    script_file: Option<String>,
    mode: Mode,
    sim: SimConfig,
    verbose: bool,
}

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    logger::init(if config.verbose { LevelFilter::Debug } else { LevelFilter::Warn });

    if let Err(e) = run(&config) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn print_help(program: &str) {
    eprintln!("Paging Simulator - Address translation and demand paging, one fault at a time");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS] [script_file]", program);
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  script_file - Commands to run, one per line (stdin when omitted)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -m, --mode <1|2>   Start in simple translation (1) or demand paging (2, default)");
    eprintln!("  --processes <n>    Number of processes (default 4)");
    eprintln!("  --pages <n>        Pages per process (default 4)");
    eprintln!("  --frames <n>       RAM frames (default 16)");
    eprintln!("  --swap <n>         Swap blocks (default 32)");
    eprintln!("  -v, --verbose      Log every translation and resolution step");
    eprintln!("  -h, --help         Print this help message");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  mode <1|2>       Reset the session in the given mode");
    eprintln!("  process <pid>    Switch the active process");
    eprintln!("  access <page>    Touch the variable on <page> of the active process");
    eprintln!("  frame <n>        Resolve the pending page fault into frame <n>");
    eprintln!("  cancel           Abandon the pending page fault");
    eprintln!("  show             Print RAM, swap and the active page table");
    eprintln!("  stats            Print access and fault counters");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} session.txt", program);
    eprintln!("  {} -v --frames 8 session.txt", program);
}

fn parse_args() -> Result<Config, String> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("paging-sim");

    let mut mode = Mode::DemandPaging;
    let mut sim = SimConfig::default();
    let mut verbose = false;
    let mut positional: Vec<&String> = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| -> Result<usize, String> {
            let raw = iter
                .next()
                .ok_or_else(|| format!("Option {} requires a value", name))?;
            raw.parse()
                .map_err(|_| format!("Invalid value for {}: {}", name, raw))
        };

        match arg.as_str() {
            "-h" | "--help" => {
                print_help(program);
                process::exit(0);
            }
            "-v" | "--verbose" => {
                verbose = true;
            }
            "-m" | "--mode" => {
                let part = value(arg)?;
                mode = Mode::from_part(part)
                    .ok_or_else(|| format!("Unknown mode: {} (expected 1 or 2)", part))?;
            }
            "--processes" => sim.process_count = value(arg)?,
            "--pages" => sim.pages_per_process = value(arg)?,
            "--frames" => sim.ram_frames = value(arg)?,
            "--swap" => sim.swap_blocks = value(arg)?,
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}\nUse --help for usage information.", arg));
            }
            _ => {
                positional.push(arg);
            }
        }
    }

    if positional.len() > 1 {
        print_help(program);
        return Err(format!("\nError: Expected at most 1 argument, got {}", positional.len()));
    }

    sim.validate().map_err(|e| e.to_string())?;

    Ok(Config {
        script_file: positional.first().map(|s| s.to_string()),
        mode,
        sim,
        verbose,
    })
}

/// Main logic separated from main() for cleaner error handling
fn run(config: &Config) -> SimResult<()> {
    let commands: Vec<(usize, Command)> = match &config.script_file {
        Some(path) => read_script(path)?,
        None => {
            let mut content = String::new();
            io::stdin().read_to_string(&mut content)?;
            parse_script(&content)?
        }
    };

    let mut session = Session::new(config.mode, config.sim.clone())?;
    println!(
        "> System reset. Mode: {}. {} processes loaded. RAM: {} frames.",
        session.mode(),
        config.sim.process_count,
        config.sim.ram_frames
    );

    let mut failures = 0;
    for (line, command) in commands {
        match execute(&mut session, command) {
            Ok(out) => print!("{}", out),
            Err(e) => {
                failures += 1;
                println!("  [ERROR] line {}: {}", line, e);
            }
        }
    }

    if config.verbose {
        let stats = session.stats();
        eprintln!();
        eprintln!("=== Summary ===");
        eprintln!("Accesses: {} ({} hits, {} faults)", stats.accesses, stats.hits, stats.faults);
        eprintln!("Swap-outs: {}  Swap-ins: {}", stats.swap_outs, stats.swap_ins);
        eprintln!("Rejected commands: {}", failures);
    }

    Ok(())
}
