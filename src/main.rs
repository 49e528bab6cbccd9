//! Stencil to Dataflow Scheduler CLI
//!
//! Usage:
//!   stencil2dataflow jacobi.json
//!   stencil2dataflow jacobi.json --iterate 4 --border preserve -v
//!   cat blur.json | stencil2dataflow --json

use clap::Parser as ClapParser;
use colored::Colorize;
use std::fs;
use std::io::{self, Read};

use stencil_dataflow::logging::init_logging;
use stencil_dataflow::{compile, BorderPolicy, DataflowProgram, StencilConfig};

#[derive(ClapParser, Debug)]
#[command(name = "stencil2dataflow")]
#[command(author = "FPGA Team")]
#[command(version = "0.1.0")]
#[command(about = "Schedules normalized stencil programs into synchronized dataflow graphs")]
struct Args {
    /// Normalized stencil description (JSON); reads stdin when omitted
    #[arg(value_name = "FILE")]
    input_file: Option<String>,

    /// Override the iteration count
    #[arg(short = 'i', long = "iterate")]
    iterate: Option<u32>,

    /// Override the border policy (none or preserve)
    #[arg(short = 'b', long = "border")]
    border: Option<BorderPolicy>,

    /// Override the tile size (e.g. "128x64")
    #[arg(short = 't', long = "tile-size", value_parser = parse_tile_size)]
    tile_size: Option<TileSize>,

    /// Output as JSON
    #[arg(short = 'j', long = "json")]
    json_output: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

#[derive(Debug, Clone)]
struct TileSize(Vec<usize>);

fn parse_tile_size(s: &str) -> Result<TileSize, String> {
    s.split('x')
        .map(|dim| {
            dim.trim()
                .parse::<usize>()
                .map_err(|_| format!("Invalid tile dimension: {}", dim))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(TileSize)
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_level.as_deref()) {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }

    let source = if let Some(file) = &args.input_file {
        fs::read_to_string(file).unwrap_or_else(|e| {
            eprintln!("{}: Failed to read file '{}': {}", "Error".red(), file, e);
            std::process::exit(1);
        })
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer).unwrap_or_else(|e| {
            eprintln!("{}: Failed to read stdin: {}", "Error".red(), e);
            std::process::exit(1);
        });
        buffer
    };

    let mut config = match StencilConfig::from_json(&source) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Input error".red(), e);
            std::process::exit(1);
        }
    };
    if let Some(iterate) = args.iterate {
        config.iterate = iterate;
    }
    if let Some(border) = args.border {
        config.border = border;
    }
    if let Some(TileSize(tile_size)) = args.tile_size {
        config.tile_size = tile_size;
    }

    if args.verbose && !args.json_output {
        println!("{}", "Stencil to Dataflow Scheduler".bold().blue());
        println!("{}", "=".repeat(35));
        println!();
        println!("{}: {}", "Application".green(), config.app_name);
        println!(
            "{}: {} -> {} ({} intermediate{})",
            "Pipeline".green(),
            config.input.name,
            config.output.name,
            config.intermediates.len(),
            if config.intermediates.len() == 1 { "" } else { "s" }
        );
        println!();
    }

    let program = match compile(&config) {
        Ok(p) => p,
        Err(e) if e.is_internal() => {
            eprintln!("{}: {}", "Compiler bug".red().bold(), e);
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("{}: {}", "Compilation error".red(), e);
            std::process::exit(1);
        }
    };

    if args.json_output {
        match program.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{}: Failed to serialize to JSON: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
    } else {
        print_program(&program, args.verbose);
    }
}

fn print_program(program: &DataflowProgram, verbose: bool) {
    println!("{}", "Scheduling Results".bold().green());
    println!("{}", "=".repeat(50));
    println!();

    println!("{}: {:?}", "Tile size".cyan(), program.tile_size);
    println!(
        "{}: {} (border: {})",
        "Iterations".cyan(),
        program.iterate,
        program.border
    );
    println!(
        "{}: {} banks, {}-bit bursts, unroll {}",
        "Memory".cyan(),
        program.params.dram_bank,
        program.params.burst_width,
        program.params.unroll_factor
    );
    println!("{}: {} cycles", "Pipeline latency".cyan(), program.latency);
    println!();

    println!("{}", "Buffers".bold().yellow());
    println!("{}", "-".repeat(50));
    for buffer in &program.buffers {
        println!(
            "  {:<16} {:>8}[{}]  {} {}",
            buffer.name,
            buffer.ty.to_string(),
            buffer.chan,
            "offset".cyan(),
            buffer.offset
        );
    }
    println!();

    println!("{}", "Stages".bold().yellow());
    println!("{}", "-".repeat(50));
    for stage in &program.stages {
        println!();
        println!("{} {}", "Stage".bold(), stage.name.bold());
        for edge in &stage.inputs {
            println!(
                "  {} {:<14} {}: {}  {}: {}",
                "<-".cyan(),
                edge.buffer,
                "delay".cyan(),
                edge.delay,
                "fifo".cyan(),
                edge.fifo_depth
            );
            if verbose {
                println!("     {}: {:?}", "window".cyan(), edge.window);
            }
        }
        if let Some(border) = &stage.border {
            println!(
                "  {} {} ({}: {}, {}: {:?})",
                "border from".magenta(),
                border.from,
                "distance".cyan(),
                border.window_distance,
                "dim".cyan(),
                border.stencil_dim
            );
        }
        if verbose {
            for (chan, expr) in stage.exprs.iter().enumerate() {
                println!("  {}[{}] = {}", stage.name, chan, expr);
            }
        }
    }
}
