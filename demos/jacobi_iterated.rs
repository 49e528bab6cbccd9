//! Example: Iterated Jacobi with Border Preservation
//!
//! Loads the 5-point Jacobi stencil from `demos/jacobi2d.json` and
//! compiles it for several iteration counts. Every extra iteration adds a
//! synthesized stage that copies the previous iteration's output, plus a
//! border edge carrying the previous input across the iteration boundary.
//!
//! Run with: cargo run --example jacobi_iterated

use stencil_dataflow::{compile, StencilConfig};

fn main() {
    println!("=== Iterated Jacobi Example ===\n");

    let json = include_str!("jacobi2d.json");
    let base = StencilConfig::from_json(json).unwrap();

    for iterate in 1..=4 {
        let mut config = base.clone();
        config.iterate = iterate;
        let program = compile(&config).unwrap();

        println!(
            "iterate = {}: {} stages, latency {} cycles",
            iterate,
            program.stages.len(),
            program.latency
        );
        for stage in &program.stages {
            if let Some(border) = &stage.border {
                println!(
                    "  {:<14} border from {:<12} distance {}, window {:?}",
                    stage.name, border.from, border.window_distance, border.stencil_dim
                );
            }
        }
    }
    println!();

    // Full report for the last configuration
    let mut config = base;
    config.iterate = 3;
    let program = compile(&config).unwrap();
    println!("{}", program);

    match program.to_json() {
        Ok(json) => println!("JSON size: {} bytes", json.len()),
        Err(e) => eprintln!("Failed to serialize: {}", e),
    }
}
