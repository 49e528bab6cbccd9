//! Example: Two-Stage Blur
//!
//! A separable 3x3 blur: a horizontal pass into an intermediate buffer,
//! then a vertical pass into the output. Shows the per-edge windows and
//! the transitive window of the input as seen by the output.
//!
//! Run with: cargo run --example blur_chain

use stencil_dataflow::{
    schedule_stencil, BinaryOp, DataflowProgram, ElemType, Expr, Node, StencilConfig,
    WindowAlgebra,
};

fn average(from: &str, points: &[[i64; 2]]) -> Expr {
    let sum = Expr::sum(points.iter().map(|p| Expr::load(from, p.to_vec())))
        .unwrap_or_else(|| Expr::constant(0.0));
    Expr::binary(BinaryOp::Div, sum, Expr::constant(points.len() as f64))
}

fn main() {
    println!("=== Two-Stage Blur Example ===\n");

    let input = Node::new("img", ElemType::Uint16, 1);
    let blur_x = Node::new("blur_x", ElemType::Uint16, 1)
        .with_expr(vec![0, 0], average("img", &[[-1, 0], [0, 0], [1, 0]]));
    let output = Node::new("blur_y", ElemType::Uint16, 1)
        .with_expr(vec![0, 0], average("blur_x", &[[0, -1], [0, 0], [0, 1]]));

    let config = StencilConfig::new("blur", input, output, vec![2000, 1000])
        .with_intermediate(blur_x);

    let graph = schedule_stencil(&config).unwrap();

    println!("Tile size: {:?}", graph.tile_size());
    println!();
    for buffer in graph.chronological_buffers() {
        println!("  {:<8} offset {}", buffer.name, buffer.offset);
    }
    println!();

    for stage in graph.stages_chronologically() {
        println!("Stage {}:", graph.stage_name(stage));
        for input in &stage.inputs {
            println!(
                "  <- {:<8} window {:?}, delay {}",
                graph.buffer(*input).name,
                stage.window[input],
                stage.delay[input]
            );
        }
    }
    println!();

    let mut algebra = WindowAlgebra::new(&graph);
    let window = algebra.window(graph.input().id, graph.output().id);
    println!(
        "{} reads {} points of {}: {:?}",
        graph.output().name,
        window.len(),
        graph.input().name,
        window
    );
    println!();

    let program = DataflowProgram::from_graph(&graph, &config).unwrap();
    println!("{}", program);
}
