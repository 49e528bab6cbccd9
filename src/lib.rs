//! Stencil to Dataflow Scheduler
//!
//! This library is the scheduling backend of a stencil-to-FPGA compiler. It
//! takes the normalized nodes of a stencil program (an input grid, a chain
//! of intermediate computations and an output grid) and produces a
//! synchronized dataflow graph: every buffer gets a pipeline offset, and
//! every producer-consumer edge gets the delay needed to keep its stage's
//! inputs aligned.
//!
//! # Example
//!
//! ```rust
//! use stencil_dataflow::{compile, ElemType, Expr, Node, StencilConfig};
//!
//! let input = Node::new("I", ElemType::Float, 1);
//! let sum = Expr::sum((-1..=1).map(|d| Expr::load("I", vec![d]))).unwrap();
//! let output = Node::new("O", ElemType::Float, 1).with_expr(vec![0], sum);
//! let config = StencilConfig::new("blur", input, output, vec![16]);
//!
//! let program = compile(&config).unwrap();
//! assert_eq!(program.latency, 1);
//! println!("{}", program);
//! ```

pub mod ast;
pub mod border;
pub mod builder;
pub mod config;
pub mod error;
pub mod graph;
pub mod hardware;
pub mod logging;
pub mod schedule;
pub mod unroll;
pub mod window;

pub use ast::{BinaryOp, ElemType, Expr, Node, Point, StoreExpr, UnaryOp};
pub use builder::{build, GraphBuilder};
pub use config::{BorderPolicy, StencilConfig};
pub use error::{CompileError, CompileResult};
pub use graph::{BorderEdge, Buffer, BufferId, Stage, StageId, StencilGraph};
pub use hardware::{DataflowProgram, HardwareParams};
pub use window::{serialize, PointSet, WindowAlgebra};

/// Build, schedule and border-link the graph of `config`
pub fn schedule_stencil(config: &StencilConfig) -> CompileResult<StencilGraph> {
    let mut graph = build(config)?;
    schedule::schedule(&mut graph)?;
    border::link_borders(&mut graph)?;
    Ok(graph)
}

/// Main compilation function: produces the frozen dataflow program
pub fn compile(config: &StencilConfig) -> CompileResult<DataflowProgram> {
    let graph = schedule_stencil(config)?;
    DataflowProgram::from_graph(&graph, config)
}
