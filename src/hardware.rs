//! Hardware interface of the scheduled graph
//!
//! [`DataflowProgram`] is the frozen, serializable view of a scheduled
//! stencil graph handed to the kernel emitter and the resource estimator.
//! [`HardwareParams`] holds the platform numbers derived from the
//! configuration (element widths, memory coalescing, partitioning).

use serde::{Deserialize, Serialize};

use crate::ast::{ElemType, Point};
use crate::config::{BorderPolicy, StencilConfig};
use crate::error::{CompileError, CompileResult};
use crate::graph::{BufferId, StencilGraph};
use crate::window::{serialize, stencil_dim};

/// Slack added on top of an edge's delay when sizing its FIFO
pub const FIFO_MARGIN: i64 = 2;

/// Depth of the FIFO carrying an edge with the given delay
pub fn fifo_depth(delay: i64) -> i64 {
    delay + FIFO_MARGIN
}

/// Elements of `width` bits packed into one memory burst
pub fn coalescing_factor(burst_width: usize, width: usize) -> CompileResult<usize> {
    if width == 0 || burst_width == 0 || burst_width % width != 0 {
        return Err(CompileError::internal(format!(
            "cannot pack {}-bit elements into a {}-bit burst",
            width, burst_width
        )));
    }
    Ok(burst_width / width)
}

/// Platform parameters derived from the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareParams {
    pub burst_width: usize,
    /// DRAM banks per direction
    pub dram_bank: usize,
    pub unroll_factor: usize,
    pub pixel_width_i: usize,
    pub pixel_width_o: usize,
    pub input_partition: usize,
    pub output_partition: usize,
}

impl HardwareParams {
    pub fn from_config(config: &StencilConfig) -> CompileResult<Self> {
        let dram_bank = config.effective_dram_bank();
        let pixel_width_i = config.input.ty.width();
        let pixel_width_o = config.output.ty.width();
        let partition = |width: usize| -> CompileResult<usize> {
            let coalesced = coalescing_factor(config.burst_width, width)?;
            Ok((coalesced * dram_bank / 2).max(config.unroll_factor / 2))
        };
        Ok(Self {
            burst_width: config.burst_width,
            dram_bank,
            unroll_factor: config.unroll_factor,
            pixel_width_i,
            pixel_width_o,
            input_partition: partition(pixel_width_i)?,
            output_partition: partition(pixel_width_o)?,
        })
    }
}

/// A buffer as seen by the emitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ElemType,
    pub c_type: String,
    pub chan: usize,
    pub offset: i64,
    pub producer: Option<String>,
    pub consumers: Vec<String>,
}

/// One input edge of a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeInfo {
    pub buffer: String,
    pub window: Vec<Point>,
    pub delay: i64,
    pub fifo_depth: i64,
}

/// A border edge as seen by the resource estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorderInfo {
    pub from: String,
    pub window_offset: Point,
    pub window_distance: i64,
    pub stencil_dim: Vec<i64>,
}

/// One stage as seen by the emitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageInfo {
    pub name: String,
    pub store_index: Point,
    /// Linearized store index
    pub store_offset: i64,
    pub inputs: Vec<EdgeInfo>,
    pub exprs: Vec<String>,
    pub border: Option<BorderInfo>,
}

/// A complete scheduled dataflow program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataflowProgram {
    pub app_name: String,
    pub iterate: u32,
    pub border: BorderPolicy,
    pub tile_size: Vec<usize>,
    pub params: HardwareParams,
    pub input: String,
    pub output: String,
    /// Buffers in chronological order
    pub buffers: Vec<BufferInfo>,
    /// Stages in chronological order
    pub stages: Vec<StageInfo>,
    /// Offset of the output, i.e. pipeline depth in cycles
    pub latency: i64,
}

impl DataflowProgram {
    /// Freeze a scheduled and border-linked graph
    pub fn from_graph(graph: &StencilGraph, config: &StencilConfig) -> CompileResult<Self> {
        if !graph.is_scheduled() || !graph.is_border_linked() {
            return Err(CompileError::internal(
                "dataflow program requested before scheduling finished",
            ));
        }
        let tile_size = graph.tile_size();
        let name_of = |id: BufferId| graph.buffer(id).name.clone();

        let buffers = graph
            .chronological_buffers()
            .map(|b| BufferInfo {
                name: b.name.clone(),
                ty: b.ty,
                c_type: b.ty.c_type().to_string(),
                chan: b.chan,
                offset: b.offset,
                producer: b.parent.map(|s| name_of(graph.stage(s).output)),
                consumers: b.children.iter().map(|&s| name_of(graph.stage(s).output)).collect(),
            })
            .collect();

        let stages = graph
            .stages_chronologically()
            .map(|stage| {
                let store = graph.buffer(stage.output).idx.clone().unwrap_or_default();
                let inputs = stage
                    .inputs
                    .iter()
                    .map(|&x| {
                        let delay = stage.delay.get(&x).copied().unwrap_or(0);
                        EdgeInfo {
                            buffer: name_of(x),
                            window: stage.window.get(&x).cloned().unwrap_or_default(),
                            delay,
                            fifo_depth: fifo_depth(delay),
                        }
                    })
                    .collect();
                let border = stage.border.as_ref().map(|edge| BorderInfo {
                    from: name_of(edge.source),
                    window_offset: edge.window_offset.clone(),
                    window_distance: edge.distance,
                    stencil_dim: stencil_dim(&edge.window),
                });
                StageInfo {
                    name: name_of(stage.output),
                    store_offset: serialize(&store, tile_size),
                    store_index: store,
                    inputs,
                    exprs: stage.exprs.iter().map(|e| e.expr.to_string()).collect(),
                    border,
                }
            })
            .collect();

        Ok(Self {
            app_name: config.app_name.clone(),
            iterate: config.iterate,
            border: config.border,
            tile_size: tile_size.to_vec(),
            params: HardwareParams::from_config(config)?,
            input: graph.input().name.clone(),
            output: graph.output().name.clone(),
            buffers,
            stages,
            latency: graph.output().offset,
        })
    }

    pub fn stage(&self, name: &str) -> Option<&StageInfo> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Export to JSON format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for DataflowProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Dataflow Program: {}", self.app_name)?;
        writeln!(f, "================")?;
        writeln!(f, "Tile size: {:?}", self.tile_size)?;
        writeln!(f, "Iterations: {} (border: {})", self.iterate, self.border)?;
        writeln!(f, "Unroll factor: {}", self.params.unroll_factor)?;
        writeln!(f, "Pipeline latency: {} cycles", self.latency)?;
        writeln!(f)?;

        for buffer in &self.buffers {
            writeln!(
                f,
                "{}[{}] {} @ {}",
                buffer.name, buffer.chan, buffer.ty, buffer.offset
            )?;
        }
        writeln!(f)?;

        for stage in &self.stages {
            writeln!(f, "Stage {} @ {:?}:", stage.name, stage.store_index)?;
            for edge in &stage.inputs {
                writeln!(
                    f,
                    "  <- {} window {:?} delay {} (fifo depth {})",
                    edge.buffer, edge.window, edge.delay, edge.fifo_depth
                )?;
            }
            for (chan, expr) in stage.exprs.iter().enumerate() {
                writeln!(f, "  {}[{}] = {}", stage.name, chan, expr)?;
            }
            if let Some(border) = &stage.border {
                writeln!(
                    f,
                    "  border from {}: offset {:?}, distance {}",
                    border.from, border.window_offset, border.window_distance
                )?;
            }
        }

        Ok(())
    }
}
