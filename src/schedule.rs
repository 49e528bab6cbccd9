//! Dependency scheduler
//!
//! Assigns every buffer its pipeline offset and every stage input its delay
//! in a single forward pass over the graph. Stages become ready when their
//! count of unprocessed inputs drops to zero (Kahn's algorithm), so each
//! buffer is visited exactly once and a cycle shows up as buffers that are
//! never reached.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info};

use crate::error::{CompileError, CompileResult};
use crate::graph::{BufferId, StageId, StencilGraph};
use crate::window::max_serialized;

/// Schedule `graph` in place and return its chronological buffer order.
///
/// Offsets and delays are computed aside and only written back once every
/// buffer has been reached, so a failed schedule leaves the graph as built.
pub fn schedule(graph: &mut StencilGraph) -> CompileResult<Vec<BufferId>> {
    info!("calculate buffer offsets");

    let mut pending: Vec<usize> = graph.stages.iter().map(|s| s.inputs.len()).collect();
    let mut offsets: Vec<i64> = graph.buffers.iter().map(|b| b.offset).collect();
    let mut delays: Vec<Option<BTreeMap<BufferId, i64>>> = vec![None; graph.stages.len()];
    let mut processed = vec![false; graph.buffers.len()];
    let mut order = Vec::with_capacity(graph.buffers.len());
    let mut queue = VecDeque::new();

    let root = graph.input;
    offsets[root.index()] = 0;
    processed[root.index()] = true;
    order.push(root);
    queue.push_back(root);
    debug!("buffer {} is at offset 0", graph.buffer(root).name);

    while let Some(buffer) = queue.pop_front() {
        for &stage in &graph.buffer(buffer).children {
            let remaining = &mut pending[stage.index()];
            *remaining = remaining.saturating_sub(1);
            if *remaining > 0 {
                continue;
            }
            let output = graph.stage(stage).output;
            if processed[output.index()] {
                return Err(CompileError::internal(format!(
                    "buffer {} scheduled twice",
                    graph.buffer(output).name
                )));
            }
            delays[stage.index()] = Some(schedule_stage(graph, stage, &mut offsets));
            processed[output.index()] = true;
            order.push(output);
            queue.push_back(output);
        }
    }

    if order.len() < graph.buffers.len() {
        let stuck: Vec<&str> = graph
            .buffers
            .iter()
            .filter(|b| !processed[b.id.index()])
            .map(|b| b.name.as_str())
            .collect();
        return Err(CompileError::semantic(format!(
            "cannot schedule buffer{} {}: unreachable from input {} or part of a cycle",
            if stuck.len() == 1 { "" } else { "s" },
            stuck.join(", "),
            graph.input().name
        )));
    }

    for (buffer, offset) in graph.buffers.iter_mut().zip(offsets) {
        buffer.offset = offset;
    }
    for (stage, delay) in graph.stages.iter_mut().zip(delays) {
        if let Some(delay) = delay {
            stage.delay = delay;
        }
    }
    graph.chronological = order.clone();
    Ok(order)
}

/// Latency of the window over `input`: its largest linearized offset
fn window_latency(graph: &StencilGraph, stage: StageId, input: BufferId) -> i64 {
    let points = graph.stage(stage).window.get(&input);
    points
        .and_then(|p| max_serialized(p, &graph.tile_size))
        .unwrap_or(0)
}

/// Place the output of a stage whose inputs are all placed, then align
/// every input with delays.
fn schedule_stage(
    graph: &StencilGraph,
    stage: StageId,
    offsets: &mut [i64],
) -> BTreeMap<BufferId, i64> {
    let output = graph.stage(stage).output;
    let inputs: Vec<(BufferId, i64, i64)> = graph
        .stage(stage)
        .inputs
        .iter()
        .map(|&x| (x, offsets[x.index()], window_latency(graph, stage, x)))
        .collect();

    // An output is never earlier than any of its inputs, nor earlier than
    // the latest point of any window becomes available.
    let offset = inputs
        .iter()
        .map(|&(_, x_offset, latency)| x_offset.max(x_offset + latency))
        .fold(offsets[output.index()], i64::max);
    offsets[output.index()] = offset;
    debug!("buffer {} is at offset {}", graph.buffer(output).name, offset);

    let mut delays = BTreeMap::new();
    for (x, x_offset, latency) in inputs {
        let arrival = x_offset + latency;
        let delay = offset - arrival;
        debug_assert!(delay >= 0, "negative delay on {:?} -> {:?}", x, output);
        if delay > 0 {
            debug!(
                "buffer {} arrives at buffer {} at offset {} < {}; add {} delay",
                graph.buffer(x).name,
                graph.buffer(output).name,
                arrival,
                offset,
                delay
            );
        }
        delays.insert(x, delay);
    }
    delays
}
