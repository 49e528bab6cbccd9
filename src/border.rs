//! Border preservation linker
//!
//! A stage that preserves the border of an earlier buffer needs that buffer
//! as an extra input, held long enough to cover the whole transitive window
//! between the two. The transitive window is only known once the graph is
//! fully wired and scheduled, so this runs as a second pass.

use tracing::{debug, info};

use crate::ast::Point;
use crate::error::{CompileError, CompileResult};
use crate::graph::{BorderEdge, BufferId, Stage, StageId, StencilGraph};
use crate::window::{max_serialized, sort_window, window_distance, window_offset, PointSet, WindowAlgebra};

/// Everything needed to splice one border edge into its stage
struct PendingEdge {
    stage: StageId,
    source: BufferId,
    window: PointSet,
    /// Reads of the source in load coordinates of the stage
    reads: Vec<Point>,
}

/// Add the border edges of every stage flagged with a border source.
///
/// Must run after [`crate::schedule::schedule`].
pub fn link_borders(graph: &mut StencilGraph) -> CompileResult<()> {
    if !graph.is_scheduled() {
        return Err(CompileError::internal(
            "border preservation requested before the graph was scheduled",
        ));
    }
    if graph.border_linked {
        return Err(CompileError::internal("border preservation linked twice"));
    }
    info!("link preserved borders");

    let pending = collect_edges(graph)?;
    for edge in pending {
        splice(graph, edge)?;
    }
    graph.border_linked = true;
    dump_stages(graph);
    Ok(())
}

/// `name@idx <- input@window, ...` for one stage
pub fn stage_summary(graph: &StencilGraph, stage: &Stage) -> String {
    let output = graph.buffer(stage.output);
    let inputs: Vec<String> = stage
        .window
        .iter()
        .map(|(input, window)| format!("{}@{:?}", graph.buffer(*input).name, window))
        .collect();
    format!(
        "{}@{:?} <- [{}]",
        output.name,
        output.idx.clone().unwrap_or_default(),
        inputs.join(", ")
    )
}

fn dump_stages(graph: &StencilGraph) {
    for stage in graph.stages_chronologically() {
        debug!("stage: {}", stage_summary(graph, stage));
    }
    for buffer in graph.chronological_buffers() {
        debug!("buffer.offset: {} @ {}", buffer.name, buffer.offset);
    }
    for stage in graph.stages_chronologically() {
        for (input, delay) in &stage.delay {
            debug!(
                "stage.delay: {} <- {} delayed {}",
                graph.stage_name(stage),
                graph.buffer(*input).name,
                delay
            );
        }
    }
}

/// Compute all transitive windows before the graph is touched
fn collect_edges(graph: &StencilGraph) -> CompileResult<Vec<PendingEdge>> {
    let mut algebra = WindowAlgebra::new(graph);
    let mut pending = Vec::new();
    for stage in graph.stages_chronologically() {
        let source = match stage.preserve_border_from {
            Some(source) => source,
            None => continue,
        };
        let output = graph.buffer(stage.output);
        let window = algebra.window(source, stage.output);
        if window.is_empty() {
            return Err(CompileError::semantic(format!(
                "cannot preserve border of {} in {}: {} does not depend on it",
                graph.buffer(source).name,
                output.name,
                output.name
            )));
        }
        // Scheduled latencies are raw load offsets, so the held reads must be
        // in that frame for the delay to stay non-negative.
        let reads = algebra.load_window(source, stage.output).into_iter().collect();
        pending.push(PendingEdge {
            stage: stage.id,
            source,
            window,
            reads,
        });
    }
    Ok(pending)
}

fn splice(graph: &mut StencilGraph, edge: PendingEdge) -> CompileResult<()> {
    let PendingEdge {
        stage,
        source,
        window,
        reads,
    } = edge;
    let tile_size = graph.tile_size.clone();
    let output = graph.stage(stage).output;

    let mut merged = graph
        .stage(stage)
        .window
        .get(&source)
        .cloned()
        .unwrap_or_default();
    merged.extend(reads);
    sort_window(&mut merged, &tile_size);

    let latency = max_serialized(&merged, &tile_size).unwrap_or(0);
    let delay = graph.buffer(output).offset - (graph.buffer(source).offset + latency);
    if delay < 0 {
        return Err(CompileError::internal(format!(
            "border window of {} in {} reaches {} cycles past the schedule",
            graph.buffer(source).name,
            graph.buffer(output).name,
            -delay
        )));
    }

    let border = BorderEdge {
        source,
        window_offset: window_offset(&window),
        distance: window_distance(&window, &tile_size),
        window,
    };
    debug!(
        "border of {} in {}: window {:?}, delay {}, distance {}",
        graph.buffer(source).name,
        graph.buffer(output).name,
        merged,
        delay,
        border.distance
    );

    let target = graph.stage_mut(stage);
    target.window.insert(source, merged);
    target.delay.insert(source, delay);
    target.inputs.insert(source);
    target.border = Some(border);
    graph.buffer_mut(source).children.insert(stage);
    Ok(())
}
