//! Stencil dependency graph
//!
//! Buffers and stages live in two arenas owned by [`StencilGraph`] and refer
//! to each other through [`BufferId`] / [`StageId`] handles. Handles are
//! assigned once at build time and stay valid for the whole compilation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::ast::{ElemType, Point, StoreExpr};

/// Stable handle of a buffer inside its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BufferId(pub u32);

/// Stable handle of a stage inside its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StageId(pub u32);

impl BufferId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl StageId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Named grid of values produced by at most one stage
#[derive(Debug, Clone)]
pub struct Buffer {
    pub id: BufferId,
    pub name: String,
    pub ty: ElemType,
    pub chan: usize,
    /// Store index; `None` for the root input
    pub idx: Option<Point>,
    /// Logical cycle at which this buffer's value is ready
    pub offset: i64,
    pub parent: Option<StageId>,
    pub children: BTreeSet<StageId>,
    /// Stages that retain this buffer's border values
    pub preserve_border_to: BTreeSet<StageId>,
}

impl Buffer {
    pub fn is_input(&self) -> bool {
        self.parent.is_none()
    }
}

/// Extra input edge that carries border values across an iteration boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorderEdge {
    pub source: BufferId,
    /// Transitive window of the source, relative to the stage's store index
    pub window: BTreeSet<Point>,
    /// Warm-up elements per dimension before the window is populated
    pub window_offset: Point,
    /// Pipeline cycles the source must be held for
    pub distance: i64,
}

/// One computational unit producing exactly one buffer
#[derive(Debug, Clone)]
pub struct Stage {
    pub id: StageId,
    pub output: BufferId,
    pub inputs: BTreeSet<BufferId>,
    /// Relative points read from each input, sorted by linearized offset
    pub window: BTreeMap<BufferId, Vec<Point>>,
    /// Extra buffering cycles per input
    pub delay: BTreeMap<BufferId, i64>,
    pub exprs: Vec<StoreExpr>,
    pub preserve_border_from: Option<BufferId>,
    /// Set by the border linker
    pub border: Option<BorderEdge>,
}

/// All buffers and stages of one compilation unit
#[derive(Debug, Clone)]
pub struct StencilGraph {
    pub(crate) buffers: Vec<Buffer>,
    pub(crate) stages: Vec<Stage>,
    pub(crate) names: HashMap<String, BufferId>,
    pub(crate) input: BufferId,
    pub(crate) output: BufferId,
    pub(crate) tile_size: Vec<usize>,
    pub(crate) chronological: Vec<BufferId>,
    pub(crate) border_linked: bool,
}

impl StencilGraph {
    pub fn buffer(&self, id: BufferId) -> &Buffer {
        &self.buffers[id.index()]
    }

    pub fn stage(&self, id: StageId) -> &Stage {
        &self.stages[id.index()]
    }

    pub(crate) fn buffer_mut(&mut self, id: BufferId) -> &mut Buffer {
        &mut self.buffers[id.index()]
    }

    pub(crate) fn stage_mut(&mut self, id: StageId) -> &mut Stage {
        &mut self.stages[id.index()]
    }

    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn buffer_id(&self, name: &str) -> Option<BufferId> {
        self.names.get(name).copied()
    }

    pub fn buffer_by_name(&self, name: &str) -> Option<&Buffer> {
        self.buffer_id(name).map(|id| self.buffer(id))
    }

    /// The stage producing the named buffer
    pub fn stage_by_name(&self, name: &str) -> Option<&Stage> {
        self.buffer_by_name(name)
            .and_then(|b| b.parent)
            .map(|id| self.stage(id))
    }

    pub fn input(&self) -> &Buffer {
        self.buffer(self.input)
    }

    pub fn output(&self) -> &Buffer {
        self.buffer(self.output)
    }

    pub fn tile_size(&self) -> &[usize] {
        &self.tile_size
    }

    /// Name of the stage, i.e. of the buffer it produces
    pub fn stage_name(&self, stage: &Stage) -> &str {
        &self.buffer(stage.output).name
    }

    /// Window of `stage` over the named input
    pub fn window_of<'a>(&self, stage: &'a Stage, input: &str) -> Option<&'a [Point]> {
        let id = self.buffer_id(input)?;
        stage.window.get(&id).map(|w| w.as_slice())
    }

    /// Buffers in schedule order; empty until the graph is scheduled
    pub fn chronological_buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.chronological.iter().map(|&id| self.buffer(id))
    }

    /// Stages in schedule order
    pub fn stages_chronologically(&self) -> impl Iterator<Item = &Stage> {
        self.chronological_buffers()
            .filter_map(|b| b.parent)
            .map(|id| self.stage(id))
    }

    pub fn is_scheduled(&self) -> bool {
        !self.chronological.is_empty()
    }

    pub fn is_border_linked(&self) -> bool {
        self.border_linked
    }

    /// Buffers read by at least one stage
    pub fn producer_buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter().filter(|b| !b.children.is_empty())
    }

    /// Buffers written by a stage
    pub fn consumer_buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter().filter(|b| b.parent.is_some())
    }

    /// Stages carrying a border edge
    pub fn border_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().filter(|s| s.preserve_border_from.is_some())
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{ElemType, Expr, Node};
    use crate::builder::build;
    use crate::config::StencilConfig;

    fn graph() -> super::StencilGraph {
        let a = Node::new("A", ElemType::Float, 1).with_expr(vec![0], Expr::load("I", vec![1]));
        let output = Node::new("O", ElemType::Float, 1).with_expr(vec![0], Expr::load("A", vec![0]));
        let config = StencilConfig::new("pair", Node::new("I", ElemType::Float, 1), output, vec![8])
            .with_intermediate(a);
        build(&config).unwrap()
    }

    #[test]
    fn test_producer_consumer_buffers() {
        let graph = graph();
        let producers: Vec<&str> = graph.producer_buffers().map(|b| b.name.as_str()).collect();
        let consumers: Vec<&str> = graph.consumer_buffers().map(|b| b.name.as_str()).collect();
        assert_eq!(producers, vec!["I", "A"]);
        assert_eq!(consumers, vec!["A", "O"]);
    }

    #[test]
    fn test_lookup_by_name() {
        let graph = graph();
        let stage = graph.stage_by_name("A").unwrap();
        assert_eq!(graph.window_of(stage, "I"), Some(&[vec![1]][..]));
        assert_eq!(graph.window_of(stage, "O"), None);
        assert!(graph.stage_by_name("I").is_none());
        assert!(graph.buffer_id("missing").is_none());
        assert_eq!(graph.border_stages().count(), 0);
        assert_eq!(graph.chronological_buffers().count(), 0);
    }
}
