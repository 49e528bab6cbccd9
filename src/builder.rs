//! Graph builder
//!
//! Turns the normalized nodes of a [`StencilConfig`] into a wired
//! [`StencilGraph`]: expands iterations, allocates one buffer per node,
//! derives each stage's windows from its loads and records border
//! preservation requirements.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

use crate::ast::{Node, Point};
use crate::config::StencilConfig;
use crate::error::{CompileError, CompileResult};
use crate::graph::{Buffer, BufferId, Stage, StageId, StencilGraph};
use crate::unroll::unroll;
use crate::window::sort_window;

/// Build the dependency graph of `config`
pub fn build(config: &StencilConfig) -> CompileResult<StencilGraph> {
    GraphBuilder::new(config).build()
}

/// Builder state for one compilation unit
pub struct GraphBuilder<'c> {
    config: &'c StencilConfig,
    buffers: Vec<Buffer>,
    stages: Vec<Stage>,
    names: HashMap<String, BufferId>,
}

impl<'c> GraphBuilder<'c> {
    pub fn new(config: &'c StencilConfig) -> Self {
        Self {
            config,
            buffers: Vec::new(),
            stages: Vec::new(),
            names: HashMap::new(),
        }
    }

    pub fn build(mut self) -> CompileResult<StencilGraph> {
        let config = self.config;
        config.validate()?;
        self.check_declared_names()?;

        if !config.input.exprs.is_empty() {
            return Err(CompileError::semantic(format!(
                "input {} must not have defining expressions",
                config.input.name
            )));
        }

        let unrolled = unroll(config);
        let mut defined: Vec<&Node> = unrolled.intermediates.iter().map(|i| &i.node).collect();
        defined.push(&unrolled.output);

        let input = self.alloc_buffer(&config.input, None)?;
        let mut outputs = Vec::with_capacity(defined.len());
        for node in &defined {
            let store = node.store_index()?.ok_or_else(|| {
                CompileError::semantic(format!("buffer {} has no defining expression", node.name))
            })?;
            self.check_dim(&node.name, store)?;
            outputs.push(self.alloc_buffer(node, Some(store.to_vec()))?);
        }
        let output = *outputs
            .last()
            .ok_or_else(|| CompileError::internal("output buffer was not allocated"))?;

        for (node, &buffer) in defined.iter().zip(&outputs) {
            self.add_stage(node, buffer)?;
        }
        for (node, &buffer) in defined.iter().zip(&outputs) {
            if let Some(from) = &node.preserve_border {
                self.add_border_requirement(from, buffer)?;
            }
        }

        info!(
            "built stencil graph {} with {} buffers and {} stages",
            config.app_name,
            self.buffers.len(),
            self.stages.len()
        );

        Ok(StencilGraph {
            buffers: self.buffers,
            stages: self.stages,
            names: self.names,
            input,
            output,
            tile_size: config.tile_size.clone(),
            chronological: Vec::new(),
            border_linked: false,
        })
    }

    /// Name checks on the user-declared nodes, before expansion
    fn check_declared_names(&self) -> CompileResult<()> {
        let config = self.config;
        let mut seen = HashSet::new();
        for node in &config.intermediates {
            if !seen.insert(node.name.as_str()) {
                return Err(CompileError::semantic(format!(
                    "intermediate {} is defined more than once",
                    node.name
                )));
            }
        }
        if seen.contains(config.input.name.as_str()) {
            return Err(CompileError::semantic(format!(
                "input name conflict with buffer: {}",
                config.input.name
            )));
        }
        if seen.contains(config.output.name.as_str()) || config.output.name == config.input.name {
            return Err(CompileError::semantic(format!(
                "output name conflict with buffer: {}",
                config.output.name
            )));
        }
        seen.insert(config.input.name.as_str());
        seen.insert(config.output.name.as_str());
        if let Some(param) = config.extra_params.iter().find(|p| seen.contains(p.as_str())) {
            return Err(CompileError::semantic(format!(
                "parameter name conflict with buffer: {}",
                param
            )));
        }
        Ok(())
    }

    fn check_dim(&self, name: &str, idx: &[i64]) -> CompileResult<()> {
        let dim = self.config.dim();
        if idx.len() != dim {
            return Err(CompileError::semantic(format!(
                "index {:?} of {} has {} dimensions, expected {}",
                idx,
                name,
                idx.len(),
                dim
            )));
        }
        Ok(())
    }

    fn alloc_buffer(&mut self, node: &Node, idx: Option<Point>) -> CompileResult<BufferId> {
        if self.names.contains_key(&node.name) {
            return Err(CompileError::semantic(format!(
                "name conflict: buffer {} is defined more than once",
                node.name
            )));
        }
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(Buffer {
            id,
            name: node.name.clone(),
            ty: node.ty,
            chan: node.chan,
            idx,
            offset: 0,
            parent: None,
            children: BTreeSet::new(),
            preserve_border_to: BTreeSet::new(),
        });
        self.names.insert(node.name.clone(), id);
        Ok(id)
    }

    /// Window of `node` over each input buffer, extra parameters excluded
    fn window_for(&self, node: &Node) -> CompileResult<BTreeMap<BufferId, Vec<Point>>> {
        let mut window: BTreeMap<BufferId, Vec<Point>> = BTreeMap::new();
        for (name, idx) in node.loads() {
            if self.config.extra_params.contains(name) {
                continue;
            }
            let id = self.names.get(name).copied().ok_or_else(|| {
                CompileError::semantic(format!(
                    "buffer {} loads from undefined buffer {}",
                    node.name, name
                ))
            })?;
            self.check_dim(name, idx)?;
            window.entry(id).or_default().push(idx.to_vec());
        }
        for points in window.values_mut() {
            sort_window(points, &self.config.tile_size);
        }
        Ok(window)
    }

    fn add_stage(&mut self, node: &Node, output: BufferId) -> CompileResult<StageId> {
        let window = self.window_for(node)?;
        let id = StageId(self.stages.len() as u32);
        let inputs: BTreeSet<BufferId> = window.keys().copied().collect();

        debug!(
            "window for {} is {}",
            node.name,
            window
                .iter()
                .map(|(b, points)| format!("{}@{:?}", self.buffers[b.index()].name, points))
                .collect::<Vec<_>>()
                .join(", ")
        );

        for input in &inputs {
            self.buffers[input.index()].children.insert(id);
        }
        self.buffers[output.index()].parent = Some(id);
        self.stages.push(Stage {
            id,
            output,
            inputs,
            window,
            delay: BTreeMap::new(),
            exprs: node.exprs.clone(),
            preserve_border_from: None,
            border: None,
        });
        Ok(id)
    }

    fn add_border_requirement(&mut self, from: &str, to: BufferId) -> CompileResult<()> {
        let source = self.names.get(from).copied().ok_or_else(|| {
            CompileError::semantic(format!(
                "cannot preserve border of undefined buffer {} in {}",
                from,
                self.buffers[to.index()].name
            ))
        })?;
        let stage = self.buffers[to.index()]
            .parent
            .ok_or_else(|| CompileError::internal("border requirement on a buffer without stage"))?;
        debug!(
            "border from {} to {}",
            self.buffers[source.index()].name,
            self.buffers[to.index()].name
        );
        self.buffers[source.index()].preserve_border_to.insert(stage);
        self.stages[stage.index()].preserve_border_from = Some(source);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, ElemType, Expr};
    use crate::config::BorderPolicy;

    fn stencil(name: &str, from: &str, reads: &[i64]) -> Node {
        let sum = Expr::sum(reads.iter().map(|&d| Expr::load(from, vec![d]))).unwrap();
        Node::new(name, ElemType::Float, 1).with_expr(vec![0], sum)
    }

    fn chain() -> StencilConfig {
        StencilConfig::new(
            "chain",
            Node::new("I", ElemType::Float, 1),
            stencil("O", "A", &[1, -1, 0, 1]),
            vec![16],
        )
        .with_intermediate(stencil("A", "I", &[-1, 0, 1]))
    }

    #[test]
    fn test_build_chain() {
        let graph = build(&chain()).unwrap();
        assert_eq!(graph.buffers().len(), 3);
        assert_eq!(graph.stages().len(), 2);
        assert_eq!(graph.input().name, "I");
        assert_eq!(graph.output().name, "O");
        assert!(graph.input().is_input());
        assert!(!graph.is_scheduled());

        let a = graph.buffer_by_name("A").unwrap();
        let stage_o = graph.stage_by_name("O").unwrap();
        assert!(a.children.contains(&stage_o.id));
        assert_eq!(graph.stage_name(stage_o), "O");
        // distinct points, sorted by linearized offset
        assert_eq!(
            graph.window_of(stage_o, "A").unwrap(),
            &[vec![-1], vec![0], vec![1]]
        );
    }

    #[test]
    fn test_extra_params_excluded() {
        let output = Node::new("O", ElemType::Float, 1).with_expr(
            vec![0],
            Expr::binary(BinaryOp::Mul, Expr::load("I", vec![0]), Expr::load("coeff", vec![3])),
        );
        let config = StencilConfig::new("scale", Node::new("I", ElemType::Float, 1), output, vec![16])
            .with_extra_param("coeff");
        let graph = build(&config).unwrap();
        let stage = graph.stage_by_name("O").unwrap();
        assert_eq!(stage.inputs.len(), 1);
        assert!(graph.buffer_by_name("coeff").is_none());
    }

    #[test]
    fn test_undefined_input() {
        let config = StencilConfig::new(
            "broken",
            Node::new("I", ElemType::Float, 1),
            stencil("O", "missing", &[0]),
            vec![16],
        );
        let err = build(&config).unwrap_err();
        assert!(err.is_semantic());
        assert!(err.message().contains("missing"));
    }

    #[test]
    fn test_name_conflicts() {
        let config = chain().with_intermediate(stencil("I", "A", &[0]));
        assert!(build(&config).unwrap_err().message().contains("input name conflict"));

        let config = chain().with_intermediate(stencil("O", "A", &[0]));
        assert!(build(&config).unwrap_err().message().contains("output name conflict"));

        let config = chain().with_intermediate(stencil("A", "I", &[0]));
        assert!(build(&config).is_err());

        let config = chain().with_extra_param("A");
        assert!(build(&config).is_err());
    }

    #[test]
    fn test_synthesized_name_conflict() {
        let config = chain()
            .with_intermediate(stencil("A_iter1", "A", &[0]))
            .with_iterate(2, BorderPolicy::None);
        let err = build(&config).unwrap_err();
        assert!(err.message().contains("A_iter1"));
    }

    #[test]
    fn test_non_uniform_store() {
        let output = stencil("O", "I", &[0]).with_expr(vec![1], Expr::load("I", vec![0]));
        let config = StencilConfig::new("bad", Node::new("I", ElemType::Float, 1), output, vec![16]);
        assert!(build(&config).unwrap_err().is_semantic());
    }

    #[test]
    fn test_dimension_mismatch() {
        let config = StencilConfig::new(
            "bad",
            Node::new("I", ElemType::Float, 1),
            stencil("O", "I", &[0]),
            vec![16, 16],
        );
        assert!(build(&config).unwrap_err().message().contains("dimensions"));
    }

    #[test]
    fn test_iterated_border_requirements() {
        let config = chain().with_iterate(3, BorderPolicy::Preserve);
        let graph = build(&config).unwrap();
        let names: Vec<&str> = graph.buffers().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["I", "A", "I_iter1", "A_iter1", "I_iter2", "A_iter2", "O"]);

        let stage = graph.stage_by_name("I_iter2").unwrap();
        let source = stage.preserve_border_from.unwrap();
        assert_eq!(graph.buffer(source).name, "I_iter1");
        assert!(graph.buffer(source).preserve_border_to.contains(&stage.id));
        assert_eq!(graph.border_stages().count(), 3);
    }
}
