//! Window algebra
//!
//! Linearization of multidimensional offsets against the tile shape, and the
//! transitive window one buffer has on another through any number of
//! intermediate stages.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::ast::Point;
use crate::graph::{BufferId, StencilGraph};

/// A set of relative offsets
pub type PointSet = BTreeSet<Point>;

/// Linearize `point` using the tile shape as a mixed-radix basis:
/// `p[0] + p[1]*t[0] + p[2]*t[0]*t[1] + ...`
pub fn serialize(point: &[i64], tile_size: &[usize]) -> i64 {
    let mut stride = 1i64;
    let mut acc = 0i64;
    for (v, t) in point.iter().zip(tile_size) {
        acc += v * stride;
        stride *= *t as i64;
    }
    acc
}

pub fn serialize_all<'a>(points: impl IntoIterator<Item = &'a Point>, tile_size: &[usize]) -> Vec<i64> {
    points.into_iter().map(|p| serialize(p, tile_size)).collect()
}

/// Largest linearized offset in `points`, `None` when empty
pub fn max_serialized<'a>(points: impl IntoIterator<Item = &'a Point>, tile_size: &[usize]) -> Option<i64> {
    points.into_iter().map(|p| serialize(p, tile_size)).max()
}

/// Sort by linearized offset, ties broken lexicographically, and dedup
pub fn sort_window(points: &mut Vec<Point>, tile_size: &[usize]) {
    points.sort_by(|a, b| {
        serialize(a, tile_size)
            .cmp(&serialize(b, tile_size))
            .then_with(|| a.cmp(b))
    });
    points.dedup();
}

/// Per dimension, the negated minimum coordinate of the window
pub fn window_offset(window: &PointSet) -> Point {
    let dim = match window.iter().next() {
        Some(p) => p.len(),
        None => return Point::new(),
    };
    (0..dim)
        .map(|d| -window.iter().map(|p| p[d]).min().unwrap_or(0))
        .collect()
}

/// Pipeline span covering the whole window: from its earliest point, as
/// given by the window offset, to its latest linearized point.
///
/// The span is `max + serialize(window_offset)`: the window offset is the
/// negated minimum, so adding it measures the distance from the minimum.
pub fn window_distance(window: &PointSet, tile_size: &[usize]) -> i64 {
    match max_serialized(window, tile_size) {
        Some(max) => max + serialize(&window_offset(window), tile_size),
        None => 0,
    }
}

/// Extent of the window in each dimension
pub fn stencil_dim(window: &PointSet) -> Vec<i64> {
    let dim = match window.iter().next() {
        Some(p) => p.len(),
        None => return Vec::new(),
    };
    (0..dim)
        .map(|d| {
            let max = window.iter().map(|p| p[d]).max().unwrap_or(0);
            let min = window.iter().map(|p| p[d]).min().unwrap_or(0);
            max - min + 1
        })
        .collect()
}

/// Shift the window by its own offset so every dimension starts at 0
pub fn normalize(window: &PointSet) -> PointSet {
    let offset = window_offset(window);
    window
        .iter()
        .map(|p| p.iter().zip(&offset).map(|(a, b)| a + b).collect())
        .collect()
}

/// Coordinate frame of a transitive window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Frame {
    /// Relative to the store index of every stage on the path
    Store,
    /// Raw load offsets summed along the path, as the scheduler sees them
    Load,
}

/// Memoized transitive windows over a built graph
pub struct WindowAlgebra<'g> {
    graph: &'g StencilGraph,
    memo: HashMap<(BufferId, BufferId, Frame), PointSet>,
}

impl<'g> WindowAlgebra<'g> {
    pub fn new(graph: &'g StencilGraph) -> Self {
        Self {
            graph,
            memo: HashMap::new(),
        }
    }

    /// Offsets of `from` that one element of `to` depends on, relative to
    /// the store index of `to`. Empty if `to` does not depend on `from`.
    pub fn window(&mut self, from: BufferId, to: BufferId) -> PointSet {
        self.walk(from, to, Frame::Store)
    }

    /// Offsets of `from` as `to` would load them, without subtracting the
    /// store index of any stage on the path.
    ///
    /// The largest linearized point never exceeds `to.offset - from.offset`
    /// once the graph is scheduled.
    pub fn load_window(&mut self, from: BufferId, to: BufferId) -> PointSet {
        self.walk(from, to, Frame::Load)
    }

    fn walk(&mut self, from: BufferId, to: BufferId, frame: Frame) -> PointSet {
        if let Some(points) = self.memo.get(&(from, to, frame)) {
            return points.clone();
        }

        let graph = self.graph;
        let target = graph.buffer(to);
        let mut points = PointSet::new();
        if let (Some(stage_id), Some(idx)) = (target.parent, target.idx.as_ref()) {
            let store: &[i64] = match frame {
                Frame::Store => idx,
                Frame::Load => &[],
            };
            let stage = graph.stage(stage_id);
            for (&input, reads) in &stage.window {
                if input == from {
                    points.extend(reads.iter().map(|p| relative(p, &[], store)));
                } else {
                    let upstream = self.walk(from, input, frame);
                    for q in &upstream {
                        for p in reads {
                            points.insert(relative(p, q, store));
                        }
                    }
                }
            }
        }

        debug!(
            "overall stencil window of {} <- {} is {:?} ({} points, {:?} frame)",
            target.name,
            graph.buffer(from).name,
            points,
            points.len(),
            frame
        );
        self.memo.insert((from, to, frame), points.clone());
        points
    }
}

/// `p + q - store`, with an empty `q` treated as the origin
fn relative(p: &[i64], q: &[i64], store: &[i64]) -> Point {
    p.iter()
        .enumerate()
        .map(|(d, v)| v + q.get(d).copied().unwrap_or(0) - store.get(d).copied().unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ElemType, Expr, Node};
    use crate::builder::build;
    use crate::config::StencilConfig;

    fn set(points: &[&[i64]]) -> PointSet {
        points.iter().map(|p| p.to_vec()).collect()
    }

    fn stencil(name: &str, from: &str, reads: &[i64]) -> Node {
        let sum = Expr::sum(reads.iter().map(|&d| Expr::load(from, vec![d]))).unwrap();
        Node::new(name, ElemType::Float, 1).with_expr(vec![0], sum)
    }

    #[test]
    fn test_serialize_1d() {
        assert_eq!(serialize(&[1], &[16]), 1);
        assert_eq!(serialize(&[-3], &[16]), -3);
    }

    #[test]
    fn test_serialize_mixed_radix() {
        assert_eq!(serialize(&[1, 1], &[64, 32]), 65);
        assert_eq!(serialize(&[-1, 2, 1], &[8, 4, 2]), -1 + 16 + 32);
        assert_eq!(serialize_all(&set(&[&[0, -1], &[1, 0]]), &[10, 10]), vec![-10, 1]);
    }

    #[test]
    fn test_sort_window() {
        let mut points = vec![vec![0, 1], vec![1, 0], vec![-1, 0], vec![1, 0]];
        sort_window(&mut points, &[8, 8]);
        assert_eq!(points, vec![vec![-1, 0], vec![1, 0], vec![0, 1]]);
    }

    #[test]
    fn test_window_offset_and_normalize() {
        let window = set(&[&[-2, 1], &[1, -1], &[0, 3]]);
        assert_eq!(window_offset(&window), vec![2, 1]);
        let normalized = normalize(&window);
        assert_eq!(window_offset(&normalized), vec![0, 0]);
        assert_eq!(normalized, set(&[&[0, 2], &[3, 0], &[2, 4]]));
    }

    #[test]
    fn test_window_distance() {
        let window = set(&[&[-2], &[-1], &[0], &[1], &[2]]);
        assert_eq!(window_distance(&window, &[16]), 4);
        assert_eq!(window_distance(&PointSet::new(), &[16]), 0);

        // 3x3 box in a 10-wide tile: from (-1,-1) to (1,1)
        let window: PointSet = (-1..=1)
            .flat_map(|j| (-1..=1).map(move |i| vec![i, j]))
            .collect();
        assert_eq!(window_distance(&window, &[10, 10]), 22);
    }

    #[test]
    fn test_stencil_dim() {
        let window = set(&[&[-1, 0], &[1, 0], &[0, -2], &[0, 2]]);
        assert_eq!(stencil_dim(&window), vec![3, 5]);
    }

    #[test]
    fn test_chain_window() {
        let config = StencilConfig::new(
            "chain",
            Node::new("I", ElemType::Float, 1),
            stencil("O", "A", &[-1, 0, 1]),
            vec![16],
        )
        .with_intermediate(stencil("A", "I", &[-1, 0, 1]));
        let graph = build(&config).unwrap();
        let i = graph.buffer_id("I").unwrap();
        let a = graph.buffer_id("A").unwrap();
        let o = graph.buffer_id("O").unwrap();

        let mut algebra = WindowAlgebra::new(&graph);
        assert_eq!(algebra.window(i, o), set(&[&[-2], &[-1], &[0], &[1], &[2]]));
        assert_eq!(algebra.window(a, o), set(&[&[-1], &[0], &[1]]));
        assert!(algebra.window(o, i).is_empty());
    }

    #[test]
    fn test_window_relative_to_store_index() {
        let output = Node::new("O", ElemType::Float, 1).with_expr(
            vec![1],
            Expr::binary(
                crate::ast::BinaryOp::Add,
                Expr::load("I", vec![0]),
                Expr::load("I", vec![2]),
            ),
        );
        let config = StencilConfig::new("shifted", Node::new("I", ElemType::Float, 1), output, vec![16]);
        let graph = build(&config).unwrap();
        let mut algebra = WindowAlgebra::new(&graph);
        let (i, o) = (graph.buffer_id("I").unwrap(), graph.buffer_id("O").unwrap());
        assert_eq!(algebra.window(i, o), set(&[&[-1], &[1]]));
        assert_eq!(algebra.load_window(i, o), set(&[&[0], &[2]]));
    }

    #[test]
    fn test_load_window_keeps_intermediate_store() {
        // T stores at -1, so its window on I is shifted right by one
        let t = Node::new("T", ElemType::Float, 1).with_expr(
            vec![-1],
            Expr::binary(
                crate::ast::BinaryOp::Add,
                Expr::load("I", vec![-1]),
                Expr::load("I", vec![0]),
            ),
        );
        let config = StencilConfig::new(
            "shifted",
            Node::new("I", ElemType::Float, 1),
            stencil("O", "T", &[0]),
            vec![16],
        )
        .with_intermediate(t);
        let graph = build(&config).unwrap();
        let (i, o) = (graph.buffer_id("I").unwrap(), graph.buffer_id("O").unwrap());
        let mut algebra = WindowAlgebra::new(&graph);
        assert_eq!(algebra.window(i, o), set(&[&[0], &[1]]));
        assert_eq!(algebra.load_window(i, o), set(&[&[-1], &[0]]));
    }
}
