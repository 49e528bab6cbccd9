//! Multi-iteration expansion
//!
//! For `iterate = N`, the output node is instantiated N-1 extra times as a
//! synthesized intermediate, each followed by a fresh instance of every user
//! intermediate. Instance `k` lives in the namespace `<name>_iter<k>`;
//! instance 0 keeps the original names.

use std::collections::HashSet;

use tracing::debug;

use crate::ast::Node;
use crate::config::StencilConfig;

/// Name of `base` in iteration `iteration`
pub fn iteration_name(base: &str, iteration: u32) -> String {
    if iteration == 0 {
        base.to_string()
    } else {
        format!("{}_iter{}", base, iteration)
    }
}

/// A node instance after expansion
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInstance {
    pub node: Node,
    pub iteration: u32,
    /// Synthesized copy of the output node
    pub synthesized: bool,
}

/// Result of expanding all iterations
#[derive(Debug, Clone, PartialEq)]
pub struct Unrolled {
    /// User intermediates of iteration 0 first, then each later iteration
    /// as its synthesized output copy followed by its intermediates
    pub intermediates: Vec<NodeInstance>,
    /// The final output node, reading from the last iteration
    pub output: Node,
}

/// Expand `config` into one node instance per buffer
pub fn unroll(config: &StencilConfig) -> Unrolled {
    let input = config.input.name.as_str();
    let intermediate_names: HashSet<&str> =
        config.intermediates.iter().map(|n| n.name.as_str()).collect();
    let iterated = |name: &str| name == input || intermediate_names.contains(name);

    let mut intermediates: Vec<NodeInstance> = config
        .intermediates
        .iter()
        .map(|node| NodeInstance {
            node: node.clone(),
            iteration: 0,
            synthesized: false,
        })
        .collect();

    if config.iterate > 1 {
        debug!(
            "pipeline {} iterations of {} -> {}",
            config.iterate, input, config.output.name
        );
    }

    for iteration in 1..config.iterate {
        // The previous iteration's output becomes this iteration's input.
        let mut boundary = config.output.clone();
        boundary.name = iteration_name(input, iteration);
        boundary.rename_loads(&|n: &str| {
            if iterated(n) {
                iteration_name(n, iteration - 1)
            } else {
                n.to_string()
            }
        });
        if config.preserve_border() {
            boundary.preserve_border = Some(iteration_name(input, iteration - 1));
        }
        intermediates.push(NodeInstance {
            node: boundary,
            iteration,
            synthesized: true,
        });

        for template in &config.intermediates {
            let mut node = template.clone();
            node.name = iteration_name(&template.name, iteration);
            let rename = |n: &str| {
                if iterated(n) {
                    iteration_name(n, iteration)
                } else {
                    n.to_string()
                }
            };
            node.rename_loads(&rename);
            node.preserve_border = node.preserve_border.as_deref().map(rename);
            intermediates.push(NodeInstance {
                node,
                iteration,
                synthesized: false,
            });
        }
    }

    let last = config.iterate.saturating_sub(1);
    let mut output = config.output.clone();
    output.rename_loads(&|n: &str| {
        if iterated(n) {
            iteration_name(n, last)
        } else {
            n.to_string()
        }
    });
    if config.preserve_border() {
        output.preserve_border = Some(iteration_name(input, last));
    }

    Unrolled {
        intermediates,
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, ElemType, Expr};
    use crate::config::BorderPolicy;

    fn config(iterate: u32, border: BorderPolicy) -> StencilConfig {
        let input = Node::new("I", ElemType::Float, 1);
        let t = Node::new("T", ElemType::Float, 1).with_expr(
            vec![0],
            Expr::binary(BinaryOp::Mul, Expr::load("I", vec![-1]), Expr::load("k", vec![0])),
        );
        let output = Node::new("O", ElemType::Float, 1).with_expr(
            vec![0],
            Expr::binary(BinaryOp::Add, Expr::load("T", vec![0]), Expr::load("I", vec![1])),
        );
        StencilConfig::new("iter", input, output, vec![16])
            .with_intermediate(t)
            .with_extra_param("k")
            .with_iterate(iterate, border)
    }

    fn load_names(node: &Node) -> Vec<&str> {
        node.loads().into_iter().map(|(n, _)| n).collect()
    }

    #[test]
    fn test_iteration_name() {
        assert_eq!(iteration_name("I", 0), "I");
        assert_eq!(iteration_name("I", 2), "I_iter2");
    }

    #[test]
    fn test_single_iteration_unchanged() {
        let config = config(1, BorderPolicy::Preserve);
        let unrolled = unroll(&config);
        assert_eq!(unrolled.intermediates.len(), 1);
        assert_eq!(load_names(&unrolled.output), vec!["T", "I"]);
        assert_eq!(unrolled.output.preserve_border.as_deref(), Some("I"));
    }

    #[test]
    fn test_three_iterations() {
        let config = config(3, BorderPolicy::None);
        let unrolled = unroll(&config);
        let names: Vec<&str> = unrolled
            .intermediates
            .iter()
            .map(|n| n.node.name.as_str())
            .collect();
        assert_eq!(names, vec!["T", "I_iter1", "T_iter1", "I_iter2", "T_iter2"]);

        let boundary = &unrolled.intermediates[1];
        assert!(boundary.synthesized);
        assert_eq!(load_names(&boundary.node), vec!["T", "I"]);

        let t1 = &unrolled.intermediates[2];
        assert_eq!(load_names(&t1.node), vec!["I_iter1", "k"]);

        assert_eq!(load_names(&unrolled.output), vec!["T_iter2", "I_iter2"]);
        assert!(unrolled.intermediates.iter().all(|n| n.node.preserve_border.is_none()));
    }

    #[test]
    fn test_preserve_border_links_previous_iteration() {
        let config = config(3, BorderPolicy::Preserve);
        let unrolled = unroll(&config);
        let borders: Vec<(&str, &str)> = unrolled
            .intermediates
            .iter()
            .filter_map(|n| {
                n.node
                    .preserve_border
                    .as_deref()
                    .map(|from| (n.node.name.as_str(), from))
            })
            .collect();
        assert_eq!(borders, vec![("I_iter1", "I"), ("I_iter2", "I_iter1")]);
        assert_eq!(unrolled.output.preserve_border.as_deref(), Some("I_iter2"));
    }
}
