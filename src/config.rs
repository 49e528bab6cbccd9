//! Compilation-unit configuration
//!
//! Everything the scheduler needs besides the node definitions themselves:
//! iteration count, border policy, tile shape, platform parameters and the
//! scalar parameters that are excluded from windowing.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ast::Node;
use crate::error::{CompileError, CompileResult};

/// What happens to the border of the tile across iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderPolicy {
    #[default]
    None,
    /// Retain edge values from the previous iteration
    Preserve,
}

impl std::str::FromStr for BorderPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(BorderPolicy::None),
            "preserve" => Ok(BorderPolicy::Preserve),
            other => Err(format!("Unknown border policy: {}", other)),
        }
    }
}

impl std::fmt::Display for BorderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BorderPolicy::None => write!(f, "none"),
            BorderPolicy::Preserve => write!(f, "preserve"),
        }
    }
}

fn default_iterate() -> u32 {
    1
}

fn default_unroll_factor() -> usize {
    1
}

fn default_dram_bank() -> usize {
    1
}

fn default_burst_width() -> usize {
    512
}

/// Configuration of one stencil compilation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StencilConfig {
    /// Application name, used to key external cost models
    pub app_name: String,
    /// Number of times the whole pipeline is applied
    #[serde(default = "default_iterate")]
    pub iterate: u32,
    #[serde(default)]
    pub border: BorderPolicy,
    /// Tile extent per dimension; the mixed-radix basis for linearization
    pub tile_size: Vec<usize>,
    #[serde(default = "default_unroll_factor")]
    pub unroll_factor: usize,
    #[serde(default = "default_dram_bank")]
    pub dram_bank: usize,
    /// Read and write through separate halves of the DRAM banks
    #[serde(default)]
    pub dram_separate: bool,
    /// Memory burst width in bits
    #[serde(default = "default_burst_width")]
    pub burst_width: usize,
    /// Scalar parameters supplied at run time; never part of a window
    #[serde(default)]
    pub extra_params: BTreeSet<String>,
    pub input: Node,
    pub output: Node,
    #[serde(default)]
    pub intermediates: Vec<Node>,
}

impl StencilConfig {
    pub fn new(app_name: impl Into<String>, input: Node, output: Node, tile_size: Vec<usize>) -> Self {
        Self {
            app_name: app_name.into(),
            iterate: default_iterate(),
            border: BorderPolicy::default(),
            tile_size,
            unroll_factor: default_unroll_factor(),
            dram_bank: default_dram_bank(),
            dram_separate: false,
            burst_width: default_burst_width(),
            extra_params: BTreeSet::new(),
            input,
            output,
            intermediates: Vec::new(),
        }
    }

    pub fn with_intermediate(mut self, node: Node) -> Self {
        self.intermediates.push(node);
        self
    }

    pub fn with_iterate(mut self, iterate: u32, border: BorderPolicy) -> Self {
        self.iterate = iterate;
        self.border = border;
        self
    }

    pub fn with_extra_param(mut self, name: impl Into<String>) -> Self {
        self.extra_params.insert(name.into());
        self
    }

    pub fn from_json(json: &str) -> CompileResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CompileError::semantic(format!("invalid stencil description: {}", e)))
    }

    /// Number of spatial dimensions
    pub fn dim(&self) -> usize {
        self.tile_size.len()
    }

    pub fn preserve_border(&self) -> bool {
        self.border == BorderPolicy::Preserve
    }

    /// DRAM banks available in each direction
    pub fn effective_dram_bank(&self) -> usize {
        if self.dram_separate {
            self.dram_bank / 2
        } else {
            self.dram_bank
        }
    }

    /// Check the global parameters; node-level checks happen in the builder.
    pub fn validate(&self) -> CompileResult<()> {
        if self.iterate < 1 {
            return Err(CompileError::semantic(format!(
                "cannot iterate {} times",
                self.iterate
            )));
        }
        if self.tile_size.is_empty() {
            return Err(CompileError::semantic("tile size must have at least one dimension"));
        }
        if let Some(d) = self.tile_size.iter().position(|&t| t == 0) {
            return Err(CompileError::semantic(format!(
                "tile size of dimension {} must be positive",
                d
            )));
        }
        if self.unroll_factor == 0 {
            return Err(CompileError::semantic("unroll factor must be positive"));
        }
        if self.dram_bank == 0 {
            return Err(CompileError::semantic("number of DRAM banks must be positive"));
        }
        if self.dram_separate && self.dram_bank % 2 != 0 {
            return Err(CompileError::semantic(format!(
                "number of DRAM banks has to be even when separated, got {}",
                self.dram_bank
            )));
        }
        if self.iterate > 1 {
            if self.input.ty != self.output.ty {
                return Err(CompileError::semantic(format!(
                    "input must have the same type as output if iterate > 1 times, \
                     current input has type {} but output has type {}",
                    self.input.ty, self.output.ty
                )));
            }
            if self.input.chan != self.output.chan {
                return Err(CompileError::semantic(format!(
                    "input must have the same number of channels as output if iterate > 1 times, \
                     current input has {} channels but output has {} channels",
                    self.input.chan, self.output.chan
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ElemType, Expr};

    fn config() -> StencilConfig {
        let input = Node::new("I", ElemType::Float, 1);
        let output = Node::new("O", ElemType::Float, 1).with_expr(vec![0], Expr::load("I", vec![0]));
        StencilConfig::new("copy", input, output, vec![16])
    }

    #[test]
    fn test_defaults_valid() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.dim(), 1);
        assert_eq!(config.effective_dram_bank(), 1);
        assert!(!config.preserve_border());
    }

    #[test]
    fn test_zero_iterations() {
        let config = config().with_iterate(0, BorderPolicy::None);
        assert!(config.validate().unwrap_err().is_semantic());
    }

    #[test]
    fn test_dram_separate_odd() {
        let mut config = config();
        config.dram_bank = 3;
        config.dram_separate = true;
        assert!(config.validate().is_err());

        config.dram_bank = 4;
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_dram_bank(), 2);
    }

    #[test]
    fn test_iterate_type_mismatch() {
        let mut config = config().with_iterate(2, BorderPolicy::Preserve);
        config.output.ty = ElemType::Double;
        let err = config.validate().unwrap_err();
        assert!(err.message().contains("same type"));
    }

    #[test]
    fn test_iterate_chan_mismatch() {
        let mut config = config().with_iterate(3, BorderPolicy::None);
        config.output.chan = 2;
        let err = config.validate().unwrap_err();
        assert!(err.message().contains("channels"));
    }

    #[test]
    fn test_empty_tile() {
        let mut config = config();
        config.tile_size.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_border_policy_from_str() {
        assert_eq!("Preserve".parse::<BorderPolicy>(), Ok(BorderPolicy::Preserve));
        assert_eq!("none".parse::<BorderPolicy>(), Ok(BorderPolicy::None));
        assert!("wrap".parse::<BorderPolicy>().is_err());
    }

    #[test]
    fn test_from_json_defaults() {
        let json = r#"{
            "app_name": "copy",
            "tile_size": [32, 32],
            "input": {"name": "I", "type": "uint8"},
            "output": {"name": "O", "type": "uint8", "exprs": [
                {"idx": [0, 0], "expr": {"kind": "load", "name": "I", "idx": [0, 0]}}
            ]}
        }"#;
        let config = StencilConfig::from_json(json).unwrap();
        assert_eq!(config.iterate, 1);
        assert_eq!(config.border, BorderPolicy::None);
        assert_eq!(config.burst_width, 512);
        assert!(config.intermediates.is_empty());
    }
}
