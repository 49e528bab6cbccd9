//! Normalized AST nodes consumed by the graph builder
//!
//! The front end hands over one [`Node`] per buffer of the stencil program.
//! Every node stores to a single, uniform index and reads other buffers
//! through [`Expr::Load`] expressions at relative multidimensional offsets.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};

/// A relative multidimensional offset
pub type Point = Vec<i64>;

/// Element type of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElemType {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
}

impl ElemType {
    /// Width of one element in bits
    pub fn width(self) -> usize {
        match self {
            ElemType::Uint8 | ElemType::Int8 => 8,
            ElemType::Uint16 | ElemType::Int16 => 16,
            ElemType::Uint32 | ElemType::Int32 | ElemType::Float => 32,
            ElemType::Uint64 | ElemType::Int64 | ElemType::Double => 64,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElemType::Float | ElemType::Double)
    }

    /// Name of the matching C type in generated kernels
    pub fn c_type(self) -> &'static str {
        match self {
            ElemType::Uint8 => "uint8_t",
            ElemType::Uint16 => "uint16_t",
            ElemType::Uint32 => "uint32_t",
            ElemType::Uint64 => "uint64_t",
            ElemType::Int8 => "int8_t",
            ElemType::Int16 => "int16_t",
            ElemType::Int32 => "int32_t",
            ElemType::Int64 => "int64_t",
            ElemType::Float => "float",
            ElemType::Double => "double",
        }
    }
}

impl std::fmt::Display for ElemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElemType::Uint8 => "uint8",
            ElemType::Uint16 => "uint16",
            ElemType::Uint32 => "uint32",
            ElemType::Uint64 => "uint64",
            ElemType::Int8 => "int8",
            ElemType::Int16 => "int16",
            ElemType::Int32 => "int32",
            ElemType::Int64 => "int64",
            ElemType::Float => "float",
            ElemType::Double => "double",
        };
        write!(f, "{}", name)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "-")]
    Neg,
    #[serde(rename = "!")]
    Not,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Rem,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Expression tree of a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// Read of `name` at a relative index: `name(i, j)`
    Load { name: String, idx: Point },

    /// Numeric literal
    Const { value: f64 },

    Unary { op: UnaryOp, operand: Box<Expr> },

    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// Intrinsic call such as `sqrt(x)` or `max(a, b)`
    Call { func: String, args: Vec<Expr> },
}

impl Expr {
    pub fn load(name: impl Into<String>, idx: impl Into<Point>) -> Self {
        Expr::Load {
            name: name.into(),
            idx: idx.into(),
        }
    }

    pub fn constant(value: f64) -> Self {
        Expr::Const { value }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Left-folded sum of the given terms; `None` for an empty iterator
    pub fn sum(terms: impl IntoIterator<Item = Expr>) -> Option<Self> {
        terms
            .into_iter()
            .reduce(|acc, term| Expr::binary(BinaryOp::Add, acc, term))
    }

    /// Call `f` with the name and index of every load, in source order
    pub fn visit_loads<'a>(&'a self, f: &mut impl FnMut(&'a str, &'a [i64])) {
        match self {
            Expr::Load { name, idx } => f(name.as_str(), idx.as_slice()),
            Expr::Const { .. } => {}
            Expr::Unary { operand, .. } => operand.visit_loads(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit_loads(f);
                rhs.visit_loads(f);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.visit_loads(f);
                }
            }
        }
    }

    /// Rewrite the buffer name of every load
    pub fn rename_loads(&mut self, rename: &impl Fn(&str) -> String) {
        match self {
            Expr::Load { name, .. } => *name = rename(name.as_str()),
            Expr::Const { .. } => {}
            Expr::Unary { operand, .. } => operand.rename_loads(rename),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.rename_loads(rename);
                rhs.rename_loads(rename);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.rename_loads(rename);
                }
            }
        }
    }
}

fn fmt_index(f: &mut std::fmt::Formatter<'_>, idx: &[i64]) -> std::fmt::Result {
    write!(f, "(")?;
    for (i, v) in idx.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", v)?;
    }
    write!(f, ")")
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Load { name, idx } => {
                write!(f, "{}", name)?;
                fmt_index(f, idx)
            }
            Expr::Const { value } => write!(f, "{}", value),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => write!(f, "-({})", operand),
                UnaryOp::Not => write!(f, "!({})", operand),
            },
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Call { func, args } => {
                write!(f, "{}(", func)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// One defining expression of a node: `name[chan](idx) = expr`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreExpr {
    pub idx: Point,
    pub expr: Expr,
}

impl StoreExpr {
    pub fn new(idx: impl Into<Point>, expr: Expr) -> Self {
        Self {
            idx: idx.into(),
            expr,
        }
    }
}

fn default_chan() -> usize {
    1
}

/// A normalized input, intermediate or output node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ElemType,
    #[serde(default = "default_chan")]
    pub chan: usize,
    /// One store per channel; empty for the input node
    #[serde(default)]
    pub exprs: Vec<StoreExpr>,
    /// Buffer whose border values must be retained into this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_border: Option<String>,
}

impl Node {
    pub fn new(name: impl Into<String>, ty: ElemType, chan: usize) -> Self {
        Self {
            name: name.into(),
            ty,
            chan,
            exprs: Vec::new(),
            preserve_border: None,
        }
    }

    /// Append a defining expression
    pub fn with_expr(mut self, idx: impl Into<Point>, expr: Expr) -> Self {
        self.exprs.push(StoreExpr::new(idx, expr));
        self
    }

    /// The uniform store index shared by all defining expressions.
    ///
    /// Returns `None` for a node without expressions (the input node).
    pub fn store_index(&self) -> CompileResult<Option<&[i64]>> {
        let mut stores = self.exprs.iter().map(|e| e.idx.as_slice());
        let first = match stores.next() {
            Some(idx) => idx,
            None => return Ok(None),
        };
        if let Some(other) = stores.find(|idx| *idx != first) {
            return Err(CompileError::semantic(format!(
                "node {} stores to non-uniform indices {:?} and {:?}",
                self.name, first, other
            )));
        }
        Ok(Some(first))
    }

    /// All `(name, idx)` loads of all defining expressions
    pub fn loads(&self) -> Vec<(&str, &[i64])> {
        let mut loads = Vec::new();
        for store in &self.exprs {
            store.expr.visit_loads(&mut |name, idx| loads.push((name, idx)));
        }
        loads
    }

    pub fn rename_loads(&mut self, rename: &impl Fn(&str) -> String) {
        for store in &mut self.exprs {
            store.expr.rename_loads(rename);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blur(name: &str, from: &str) -> Node {
        let sum = Expr::sum((-1..=1).map(|d| Expr::load(from, vec![d]))).unwrap();
        Node::new(name, ElemType::Float, 1).with_expr(
            vec![0],
            Expr::binary(BinaryOp::Div, sum, Expr::constant(3.0)),
        )
    }

    #[test]
    fn test_loads_in_source_order() {
        let node = blur("B", "A");
        let loads = node.loads();
        assert_eq!(
            loads,
            vec![("A", &[-1][..]), ("A", &[0][..]), ("A", &[1][..])]
        );
    }

    #[test]
    fn test_store_index_uniform() {
        let node = blur("B", "A").with_expr(vec![0], Expr::load("A", vec![0]));
        assert_eq!(node.store_index().unwrap(), Some(&[0][..]));
    }

    #[test]
    fn test_store_index_non_uniform() {
        let node = blur("B", "A").with_expr(vec![1], Expr::load("A", vec![0]));
        let err = node.store_index().unwrap_err();
        assert!(err.is_semantic());
    }

    #[test]
    fn test_store_index_input() {
        let node = Node::new("A", ElemType::Uint16, 1);
        assert_eq!(node.store_index().unwrap(), None);
    }

    #[test]
    fn test_rename_loads() {
        let mut node = blur("B", "A");
        node.rename_loads(&|n: &str| format!("{}_iter1", n));
        assert!(node.loads().iter().all(|(name, _)| *name == "A_iter1"));
    }

    #[test]
    fn test_display() {
        let node = blur("B", "A");
        assert_eq!(
            node.exprs[0].expr.to_string(),
            "(((A(-1) + A(0)) + A(1)) / 3)"
        );
    }

    #[test]
    fn test_elem_type_widths() {
        assert_eq!(ElemType::Uint8.width(), 8);
        assert_eq!(ElemType::Float.width(), 32);
        assert_eq!(ElemType::Double.c_type(), "double");
        assert_eq!(ElemType::Int16.c_type(), "int16_t");
        assert!(ElemType::Float.is_float());
        assert!(!ElemType::Int64.is_float());
    }

    #[test]
    fn test_node_from_json() {
        let json = r#"{
            "name": "B",
            "type": "uint16",
            "exprs": [
                {"idx": [0, 0], "expr": {"kind": "binary", "op": "+",
                    "lhs": {"kind": "load", "name": "A", "idx": [0, -1]},
                    "rhs": {"kind": "load", "name": "A", "idx": [0, 1]}}}
            ]
        }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.ty, ElemType::Uint16);
        assert_eq!(node.chan, 1);
        assert_eq!(node.loads().len(), 2);
        assert_eq!(node.preserve_border, None);
    }
}
