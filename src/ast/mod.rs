//! # Expression AST
//!
//! A whitelisted sum type over the expression nodes the interpreter is willing to
//! evaluate. Any node outside this enum cannot be constructed by the parser, so the
//! "node whitelist" bound from the design notes is enforced structurally rather than
//! by a runtime check — the one exception is the parse cache (see
//! `crate::interpreter::cache`), which re-validates cached nodes defensively since a
//! future cache format change could smuggle one in.

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

/// Expression AST node. Boxed recursive fields keep `Expr` a fixed, small size despite
/// unbounded nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    Name(String),
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expr>,
    },
    /// Chainable comparison: `a < b <= c` is `Compare{left: a, ops: [Lt, Le],
    /// comparators: [b, c]}`.
    Compare {
        left: Box<Expr>,
        ops: Vec<CompareOp>,
        comparators: Vec<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    List(Vec<Expr>),
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
}

impl Expr {
    /// Node-kind name, used in `SecurityError::DisallowedNode` messages and trace
    /// step labels. Every `Expr` variant is itself whitelisted by construction, so
    /// this is informational, not a gate.
    pub fn node_kind(&self) -> &'static str {
        match self {
            Expr::Literal(_) => "Literal",
            Expr::Name(_) => "Name",
            Expr::UnaryOp { .. } => "UnaryOp",
            Expr::BinOp { .. } => "BinOp",
            Expr::BoolOp { .. } => "BoolOp",
            Expr::Compare { .. } => "Compare",
            Expr::Call { .. } => "Call",
            Expr::List(_) => "List",
            Expr::Subscript { .. } => "Subscript",
            Expr::IfExp { .. } => "IfExp",
        }
    }
}

pub mod builders;
pub mod reserved;
