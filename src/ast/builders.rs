//! Fluent builders for constructing `Expr` trees, particularly useful for tests that
//! want to exercise the interpreter without going through the text parser.
//!
//! ## Example
//!
//! ```rust
//! use rule_reasoner::ast::builders::ExprBuilder;
//!
//! // credit_score > 700 and annual_income >= 50000
//! let expr = ExprBuilder::and(vec![
//!     ExprBuilder::gt(ExprBuilder::name("credit_score"), ExprBuilder::int(700)),
//!     ExprBuilder::ge(ExprBuilder::name("annual_income"), ExprBuilder::int(50000)),
//! ]);
//! ```

use crate::ast::{BinOp, BoolOpKind, CompareOp, Expr, UnaryOp};
use crate::value::Value;

pub struct ExprBuilder;

impl ExprBuilder {
    pub fn name(field: impl Into<String>) -> Expr {
        Expr::Name(field.into())
    }

    pub fn int(v: i64) -> Expr {
        Expr::Literal(Value::Int(v))
    }

    pub fn float(v: f64) -> Expr {
        Expr::Literal(Value::Float(v))
    }

    pub fn str(v: impl Into<String>) -> Expr {
        Expr::Literal(Value::String(v.into()))
    }

    pub fn bool(v: bool) -> Expr {
        Expr::Literal(Value::Bool(v))
    }

    pub fn null() -> Expr {
        Expr::Literal(Value::Null)
    }

    pub fn not(operand: Expr) -> Expr {
        Expr::UnaryOp {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }
    }

    pub fn binop(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(values: Vec<Expr>) -> Expr {
        Expr::BoolOp {
            op: BoolOpKind::And,
            values,
        }
    }

    pub fn or(values: Vec<Expr>) -> Expr {
        Expr::BoolOp {
            op: BoolOpKind::Or,
            values,
        }
    }

    fn compare(op: CompareOp, left: Expr, right: Expr) -> Expr {
        Expr::Compare {
            left: Box::new(left),
            ops: vec![op],
            comparators: vec![right],
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Self::compare(CompareOp::Eq, left, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Expr {
        Self::compare(CompareOp::Gt, left, right)
    }

    pub fn ge(left: Expr, right: Expr) -> Expr {
        Self::compare(CompareOp::Ge, left, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Expr {
        Self::compare(CompareOp::Lt, left, right)
    }

    pub fn le(left: Expr, right: Expr) -> Expr {
        Self::compare(CompareOp::Le, left, right)
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn if_exp(test: Expr, body: Expr, orelse: Expr) -> Expr {
        Expr::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_and() {
        let expr = ExprBuilder::and(vec![
            ExprBuilder::gt(ExprBuilder::name("x"), ExprBuilder::int(0)),
            ExprBuilder::ge(ExprBuilder::name("y"), ExprBuilder::int(1)),
        ]);
        match expr {
            Expr::BoolOp { op: BoolOpKind::And, values } => assert_eq!(values.len(), 2),
            _ => panic!("expected BoolOp::And"),
        }
    }
}
