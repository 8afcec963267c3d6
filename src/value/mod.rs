//! # Value Type System
//!
//! Tagged union over the value set the interpreter operates on: `Null`, `Bool`, `Int`,
//! `Float`, `String`, `List`, and `Mapping`. Equality and ordering follow numeric
//! promotion (`Int` compares with `Float` by widening); `String` compares lexically;
//! `Null` is equal only to `Null`; ordering across unrelated type classes (e.g. `Bool`
//! vs `String`) is undefined and surfaces as an `EvaluationError` rather than an
//! arbitrary ordering.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A fact or expression-evaluation value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    /// Kept as a `BTreeMap` so two mappings with the same entries serialize and
    /// compare identically regardless of insertion order.
    Mapping(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Mapping(_) => "mapping",
        }
    }

    /// Truthiness used by `Not`, `BoolOp`, and `IfExp`: `Null`, `0`, `0.0`, `""`, and
    /// empty lists/mappings are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Mapping(m) => !m.is_empty(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_container(&self) -> Option<ContainerRef<'_>> {
        match self {
            Value::List(items) => Some(ContainerRef::List(items)),
            Value::String(s) => Some(ContainerRef::Str(s)),
            Value::Mapping(m) => Some(ContainerRef::Mapping(m)),
            _ => None,
        }
    }
}

pub enum ContainerRef<'a> {
    List(&'a [Value]),
    Str(&'a str),
    Mapping(&'a BTreeMap<String, Value>),
}

impl ContainerRef<'_> {
    /// Membership test for `in` / `not in`.
    pub fn contains(&self, needle: &Value) -> bool {
        match self {
            ContainerRef::List(items) => items.iter().any(|v| v == needle),
            ContainerRef::Str(s) => match needle {
                Value::String(n) => s.contains(n.as_str()),
                _ => false,
            },
            ContainerRef::Mapping(m) => match needle {
                Value::String(k) => m.contains_key(k),
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Mapping(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Numeric-promoted, type-class-bounded equality. Cross-class equality (e.g.
/// `Bool(true) == Int(1)`) is always `false`: `Null` is equal only to `Null`, and
/// ordering across type classes is undefined, a rule extended here to equality too.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Mapping(a), Value::Mapping(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Partial ordering with numeric promotion; `None` for cross-class comparisons, which
/// callers turn into `EvaluationError::Incomparable`.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_promotion_equality() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Float(2.5));
    }

    #[test]
    fn null_equals_only_null() {
        assert_eq!(Value::Null, Value::Null);
        assert_ne!(Value::Null, Value::Bool(false));
        assert_ne!(Value::Null, Value::Int(0));
    }

    #[test]
    fn cross_class_ordering_is_none() {
        assert_eq!(Value::Bool(true).partial_cmp(&Value::Int(1)), None);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::Int(1).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
    }

    #[test]
    fn container_contains() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let c = list.as_container().unwrap();
        assert!(c.contains(&Value::Int(1)));
        assert!(!c.contains(&Value::Int(3)));

        let s = Value::String("hello world".into());
        let c = s.as_container().unwrap();
        assert!(c.contains(&Value::String("world".into())));
    }
}
