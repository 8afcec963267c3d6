//! # Error Taxonomy
//!
//! One `thiserror` enum per propagation boundary, matching the kinds enumerated in
//! the engine's design notes rather than a single catch-all error type. Each variant
//! that can be attributed to a rule carries the rule id; evaluation-time variants also
//! carry the offending expression source and the field bindings observed so far, so a
//! caller never has to re-derive "what was being evaluated when this failed".

use std::fmt;

use crate::value::Value;

/// Bindings observed up to the point of failure, attached to evaluation errors for
/// explainability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldBindings(pub Vec<(String, Value)>);

impl fmt::Display for FieldBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Failures raised while loading rule sources (files, directories, raw strings).
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("rule source not found: {0}")]
    NotFound(String),
    #[error("failed to read rule source {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// YAML surface-shape violations: unknown keys, wrong types, missing required fields.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SchemaError {
    #[error("top-level `rules` key is required and must be a non-empty list")]
    MissingRules,
    #[error("rule at index {index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },
    #[error("rule `{rule_id}` has unknown key `{key}`")]
    UnknownRuleKey { rule_id: String, key: String },
    #[error("unknown top-level key `{0}`")]
    UnknownTopLevelKey(String),
    #[error("rule `{rule_id}` field `{field}` has the wrong type: expected {expected}")]
    WrongType {
        rule_id: String,
        field: &'static str,
        expected: &'static str,
    },
}

/// Semantic rule-set issues found after parsing but before execution.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("duplicate rule id `{0}`")]
    DuplicateRuleId(String),
    #[error("`{0}` is a reserved keyword and cannot be used as a rule id")]
    ReservedRuleId(String),
    #[error("rule `{rule_id}` writes reserved keyword `{key}` via actions/facts")]
    ReservedActionKey { rule_id: String, key: String },
    #[error("rule `{rule_id}` triggers unknown rule `{target}`")]
    UnknownTrigger { rule_id: String, target: String },
    #[error("rule `{0}` triggers itself")]
    SelfTrigger(String),
    #[error("cycle detected in triggers graph involving rule `{0}`")]
    CyclicTriggers(String),
    #[error("rule `{rule_id}` condition failed to compile: {source}")]
    BadCondition {
        rule_id: String,
        #[source]
        source: CompilationError,
    },
    #[error("rule `{rule_id}` action `{key}` failed to compile: {source}")]
    BadAction {
        rule_id: String,
        key: String,
        #[source]
        source: ParseError,
    },
    #[error("registering function `{0}` failed: name is a reserved keyword")]
    ReservedFunctionName(String),
    #[error("registering function `{0}` failed: not a legal identifier")]
    IllegalFunctionName(String),
    #[error("registering function `{0}` failed: purity cannot be proven; pass allow_unsafe")]
    UnprovenPurity(String),
}

/// The structured-condition compiler rejected a combinator shape.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CompilationError {
    #[error("combinator `{0}` requires a list body")]
    CombinatorNotAList(String),
    #[error("combinator `{0}` has an empty body")]
    EmptyCombinatorBody(String),
    #[error("unknown combinator key(s): {0:?}")]
    UnknownCombinator(Vec<String>),
    #[error("`not` takes a single condition, not a list; lists are only valid directly under `all`/`any`")]
    NotArity,
}

/// Expression text failed to parse into an AST.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[error("failed to parse expression `{source_text}`: {message}")]
pub struct ParseError {
    pub source_text: String,
    pub message: String,
}

/// A bound enforced by `EngineLimits` was violated.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SecurityError {
    #[error("expression length {actual} exceeds limit {limit}")]
    ExpressionTooLong { actual: usize, limit: usize },
    #[error("recursion depth {actual} exceeds limit {limit}")]
    RecursionTooDeep { actual: usize, limit: usize },
    #[error("node type `{0}` is not in the expression whitelist")]
    DisallowedNode(String),
    #[error("`**` exponent magnitude {actual} exceeds limit {limit}")]
    PowExponentTooLarge { actual: u64, limit: u64 },
    #[error("evaluation exceeded {limit_ms}ms (ran {elapsed_ms}ms)")]
    Timeout { limit_ms: u64, elapsed_ms: u64 },
    #[error("oracle cost ceiling of {ceiling} exceeded for this run")]
    OracleCostCeiling { ceiling: f64 },
    #[error("evaluation was cancelled")]
    Cancelled,
}

/// A well-formed expression failed at runtime.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum EvaluationError {
    #[error("type mismatch in `{op}`: {lhs_type} vs {rhs_type} (in `{expression}`)")]
    TypeMismatch {
        op: String,
        lhs_type: String,
        rhs_type: String,
        expression: String,
    },
    #[error("division by zero (in `{expression}`)")]
    DivisionByZero { expression: String },
    #[error("modulo by zero (in `{expression}`)")]
    ModuloByZero { expression: String },
    #[error("unknown function `{name}` (in `{expression}`)")]
    UnknownFunction { name: String, expression: String },
    #[error("subscript index {index} out of range for length {len} (in `{expression}`)")]
    IndexOutOfRange {
        index: String,
        len: usize,
        expression: String,
    },
    #[error("comparison on non-comparable types (in `{expression}`)")]
    Incomparable { expression: String },
    #[error("`in`/`not in` requires a container right-hand side (in `{expression}`)")]
    NotAContainer { expression: String },
    #[error("key `{key}` not found in mapping (in `{expression}`)")]
    KeyNotFound { key: String, expression: String },
}

impl EvaluationError {
    /// Which field the error most likely stems from, used by the fallback evaluator
    /// to build its enhanced oracle prompt. Best-effort: not every variant names one.
    pub fn offending_field(&self) -> Option<&str> {
        None
    }
}

/// A user-registered function raised during a call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("function `{name}` raised with args {args:?}: {message}")]
pub struct FunctionError {
    pub name: String,
    pub args: Vec<Value>,
    pub message: String,
}

/// The oracle transport failed or timed out during fallback.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("oracle call timed out after {0}ms")]
    Timeout(u64),
    #[error("oracle transport error: {0}")]
    Transport(String),
    #[error("oracle response could not be coerced to the requested type")]
    Uncoercible,
}

/// The run was cancelled via a `CancelHandle`.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("run was cancelled")]
pub struct CancelledError;

/// Top-level error surface for the public API, aggregating every boundary above.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Compilation(#[from] CompilationError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error(transparent)]
    Cancelled(#[from] CancelledError),
}
