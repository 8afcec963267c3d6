//! # Interpreter
//!
//! Recursive-descent evaluator over the whitelisted `Expr` AST. Every node entry
//! checks the `ReasonToken` (timeout/cancellation) and the recursion depth bound
//! before doing any work. Tracing is unified behind one evaluator with a
//! `TraceLevel` parameter rather than several overlapping evaluators.

pub mod cache;
pub mod limits;
pub mod timeout;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::ast::{BinOp, BoolOpKind, CompareOp, Expr, UnaryOp};
use crate::error::{EvaluationError, SecurityError};
use crate::registry::{CallError, Registry};
use crate::value::Value;

use cache::ParseCache;
use limits::EngineLimits;
use timeout::ReasonToken;

/// Facts read during one evaluation, collected for tracing and for the field
/// extractor's dynamic cross-check.
pub type FieldReads = HashSet<String>;

/// A single step of an evaluation trace tree, with parent/child links recording
/// operation, expression text, result, details, and elapsed time.
#[derive(Debug, Clone)]
pub struct Step {
    pub operation: String,
    pub expression_text: String,
    pub result: Option<Value>,
    pub details: String,
    pub elapsed_ms: f64,
    pub children: Vec<Step>,
}

/// Anything a fact lookup might be backed by. The interpreter only needs read access
/// to the enriched fact map; `crate::context::ExecutionContext` is the concrete
/// owner used by the engine, but tests can hand the interpreter any implementor.
pub trait FactReader {
    fn get(&self, name: &str) -> Option<Value>;
}

impl FactReader for std::collections::BTreeMap<String, Value> {
    fn get(&self, name: &str) -> Option<Value> {
        std::collections::BTreeMap::get(self, name).cloned()
    }
}

pub struct Interpreter {
    limits: Arc<EngineLimits>,
    registry: Arc<Registry>,
    cache: ParseCache,
}

impl Interpreter {
    pub fn new(limits: Arc<EngineLimits>, registry: Arc<Registry>) -> Self {
        let cache_size = limits.expression_cache_size;
        Self {
            limits,
            registry,
            cache: ParseCache::new(cache_size),
        }
    }

    pub fn cache_stats(&self) -> cache::CacheStats {
        self.cache.stats()
    }

    /// Parses `source`, using and populating the LRU cache, enforcing the
    /// max-expression-length bound before attempting to parse at all.
    pub fn parse(&self, source: &str) -> Result<Expr, ParseOutcome> {
        if source.len() > self.limits.max_expression_length {
            return Err(ParseOutcome::Security(SecurityError::ExpressionTooLong {
                actual: source.len(),
                limit: self.limits.max_expression_length,
            }));
        }
        if let Some(expr) = self.cache.get(source) {
            return Ok(expr);
        }
        let expr = crate::parser::parse_expression(source).map_err(ParseOutcome::Parse)?;
        self.cache.insert(source.to_string(), expr.clone());
        Ok(expr)
    }

    pub fn evaluate(
        &self,
        expr: &Expr,
        source: &str,
        facts: &dyn FactReader,
        token: &ReasonToken,
    ) -> Result<(Value, FieldReads), EvalOutcome> {
        let mut reads = FieldReads::new();
        let value = self.eval_node(expr, source, facts, token, 0, &mut reads)?;
        Ok((value, reads))
    }

    pub fn evaluate_bool(
        &self,
        expr: &Expr,
        source: &str,
        facts: &dyn FactReader,
        token: &ReasonToken,
    ) -> Result<(bool, FieldReads), EvalOutcome> {
        let (value, reads) = self.evaluate(expr, source, facts, token)?;
        Ok((value.is_truthy(), reads))
    }

    /// Same as `evaluate` but builds a `Step` tree alongside; used only at
    /// `TraceLevel::Debug`.
    pub fn evaluate_with_trace(
        &self,
        expr: &Expr,
        source: &str,
        facts: &dyn FactReader,
        token: &ReasonToken,
    ) -> Result<(Value, FieldReads, Step), EvalOutcome> {
        let mut reads = FieldReads::new();
        let mut step = Step {
            operation: expr.node_kind().to_string(),
            expression_text: source.to_string(),
            result: None,
            details: String::new(),
            elapsed_ms: 0.0,
            children: Vec::new(),
        };
        let value = self.eval_node_traced(expr, source, facts, token, 0, &mut reads, &mut step)?;
        step.result = Some(value.clone());
        Ok((value, reads, step))
    }

    fn check_bounds(&self, depth: usize, token: &ReasonToken) -> Result<(), EvalOutcome> {
        if depth > self.limits.max_recursion_depth {
            return Err(EvalOutcome::Security(SecurityError::RecursionTooDeep {
                actual: depth,
                limit: self.limits.max_recursion_depth,
            }));
        }
        if let Err(reason) = token.check() {
            return Err(match reason {
                timeout::TimeoutReason::Elapsed { limit_ms, elapsed_ms } => {
                    EvalOutcome::Security(SecurityError::Timeout { limit_ms, elapsed_ms })
                }
                timeout::TimeoutReason::Cancelled => EvalOutcome::Security(SecurityError::Cancelled),
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn eval_node(
        &self,
        expr: &Expr,
        source: &str,
        facts: &dyn FactReader,
        token: &ReasonToken,
        depth: usize,
        reads: &mut FieldReads,
    ) -> Result<Value, EvalOutcome> {
        self.check_bounds(depth, token)?;
        let depth = depth + 1;

        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Name(name) => {
                reads.insert(name.clone());
                Ok(facts.get(name).unwrap_or(Value::Null))
            }
            Expr::UnaryOp { op, operand } => {
                let v = self.eval_node(operand, source, facts, token, depth, reads)?;
                eval_unary(*op, v, source)
            }
            Expr::BinOp { op, left, right } => {
                let l = self.eval_node(left, source, facts, token, depth, reads)?;
                let r = self.eval_node(right, source, facts, token, depth, reads)?;
                eval_binop(*op, l, r, source, self.limits.max_pow_exponent)
            }
            Expr::BoolOp { op, values } => {
                let mut last = Value::Bool(matches!(op, BoolOpKind::And));
                for v in values {
                    last = self.eval_node(v, source, facts, token, depth, reads)?;
                    match op {
                        BoolOpKind::And if !last.is_truthy() => return Ok(last),
                        BoolOpKind::Or if last.is_truthy() => return Ok(last),
                        _ => {}
                    }
                }
                Ok(last)
            }
            Expr::Compare { left, ops, comparators } => {
                let mut left_val = self.eval_node(left, source, facts, token, depth, reads)?;
                for (op, comparator) in ops.iter().zip(comparators.iter()) {
                    let right_val = self.eval_node(comparator, source, facts, token, depth, reads)?;
                    let ok = eval_compare(*op, &left_val, &right_val, source)?;
                    if !ok {
                        return Ok(Value::Bool(false));
                    }
                    left_val = right_val;
                }
                Ok(Value::Bool(true))
            }
            Expr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval_node(a, source, facts, token, depth, reads)?);
                }
                self.registry
                    .call(name, values, source)
                    .map_err(EvalOutcome::from)
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_node(item, source, facts, token, depth, reads)?);
                }
                Ok(Value::List(out))
            }
            Expr::Subscript { value, index } => {
                let v = self.eval_node(value, source, facts, token, depth, reads)?;
                let i = self.eval_node(index, source, facts, token, depth, reads)?;
                eval_subscript(v, i, source)
            }
            Expr::IfExp { test, body, orelse } => {
                let t = self.eval_node(test, source, facts, token, depth, reads)?;
                if t.is_truthy() {
                    self.eval_node(body, source, facts, token, depth, reads)
                } else {
                    self.eval_node(orelse, source, facts, token, depth, reads)
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_node_traced(
        &self,
        expr: &Expr,
        source: &str,
        facts: &dyn FactReader,
        token: &ReasonToken,
        depth: usize,
        reads: &mut FieldReads,
        step: &mut Step,
    ) -> Result<Value, EvalOutcome> {
        let start = Instant::now();
        // Children steps are only meaningful for composite nodes; leaves still get a
        // timing entry via the parent's elapsed_ms field.
        let value = match expr {
            Expr::BoolOp { op, values } => {
                let mut last = Value::Bool(matches!(op, BoolOpKind::And));
                for v in values {
                    let mut child = Step {
                        operation: v.node_kind().to_string(),
                        expression_text: source.to_string(),
                        result: None,
                        details: String::new(),
                        elapsed_ms: 0.0,
                        children: Vec::new(),
                    };
                    last = self.eval_node_traced(v, source, facts, token, depth, reads, &mut child)?;
                    child.result = Some(last.clone());
                    step.children.push(child);
                    match op {
                        BoolOpKind::And if !last.is_truthy() => break,
                        BoolOpKind::Or if last.is_truthy() => break,
                        _ => {}
                    }
                }
                last
            }
            _ => self.eval_node(expr, source, facts, token, depth, reads)?,
        };
        step.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        Ok(value)
    }
}

fn eval_unary(op: UnaryOp, v: Value, source: &str) -> Result<Value, EvalOutcome> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
        UnaryOp::Plus => match v {
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Float(f) => Ok(Value::Float(f)),
            other => Err(type_mismatch("unary +", &other, &other, source)),
        },
        UnaryOp::Minus => match v {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(type_mismatch("unary -", &other, &other, source)),
        },
    }
}

fn eval_binop(op: BinOp, l: Value, r: Value, source: &str, max_pow_exponent: i64) -> Result<Value, EvalOutcome> {
    if !l.is_numeric() || !r.is_numeric() {
        return Err(type_mismatch(binop_name(op), &l, &r, source));
    }
    let both_int = matches!((&l, &r), (Value::Int(_), Value::Int(_)));
    let (lf, rf) = (l.as_f64().unwrap(), r.as_f64().unwrap());

    match op {
        BinOp::Add => Ok(numeric_result(both_int, lf + rf, l, r, i64::wrapping_add)),
        BinOp::Sub => Ok(numeric_result(both_int, lf - rf, l, r, i64::wrapping_sub)),
        BinOp::Mul => Ok(numeric_result(both_int, lf * rf, l, r, i64::wrapping_mul)),
        BinOp::Div => {
            if rf == 0.0 {
                return Err(EvalOutcome::Evaluation(EvaluationError::DivisionByZero {
                    expression: source.to_string(),
                }));
            }
            Ok(Value::Float(lf / rf))
        }
        BinOp::Mod => {
            if rf == 0.0 {
                return Err(EvalOutcome::Evaluation(EvaluationError::ModuloByZero {
                    expression: source.to_string(),
                }));
            }
            Ok(numeric_result(both_int, python_mod_f64(lf, rf), l, r, python_mod_i64))
        }
        BinOp::Pow => {
            if let Value::Int(exp) = r {
                if exp.unsigned_abs() > max_pow_exponent as u64 {
                    return Err(EvalOutcome::Security(SecurityError::PowExponentTooLarge {
                        actual: exp.unsigned_abs(),
                        limit: max_pow_exponent as u64,
                    }));
                }
            }
            let result = lf.powf(rf);
            Ok(if both_int && rf >= 0.0 {
                Value::Int(result as i64)
            } else {
                Value::Float(result)
            })
        }
    }
}

/// `%` follows the sign of the divisor, matching Python's `left % right` rather than
/// Rust's truncating `%` (e.g. `-7 % 3 == 2`, `7 % -3 == -2`).
fn python_mod_i64(a: i64, b: i64) -> i64 {
    ((a % b) + b) % b
}

fn python_mod_f64(a: f64, b: f64) -> f64 {
    ((a % b) + b) % b
}

fn numeric_result(both_int: bool, float_result: f64, l: Value, r: Value, int_op: fn(i64, i64) -> i64) -> Value {
    if both_int {
        if let (Value::Int(a), Value::Int(b)) = (l, r) {
            return Value::Int(int_op(a, b));
        }
    }
    Value::Float(float_result)
}

fn binop_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    }
}

fn eval_compare(op: CompareOp, l: &Value, r: &Value, source: &str) -> Result<bool, EvalOutcome> {
    use CompareOp::*;
    match op {
        Eq => Ok(l == r),
        Ne => Ok(l != r),
        Is => Ok(matches!((l, r), (Value::Null, Value::Null)) || l == r),
        IsNot => Ok(!(matches!((l, r), (Value::Null, Value::Null)) || l == r)),
        Lt | Le | Gt | Ge => {
            let ord = l.partial_cmp(r).ok_or_else(|| {
                EvalOutcome::Evaluation(EvaluationError::Incomparable {
                    expression: source.to_string(),
                })
            })?;
            Ok(match op {
                Lt => ord.is_lt(),
                Le => ord.is_le(),
                Gt => ord.is_gt(),
                Ge => ord.is_ge(),
                _ => unreachable!(),
            })
        }
        In | NotIn => {
            let container = r.as_container().ok_or_else(|| {
                EvalOutcome::Evaluation(EvaluationError::NotAContainer {
                    expression: source.to_string(),
                })
            })?;
            let found = container.contains(l);
            Ok(if matches!(op, In) { found } else { !found })
        }
    }
}

fn eval_subscript(value: Value, index: Value, source: &str) -> Result<Value, EvalOutcome> {
    match value {
        Value::List(items) => {
            let i = match index {
                Value::Int(i) => i,
                other => return Err(type_mismatch("subscript", &other, &other, source)),
            };
            let len = items.len();
            let idx = if i < 0 { i + len as i64 } else { i };
            if idx >= 0 && (idx as usize) < len {
                Ok(items[idx as usize].clone())
            } else {
                Err(EvalOutcome::Evaluation(EvaluationError::IndexOutOfRange {
                    index: i.to_string(),
                    len,
                    expression: source.to_string(),
                }))
            }
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = match index {
                Value::Int(i) => i,
                other => return Err(type_mismatch("subscript", &other, &other, source)),
            };
            let len = chars.len();
            let idx = if i < 0 { i + len as i64 } else { i };
            if idx >= 0 && (idx as usize) < len {
                Ok(Value::String(chars[idx as usize].to_string()))
            } else {
                Err(EvalOutcome::Evaluation(EvaluationError::IndexOutOfRange {
                    index: i.to_string(),
                    len,
                    expression: source.to_string(),
                }))
            }
        }
        Value::Mapping(m) => match index {
            Value::String(key) => m.get(&key).cloned().ok_or_else(|| {
                EvalOutcome::Evaluation(EvaluationError::KeyNotFound {
                    key,
                    expression: source.to_string(),
                })
            }),
            other => Err(type_mismatch("subscript", &other, &other, source)),
        },
        other => Err(type_mismatch("subscript", &other, &other, source)),
    }
}

fn type_mismatch(op: &str, l: &Value, r: &Value, source: &str) -> EvalOutcome {
    EvalOutcome::Evaluation(EvaluationError::TypeMismatch {
        op: op.to_string(),
        lhs_type: l.type_name().to_string(),
        rhs_type: r.type_name().to_string(),
        expression: source.to_string(),
    })
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseOutcome {
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error(transparent)]
    Parse(#[from] crate::error::ParseError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalOutcome {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error(transparent)]
    Function(#[from] crate::error::FunctionError),
}

impl From<CallError> for EvalOutcome {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Evaluation(e) => EvalOutcome::Evaluation(e),
            CallError::Function(e) => EvalOutcome::Function(e),
        }
    }
}
