//! # Function Registry
//!
//! Two tiers of callables the interpreter's `Call` node can resolve: always-present
//! built-ins and caller-registered user functions. Held behind a `parking_lot::RwLock`
//! since registration is rare relative to lookups during `reason()`: the registry is
//! treated as read-only during a run, and registration between runs is synchronized.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ast::reserved::{is_legal_identifier, is_reserved, BUILTIN_FUNCTION_NAMES, LANGUAGE_KEYWORDS};
use crate::error::{EvaluationError, FunctionError, ValidationError};
use crate::value::{ContainerRef, Value};

/// A user-registered callable. Takes positional arguments, returns a `Value` or an
/// error message (wrapped into `FunctionError` by the caller, which already knows the
/// function name and argument vector).
pub type UserFunction = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

pub struct Registry {
    user_functions: RwLock<HashMap<String, UserFunction>>,
}

impl Registry {
    pub fn new() -> Self {
        debug_assert!(
            BUILTIN_FUNCTION_NAMES.iter().all(|b| !LANGUAGE_KEYWORDS.contains(b)),
            "builtin function name collides with a language keyword"
        );
        Self {
            user_functions: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a user function. `allow_unsafe` is required for callables whose
    /// purity the caller cannot vouch for. Rust closures carry no purity
    /// introspection, so this crate treats every registration as requiring the flag
    /// unless the caller explicitly asserts purity.
    pub fn register(
        &self,
        name: &str,
        func: UserFunction,
        allow_unsafe: bool,
    ) -> Result<(), ValidationError> {
        if is_reserved(name) {
            return Err(ValidationError::ReservedFunctionName(name.to_string()));
        }
        if !is_legal_identifier(name) {
            return Err(ValidationError::IllegalFunctionName(name.to_string()));
        }
        if !allow_unsafe {
            return Err(ValidationError::UnprovenPurity(name.to_string()));
        }
        self.user_functions.write().insert(name.to_string(), func);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.user_functions.write().remove(name).is_some()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_FUNCTION_NAMES.iter().map(|s| s.to_string()).collect();
        names.extend(self.user_functions.read().keys().cloned());
        names
    }

    pub fn is_known(&self, name: &str) -> bool {
        BUILTIN_FUNCTION_NAMES.contains(&name) || self.user_functions.read().contains_key(name)
    }

    /// Invokes a built-in or user function by name. `expression` is the originating
    /// source text, threaded through purely for error attribution.
    pub fn call(&self, name: &str, args: Vec<Value>, expression: &str) -> Result<Value, CallError> {
        if let Some(value) = call_builtin(name, &args, expression)? {
            return Ok(value);
        }
        let func = {
            let guard = self.user_functions.read();
            guard.get(name).cloned()
        };
        match func {
            Some(f) => f(&args).map_err(|message| {
                CallError::Function(FunctionError {
                    name: name.to_string(),
                    args,
                    message,
                })
            }),
            None => Err(CallError::Evaluation(EvaluationError::UnknownFunction {
                name: name.to_string(),
                expression: expression.to_string(),
            })),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Function(#[from] FunctionError),
}

/// Returns `Ok(None)` when `name` is not a built-in (so the caller falls through to
/// user functions), `Ok(Some(value))` on success, `Err` on a built-in-specific
/// failure (wrong arity, wrong argument type).
fn call_builtin(name: &str, args: &[Value], expression: &str) -> Result<Option<Value>, EvaluationError> {
    let mismatch = |op: &str, lhs: &Value, rhs: &Value| EvaluationError::TypeMismatch {
        op: op.to_string(),
        lhs_type: lhs.type_name().to_string(),
        rhs_type: rhs.type_name().to_string(),
        expression: expression.to_string(),
    };
    let arity_err = |fname: &str| EvaluationError::TypeMismatch {
        op: format!("call to `{fname}`"),
        lhs_type: format!("{} args", args.len()),
        rhs_type: "expected arity mismatch".to_string(),
        expression: expression.to_string(),
    };

    let result = match name {
        "len" => {
            let v = args.first().ok_or_else(|| arity_err("len"))?;
            match v.as_container() {
                Some(ContainerRef::List(items)) => Value::Int(items.len() as i64),
                Some(ContainerRef::Str(s)) => Value::Int(s.chars().count() as i64),
                Some(ContainerRef::Mapping(m)) => Value::Int(m.len() as i64),
                None => return Err(mismatch("len", v, v)),
            }
        }
        "sum" => {
            let list = list_arg(args, "sum")?;
            let mut total = 0.0_f64;
            let mut all_int = true;
            for v in list {
                match v.as_f64() {
                    Some(n) => {
                        total += n;
                        if matches!(v, Value::Float(_)) {
                            all_int = false;
                        }
                    }
                    None => return Err(mismatch("sum", v, v)),
                }
            }
            if all_int {
                Value::Int(total as i64)
            } else {
                Value::Float(total)
            }
        }
        "abs" => match args.first() {
            Some(Value::Int(i)) => Value::Int(i.abs()),
            Some(Value::Float(f)) => Value::Float(f.abs()),
            Some(v) => return Err(mismatch("abs", v, v)),
            None => return Err(arity_err("abs")),
        },
        "min" => reduce_numeric(args, "min", f64::min)?,
        "max" => reduce_numeric(args, "max", f64::max)?,
        "round" => match args.first() {
            Some(Value::Float(f)) => Value::Int(f.round() as i64),
            Some(Value::Int(i)) => Value::Int(*i),
            Some(v) => return Err(mismatch("round", v, v)),
            None => return Err(arity_err("round")),
        },
        "startswith" => {
            let (s, prefix) = two_strings(args, "startswith")?;
            Value::Bool(s.starts_with(prefix.as_str()))
        }
        "endswith" => {
            let (s, suffix) = two_strings(args, "endswith")?;
            Value::Bool(s.ends_with(suffix.as_str()))
        }
        "contains" => {
            let container = args.first().ok_or_else(|| arity_err("contains"))?;
            let needle = args.get(1).ok_or_else(|| arity_err("contains"))?;
            match container.as_container() {
                Some(c) => Value::Bool(c.contains(needle)),
                None => return Err(mismatch("contains", container, needle)),
            }
        }
        "upper" => Value::String(one_string(args, "upper")?.to_uppercase()),
        "lower" => Value::String(one_string(args, "lower")?.to_lowercase()),
        "trim" => Value::String(one_string(args, "trim")?.trim().to_string()),
        "str" => Value::String(args.first().map(ToString::to_string).unwrap_or_default()),
        "int" => match args.first() {
            Some(Value::Int(i)) => Value::Int(*i),
            Some(Value::Float(f)) => Value::Int(*f as i64),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| mismatch("int", &Value::String(s.clone()), &Value::String(s.clone())))?,
            Some(v) => return Err(mismatch("int", v, v)),
            None => return Err(arity_err("int")),
        },
        "float" => match args.first() {
            Some(Value::Int(i)) => Value::Float(*i as f64),
            Some(Value::Float(f)) => Value::Float(*f),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| mismatch("float", &Value::String(s.clone()), &Value::String(s.clone())))?,
            Some(v) => return Err(mismatch("float", v, v)),
            None => return Err(arity_err("float")),
        },
        "bool" => Value::Bool(args.first().map(Value::is_truthy).unwrap_or(false)),
        _ => return Ok(None),
    };
    Ok(Some(result))
}

fn list_arg<'a>(args: &'a [Value], fname: &str) -> Result<&'a [Value], EvaluationError> {
    match args.first() {
        Some(Value::List(items)) => Ok(items),
        Some(v) => Err(EvaluationError::TypeMismatch {
            op: format!("call to `{fname}`"),
            lhs_type: v.type_name().to_string(),
            rhs_type: "list".to_string(),
            expression: String::new(),
        }),
        None => Err(EvaluationError::TypeMismatch {
            op: format!("call to `{fname}`"),
            lhs_type: "0 args".to_string(),
            rhs_type: "1 arg".to_string(),
            expression: String::new(),
        }),
    }
}

fn reduce_numeric(args: &[Value], fname: &str, pick: fn(f64, f64) -> f64) -> Result<Value, EvaluationError> {
    let list = list_arg(args, fname)?;
    let mut iter = list.iter();
    let first = iter
        .next()
        .and_then(Value::as_f64)
        .ok_or_else(|| EvaluationError::TypeMismatch {
            op: fname.to_string(),
            lhs_type: "empty or non-numeric list".to_string(),
            rhs_type: "numeric list".to_string(),
            expression: String::new(),
        })?;
    let mut acc = first;
    let all_int = list.iter().all(|v| matches!(v, Value::Int(_)));
    for v in iter {
        let n = v.as_f64().ok_or_else(|| EvaluationError::TypeMismatch {
            op: fname.to_string(),
            lhs_type: v.type_name().to_string(),
            rhs_type: "numeric".to_string(),
            expression: String::new(),
        })?;
        acc = pick(acc, n);
    }
    Ok(if all_int { Value::Int(acc as i64) } else { Value::Float(acc) })
}

fn one_string<'a>(args: &'a [Value], fname: &str) -> Result<&'a str, EvaluationError> {
    match args.first() {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(v) => Err(EvaluationError::TypeMismatch {
            op: fname.to_string(),
            lhs_type: v.type_name().to_string(),
            rhs_type: "string".to_string(),
            expression: String::new(),
        }),
        None => Err(EvaluationError::TypeMismatch {
            op: fname.to_string(),
            lhs_type: "0 args".to_string(),
            rhs_type: "1 arg".to_string(),
            expression: String::new(),
        }),
    }
}

fn two_strings(args: &[Value], fname: &str) -> Result<(String, String), EvaluationError> {
    let a = one_string(args, fname)?.to_string();
    let b = match args.get(1) {
        Some(Value::String(s)) => s.clone(),
        Some(v) => {
            return Err(EvaluationError::TypeMismatch {
                op: fname.to_string(),
                lhs_type: v.type_name().to_string(),
                rhs_type: "string".to_string(),
                expression: String::new(),
            })
        }
        None => {
            return Err(EvaluationError::TypeMismatch {
                op: fname.to_string(),
                lhs_type: "1 arg".to_string(),
                rhs_type: "2 args".to_string(),
                expression: String::new(),
            })
        }
    };
    Ok((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_len_sum_abs() {
        let reg = Registry::new();
        assert_eq!(
            reg.call("len", vec![Value::List(vec![Value::Int(1), Value::Int(2)])], "").unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            reg.call("sum", vec![Value::List(vec![Value::Int(1), Value::Int(2)])], "").unwrap(),
            Value::Int(3)
        );
        assert_eq!(reg.call("abs", vec![Value::Int(-5)], "").unwrap(), Value::Int(5));
    }

    #[test]
    fn rejects_registration_of_reserved_names() {
        let reg = Registry::new();
        let err = reg.register("and", Arc::new(|_| Ok(Value::Null)), true).unwrap_err();
        assert!(matches!(err, ValidationError::ReservedFunctionName(_)));
    }

    #[test]
    fn requires_allow_unsafe() {
        let reg = Registry::new();
        let err = reg.register("my_func", Arc::new(|_| Ok(Value::Null)), false).unwrap_err();
        assert!(matches!(err, ValidationError::UnprovenPurity(_)));
    }

    #[test]
    fn user_function_roundtrip() {
        let reg = Registry::new();
        reg.register("double", Arc::new(|args: &[Value]| match args.first() {
            Some(Value::Int(i)) => Ok(Value::Int(i * 2)),
            _ => Err("expected int".to_string()),
        }), true)
        .unwrap();
        assert_eq!(reg.call("double", vec![Value::Int(21)], "").unwrap(), Value::Int(42));
        assert!(reg.unregister("double"));
        assert!(!reg.is_known("double"));
    }

    #[test]
    fn unknown_function_is_evaluation_error() {
        let reg = Registry::new();
        let err = reg.call("nope", vec![], "nope()").unwrap_err();
        assert!(matches!(err, CallError::Evaluation(EvaluationError::UnknownFunction { .. })));
    }
}
