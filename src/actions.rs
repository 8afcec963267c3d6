//! # Actions & Template Expressions
//!
//! An `actions`/`facts` entry's YAML value is classified at load time as a literal, a
//! template (`{{ expr }}` substitution), or a bare expression string; at apply time
//! (`apply_value`) templates/expressions are evaluated against the current context and
//! spliced or substituted in, with evaluation failures treated as non-fatal (original
//! literal written, trace note recorded).

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;

use crate::interpreter::timeout::ReasonToken;
use crate::interpreter::{EvalOutcome, Interpreter};
use crate::rule::ActionValue;
use crate::value::Value;

fn template_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*(.+?)\s*\}\}").expect("static regex"))
}

/// Decides whether a raw YAML scalar should be treated as a literal or as an
/// expression/template string. Simple sentences without operators are treated as
/// literals to avoid false positives: detection looks for template markers,
/// arithmetic/comparison operators, function-call syntax, or parens.
pub fn classify(raw: &Value) -> ActionValue {
    let Value::String(s) = raw else {
        return ActionValue::Literal(raw.clone());
    };
    if looks_like_expression(s) {
        ActionValue::Template(s.clone())
    } else {
        ActionValue::Literal(raw.clone())
    }
}

fn looks_like_expression(s: &str) -> bool {
    if template_re().is_match(s) {
        return true;
    }
    let has_operator = ["==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "<", ">"]
        .iter()
        .any(|op| s.contains(op));
    let has_call_syntax = s.contains('(') && s.contains(')') && s.chars().any(|c| c.is_alphabetic());
    has_operator || has_call_syntax
}

/// Evaluates one `ActionValue` against the current enriched facts, returning the
/// value to write plus an optional non-fatal note. Evaluation failures for action
/// values are non-fatal: the original literal is written, and a trace note is
/// recorded.
pub fn apply_value(
    value: &ActionValue,
    interpreter: &Interpreter,
    facts: &BTreeMap<String, Value>,
    token: &ReasonToken,
) -> (Value, Option<String>) {
    match value {
        ActionValue::Literal(v) => (v.clone(), None),
        ActionValue::Template(template) => {
            let re = template_re();
            if let Some(caps) = re.captures(template) {
                if caps.get(0).map(|m| m.as_str()) == Some(template.as_str()) {
                    // The entire value is one `{{ expr }}`: result replaces the value,
                    // preserving its type.
                    let expr_text = caps.get(1).unwrap().as_str();
                    return match eval(expr_text, interpreter, facts, token) {
                        Ok(v) => (v, None),
                        Err(e) => (Value::String(template.clone()), Some(format!("template eval failed: {e}"))),
                    };
                }
                // Otherwise splice each occurrence's stringified result into the text.
                let mut note = None;
                let mut out = String::new();
                let mut last = 0;
                for caps in re.captures_iter(template) {
                    let m = caps.get(0).unwrap();
                    out.push_str(&template[last..m.start()]);
                    let expr_text = caps.get(1).unwrap().as_str();
                    match eval(expr_text, interpreter, facts, token) {
                        Ok(v) => out.push_str(&v.to_string()),
                        Err(e) => {
                            out.push_str(m.as_str());
                            note = Some(format!("template eval failed for `{expr_text}`: {e}"));
                        }
                    }
                    last = m.end();
                }
                out.push_str(&template[last..]);
                (Value::String(out), note)
            } else {
                // Classified as an expression but contains no `{{ }}` markers: it's a
                // bare expression string (arithmetic/comparison/call syntax).
                match eval(template, interpreter, facts, token) {
                    Ok(v) => (v, None),
                    Err(e) => (
                        Value::String(template.clone()),
                        Some(format!("expression eval failed: {e}")),
                    ),
                }
            }
        }
    }
}

fn eval(
    expr_text: &str,
    interpreter: &Interpreter,
    facts: &BTreeMap<String, Value>,
    token: &ReasonToken,
) -> Result<Value, String> {
    let expr = interpreter.parse(expr_text).map_err(|e| e.to_string())?;
    let reader: &dyn crate::interpreter::FactReader = facts;
    let (value, _) = interpreter
        .evaluate(&expr, expr_text, reader, token)
        .map_err(|e: EvalOutcome| e.to_string())?;
    Ok(value)
}

pub fn engine_limits_default() -> Arc<crate::interpreter::limits::EngineLimits> {
    Arc::new(crate::interpreter::limits::EngineLimits::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn interp() -> Interpreter {
        Interpreter::new(engine_limits_default(), Arc::new(Registry::new()))
    }

    #[test]
    fn classifies_literal_sentence() {
        let classified = classify(&Value::String("premium customer".to_string()));
        assert!(matches!(classified, ActionValue::Literal(_)));
    }

    #[test]
    fn classifies_template() {
        let classified = classify(&Value::String("{{ amount * 2 }}".to_string()));
        assert!(matches!(classified, ActionValue::Template(_)));
    }

    #[test]
    fn whole_template_preserves_type() {
        let i = interp();
        let token = ReasonToken::new(1000);
        let facts: BTreeMap<String, Value> = [("amount".to_string(), Value::Int(21))].into();
        let (v, note) = apply_value(&ActionValue::Template("{{ amount * 2 }}".to_string()), &i, &facts, &token);
        assert_eq!(v, Value::Int(42));
        assert!(note.is_none());
    }

    #[test]
    fn spliced_template_stringifies() {
        let i = interp();
        let token = ReasonToken::new(1000);
        let facts: BTreeMap<String, Value> = [("amount".to_string(), Value::Int(21))].into();
        let (v, _) = apply_value(
            &ActionValue::Template("amt={{amount}}".to_string()),
            &i,
            &facts,
            &token,
        );
        assert_eq!(v, Value::String("amt=21".to_string()));
    }

    #[test]
    fn failed_evaluation_is_non_fatal() {
        let i = interp();
        let token = ReasonToken::new(1000);
        let facts: BTreeMap<String, Value> = BTreeMap::new();
        let (v, note) = apply_value(&ActionValue::Template("{{ 1/0 }}".to_string()), &i, &facts, &token);
        assert_eq!(v, Value::String("{{ 1/0 }}".to_string()));
        assert!(note.is_some());
    }
}
