//! # Condition Compiler
//!
//! Lowers the three structured-condition shapes into a single flat expression string
//! the interpreter's parser can consume: a flat string (passed through), a mapping
//! with exactly one of `all`/`any`/`not`, or a mapping with multiple sibling keys
//! (implicit `and`).

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::CompilationError;

/// The YAML/JSON surface shape of a `condition`/`if` field, before compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    Flat(String),
    Structured(Json),
}

/// Compiles a `ConditionSpec` into a single expression source string.
pub fn compile(spec: &ConditionSpec) -> Result<String, CompilationError> {
    match spec {
        ConditionSpec::Flat(s) => Ok(s.trim().to_string()),
        ConditionSpec::Structured(json) => compile_json(json),
    }
}

fn compile_json(json: &Json) -> Result<String, CompilationError> {
    match json {
        Json::String(s) => Ok(s.trim().to_string()),
        Json::Object(map) => {
            if map.is_empty() {
                return Err(CompilationError::EmptyCombinatorBody("<mapping>".to_string()));
            }
            let combinators: Vec<&str> = ["all", "any", "not"]
                .into_iter()
                .filter(|k| map.contains_key(*k))
                .collect();

            // Exactly one key, and it's a recognized combinator: compile it directly.
            if map.len() == 1 && combinators.len() == 1 {
                return compile_combinator(combinators[0], &map[combinators[0]]);
            }
            // Exactly one key, but it's not a recognized combinator name: reject.
            if map.len() == 1 {
                let (key, _) = map.iter().next().expect("len checked");
                return Err(CompilationError::UnknownCombinator(vec![key.clone()]));
            }
            // Multiple sibling keys (whatever their names): implicit `and` of each
            // lowered child.
            let parts: Result<Vec<String>, CompilationError> = map.values().map(compile_json).collect();
            let parts = parts?;
            Ok(parts.iter().map(|p| format!("({p})")).collect::<Vec<_>>().join(" and "))
        }
        other => Err(CompilationError::CombinatorNotAList(other.to_string())),
    }
}

fn compile_combinator(key: &str, body: &Json) -> Result<String, CompilationError> {
    match key {
        "all" | "any" => {
            let items = body
                .as_array()
                .ok_or_else(|| CompilationError::CombinatorNotAList(key.to_string()))?;
            if items.is_empty() {
                return Err(CompilationError::EmptyCombinatorBody(key.to_string()));
            }
            let parts: Result<Vec<String>, CompilationError> = items
                .iter()
                .map(|item| compile(&json_to_spec(item)))
                .collect();
            let parts = parts?;
            let joiner = if key == "all" { " and " } else { " or " };
            Ok(parts.iter().map(|p| format!("({p})")).collect::<Vec<_>>().join(joiner))
        }
        "not" => {
            if let Json::Array(_) = body {
                return Err(CompilationError::NotArity);
            }
            let inner = compile(&json_to_spec(body))?;
            Ok(format!("not ({inner})"))
        }
        other => Err(CompilationError::UnknownCombinator(vec![other.to_string()])),
    }
}

fn json_to_spec(json: &Json) -> ConditionSpec {
    match json {
        Json::String(s) => ConditionSpec::Flat(s.clone()),
        other => ConditionSpec::Structured(other.clone()),
    }
}
