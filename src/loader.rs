//! # Rule Loading
//!
//! Turns raw YAML documents (string, file, or directory of files) into `Rule`
//! records. Schema validation runs on the raw `serde_yaml::Value` document before any
//! attempt to compile a condition or classify an action, so a malformed rule file
//! never reaches the parser with half-validated input.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value as Yaml;

use crate::ast::reserved::is_reserved;
use crate::engine::build_rule;
use crate::error::{EngineError, LoadError, SchemaError};
use crate::rule::Rule;
use crate::value::Value;

const REQUIRED_TOP_LEVEL: &[&str] = &["rules"];
const ALLOWED_TOP_LEVEL: &[&str] = &["rules", "version", "description", "metadata"];
const REQUIRED_RULE_FIELDS: &[&str] = &["id"];
const ALLOWED_RULE_FIELDS: &[&str] = &[
    "id", "priority", "condition", "if", "facts", "actions", "then", "triggers", "tags",
    "description", "enabled",
];

/// Reads and validates a YAML rule document, producing compiled `Rule`s.
pub fn load_yaml_str(yaml_content: &str) -> Result<Vec<Rule>, EngineError> {
    if yaml_content.trim().is_empty() {
        return Err(EngineError::Load(LoadError::NotFound("<empty YAML content>".to_string())));
    }
    let doc: Yaml = serde_yaml::from_str(yaml_content).map_err(LoadError::Yaml)?;
    validate_top_level(&doc)?;

    let rules_seq = doc
        .get("rules")
        .and_then(Yaml::as_sequence)
        .ok_or(EngineError::Schema(SchemaError::MissingRules))?;

    let mut rules = Vec::with_capacity(rules_seq.len());
    for (index, rule_yaml) in rules_seq.iter().enumerate() {
        rules.push(parse_rule(rule_yaml, index)?);
    }
    Ok(rules)
}

pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<Rule>, EngineError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| {
        EngineError::Load(LoadError::Io { path: path.display().to_string(), source })
    })?;
    load_yaml_str(&content)
}

/// Loads every `*.yaml`/`*.yml` file in `directory` (recursively) and concatenates
/// their rule sets. Rule ids must be unique across the whole directory, not just
/// within one file — that check happens downstream in semantic validation.
pub fn load_directory(directory: impl AsRef<Path>) -> Result<Vec<Rule>, EngineError> {
    let directory = directory.as_ref();
    if !directory.is_dir() {
        return Err(EngineError::Load(LoadError::NotFound(directory.display().to_string())));
    }
    let mut paths = Vec::new();
    collect_yaml_paths(directory, &mut paths)?;
    paths.sort();

    if paths.is_empty() {
        return Err(EngineError::Load(LoadError::NotFound(format!(
            "no YAML files found in {}",
            directory.display()
        ))));
    }

    let mut rules = Vec::new();
    for path in paths {
        rules.extend(load_file(&path)?);
    }
    Ok(rules)
}

fn collect_yaml_paths(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), EngineError> {
    let entries = std::fs::read_dir(dir).map_err(|source| {
        EngineError::Load(LoadError::Io { path: dir.display().to_string(), source })
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| {
            EngineError::Load(LoadError::Io { path: dir.display().to_string(), source })
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_yaml_paths(&path, out)?;
        } else if matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml")) {
            out.push(path);
        }
    }
    Ok(())
}

fn validate_top_level(doc: &Yaml) -> Result<(), SchemaError> {
    let Yaml::Mapping(map) = doc else {
        return Err(SchemaError::MissingRules);
    };
    let keys: BTreeSet<&str> = map.keys().filter_map(Yaml::as_str).collect();

    for required in REQUIRED_TOP_LEVEL {
        if !keys.contains(required) {
            return Err(SchemaError::MissingRules);
        }
    }
    for key in &keys {
        if !ALLOWED_TOP_LEVEL.contains(key) {
            return Err(SchemaError::UnknownTopLevelKey((*key).to_string()));
        }
    }
    Ok(())
}

fn parse_rule(rule_yaml: &Yaml, index: usize) -> Result<Rule, EngineError> {
    let Yaml::Mapping(map) = rule_yaml else {
        return Err(EngineError::Schema(SchemaError::MissingField { index, field: "id" }));
    };
    let keys: BTreeSet<&str> = map.keys().filter_map(Yaml::as_str).collect();

    for required in REQUIRED_RULE_FIELDS {
        if !keys.contains(required) {
            return Err(EngineError::Schema(SchemaError::MissingField { index, field: required }));
        }
    }
    if !keys.contains("condition") && !keys.contains("if") {
        return Err(EngineError::Schema(SchemaError::MissingField { index, field: "condition" }));
    }
    if !keys.contains("actions") && !keys.contains("then") {
        return Err(EngineError::Schema(SchemaError::MissingField { index, field: "actions" }));
    }

    let id = rule_yaml
        .get("id")
        .and_then(Yaml::as_str)
        .ok_or(EngineError::Schema(SchemaError::WrongType { rule_id: format!("<index {index}>"), field: "id", expected: "string" }))?
        .to_string();

    for key in &keys {
        if !ALLOWED_RULE_FIELDS.contains(key) {
            return Err(EngineError::Schema(SchemaError::UnknownRuleKey { rule_id: id.clone(), key: (*key).to_string() }));
        }
    }

    let condition_yaml = rule_yaml.get("condition").or_else(|| rule_yaml.get("if")).expect("checked above");
    let condition_spec = yaml_to_condition_spec(condition_yaml, &id)?;

    let actions_yaml = rule_yaml.get("actions").or_else(|| rule_yaml.get("then")).expect("checked above");
    let actions = yaml_mapping_to_pairs(actions_yaml, &id, "actions")?;
    if actions.is_empty() {
        return Err(EngineError::Schema(SchemaError::WrongType { rule_id: id, field: "actions", expected: "non-empty mapping" }));
    }

    let facts = match rule_yaml.get("facts") {
        Some(f) => yaml_mapping_to_pairs(f, &id, "facts")?,
        None => Vec::new(),
    };

    for (key, _) in actions.iter().chain(facts.iter()) {
        if is_reserved(key) {
            return Err(EngineError::Schema(SchemaError::UnknownRuleKey { rule_id: id, key: key.clone() }));
        }
    }

    let priority = rule_yaml.get("priority").and_then(Yaml::as_i64).unwrap_or(0);
    let triggers = rule_yaml
        .get("triggers")
        .and_then(Yaml::as_sequence)
        .map(|seq| seq.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let tags = rule_yaml
        .get("tags")
        .and_then(Yaml::as_sequence)
        .map(|seq| seq.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let description = rule_yaml.get("description").and_then(Yaml::as_str).map(String::from);
    let enabled = rule_yaml.get("enabled").and_then(Yaml::as_bool).unwrap_or(true);

    build_rule(id, priority, condition_spec, actions, facts, triggers, tags, description, enabled)
}

fn yaml_to_condition_spec(yaml: &Yaml, rule_id: &str) -> Result<crate::condition::ConditionSpec, EngineError> {
    if let Some(s) = yaml.as_str() {
        return Ok(crate::condition::ConditionSpec::Flat(s.to_string()));
    }
    let json: serde_json::Value = serde_yaml::from_value(yaml.clone()).map_err(|_| {
        EngineError::Schema(SchemaError::WrongType { rule_id: rule_id.to_string(), field: "condition", expected: "string or mapping" })
    })?;
    match &json {
        serde_json::Value::Object(_) => Ok(crate::condition::ConditionSpec::Structured(json)),
        serde_json::Value::String(s) => Ok(crate::condition::ConditionSpec::Flat(s.clone())),
        _ => Err(EngineError::Schema(SchemaError::WrongType {
            rule_id: rule_id.to_string(),
            field: "condition",
            expected: "string or mapping",
        })),
    }
}

fn yaml_mapping_to_pairs(yaml: &Yaml, rule_id: &str, field: &'static str) -> Result<Vec<(String, Value)>, EngineError> {
    let Yaml::Mapping(map) = yaml else {
        return Err(EngineError::Schema(SchemaError::WrongType { rule_id: rule_id.to_string(), field, expected: "mapping" }));
    };
    let mut out = Vec::with_capacity(map.len());
    for (k, v) in map {
        let key = k
            .as_str()
            .ok_or(EngineError::Schema(SchemaError::WrongType { rule_id: rule_id.to_string(), field, expected: "string keys" }))?
            .to_string();
        out.push((key, yaml_to_value(v)));
    }
    Ok(out)
}

fn yaml_to_value(yaml: &Yaml) -> Value {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scratch {
        Null,
        Bool(bool),
        Int(i64),
        Float(f64),
        String(String),
        List(Vec<serde_yaml::Value>),
        Mapping(std::collections::BTreeMap<String, serde_yaml::Value>),
    }
    let scratch: Scratch = serde_yaml::from_value(yaml.clone()).unwrap_or(Scratch::Null);
    match scratch {
        Scratch::Null => Value::Null,
        Scratch::Bool(b) => Value::Bool(b),
        Scratch::Int(i) => Value::Int(i),
        Scratch::Float(f) => Value::Float(f),
        Scratch::String(s) => Value::String(s),
        Scratch::List(items) => Value::List(items.iter().map(yaml_to_value).collect()),
        Scratch::Mapping(map) => Value::Mapping(map.into_iter().map(|(k, v)| (k, yaml_to_value(&v))).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_rule_set() {
        let yaml = r#"
rules:
  - id: r1
    condition: "x > 0"
    actions:
      y: 1
"#;
        let rules = load_yaml_str(yaml).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "r1");
    }

    #[test]
    fn accepts_if_then_aliases() {
        let yaml = r#"
rules:
  - id: r1
    if: "x > 0"
    then:
      y: 1
"#;
        let rules = load_yaml_str(yaml).unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn structured_condition_compiles() {
        let yaml = r#"
rules:
  - id: r1
    condition:
      all:
        - "a > 0"
        - "b > 0"
    actions:
      ok: true
"#;
        let rules = load_yaml_str(yaml).unwrap();
        assert_eq!(rules[0].condition_source, "(a > 0) and (b > 0)");
    }

    #[test]
    fn rejects_missing_rules_key() {
        let err = load_yaml_str("version: \"1\"").unwrap_err();
        assert!(matches!(err, EngineError::Schema(SchemaError::MissingRules)));
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let yaml = "rules: []\nbogus: true\n";
        let err = load_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, EngineError::Schema(SchemaError::UnknownTopLevelKey(_))));
    }

    #[test]
    fn rejects_unknown_rule_key() {
        let yaml = r#"
rules:
  - id: r1
    condition: "true"
    actions:
      y: 1
    bogus: 1
"#;
        let err = load_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, EngineError::Schema(SchemaError::UnknownRuleKey { .. })));
    }

    #[test]
    fn rejects_empty_actions() {
        let yaml = r#"
rules:
  - id: r1
    condition: "true"
    actions: {}
"#;
        let err = load_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, EngineError::Schema(SchemaError::WrongType { .. })));
    }

    #[test]
    fn rejects_reserved_action_key() {
        let yaml = r#"
rules:
  - id: r1
    condition: "true"
    actions:
      and: 1
"#;
        let err = load_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, EngineError::Schema(SchemaError::UnknownRuleKey { .. })));
    }

    #[test]
    fn preserves_triggers_and_tags() {
        let yaml = r#"
rules:
  - id: r1
    condition: "true"
    actions:
      y: 1
    triggers: [r2]
    tags: [billing]
    priority: 5
    enabled: false
"#;
        let rules = load_yaml_str(yaml).unwrap();
        assert_eq!(rules[0].triggers, vec!["r2".to_string()]);
        assert_eq!(rules[0].tags, vec!["billing".to_string()]);
        assert_eq!(rules[0].priority, 5);
        assert!(!rules[0].enabled);
    }
}
