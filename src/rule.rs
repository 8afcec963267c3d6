//! # Rule Model
//!
//! Immutable rule record: id, priority, condition, actions, optional intermediate
//! `facts` writes, triggers, tags, enabled flag. Constructed once at load time by
//! `crate::loader` and never mutated afterward.

use serde::{Deserialize, Serialize};

use crate::ast::Expr;
use crate::value::Value;

pub type RuleId = String;

/// A single `actions`/`facts` entry's value: either a literal or a template/
/// expression string. Which case a YAML scalar falls into is decided by
/// `crate::actions::classify` at load time, not here — by the time a `Rule` exists
/// the classification has already happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionValue {
    Literal(Value),
    Template(String),
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub id: RuleId,
    pub priority: i64,
    pub condition: Expr,
    pub condition_source: String,
    pub actions: Vec<(String, ActionValue)>,
    pub facts: Vec<(String, ActionValue)>,
    pub triggers: Vec<RuleId>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub enabled: bool,
}

impl Rule {
    /// Keys written by this rule's `actions` and `facts` blocks combined — the write
    /// set the scheduler uses to build dependency edges.
    pub fn write_set(&self) -> impl Iterator<Item = &str> {
        self.actions
            .iter()
            .chain(self.facts.iter())
            .map(|(k, _)| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::ExprBuilder;

    #[test]
    fn write_set_combines_actions_and_facts() {
        let rule = Rule {
            id: "r1".to_string(),
            priority: 0,
            condition: ExprBuilder::bool(true),
            condition_source: "true".to_string(),
            actions: vec![("y".to_string(), ActionValue::Literal(Value::Int(1)))],
            facts: vec![("z".to_string(), ActionValue::Literal(Value::Int(2)))],
            triggers: vec![],
            tags: vec![],
            description: None,
            enabled: true,
        };
        let keys: Vec<&str> = rule.write_set().collect();
        assert_eq!(keys, vec!["y", "z"]);
    }
}
