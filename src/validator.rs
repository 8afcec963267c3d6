//! # Validator
//!
//! Two layers: schema validation checks the raw YAML surface shape before parsing
//! rule bodies; semantic validation runs after rules and their conditions/actions
//! have been compiled, checking id uniqueness, reserved-keyword conflicts, trigger
//! references, and trigger-graph acyclicity via three-color DFS.

use std::collections::{HashMap, HashSet};

use crate::ast::reserved::is_reserved;
use crate::error::ValidationError;
use crate::rule::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Fail on the first error encountered.
    Strict,
    /// Accumulate all errors and proceed with the rules that validated cleanly.
    Lenient,
}

pub struct ValidationOutcome {
    pub errors: Vec<ValidationError>,
    /// In lenient mode, ids of rules dropped due to a validation error attributed to
    /// them specifically (duplicate/self-trigger/bad condition). Cross-cutting
    /// failures (cyclic triggers) do not drop rules — callers interpret those as a
    /// load-time failure regardless of mode.
    pub dropped_rule_ids: HashSet<String>,
}

/// Runs semantic validation over an already-parsed rule set. Schema validation (YAML
/// surface shape) happens earlier, in `crate::loader`, since it operates on the raw
/// document before `Rule` values exist.
pub fn validate_semantics(rules: &[Rule], mode: ValidationMode) -> ValidationOutcome {
    let mut errors = Vec::new();
    let mut dropped = HashSet::new();

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for rule in rules {
        if is_reserved(&rule.id) {
            errors.push(ValidationError::ReservedRuleId(rule.id.clone()));
            dropped.insert(rule.id.clone());
            if mode == ValidationMode::Strict {
                return ValidationOutcome { errors, dropped_rule_ids: dropped };
            }
        }
        if !seen_ids.insert(rule.id.as_str()) {
            errors.push(ValidationError::DuplicateRuleId(rule.id.clone()));
            dropped.insert(rule.id.clone());
            if mode == ValidationMode::Strict {
                return ValidationOutcome { errors, dropped_rule_ids: dropped };
            }
        }
        for (key, _) in rule.actions.iter().chain(rule.facts.iter()) {
            if is_reserved(key) {
                errors.push(ValidationError::ReservedActionKey {
                    rule_id: rule.id.clone(),
                    key: key.clone(),
                });
                if mode == ValidationMode::Strict {
                    return ValidationOutcome { errors, dropped_rule_ids: dropped };
                }
            }
        }
    }

    let known_ids: HashSet<&str> = rules.iter().map(|r| r.id.as_str()).collect();
    for rule in rules {
        for target in &rule.triggers {
            if target == &rule.id {
                errors.push(ValidationError::SelfTrigger(rule.id.clone()));
                if mode == ValidationMode::Strict {
                    return ValidationOutcome { errors, dropped_rule_ids: dropped };
                }
            } else if !known_ids.contains(target.as_str()) {
                errors.push(ValidationError::UnknownTrigger {
                    rule_id: rule.id.clone(),
                    target: target.clone(),
                });
                if mode == ValidationMode::Strict {
                    return ValidationOutcome { errors, dropped_rule_ids: dropped };
                }
            }
        }
    }

    if let Some(cyclic_id) = find_trigger_cycle(rules) {
        errors.push(ValidationError::CyclicTriggers(cyclic_id));
    }

    ValidationOutcome { errors, dropped_rule_ids: dropped }
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Three-color DFS cycle detection over the triggers graph.
fn find_trigger_cycle(rules: &[Rule]) -> Option<String> {
    let by_id: HashMap<&str, &Rule> = rules.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut colors: HashMap<&str, Color> = rules.iter().map(|r| (r.id.as_str(), Color::White)).collect();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a Rule>,
        colors: &mut HashMap<&'a str, Color>,
    ) -> Option<String> {
        match colors.get(id) {
            Some(Color::Black) => return None,
            Some(Color::Gray) => return Some(id.to_string()),
            _ => {}
        }
        colors.insert(id, Color::Gray);
        if let Some(rule) = by_id.get(id) {
            for target in &rule.triggers {
                if let Some(cycle_id) = visit(target.as_str(), by_id, colors) {
                    return Some(cycle_id);
                }
            }
        }
        colors.insert(id, Color::Black);
        None
    }

    for id in by_id.keys() {
        if colors.get(id) == Some(&Color::White) {
            if let Some(cycle_id) = visit(id, &by_id, &mut colors) {
                return Some(cycle_id);
            }
        }
    }
    None
}
