//! # Scheduler
//!
//! Produces a deterministic execution order over a rule set: priority plus
//! field-dependency topological sort via Kahn's algorithm, with in-degree tracking,
//! ready-set tie-breaking, and a cycle-tolerance fallback that appends whatever
//! remains in priority order rather than failing the run.
//!
//! Also hosts a backward-chaining lookup: given a `Goal`, returns rules whose
//! actions/facts can produce the goal field.

use std::collections::{HashSet, VecDeque};

use crate::field_extractor::FieldExtractor;
use crate::registry::Registry;
use crate::rule::{Rule, RuleId};
use crate::value::Value;

/// Produces a deterministic execution order: Kahn's algorithm over the
/// writer-to-reader dependency graph, ties broken by descending priority then
/// lexicographic id. If a cycle remains, the unresolved rules are appended in pure
/// priority order rather than failing — cycle tolerance, not cycle rejection (that's
/// the validator's job for `triggers`, not field deps).
pub fn schedule(rules: &[Rule], extractor: &FieldExtractor, registry: &Registry) -> Vec<RuleId> {
    let n = rules.len();

    let read_sets: Vec<HashSet<String>> = rules
        .iter()
        .map(|r| (*extractor.fields(&r.condition_source, &r.condition, registry)).clone())
        .collect();
    let write_sets: Vec<HashSet<String>> = rules
        .iter()
        .map(|r| r.write_set().map(String::from).collect())
        .collect();

    // dependents[writer] = readers that must come after writer.
    let mut dependents: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    let mut in_degree: Vec<usize> = vec![0; n];

    for writer in 0..n {
        for reader in 0..n {
            if writer == reader {
                continue;
            }
            if !write_sets[writer].is_disjoint(&read_sets[reader]) && dependents[writer].insert(reader) {
                in_degree[reader] += 1;
            }
        }
    }

    let priority_key = |i: usize| (-rules[i].priority, rules[i].id.clone());

    let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    ready.sort_by_key(|&i| priority_key(i));
    let mut ready: VecDeque<usize> = ready.into();

    let mut order = Vec::with_capacity(n);
    let mut emitted = vec![false; n];

    while let Some(current) = pop_best(&mut ready, &priority_key) {
        emitted[current] = true;
        order.push(rules[current].id.clone());
        let mut newly_ready = Vec::new();
        for &dependent in &dependents[current] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                newly_ready.push(dependent);
            }
        }
        newly_ready.sort_by_key(|&i| priority_key(i));
        for r in newly_ready {
            ready.push_back(r);
        }
    }

    if order.len() < n {
        tracing::warn!(
            remaining = n - order.len(),
            "scheduler: cycle detected in field dependencies, falling back to priority order for remaining rules"
        );
        let mut leftover: Vec<usize> = (0..n).filter(|&i| !emitted[i]).collect();
        leftover.sort_by_key(|&i| priority_key(i));
        order.extend(leftover.into_iter().map(|i| rules[i].id.clone()));
    }

    debug_assert_eq!(order.len(), n, "scheduler must emit every rule exactly once");
    order
}

fn pop_best(
    ready: &mut VecDeque<usize>,
    priority_key: &impl Fn(usize) -> (i64, String),
) -> Option<usize> {
    if ready.is_empty() {
        return None;
    }
    let (best_pos, _) = ready
        .iter()
        .enumerate()
        .min_by_key(|(_, &i)| priority_key(i))
        .expect("non-empty checked above");
    ready.remove(best_pos)
}

/// A backward-chaining query: which rules can produce `field`, optionally filtered to
/// those that set it to `expected_value`.
pub struct Goal {
    pub field: String,
    pub expected_value: Option<Value>,
}

const MAX_CHAIN_DEPTH: usize = 32;

/// Returns the ids of rules whose `actions`/`facts` write `goal.field` (filtered by
/// `expected_value` when given). Capped depth and a visited-set guard against cycles,
/// though this query does not itself recurse through dependency chains beyond
/// collecting direct producers — a single-hop producer lookup, not a proof search.
pub fn find_producers(rules: &[Rule], goal: &Goal) -> Vec<RuleId> {
    let mut visited = HashSet::new();
    let mut out = Vec::new();
    for rule in rules.iter().take(MAX_CHAIN_DEPTH.max(rules.len())) {
        if !visited.insert(rule.id.as_str()) {
            continue;
        }
        let produces = rule
            .actions
            .iter()
            .chain(rule.facts.iter())
            .any(|(key, value)| {
                key == &goal.field
                    && match (&goal.expected_value, value) {
                        (None, _) => true,
                        (Some(expected), crate::rule::ActionValue::Literal(actual)) => expected == actual,
                        // A template action's runtime value is unknown without
                        // evaluating it; backward chaining treats it as a possible
                        // (unverified) producer rather than excluding it.
                        (Some(_), crate::rule::ActionValue::Template(_)) => true,
                    }
            });
        if produces {
            out.push(rule.id.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::ExprBuilder;
    use crate::rule::ActionValue;

    fn rule(id: &str, priority: i64, condition_source: &str, condition: crate::ast::Expr, actions: Vec<(&str, ActionValue)>) -> Rule {
        Rule {
            id: id.to_string(),
            priority,
            condition,
            condition_source: condition_source.to_string(),
            actions: actions.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            facts: vec![],
            triggers: vec![],
            tags: vec![],
            description: None,
            enabled: true,
        }
    }

    #[test]
    fn dependency_beats_priority() {
        let r1 = rule(
            "R1",
            10,
            "x>0",
            ExprBuilder::gt(ExprBuilder::name("x"), ExprBuilder::int(0)),
            vec![("y", ActionValue::Literal(Value::Int(1)))],
        );
        let r2 = rule(
            "R2",
            50,
            "y==1",
            ExprBuilder::eq(ExprBuilder::name("y"), ExprBuilder::int(1)),
            vec![("z", ActionValue::Literal(Value::Int(2)))],
        );
        let rules = vec![r2, r1];
        let extractor = FieldExtractor::new();
        let registry = Registry::new();
        let order = schedule(&rules, &extractor, &registry);
        assert_eq!(order, vec!["R1".to_string(), "R2".to_string()]);
    }

    #[test]
    fn ties_break_by_priority_then_id() {
        let a = rule("b_rule", 5, "true", ExprBuilder::bool(true), vec![]);
        let b = rule("a_rule", 5, "true", ExprBuilder::bool(true), vec![]);
        let c = rule("high", 10, "true", ExprBuilder::bool(true), vec![]);
        let rules = vec![a, b, c];
        let extractor = FieldExtractor::new();
        let registry = Registry::new();
        let order = schedule(&rules, &extractor, &registry);
        assert_eq!(order, vec!["high".to_string(), "a_rule".to_string(), "b_rule".to_string()]);
    }

    #[test]
    fn cycle_falls_back_to_priority_order() {
        let r1 = rule(
            "R1",
            10,
            "b==1",
            ExprBuilder::eq(ExprBuilder::name("b"), ExprBuilder::int(1)),
            vec![("a", ActionValue::Literal(Value::Int(1)))],
        );
        let r2 = rule(
            "R2",
            5,
            "a==1",
            ExprBuilder::eq(ExprBuilder::name("a"), ExprBuilder::int(1)),
            vec![("b", ActionValue::Literal(Value::Int(1)))],
        );
        let rules = vec![r1, r2];
        let extractor = FieldExtractor::new();
        let registry = Registry::new();
        let order = schedule(&rules, &extractor, &registry);
        assert_eq!(order.len(), 2);
        assert_eq!(order[0], "R1");
    }

    #[test]
    fn finds_producers_of_a_goal_field() {
        let r1 = rule("r1", 0, "true", ExprBuilder::bool(true), vec![("tier", ActionValue::Literal(Value::String("premium".into())))]);
        let r2 = rule("r2", 0, "true", ExprBuilder::bool(true), vec![]);
        let rules = vec![r1, r2];
        let goal = Goal { field: "tier".to_string(), expected_value: Some(Value::String("premium".into())) };
        let producers = find_producers(&rules, &goal);
        assert_eq!(producers, vec!["r1".to_string()]);
    }
}
