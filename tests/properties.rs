//! Property-based checks of engine and scheduler invariants, run with `proptest`
//! over small generated rule sets and fact maps rather than fixed examples.

use std::collections::{BTreeMap, HashSet};

use proptest::prelude::*;
use rule_reasoner::ast::builders::ExprBuilder;
use rule_reasoner::ast::Expr;
use rule_reasoner::engine::{Engine, EngineOptions};
use rule_reasoner::rule::{ActionValue, Rule};
use rule_reasoner::value::Value;

fn rule(id: &str, priority: i64, field: &str, threshold: i64, writes: &str) -> Rule {
    Rule {
        id: id.to_string(),
        priority,
        condition: ExprBuilder::gt(ExprBuilder::name(field), ExprBuilder::int(threshold)),
        condition_source: format!("{field}>{threshold}"),
        actions: vec![(writes.to_string(), ActionValue::Literal(Value::Int(1)))],
        facts: vec![],
        triggers: vec![],
        tags: vec![],
        description: None,
        enabled: true,
    }
}

fn rule_ids() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{3,6}", 1..8)
        .prop_map(|names| {
            let mut seen = HashSet::new();
            names
                .into_iter()
                .enumerate()
                .map(|(i, n)| {
                    let candidate = format!("{n}_{i}");
                    seen.insert(candidate.clone());
                    candidate
                })
                .collect()
        })
}

proptest! {
    /// `reason()` is a pure function of (rules, facts): running it twice on the same
    /// engine with the same facts produces the same verdict and fired-rule list.
    #[test]
    fn reason_is_deterministic(
        ids in rule_ids(),
        priorities in prop::collection::vec(-10i64..10, 1..8),
        threshold in -100i64..100,
        x in -200i64..200,
    ) {
        let n = ids.len().min(priorities.len());
        let rules: Vec<Rule> = ids.iter().zip(priorities.iter()).take(n).enumerate()
            .map(|(i, (id, &p))| rule(id, p, "x", threshold, &format!("out_{i}")))
            .collect();

        let mut engine = Engine::new(EngineOptions::default(), None);
        engine.load_rules(rules).unwrap();

        let facts: BTreeMap<String, Value> = [("x".to_string(), Value::Int(x))].into();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let first = rt.block_on(engine.reason(facts.clone(), None));
        let second = rt.block_on(engine.reason(facts, None));

        prop_assert_eq!(first.verdict, second.verdict);
        prop_assert_eq!(first.fired_rules, second.fired_rules);
    }

    /// Every rule whose condition is satisfied writes its field to the verdict;
    /// every rule whose condition fails leaves that field unset.
    #[test]
    fn only_satisfied_rules_contribute_writes(
        threshold in -50i64..50,
        x in -100i64..100,
    ) {
        let r = rule("r", 0, "x", threshold, "flag");
        let mut engine = Engine::new(EngineOptions::default(), None);
        engine.load_rules(vec![r]).unwrap();

        let facts: BTreeMap<String, Value> = [("x".to_string(), Value::Int(x))].into();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(engine.reason(facts, None));

        if x > threshold {
            prop_assert_eq!(result.verdict.get("flag"), Some(&Value::Int(1)));
            prop_assert!(result.fired_rules.contains(&"r".to_string()));
        } else {
            prop_assert!(result.verdict.get("flag").is_none());
            prop_assert!(!result.fired_rules.contains(&"r".to_string()));
        }
    }

    /// A missing fact is always read as `Null`, never causes a panic, regardless of
    /// which comparison operator the condition uses.
    #[test]
    fn missing_field_is_null_never_panics(threshold in -20i64..20) {
        let r = rule("r", 0, "absent_field", threshold, "flag");
        let mut engine = Engine::new(EngineOptions::default(), None);
        engine.load_rules(vec![r]).unwrap();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(engine.reason(BTreeMap::new(), None));
        // Null > threshold is never true, so the rule never fires and the run never
        // panics regardless of `threshold`.
        prop_assert!(result.verdict.get("flag").is_none());
    }
}

/// The scheduler must emit every rule exactly once, in an order where every writer
/// of a field precedes every reader of that field (absent a cycle).
#[test]
fn scheduler_emits_every_rule_exactly_once() {
    use rule_reasoner::field_extractor::FieldExtractor;
    use rule_reasoner::registry::Registry;
    use rule_reasoner::scheduler::schedule;

    let rules = vec![
        rule("a", 10, "x", 0, "y"),
        rule("b", 5, "y", 0, "z"),
        rule("c", 20, "z", 0, "w"),
    ];
    let extractor = FieldExtractor::new();
    let registry = Registry::new();
    let order = schedule(&rules, &extractor, &registry);

    assert_eq!(order.len(), rules.len());
    let unique: HashSet<&String> = order.iter().collect();
    assert_eq!(unique.len(), rules.len());

    let pos = |id: &str| order.iter().position(|r| r == id).unwrap();
    assert!(pos("a") < pos("b"));
    assert!(pos("b") < pos("c"));
}

/// Equal `Value`s of numeric type (`Int`/`Float`) compare equal under the crate's
/// numeric-promotion equality regardless of which concrete variant each side holds.
#[test]
fn value_equality_is_reflexive_across_sampled_numerics() {
    let samples: Vec<Value> = vec![
        Value::Int(0),
        Value::Int(-5),
        Value::Int(42),
        Value::Float(0.0),
        Value::Float(-5.0),
        Value::Float(3.5),
    ];
    for v in &samples {
        assert_eq!(v, v);
    }
    assert_eq!(Value::Int(7), Value::Float(7.0));
    assert_ne!(Value::Int(7), Value::Float(7.5));
}

/// Short-circuit evaluation of `and`/`or` never evaluates the branch whose result
/// cannot change the outcome, demonstrated with an expression that would error if
/// the unreachable branch were evaluated (division by zero).
#[test]
fn and_short_circuits_before_erroring_branch() {
    use rule_reasoner::ast::BinOp;

    let expr: Expr = rule_reasoner::ast::Expr::BoolOp {
        op: rule_reasoner::ast::BoolOpKind::And,
        values: vec![
            ExprBuilder::gt(ExprBuilder::name("x"), ExprBuilder::int(1000)),
            ExprBuilder::eq(
                ExprBuilder::binop(BinOp::Div, ExprBuilder::int(1), ExprBuilder::name("zero")),
                ExprBuilder::int(1),
            ),
        ],
    };

    let r = Rule {
        id: "r".to_string(),
        priority: 0,
        condition: expr,
        condition_source: "x>1000 and 1/zero==1".to_string(),
        actions: vec![("fired".to_string(), ActionValue::Literal(Value::Bool(true)))],
        facts: vec![],
        triggers: vec![],
        tags: vec![],
        description: None,
        enabled: true,
    };

    let mut engine = Engine::new(EngineOptions::default(), None);
    engine.load_rules(vec![r]).unwrap();

    let facts: BTreeMap<String, Value> =
        [("x".to_string(), Value::Int(1)), ("zero".to_string(), Value::Int(0))].into();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let result = rt.block_on(engine.reason(facts, None));
    // x>1000 is false, so the divide-by-zero branch is never reached and the rule
    // never fires or errors.
    assert!(result.verdict.is_empty());
}
