//! End-to-end reasoning scenarios driven entirely through the public loader + engine
//! API, the way a caller shipping a YAML rule file would use this crate.

use std::collections::BTreeMap;

use rule_reasoner::engine::{Engine, EngineOptions, FallbackStrategy};
use rule_reasoner::loader::load_yaml_str;
use rule_reasoner::validator::ValidationMode;
use rule_reasoner::value::Value;

fn facts(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[tokio::test]
async fn loan_approval_chains_through_triggers() {
    let rules = load_yaml_str(
        r#"
rules:
  - id: check_income
    priority: 10
    condition: "annual_income > 50000"
    actions:
      income_verified: true
    triggers: [check_credit]

  - id: check_credit
    priority: 5
    condition: "credit_score >= 700"
    actions:
      approved: true
      tier: '{{ "premium" if credit_score >= 750 else "standard" }}'
"#,
    )
    .unwrap();

    let mut engine = Engine::new(EngineOptions::default(), None);
    engine.load_rules(rules).unwrap();

    let result = engine
        .reason(facts(&[("annual_income", Value::Int(80_000)), ("credit_score", Value::Int(760))]), None)
        .await;

    assert!(result.fired_rules.contains(&"check_income".to_string()));
    assert!(result.fired_rules.contains(&"check_credit".to_string()));
    assert_eq!(result.verdict.get("approved"), Some(&Value::Bool(true)));
    assert_eq!(result.verdict.get("tier"), Some(&Value::String("premium".to_string())));
}

#[tokio::test]
async fn disabled_rule_never_fires() {
    let rules = load_yaml_str(
        r#"
rules:
  - id: r1
    condition: "true"
    actions:
      y: 1
    enabled: false
"#,
    )
    .unwrap();
    let mut engine = Engine::new(EngineOptions::default(), None);
    engine.load_rules(rules).unwrap();
    let result = engine.reason(facts(&[]), None).await;
    assert!(result.fired_rules.is_empty());
    assert!(result.verdict.is_empty());
}

#[tokio::test]
async fn lenient_mode_drops_only_bad_rules() {
    let rules = load_yaml_str(
        r#"
rules:
  - id: r1
    condition: "true"
    actions:
      y: 1
  - id: r1
    condition: "true"
    actions:
      z: 2
"#,
    )
    .unwrap();
    let mut engine = Engine::new(
        EngineOptions { validation_mode: ValidationMode::Lenient, ..EngineOptions::default() },
        None,
    );
    engine.load_rules(rules).unwrap();
    let result = engine.reason(facts(&[]), None).await;
    // Both rules shared the duplicate id and were dropped; neither fires.
    assert!(result.fired_rules.is_empty());
}

#[tokio::test]
async fn strict_mode_rejects_duplicate_ids_at_load() {
    let rules = load_yaml_str(
        r#"
rules:
  - id: r1
    condition: "true"
    actions:
      y: 1
  - id: r1
    condition: "true"
    actions:
      z: 2
"#,
    )
    .unwrap();
    let mut engine = Engine::new(EngineOptions::default(), None);
    assert!(engine.load_rules(rules).is_err());
}

#[tokio::test]
async fn auto_fallback_strategy_without_oracle_defaults_to_false() {
    let rules = load_yaml_str(
        r#"
rules:
  - id: r1
    condition: "mystery_field > 10"
    actions:
      triggered: true
"#,
    )
    .unwrap();
    let mut engine = Engine::new(
        EngineOptions { fallback_strategy: FallbackStrategy::Auto, ..EngineOptions::default() },
        None,
    );
    engine.load_rules(rules).unwrap();
    // mystery_field is absent -> Null -> comparison errors structurally, routes to
    // fallback, no oracle configured -> defaults to false, rule does not fire.
    let result = engine.reason(facts(&[]), None).await;
    assert!(result.fired_rules.is_empty());
}

#[tokio::test]
async fn multi_file_directory_load_merges_rule_sets() {
    use std::io::Write;
    let dir = tempfile::tempdir().unwrap();
    let mut f1 = std::fs::File::create(dir.path().join("income.yaml")).unwrap();
    writeln!(
        f1,
        "rules:\n  - id: r1\n    condition: \"x > 0\"\n    actions:\n      y: 1\n"
    )
    .unwrap();
    let mut f2 = std::fs::File::create(dir.path().join("credit.yaml")).unwrap();
    writeln!(
        f2,
        "rules:\n  - id: r2\n    condition: \"y == 1\"\n    actions:\n      z: 2\n"
    )
    .unwrap();

    let rules = rule_reasoner::loader::load_directory(dir.path()).unwrap();
    assert_eq!(rules.len(), 2);

    let mut engine = Engine::new(EngineOptions::default(), None);
    engine.load_rules(rules).unwrap();
    let result = engine.reason(facts(&[("x", Value::Int(1))]), None).await;
    assert_eq!(result.verdict.get("z"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn reason_batch_processes_each_fact_set_independently() {
    let rules = load_yaml_str(
        r#"
rules:
  - id: r1
    condition: "x > 0"
    actions:
      positive: true
"#,
    )
    .unwrap();
    let mut engine = Engine::new(EngineOptions::default(), None);
    engine.load_rules(rules).unwrap();

    let batch = vec![
        facts(&[("x", Value::Int(1))]),
        facts(&[("x", Value::Int(-1))]),
    ];
    let results = engine.reason_batch(batch, None).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].verdict.get("positive"), Some(&Value::Bool(true)));
    assert!(results[1].verdict.is_empty());
}
