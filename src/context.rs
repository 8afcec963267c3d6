//! # Execution Context & Result
//!
//! `ExecutionContext` is the mutable state of one `reason()` call: the original
//! immutable facts, the enriched (writable) copy, the fired-rule list, and
//! accumulated trace frames. `ExecutionResult` is produced once, at the end of the
//! run, and is itself immutable.

use std::collections::BTreeMap;

use crate::trace::RuleTrace;
use crate::value::Value;

pub struct ExecutionContext {
    original_facts: BTreeMap<String, Value>,
    enriched_facts: BTreeMap<String, Value>,
    fired_rules: Vec<String>,
    pub current_rule_id: Option<String>,
    traces: Vec<RuleTrace>,
}

impl ExecutionContext {
    pub fn new(facts: BTreeMap<String, Value>) -> Self {
        Self {
            enriched_facts: facts.clone(),
            original_facts: facts,
            fired_rules: Vec::new(),
            current_rule_id: None,
            traces: Vec::new(),
        }
    }

    pub fn original_facts(&self) -> &BTreeMap<String, Value> {
        &self.original_facts
    }

    pub fn enriched_facts(&self) -> &BTreeMap<String, Value> {
        &self.enriched_facts
    }

    /// Reads `enriched_facts`, defaulting to `Null` when the field is unset.
    pub fn get_fact(&self, name: &str) -> Value {
        self.enriched_facts.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Writes `enriched_facts`, returning the previous value for trace before/after
    /// recording.
    pub fn set_fact(&mut self, name: String, value: Value) -> Option<Value> {
        self.enriched_facts.insert(name, value)
    }

    pub fn rule_fired(&mut self, id: String) {
        self.fired_rules.push(id);
    }

    pub fn fired_rules(&self) -> &[String] {
        &self.fired_rules
    }

    pub fn push_trace(&mut self, trace: RuleTrace) {
        self.traces.push(trace);
    }

    /// Lazily computed diff view: every key absent from or changed relative to
    /// `original_facts`.
    pub fn verdict(&self) -> BTreeMap<String, Value> {
        self.enriched_facts
            .iter()
            .filter(|(k, v)| self.original_facts.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn into_traces(self) -> Vec<RuleTrace> {
        self.traces
    }
}

/// Fallback-evaluator statistics accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FallbackStats {
    pub total: u64,
    pub structured: u64,
    pub oracle: u64,
    pub failures: u64,
}

/// The immutable result of one `reason()` call.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub verdict: BTreeMap<String, Value>,
    pub fired_rules: Vec<String>,
    pub elapsed_ms: f64,
    pub rule_traces: Vec<RuleTrace>,
    pub fallback_stats: FallbackStats,
}
