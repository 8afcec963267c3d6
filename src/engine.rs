//! # Engine
//!
//! Coordinates Scheduler, Interpreter, Fallback Evaluator, Registry, and Validator
//! behind the `reason()` contract. A span is opened per `reason()` call and per rule
//! (`rule_engine.reason`, `rule_engine.rule`), matching this codebase's pervasive
//! `tracing` instrumentation.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::actions::{apply_value, classify};
use crate::condition::{compile, ConditionSpec};
use crate::context::{ExecutionContext, ExecutionResult};
use crate::error::{EngineError, SecurityError};
use crate::fallback::{FallbackEvaluator, FallbackStatsCounters, Oracle, ReturnType};
use crate::field_extractor::FieldExtractor;
use crate::interpreter::limits::EngineLimits;
use crate::interpreter::timeout::{CancelHandle, ReasonToken};
use crate::interpreter::{EvalOutcome, Interpreter};
use crate::registry::{Registry, UserFunction};
use crate::rule::{ActionValue, Rule};
use crate::scheduler::schedule;
use crate::trace::{ActionWrite, FieldRead, RuleOutcome, RuleTrace, TraceLevel};
use crate::validator::{validate_semantics, ValidationMode};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    Strict,
    Auto,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub fallback_strategy: FallbackStrategy,
    pub trace_level: TraceLevel,
    pub limits: EngineLimits,
    pub oracle_max_tokens: u32,
    pub validation_mode: ValidationMode,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            fallback_strategy: FallbackStrategy::Strict,
            trace_level: TraceLevel::Basic,
            limits: EngineLimits::default(),
            oracle_max_tokens: 64,
            validation_mode: ValidationMode::Strict,
        }
    }
}

/// Outcome of evaluating and (if eligible) applying one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleRunOutcome {
    Fired,
    NotFired,
    /// The run's `ReasonToken` was cancelled or timed out while evaluating this
    /// rule's condition; the caller must stop scheduling further rules.
    Cancelled,
}

pub struct Engine {
    rules: Vec<Rule>,
    options: EngineOptions,
    limits: Arc<EngineLimits>,
    registry: Arc<Registry>,
    interpreter: Arc<Interpreter>,
    extractor: FieldExtractor,
    fallback: FallbackEvaluator,
    fallback_stats: FallbackStatsCounters,
    schedule_cache: parking_lot::Mutex<Option<(u64, Vec<String>)>>,
}

impl Engine {
    pub fn new(options: EngineOptions, oracle: Option<Arc<dyn Oracle>>) -> Self {
        let limits = Arc::new(options.limits);
        let registry = Arc::new(Registry::new());
        let interpreter = Arc::new(Interpreter::new(Arc::clone(&limits), Arc::clone(&registry)));
        let fallback = FallbackEvaluator::new(Arc::clone(&interpreter), oracle, Arc::clone(&limits));
        Self {
            rules: Vec::new(),
            options,
            limits,
            registry,
            interpreter,
            extractor: FieldExtractor::new(),
            fallback,
            fallback_stats: FallbackStatsCounters::default(),
            schedule_cache: parking_lot::Mutex::new(None),
        }
    }

    pub fn register_function(&self, name: &str, func: UserFunction, allow_unsafe: bool) -> Result<(), EngineError> {
        self.registry.register(name, func, allow_unsafe).map_err(EngineError::from)
    }

    /// Loads a rule set, replacing whatever was loaded before. Schema/semantic
    /// validation runs per `self.options.validation_mode`; load, schema, validation,
    /// and compilation errors are surfaced at load time and fail engine construction
    /// in strict mode.
    pub fn load_rules(&mut self, rules: Vec<Rule>) -> Result<(), EngineError> {
        let outcome = validate_semantics(&rules, self.options.validation_mode);
        if self.options.validation_mode == ValidationMode::Strict {
            if let Some(first) = outcome.errors.into_iter().next() {
                return Err(EngineError::Validation(first));
            }
            self.rules = rules;
        } else {
            self.rules = rules
                .into_iter()
                .filter(|r| !outcome.dropped_rule_ids.contains(&r.id))
                .collect();
        }
        *self.schedule_cache.lock() = None;
        Ok(())
    }

    pub fn cache_stats(&self) -> crate::interpreter::cache::CacheStats {
        self.interpreter.cache_stats()
    }

    fn execution_order(&self) -> Vec<String> {
        let version = self.rules.len() as u64 ^ (self.rules.iter().map(|r| r.priority as u64).sum::<u64>());
        let mut cache = self.schedule_cache.lock();
        if let Some((cached_version, order)) = cache.as_ref() {
            if *cached_version == version {
                return order.clone();
            }
        }
        let order = schedule(&self.rules, &self.extractor, &self.registry);
        *cache = Some((version, order.clone()));
        order
    }

    /// Evaluates every enabled rule against `facts` in dependency order, applies
    /// actions for the ones that fire, and returns the resulting verdict and trace.
    pub async fn reason(&self, facts: BTreeMap<String, Value>, cancel: Option<CancelHandle>) -> ExecutionResult {
        let span = tracing::info_span!("rule_engine.reason", rule_count = self.rules.len(), fact_count = facts.len());
        let _enter = span.enter();
        let run_start = Instant::now();

        let mut ctx = ExecutionContext::new(facts);
        let token = ReasonToken::new(self.limits.max_evaluation_time_ms);
        if let Some(handle) = cancel {
            // Bridge an externally supplied handle into this run's token by polling
            // it alongside the token's own check at each node entry would require
            // token internals; instead, cancellation is honored by cancelling the
            // token's own handle up front if already requested.
            if handle.is_cancelled() {
                token.cancel_handle().cancel();
            }
        }

        let order = self.execution_order();
        let by_id: std::collections::HashMap<&str, &Rule> = self.rules.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut main_fired = Vec::new();
        let mut cancelled = false;
        for rule_id in &order {
            let Some(rule) = by_id.get(rule_id.as_str()) else { continue };
            if !rule.enabled {
                continue;
            }
            match self.run_rule(rule, &mut ctx, &token).await {
                RuleRunOutcome::Fired => main_fired.push((*rule).clone()),
                RuleRunOutcome::NotFired => {}
                RuleRunOutcome::Cancelled => {
                    cancelled = true;
                    break;
                }
            }
        }

        // Bounded one-extra-pass trigger expansion: triggers of triggers are not
        // expanded. Skipped entirely once the run has been cancelled.
        let mut triggered_ids: Vec<String> = Vec::new();
        for fired in &main_fired {
            for t in &fired.triggers {
                if !triggered_ids.contains(t) {
                    triggered_ids.push(t.clone());
                }
            }
        }
        if !cancelled && !triggered_ids.is_empty() {
            let triggered_rules: Vec<Rule> = triggered_ids
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).map(|r| (*r).clone()))
                .filter(|r| r.enabled)
                .collect();
            let extra_order = schedule(&triggered_rules, &self.extractor, &self.registry);
            let extra_by_id: std::collections::HashMap<&str, &Rule> =
                triggered_rules.iter().map(|r| (r.id.as_str(), r)).collect();
            for rule_id in &extra_order {
                if let Some(rule) = extra_by_id.get(rule_id.as_str()) {
                    if self.run_rule(rule, &mut ctx, &token).await == RuleRunOutcome::Cancelled {
                        break;
                    }
                }
            }
        }

        let verdict = ctx.verdict();
        let fired_rules = ctx.fired_rules().to_vec();
        let elapsed_ms = run_start.elapsed().as_secs_f64() * 1000.0;
        ExecutionResult {
            verdict,
            fired_rules,
            elapsed_ms,
            rule_traces: ctx.into_traces(),
            fallback_stats: self.fallback_stats.snapshot(),
        }
    }

    pub async fn reason_batch(&self, facts_list: Vec<BTreeMap<String, Value>>, cancel: Option<CancelHandle>) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(facts_list.len());
        for facts in facts_list {
            results.push(self.reason(facts, cancel.clone()).await);
        }
        results
    }

    /// Evaluates and (if true) applies one rule's actions.
    async fn run_rule(&self, rule: &Rule, ctx: &mut ExecutionContext, token: &ReasonToken) -> RuleRunOutcome {
        let span = tracing::debug_span!("rule_engine.rule", rule_id = %rule.id, priority = rule.priority);
        let _enter = span.enter();
        ctx.current_rule_id = Some(rule.id.clone());
        let start = Instant::now();

        let snapshot = ctx.enriched_facts().clone();
        let reader: &dyn crate::interpreter::FactReader = &snapshot;

        let (condition_result, field_reads, step_tree, error_note) = match self.interpreter.evaluate_bool(
            &rule.condition,
            &rule.condition_source,
            reader,
            token,
        ) {
            Ok((result, reads)) => (Some(result), reads, None, None),
            Err(EvalOutcome::Security(sec)) => {
                error!(rule_id = %rule.id, error = %sec, "security bound violated during condition evaluation");
                let cancelled = matches!(sec, SecurityError::Timeout { .. } | SecurityError::Cancelled);
                let trace = RuleTrace {
                    rule_id: rule.id.clone(),
                    priority: rule.priority,
                    condition_source: rule.condition_source.clone(),
                    condition_result: None,
                    outcome: RuleOutcome::Errored { message: sec.to_string() },
                    field_reads: vec![],
                    action_writes: vec![],
                    elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                    step_tree: None,
                    notes: vec![],
                };
                ctx.push_trace(trace);
                return if cancelled { RuleRunOutcome::Cancelled } else { RuleRunOutcome::NotFired };
            }
            Err(e) => match self.options.fallback_strategy {
                FallbackStrategy::Strict => {
                    debug!(rule_id = %rule.id, error = %e, "condition evaluation errored in strict mode");
                    let trace = RuleTrace {
                        rule_id: rule.id.clone(),
                        priority: rule.priority,
                        condition_source: rule.condition_source.clone(),
                        condition_result: None,
                        outcome: RuleOutcome::Errored { message: e.to_string() },
                        field_reads: vec![],
                        action_writes: vec![],
                        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                        step_tree: None,
                        notes: vec![],
                    };
                    ctx.push_trace(trace);
                    return RuleRunOutcome::NotFired;
                }
                FallbackStrategy::Auto => {
                    let fallback_result = self
                        .fallback
                        .prompt(
                            &rule.condition_source,
                            ReturnType::Bool,
                            self.options.oracle_max_tokens,
                            &snapshot,
                            Some(&rule.id),
                            &self.fallback_stats,
                            token,
                        )
                        .await;
                    debug!(rule_id = %rule.id, method = ?fallback_result.method_used, "condition routed to fallback evaluator");
                    (Some(fallback_result.value.is_truthy()), Default::default(), None, Some(e.to_string()))
                }
            },
        };

        let reads_list: Vec<FieldRead> = field_reads
            .iter()
            .map(|name| FieldRead { name: name.clone(), value: ctx.get_fact(name) })
            .collect();

        let fired = condition_result.unwrap_or(false);
        if !fired {
            let trace = RuleTrace {
                rule_id: rule.id.clone(),
                priority: rule.priority,
                condition_source: rule.condition_source.clone(),
                condition_result: Some(false),
                outcome: RuleOutcome::Skipped,
                field_reads: reads_list,
                action_writes: vec![],
                elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                step_tree,
                notes: error_note.into_iter().collect(),
            };
            ctx.push_trace(trace);
            return RuleRunOutcome::NotFired;
        }

        // Action staging: evaluate every action/fact value into an overlay first,
        // committing to enriched_facts only once every value has been produced.
        let mut overlay: Vec<(String, Value)> = Vec::new();
        let mut writes = Vec::new();
        let mut notes: Vec<String> = error_note.into_iter().collect();
        for (key, action_value) in rule.actions.iter().chain(rule.facts.iter()) {
            let current_snapshot: BTreeMap<String, Value> = snapshot
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .chain(overlay.iter().cloned())
                .collect();
            let (value, note) = apply_value(action_value, &self.interpreter, &current_snapshot, token);
            if let Some(n) = note {
                notes.push(format!("{key}: {n}"));
            }
            overlay.push((key.clone(), value));
        }

        for (key, value) in overlay {
            let before = ctx.set_fact(key.clone(), value.clone());
            writes.push(ActionWrite { key, before, after: value });
        }

        ctx.rule_fired(rule.id.clone());
        let trace = RuleTrace {
            rule_id: rule.id.clone(),
            priority: rule.priority,
            condition_source: rule.condition_source.clone(),
            condition_result: Some(true),
            outcome: RuleOutcome::Fired,
            field_reads: reads_list,
            action_writes: writes,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
            step_tree: None,
            notes,
        };
        ctx.push_trace(trace);
        RuleRunOutcome::Fired
    }
}

/// Builds a `Rule` from already-parsed pieces — `crate::loader` is responsible for
/// turning YAML into these arguments via `crate::condition::compile` and
/// `crate::actions::classify`.
pub fn build_rule(
    id: String,
    priority: i64,
    condition_spec: ConditionSpec,
    actions: Vec<(String, Value)>,
    facts: Vec<(String, Value)>,
    triggers: Vec<String>,
    tags: Vec<String>,
    description: Option<String>,
    enabled: bool,
) -> Result<Rule, EngineError> {
    let condition_source = compile(&condition_spec).map_err(EngineError::Compilation)?;
    let condition = crate::parser::parse_expression(&condition_source).map_err(EngineError::Parse)?;
    Ok(Rule {
        id,
        priority,
        condition,
        condition_source,
        actions: actions.into_iter().map(|(k, v)| (k, classify(&v))).collect(),
        facts: facts.into_iter().map(|(k, v)| (k, classify(&v))).collect(),
        triggers,
        tags,
        description,
        enabled,
    })
}
