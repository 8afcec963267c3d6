//! # Trace Recorder
//!
//! Four trace levels: `None`, `Basic` (rule outcomes only), `Detailed` (adds field
//! reads/action writes), `Debug` (adds the interpreter's step tree). The ASCII-box
//! full renderer and the critical-path extraction follow the same
//! `format_trace`/`format_ir_tree` box-drawing convention used for pipeline
//! diagnostics elsewhere in this codebase; the compact one-line summary renderer is
//! this module's own addition in the same idiom.

use std::fmt::Write as _;

use crate::interpreter::Step;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TraceLevel {
    None,
    #[default]
    Basic,
    Detailed,
    Debug,
}

#[derive(Debug, Clone)]
pub struct FieldRead {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct ActionWrite {
    pub key: String,
    pub before: Option<Value>,
    pub after: Value,
}

#[derive(Debug, Clone)]
pub enum RuleOutcome {
    Fired,
    Skipped,
    Errored { message: String },
}

/// One rule's trace frame: id, priority, condition source, condition result, field
/// reads with values, action writes with before/after, elapsed time, error if any.
#[derive(Debug, Clone)]
pub struct RuleTrace {
    pub rule_id: String,
    pub priority: i64,
    pub condition_source: String,
    pub condition_result: Option<bool>,
    pub outcome: RuleOutcome,
    pub field_reads: Vec<FieldRead>,
    pub action_writes: Vec<ActionWrite>,
    pub elapsed_ms: f64,
    pub step_tree: Option<Step>,
    pub notes: Vec<String>,
}

impl RuleTrace {
    /// One paragraph for a fired rule, one terse line for a skipped/errored rule.
    pub fn explain(&self) -> String {
        match &self.outcome {
            RuleOutcome::Fired => {
                let writes: Vec<String> = self
                    .action_writes
                    .iter()
                    .map(|w| format!("{}={}", w.key, w.after))
                    .collect();
                format!(
                    "Rule `{}` (priority {}) fired: `{}` evaluated true in {:.3}ms, writing {{{}}}.",
                    self.rule_id,
                    self.priority,
                    self.condition_source,
                    self.elapsed_ms,
                    writes.join(", ")
                )
            }
            RuleOutcome::Skipped => format!(
                "Rule `{}` skipped: `{}` evaluated false.",
                self.rule_id, self.condition_source
            ),
            RuleOutcome::Errored { message } => {
                format!("Rule `{}` errored: {}.", self.rule_id, message)
            }
        }
    }
}

/// ASCII-box renderer for a full run.
pub fn render_trace(traces: &[RuleTrace]) -> String {
    let mut out = String::new();
    let width = 70usize;
    let _ = writeln!(out, "╔{}╗", "═".repeat(width));
    let _ = writeln!(out, "║ reasoning trace — {} rule(s) evaluated{:>pad$}║", traces.len(), "", pad = width.saturating_sub(28));
    let _ = writeln!(out, "╠{}╣", "═".repeat(width));
    for trace in traces {
        let _ = writeln!(out, "║ {}", trace.explain());
        if !trace.notes.is_empty() {
            for note in &trace.notes {
                let _ = writeln!(out, "║   note: {note}");
            }
        }
    }
    let _ = writeln!(out, "╚{}╝", "═".repeat(width));
    out
}

/// Compact one-line-per-rule summary, suited for log lines rather than reports.
pub fn render_summary(traces: &[RuleTrace]) -> String {
    traces
        .iter()
        .map(|t| {
            let tag = match &t.outcome {
                RuleOutcome::Fired => "FIRED",
                RuleOutcome::Skipped => "SKIP",
                RuleOutcome::Errored { .. } => "ERROR",
            };
            format!("{tag} {} ({:.2}ms)", t.rule_id, t.elapsed_ms)
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Structured dictionary output, indexable by rule id.
pub fn as_dict(traces: &[RuleTrace]) -> std::collections::BTreeMap<String, String> {
    traces.iter().map(|t| (t.rule_id.clone(), t.explain())).collect()
}

/// Extracts the critical path of a step tree: the minimal chain of steps that
/// determined a boolean outcome — for a short-circuited `and`/`or`, that is the path
/// down to the first deciding child rather than every evaluated branch.
pub fn critical_path(step: &Step) -> Vec<String> {
    let mut path = vec![step.operation.clone()];
    if let Some(last_deciding) = step.children.last() {
        path.extend(critical_path(last_deciding));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trace(outcome: RuleOutcome) -> RuleTrace {
        RuleTrace {
            rule_id: "r1".to_string(),
            priority: 10,
            condition_source: "x>0".to_string(),
            condition_result: Some(true),
            outcome,
            field_reads: vec![FieldRead { name: "x".to_string(), value: Value::Int(1) }],
            action_writes: vec![ActionWrite { key: "y".to_string(), before: None, after: Value::Int(1) }],
            elapsed_ms: 0.5,
            step_tree: None,
            notes: vec![],
        }
    }

    #[test]
    fn explains_fired_rule_as_paragraph() {
        let trace = sample_trace(RuleOutcome::Fired);
        let text = trace.explain();
        assert!(text.contains("fired"));
        assert!(text.contains("y=1"));
    }

    #[test]
    fn explains_skipped_rule_tersely() {
        let trace = sample_trace(RuleOutcome::Skipped);
        assert!(trace.explain().contains("skipped"));
    }

    #[test]
    fn renders_ascii_box() {
        let traces = vec![sample_trace(RuleOutcome::Fired)];
        let rendered = render_trace(&traces);
        assert!(rendered.contains('╔'));
        assert!(rendered.contains("r1"));
    }

    #[test]
    fn renders_compact_summary() {
        let traces = vec![sample_trace(RuleOutcome::Fired), sample_trace(RuleOutcome::Skipped)];
        let summary = render_summary(&traces);
        assert!(summary.contains("FIRED"));
        assert!(summary.contains("SKIP"));
        assert!(summary.contains('|'));
    }

    #[test]
    fn trace_level_ordering() {
        assert!(TraceLevel::None < TraceLevel::Basic);
        assert!(TraceLevel::Detailed < TraceLevel::Debug);
    }
}
