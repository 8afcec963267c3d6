//! # Rule Reasoner
//!
//! A deterministic forward-chaining rule engine: rules fire in priority and
//! field-dependency order over a fact set, enrich it through staged actions, and
//! produce a verdict plus a full explainable trace of every rule considered.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use rule_reasoner::engine::{Engine, EngineOptions};
//! use rule_reasoner::loader::load_yaml_str;
//! use rule_reasoner::value::Value;
//!
//! # async fn run() -> Result<(), rule_reasoner::error::EngineError> {
//! let rules = load_yaml_str(r#"
//! rules:
//!   - id: high_value_customer
//!     condition: "annual_income > 100000 and credit_score >= 700"
//!     actions:
//!       tier: "premium"
//! "#)?;
//!
//! let mut engine = Engine::new(EngineOptions::default(), None);
//! engine.load_rules(rules)?;
//!
//! let facts: BTreeMap<String, Value> = [
//!     ("annual_income".to_string(), Value::Int(150_000)),
//!     ("credit_score".to_string(), Value::Int(720)),
//! ].into();
//! let result = engine.reason(facts, None).await;
//! assert_eq!(result.verdict.get("tier"), Some(&Value::String("premium".to_string())));
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod ast;
pub mod condition;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod field_extractor;
pub mod interpreter;
pub mod loader;
pub mod parser;
pub mod registry;
pub mod rule;
pub mod scheduler;
pub mod trace;
pub mod validator;
pub mod value;

pub use config::Config;
pub use engine::{Engine, EngineOptions, FallbackStrategy};
pub use error::EngineError;
pub use rule::Rule;
pub use trace::TraceLevel;
pub use value::Value;
