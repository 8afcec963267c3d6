//! # Configuration
//!
//! Hierarchical configuration loading from:
//! - `engine.toml` (base configuration)
//! - `engine.local.toml` (local overrides, git-ignored)
//! - Environment variables (`RULES_` prefix, `__` nesting separator)
//!
//! ```toml
//! # engine.toml
//! [limits]
//! max_expression_length = 2000
//! max_recursion_depth = 64
//!
//! [fallback]
//! strategy = "auto"
//! oracle_max_tokens = 64
//! ```
//!
//! ```bash
//! RULES_LIMITS__MAX_RECURSION_DEPTH=128
//! RULES_FALLBACK__STRATEGY=strict
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::engine::{EngineOptions, FallbackStrategy};
use crate::interpreter::limits::EngineLimits;
use crate::trace::TraceLevel;
use crate::validator::ValidationMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_expression_length")]
    pub max_expression_length: usize,
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,
    #[serde(default = "default_max_evaluation_time_ms")]
    pub max_evaluation_time_ms: u64,
    #[serde(default = "default_max_oracle_cost")]
    pub max_oracle_cost: f64,
    #[serde(default = "default_expression_cache_size")]
    pub expression_cache_size: usize,
    #[serde(default = "default_max_pow_exponent")]
    pub max_pow_exponent: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FallbackStrategyConfig {
    Strict,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_strategy")]
    pub strategy: FallbackStrategyConfig,
    #[serde(default = "default_oracle_max_tokens")]
    pub oracle_max_tokens: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationModeConfig {
    Strict,
    Lenient,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevelConfig {
    None,
    Basic,
    Detailed,
    Debug,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default = "default_trace_level")]
    pub level: TraceLevelConfig,
    #[serde(default = "default_validation_mode")]
    pub validation_mode: ValidationModeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_max_expression_length() -> usize { 2_000 }
fn default_max_recursion_depth() -> usize { 64 }
fn default_max_evaluation_time_ms() -> u64 { 1_000 }
fn default_max_oracle_cost() -> f64 { 1.0 }
fn default_expression_cache_size() -> usize { 512 }
fn default_max_pow_exponent() -> i64 { 64 }
fn default_fallback_strategy() -> FallbackStrategyConfig { FallbackStrategyConfig::Strict }
fn default_oracle_max_tokens() -> u32 { 64 }
fn default_trace_level() -> TraceLevelConfig { TraceLevelConfig::Basic }
fn default_validation_mode() -> ValidationModeConfig { ValidationModeConfig::Strict }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_expression_length: default_max_expression_length(),
            max_recursion_depth: default_max_recursion_depth(),
            max_evaluation_time_ms: default_max_evaluation_time_ms(),
            max_oracle_cost: default_max_oracle_cost(),
            expression_cache_size: default_expression_cache_size(),
            max_pow_exponent: default_max_pow_exponent(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { strategy: default_fallback_strategy(), oracle_max_tokens: default_oracle_max_tokens() }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self { level: default_trace_level(), validation_mode: default_validation_mode() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: LimitsConfig::default(),
            fallback: FallbackConfig::default(),
            trace: TraceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the default locations: `engine.toml`, then
    /// `engine.local.toml`, then `RULES_`-prefixed environment variables, each
    /// layer overriding the previous one.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file("engine.toml"))
            .merge(Toml::file("engine.local.toml"))
            .merge(Env::prefixed("RULES_").split("__"))
            .extract()
    }

    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("RULES_").split("__"))
            .extract()
    }

    /// Converts parsed configuration into the `EngineOptions` the `Engine` expects.
    pub fn to_engine_options(&self) -> EngineOptions {
        EngineOptions {
            fallback_strategy: match self.fallback.strategy {
                FallbackStrategyConfig::Strict => FallbackStrategy::Strict,
                FallbackStrategyConfig::Auto => FallbackStrategy::Auto,
            },
            trace_level: match self.trace.level {
                TraceLevelConfig::None => TraceLevel::None,
                TraceLevelConfig::Basic => TraceLevel::Basic,
                TraceLevelConfig::Detailed => TraceLevel::Detailed,
                TraceLevelConfig::Debug => TraceLevel::Debug,
            },
            limits: EngineLimits {
                max_pow_exponent: self.limits.max_pow_exponent,
                ..EngineLimits::new(
                    self.limits.max_expression_length,
                    self.limits.max_recursion_depth,
                    self.limits.max_evaluation_time_ms,
                    self.limits.max_oracle_cost,
                    self.limits.expression_cache_size,
                )
            },
            oracle_max_tokens: self.fallback.oracle_max_tokens,
            validation_mode: match self.trace.validation_mode {
                ValidationModeConfig::Strict => ValidationMode::Strict,
                ValidationModeConfig::Lenient => ValidationMode::Lenient,
            },
        }
    }
}
