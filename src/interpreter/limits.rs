//! # Engine Limits
//!
//! Security bounds consolidated into one value, shared via `Arc` across the
//! Interpreter, Fallback Evaluator, and Scheduler.

/// Bounds enforced by the interpreter and fallback evaluator during a single
/// `reason()` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineLimits {
    pub max_expression_length: usize,
    pub max_recursion_depth: usize,
    pub max_evaluation_time_ms: u64,
    pub max_oracle_cost: f64,
    pub expression_cache_size: usize,
    /// Caps the magnitude of a `**` exponent.
    pub max_pow_exponent: i64,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_expression_length: 2_000,
            max_recursion_depth: 64,
            max_evaluation_time_ms: 1_000,
            max_oracle_cost: 1.0,
            expression_cache_size: 512,
            max_pow_exponent: 64,
        }
    }
}

impl EngineLimits {
    pub fn new(
        max_expression_length: usize,
        max_recursion_depth: usize,
        max_evaluation_time_ms: u64,
        max_oracle_cost: f64,
        expression_cache_size: usize,
    ) -> Self {
        Self {
            max_expression_length,
            max_recursion_depth,
            max_evaluation_time_ms,
            max_oracle_cost,
            expression_cache_size,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let limits = EngineLimits::default();
        assert!(limits.max_expression_length > 0);
        assert!(limits.max_recursion_depth > 0);
    }
}
