//! # Expression Parse Cache
//!
//! Parsing an expression string is memoized in a thread-safe LRU cache keyed by
//! source text, with bounded capacity. Built with the same `lru` + `parking_lot`
//! combination used elsewhere in the interpreter for timeout and scheduling state,
//! with a `CacheStats` counter struct in the same spirit as the other execution-layer
//! stats types in this crate.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::ast::Expr;

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Thread-safe LRU cache of parsed, whitelist-validated ASTs, keyed by source text.
pub struct ParseCache {
    inner: Mutex<LruCache<String, Expr>>,
    stats: Mutex<CacheStats>,
}

impl ParseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Returns a cached AST for `source`, or `None` on a miss. Every returned AST was
    /// validated against the node whitelist before insertion (`Expr` is itself a
    /// closed enum, so this validation is structural — see `crate::ast`).
    pub fn get(&self, source: &str) -> Option<Expr> {
        let mut inner = self.inner.lock();
        let hit = inner.get(source).cloned();
        let mut stats = self.stats.lock();
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    pub fn insert(&self, source: String, expr: Expr) {
        let mut inner = self.inner.lock();
        // `push` (unlike `put`) reports an entry evicted to make room, distinct from
        // replacing an existing entry under the same key.
        if let Some((evicted_key, _)) = inner.push(source.clone(), expr) {
            if evicted_key != source {
                self.stats.lock().evictions += 1;
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn miss_then_hit() {
        let cache = ParseCache::new(4);
        assert!(cache.get("x > 0").is_none());
        cache.insert("x > 0".to_string(), Expr::Literal(Value::Bool(true)));
        assert!(cache.get("x > 0").is_some());
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = ParseCache::new(2);
        cache.insert("a".to_string(), Expr::Literal(Value::Int(1)));
        cache.insert("b".to_string(), Expr::Literal(Value::Int(2)));
        cache.insert("c".to_string(), Expr::Literal(Value::Int(3)));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.stats().evictions, 1);
    }
}
