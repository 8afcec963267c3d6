//! # Field Extractor
//!
//! Static analysis pass: walks an expression AST collecting every `Name`
//! identifier that is not reserved and does not match a registered function name.
//! Purely structural — no evaluation, no fact lookups. Results are cached per
//! expression source since the scheduler calls this once per rule per topo-sort and
//! rule sets are typically re-scheduled many times across `reason()` calls.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::ast::reserved::is_reserved;
use crate::ast::Expr;
use crate::registry::Registry;

#[derive(Default)]
pub struct FieldExtractor {
    cache: DashMap<String, Arc<HashSet<String>>>,
}

impl FieldExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the set of field names read by `expr`, excluding reserved keywords and
    /// names known to `registry` as functions. `source` is the cache key.
    pub fn fields(&self, source: &str, expr: &Expr, registry: &Registry) -> Arc<HashSet<String>> {
        if let Some(hit) = self.cache.get(source) {
            return Arc::clone(&hit);
        }
        let mut names = HashSet::new();
        walk(expr, registry, &mut names);
        let result = Arc::new(names);
        self.cache.insert(source.to_string(), Arc::clone(&result));
        result
    }
}

fn walk(expr: &Expr, registry: &Registry, out: &mut HashSet<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Name(name) => {
            if !is_reserved(name) && !registry.is_known(name) {
                out.insert(name.clone());
            }
        }
        Expr::UnaryOp { operand, .. } => walk(operand, registry, out),
        Expr::BinOp { left, right, .. } => {
            walk(left, registry, out);
            walk(right, registry, out);
        }
        Expr::BoolOp { values, .. } => values.iter().for_each(|v| walk(v, registry, out)),
        Expr::Compare { left, comparators, .. } => {
            walk(left, registry, out);
            comparators.iter().for_each(|c| walk(c, registry, out));
        }
        Expr::Call { args, .. } => args.iter().for_each(|a| walk(a, registry, out)),
        Expr::List(items) => items.iter().for_each(|i| walk(i, registry, out)),
        Expr::Subscript { value, index } => {
            walk(value, registry, out);
            walk(index, registry, out);
        }
        Expr::IfExp { test, body, orelse } => {
            walk(test, registry, out);
            walk(body, registry, out);
            walk(orelse, registry, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::ExprBuilder;

    #[test]
    fn collects_field_names() {
        let extractor = FieldExtractor::new();
        let registry = Registry::new();
        let expr = ExprBuilder::and(vec![
            ExprBuilder::gt(ExprBuilder::name("credit_score"), ExprBuilder::int(700)),
            ExprBuilder::ge(ExprBuilder::name("annual_income"), ExprBuilder::int(50_000)),
        ]);
        let fields = extractor.fields("credit_score > 700 and annual_income >= 50000", &expr, &registry);
        assert!(fields.contains("credit_score"));
        assert!(fields.contains("annual_income"));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn excludes_function_names_and_reserved_words() {
        let extractor = FieldExtractor::new();
        let registry = Registry::new();
        let expr = ExprBuilder::call("len", vec![ExprBuilder::name("tags")]);
        let fields = extractor.fields("len(tags)", &expr, &registry);
        assert!(fields.contains("tags"));
        assert!(!fields.contains("len"));
    }

    #[test]
    fn is_cached_by_source() {
        let extractor = FieldExtractor::new();
        let registry = Registry::new();
        let expr = ExprBuilder::name("x");
        let a = extractor.fields("x", &expr, &registry);
        let b = extractor.fields("x", &expr, &registry);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
