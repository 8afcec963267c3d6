//! # Reserved Keywords
//!
//! A compile-time constant set, not a runtime singleton or registry lookup. Covers
//! language built-ins, literal keywords, and the built-in function names from
//! `crate::registry`, so construction can assert the two sets never collide (see
//! `crate::registry::Registry::new`).

/// Literal/syntax keywords that can never be a rule id, fact key, action key, or
/// registered function name.
pub const LANGUAGE_KEYWORDS: &[&str] = &[
    "true", "false", "null", "none", "and", "or", "not", "in", "is", "if", "else",
];

/// Names of the always-present built-in functions (see `crate::registry`). Kept as a
/// separate list (rather than merged into `LANGUAGE_KEYWORDS`) so `Registry::new`
/// can assert there is no accidental overlap between the two lists.
pub const BUILTIN_FUNCTION_NAMES: &[&str] = &[
    "len", "sum", "abs", "min", "max", "round", "startswith", "endswith", "contains",
    "upper", "lower", "trim", "str", "int", "float", "bool",
];

/// System field names that facts/rules may not shadow.
pub const SYSTEM_FIELD_NAMES: &[&str] = &["__rule_id__", "__priority__", "__fired__"];

pub fn is_reserved(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    LANGUAGE_KEYWORDS.contains(&lower.as_str())
        || BUILTIN_FUNCTION_NAMES.contains(&lower.as_str())
        || SYSTEM_FIELD_NAMES.contains(&lower.as_str())
}

/// A legal identifier: starts with a letter or underscore, continues with
/// alphanumerics/underscores. Dotted paths are not legal identifiers at this layer —
/// field access nesting, if ever added, is out of scope; there is no unification or
/// variable binding beyond simple field reads.
pub fn is_legal_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !name.is_empty() && chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_is_case_insensitive() {
        assert!(is_reserved("AND"));
        assert!(is_reserved("Len"));
        assert!(is_reserved("null"));
        assert!(!is_reserved("credit_score"));
    }

    #[test]
    fn identifier_legality() {
        assert!(is_legal_identifier("credit_score"));
        assert!(is_legal_identifier("_private"));
        assert!(!is_legal_identifier("2x"));
        assert!(!is_legal_identifier("has-dash"));
        assert!(!is_legal_identifier(""));
    }

    #[test]
    fn builtins_and_keywords_do_not_collide() {
        for name in BUILTIN_FUNCTION_NAMES {
            assert!(
                !LANGUAGE_KEYWORDS.contains(name),
                "builtin `{name}` collides with a language keyword"
            );
        }
    }
}
