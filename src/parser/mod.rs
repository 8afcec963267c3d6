//! # Expression Parser
//!
//! A `pest`-generated recursive-descent parser over `expr.pest`, lowered into the
//! whitelisted `crate::ast::Expr` tree. Parsing never touches facts or the function
//! registry — it is a pure syntax-to-AST transform; identifier legality against the
//! registry/reserved set is checked later by the field extractor and validator.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::ast::{BinOp, BoolOpKind, CompareOp, Expr, UnaryOp};
use crate::error::ParseError;
use crate::value::Value;

#[derive(Parser)]
#[grammar = "parser/expr.pest"]
struct ExprParser;

/// Parses an expression source string into an `Expr` tree.
///
/// This is the only entry point into the grammar; callers needing ASTs for tests
/// typically prefer `crate::ast::builders::ExprBuilder` instead.
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let err = |message: String| ParseError {
        source_text: source.to_string(),
        message,
    };

    let mut pairs = ExprParser::parse(Rule::expression, source).map_err(|e| err(e.to_string()))?;
    let expression = pairs.next().ok_or_else(|| err("empty input".to_string()))?;
    let mut inner = expression.into_inner();
    let if_expr = inner
        .next()
        .ok_or_else(|| err("expected an expression".to_string()))?;
    build_if_expr(if_expr).map_err(err)
}

fn build_if_expr(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::if_expr);
    let mut inner = pair.into_inner();
    let test_or_value = inner.next().ok_or("if_expr: missing operand")?;
    let value = build_or_expr(test_or_value)?;

    match inner.next() {
        None => Ok(value),
        Some(body_branch) => {
            // `test if body ... else orelse` was matched left-to-right as
            // `or_expr kw_if or_expr kw_else if_expr`, but kw_if/kw_else are silent
            // keyword rules with no pair, so `inner` now yields the body's or_expr
            // directly followed by the orelse if_expr.
            let body = build_or_expr(body_branch)?;
            let orelse_pair = inner.next().ok_or("if_expr: missing else branch")?;
            let orelse = build_if_expr(orelse_pair)?;
            Ok(Expr::IfExp {
                test: Box::new(value),
                body: Box::new(body),
                orelse: Box::new(orelse),
            })
        }
    }
}

fn build_or_expr(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::or_expr);
    let parts: Vec<Expr> = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::and_expr)
        .map(build_and_expr)
        .collect::<Result<_, _>>()?;
    fold_bool_op(BoolOpKind::Or, parts)
}

fn build_and_expr(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::and_expr);
    let parts: Vec<Expr> = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::not_expr)
        .map(build_not_expr)
        .collect::<Result<_, _>>()?;
    fold_bool_op(BoolOpKind::And, parts)
}

fn fold_bool_op(op: BoolOpKind, mut values: Vec<Expr>) -> Result<Expr, String> {
    if values.len() == 1 {
        Ok(values.pop().expect("len checked"))
    } else {
        Ok(Expr::BoolOp { op, values })
    }
}

fn build_not_expr(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::not_expr);
    let text = pair.as_str();
    let mut inner = pair.into_inner();
    let child = inner.next().ok_or("not_expr: missing operand")?;
    if text.trim_start().starts_with("not") && child.as_rule() == Rule::not_expr {
        Ok(Expr::UnaryOp {
            op: UnaryOp::Not,
            operand: Box::new(build_not_expr(child)?),
        })
    } else {
        build_compare_expr(child)
    }
}

fn build_compare_expr(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::compare_expr);
    let mut inner = pair.into_inner();
    let left = build_add_expr(inner.next().ok_or("compare_expr: missing left operand")?)?;

    let mut ops = Vec::new();
    let mut comparators = Vec::new();
    let rest: Vec<Pair<Rule>> = inner.collect();
    let mut i = 0;
    while i < rest.len() {
        let op = parse_compare_op(&rest[i])?;
        let rhs = rest
            .get(i + 1)
            .ok_or("compare_expr: dangling comparison operator")?;
        let rhs_expr = build_add_expr(rhs.clone())?;
        ops.push(op);
        comparators.push(rhs_expr);
        i += 2;
    }

    if ops.is_empty() {
        Ok(left)
    } else {
        Ok(Expr::Compare {
            left: Box::new(left),
            ops,
            comparators,
        })
    }
}

fn parse_compare_op(pair: &Pair<Rule>) -> Result<CompareOp, String> {
    debug_assert_eq!(pair.as_rule(), Rule::compare_op);
    match pair.as_str().split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
        "==" => Ok(CompareOp::Eq),
        "!=" => Ok(CompareOp::Ne),
        "<=" => Ok(CompareOp::Le),
        ">=" => Ok(CompareOp::Ge),
        "<" => Ok(CompareOp::Lt),
        ">" => Ok(CompareOp::Gt),
        "in" => Ok(CompareOp::In),
        "not in" => Ok(CompareOp::NotIn),
        "is" => Ok(CompareOp::Is),
        "is not" => Ok(CompareOp::IsNot),
        other => Err(format!("unrecognized comparison operator `{other}`")),
    }
}

fn build_add_expr(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::add_expr);
    let mut inner = pair.into_inner();
    let mut acc = build_mul_expr(inner.next().ok_or("add_expr: missing left operand")?)?;
    let rest: Vec<Pair<Rule>> = inner.collect();
    let mut i = 0;
    while i < rest.len() {
        let op = match rest[i].as_rule() {
            Rule::add => BinOp::Add,
            Rule::sub => BinOp::Sub,
            other => return Err(format!("add_expr: unexpected node {other:?}")),
        };
        let rhs_pair = rest.get(i + 1).ok_or("add_expr: dangling operator")?;
        let rhs = build_mul_expr(rhs_pair.clone())?;
        acc = Expr::BinOp {
            op,
            left: Box::new(acc),
            right: Box::new(rhs),
        };
        i += 2;
    }
    Ok(acc)
}

fn build_mul_expr(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::mul_expr);
    let mut inner = pair.into_inner();
    let mut acc = build_unary_expr(inner.next().ok_or("mul_expr: missing left operand")?)?;
    let rest: Vec<Pair<Rule>> = inner.collect();
    let mut i = 0;
    while i < rest.len() {
        let op = match rest[i].as_rule() {
            Rule::mul => BinOp::Mul,
            Rule::div => BinOp::Div,
            Rule::modulo => BinOp::Mod,
            other => return Err(format!("mul_expr: unexpected node {other:?}")),
        };
        let rhs_pair = rest.get(i + 1).ok_or("mul_expr: dangling operator")?;
        let rhs = build_unary_expr(rhs_pair.clone())?;
        acc = Expr::BinOp {
            op,
            left: Box::new(acc),
            right: Box::new(rhs),
        };
        i += 2;
    }
    Ok(acc)
}

fn build_unary_expr(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::unary_expr);
    let mut signs = Vec::new();
    let mut operand_pair = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::plus => signs.push(UnaryOp::Plus),
            Rule::minus => signs.push(UnaryOp::Minus),
            Rule::power_expr => operand_pair = Some(p),
            other => return Err(format!("unary_expr: unexpected node {other:?}")),
        }
    }
    let mut expr = build_power_expr(operand_pair.ok_or("unary_expr: missing operand")?)?;
    for op in signs.into_iter().rev() {
        expr = Expr::UnaryOp {
            op,
            operand: Box::new(expr),
        };
    }
    Ok(expr)
}

fn build_power_expr(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::power_expr);
    let mut inner = pair.into_inner();
    let base = build_postfix_expr(inner.next().ok_or("power_expr: missing base")?)?;
    match inner.next() {
        None => Ok(base),
        // `**` is right-associative: `a ** b ** c` parses as `a ** (b ** c)`.
        Some(exponent_pair) => {
            let exponent = build_unary_expr(exponent_pair)?;
            Ok(Expr::BinOp {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            })
        }
    }
}

fn build_postfix_expr(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::postfix_expr);
    let mut inner = pair.into_inner();
    let mut expr = build_atom(inner.next().ok_or("postfix_expr: missing atom")?)?;
    for subscript in inner {
        debug_assert_eq!(subscript.as_rule(), Rule::subscript);
        let index_pair = subscript
            .into_inner()
            .next()
            .ok_or("subscript: missing index")?;
        let index = build_if_expr(index_pair)?;
        expr = Expr::Subscript {
            value: Box::new(expr),
            index: Box::new(index),
        };
    }
    Ok(expr)
}

fn build_atom(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::atom);
    let child = pair.into_inner().next().ok_or("atom: empty")?;
    match child.as_rule() {
        Rule::literal => build_literal(child),
        Rule::call => build_call(child),
        Rule::list => build_list(child),
        Rule::name => Ok(Expr::Name(child.into_inner().next().unwrap().as_str().to_string())),
        Rule::if_expr => build_if_expr(child),
        other => Err(format!("atom: unexpected node {other:?}")),
    }
}

fn build_call(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::call);
    let mut inner = pair.into_inner();
    let name = inner.next().ok_or("call: missing name")?.as_str().to_string();
    let args = inner.map(build_if_expr).collect::<Result<Vec<_>, _>>()?;
    Ok(Expr::Call { name, args })
}

fn build_list(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::list);
    let elements = pair
        .into_inner()
        .map(build_if_expr)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Expr::List(elements))
}

fn build_literal(pair: Pair<Rule>) -> Result<Expr, String> {
    debug_assert_eq!(pair.as_rule(), Rule::literal);
    let child = pair.into_inner().next().ok_or("literal: empty")?;
    let value = match child.as_rule() {
        Rule::boolean => Value::Bool(matches!(child.as_str(), "true" | "True")),
        Rule::null => Value::Null,
        Rule::number => {
            let text = child.as_str();
            if text.contains('.') || text.to_ascii_lowercase().contains('e') {
                Value::Float(text.parse().map_err(|_| format!("invalid number `{text}`"))?)
            } else {
                Value::Int(text.parse().map_err(|_| format!("invalid integer `{text}`"))?)
            }
        }
        Rule::string => {
            let raw = child.as_str();
            Value::String(unescape_string(&raw[1..raw.len() - 1]))
        }
        other => return Err(format!("literal: unexpected node {other:?}")),
    };
    Ok(Expr::Literal(value))
}

fn unescape_string(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}
