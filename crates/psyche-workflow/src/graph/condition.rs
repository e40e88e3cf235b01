//! Boolean expressions guarding CONDITIONAL nodes.
//!
//! Evaluated against a node's merged input payload. Supported forms:
//! - `key == "value"`, `key != "value"` (unquoted literals compare as numbers or booleans)
//! - `key contains "substr"` (strings and arrays)
//! - `key > 0.5`, `key >= 0.5`, `key < 0.5`, `key <= 0.5`
//! - `exists key`, `not exists key`
//! - `a && b`, `a || b` (`&&` binds tighter, no parentheses)
//!
//! Dotted keys address nested objects (`features.sentiment`).
//! Unparseable expressions evaluate to `false`.

use std::collections::HashMap;

use serde_json::Value;

/// Evaluate `expr` against `context`.
pub fn evaluate_condition(expr: &str, context: &HashMap<String, Value>) -> bool {
    split_unquoted(expr, "||").into_iter().any(|clause| {
        split_unquoted(clause, "&&")
            .into_iter()
            .all(|term| evaluate_term(term.trim(), context))
    })
}

/// Check that an expression parses, without evaluating it.
pub fn is_well_formed(expr: &str) -> bool {
    split_unquoted(expr, "||")
        .into_iter()
        .flat_map(|clause| split_unquoted(clause, "&&"))
        .all(|term| parse_term(term.trim()).is_some())
}

/// Byte offset of the first `pat` outside a double-quoted literal.
fn find_unquoted(s: &str, pat: &str) -> Option<usize> {
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if !quoted && s[i..].starts_with(pat) {
            return Some(i);
        }
    }
    None
}

fn split_unquoted<'a>(s: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(i) = find_unquoted(rest, sep) {
        parts.push(&rest[..i]);
        rest = &rest[i + sep.len()..];
    }
    parts.push(rest);
    parts
}

#[derive(Debug, PartialEq)]
enum Term<'a> {
    Exists(&'a str),
    NotExists(&'a str),
    Compare { key: &'a str, op: Op, literal: &'a str, quoted: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Contains,
    Ne,
    Eq,
    Ge,
    Le,
    Gt,
    Lt,
}

// Longer operators first so `>=` is not read as `>`.
const OPERATORS: [(&str, Op); 7] = [
    (" contains ", Op::Contains),
    ("!=", Op::Ne),
    ("==", Op::Eq),
    (">=", Op::Ge),
    ("<=", Op::Le),
    (">", Op::Gt),
    ("<", Op::Lt),
];

fn parse_term(term: &str) -> Option<Term<'_>> {
    if term.is_empty() {
        return None;
    }
    if let Some(key) = term.strip_prefix("not exists ") {
        return valid_key(key.trim()).map(Term::NotExists);
    }
    if let Some(key) = term.strip_prefix("exists ") {
        return valid_key(key.trim()).map(Term::Exists);
    }

    for (token, op) in OPERATORS {
        if let Some(at) = find_unquoted(term, token) {
            let key = valid_key(term[..at].trim())?;
            let literal = term[at + token.len()..].trim();
            let quoted = literal.len() >= 2 && literal.starts_with('"') && literal.ends_with('"');
            let literal = if quoted {
                &literal[1..literal.len() - 1]
            } else {
                literal
            };
            if literal.is_empty() && !quoted {
                return None;
            }
            return Some(Term::Compare { key, op, literal, quoted });
        }
    }
    None
}

fn valid_key(key: &str) -> Option<&str> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-');
    ok.then_some(key)
}

fn evaluate_term(term: &str, context: &HashMap<String, Value>) -> bool {
    match parse_term(term) {
        Some(Term::Exists(key)) => lookup(context, key).is_some_and(|v| !v.is_null()),
        Some(Term::NotExists(key)) => lookup(context, key).map_or(true, Value::is_null),
        Some(Term::Compare { key, op, literal, quoted }) => match lookup(context, key) {
            Some(actual) => compare(actual, op, literal, quoted),
            None => op == Op::Ne,
        },
        None => false,
    }
}

/// Resolve a dotted key against the payload.
fn lookup<'a>(context: &'a HashMap<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(v) = context.get(key) {
        return Some(v);
    }
    let mut parts = key.split('.');
    let mut current = context.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn compare(actual: &Value, op: Op, literal: &str, quoted: bool) -> bool {
    match op {
        Op::Contains => match actual {
            Value::String(s) => s.contains(literal),
            Value::Array(items) => items.iter().any(|i| equals(i, literal, quoted)),
            _ => false,
        },
        Op::Eq => equals(actual, literal, quoted),
        Op::Ne => !equals(actual, literal, quoted),
        Op::Gt | Op::Ge | Op::Lt | Op::Le => {
            let (Some(a), Ok(b)) = (as_number(actual), literal.parse::<f64>()) else {
                return false;
            };
            match op {
                Op::Gt => a > b,
                Op::Ge => a >= b,
                Op::Lt => a < b,
                _ => a <= b,
            }
        }
    }
}

fn equals(actual: &Value, literal: &str, quoted: bool) -> bool {
    match actual {
        Value::String(s) => s == literal,
        Value::Number(_) if !quoted => match (as_number(actual), literal.parse::<f64>()) {
            (Some(a), Ok(b)) => (a - b).abs() < f64::EPSILON,
            _ => false,
        },
        Value::Bool(b) if !quoted => literal.parse::<bool>().is_ok_and(|l| l == *b),
        Value::Null => !quoted && literal == "null",
        _ => false,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_condition_equals() {
        let c = ctx(&[("language", json!("he"))]);
        assert!(evaluate_condition(r#"language == "he""#, &c));
        assert!(!evaluate_condition(r#"language == "en""#, &c));
        assert!(evaluate_condition(r#"language != "en""#, &c));
    }

    #[test]
    fn test_condition_contains() {
        let c = ctx(&[
            ("text", json!("I feel anxious today")),
            ("emotions", json!(["fear", "sadness"])),
        ]);
        assert!(evaluate_condition(r#"text contains "anxious""#, &c));
        assert!(evaluate_condition(r#"emotions contains "fear""#, &c));
        assert!(!evaluate_condition(r#"emotions contains "joy""#, &c));
    }

    #[test]
    fn test_condition_numeric() {
        let c = ctx(&[("sentiment_score", json!(-0.4)), ("count", json!("3"))]);
        assert!(evaluate_condition("sentiment_score < 0", &c));
        assert!(evaluate_condition("sentiment_score <= -0.4", &c));
        assert!(!evaluate_condition("sentiment_score > 0", &c));
        assert!(evaluate_condition("count >= 3", &c));
        assert!(evaluate_condition("count == 3", &c));
    }

    #[test]
    fn test_condition_bool_and_exists() {
        let c = ctx(&[("crisis", json!(false)), ("empty", Value::Null)]);
        assert!(evaluate_condition("crisis == false", &c));
        assert!(evaluate_condition("exists crisis", &c));
        assert!(!evaluate_condition("exists empty", &c));
        assert!(evaluate_condition("not exists empty", &c));
        assert!(evaluate_condition("not exists missing", &c));
    }

    #[test]
    fn test_condition_nested_keys() {
        let c = ctx(&[("features", json!({"sentiment": "negative", "scores": [0.1, 0.9]}))]);
        assert!(evaluate_condition(r#"features.sentiment == "negative""#, &c));
        assert!(evaluate_condition("features.scores.1 > 0.5", &c));
        assert!(!evaluate_condition("features.missing > 0.5", &c));
    }

    #[test]
    fn test_condition_combinators() {
        let c = ctx(&[("a", json!(1)), ("b", json!("x"))]);
        assert!(evaluate_condition(r#"a == 1 && b == "x""#, &c));
        assert!(!evaluate_condition(r#"a == 2 && b == "x""#, &c));
        assert!(evaluate_condition(r#"a == 2 || b == "x""#, &c));
        assert!(evaluate_condition(r#"a == 2 && b == "y" || a == 1"#, &c));
    }

    #[test]
    fn test_condition_operators_inside_quotes() {
        let c = ctx(&[
            ("text", json!("rock && roll")),
            ("mood", json!("a!=b")),
            ("note", json!("x || y < z")),
            ("phrase", json!("it contains == signs")),
        ]);
        assert!(evaluate_condition(r#"text contains "rock && roll""#, &c));
        assert!(evaluate_condition(r#"mood == "a!=b""#, &c));
        assert!(!evaluate_condition(r#"mood != "a!=b""#, &c));
        assert!(evaluate_condition(r#"note == "x || y < z""#, &c));
        assert!(evaluate_condition(r#"phrase contains " contains ==""#, &c));
        assert!(evaluate_condition(r#"mood == "zzz" || text contains "&&""#, &c));
        assert!(!evaluate_condition(r#"mood == "a!=b" && text == "rock""#, &c));

        assert!(is_well_formed(r#"text contains "rock && roll""#));
        assert!(is_well_formed(r#"mood == "a!=b" || note == "x || y""#));
    }

    #[test]
    fn test_condition_missing_key() {
        let c = HashMap::new();
        assert!(!evaluate_condition(r#"missing == "value""#, &c));
        assert!(evaluate_condition(r#"missing != "value""#, &c));
    }

    #[test]
    fn test_condition_invalid_expr() {
        let c = HashMap::new();
        assert!(!evaluate_condition("this is not valid", &c));
        assert!(!evaluate_condition("", &c));
        assert!(!is_well_formed("this is not valid"));
        assert!(!is_well_formed("a == 1 &&"));
        assert!(is_well_formed(r#"a == 1 && exists b || c contains "x""#));
    }
}
