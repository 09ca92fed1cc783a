//! Context-key `when` expressions.
//!
//! # Responsibility
//! - Compile serialized `when` clauses into evaluable predicates.
//! - Evaluate predicates against a snapshot of context-key values.
//!
//! # Invariants
//! - An absent or blank clause compiles to `ContextKeyExpr::True`.
//! - Compilation never fails; malformed regex terms compile to `False`.
//! - `||` binds looser than `&&`; there is no grouping syntax.

use log::warn;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::BTreeMap;

/// Snapshot of context-key values a predicate is evaluated against.
pub type ContextKeyValues = BTreeMap<String, Value>;

/// Compiled `when` predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKeyExpr {
    True,
    False,
    Defined(String),
    Not(String),
    Equals(String, String),
    NotEquals(String, String),
    Regex(ContextKeyRegex),
    And(Vec<ContextKeyExpr>),
    Or(Vec<ContextKeyExpr>),
}

/// `key =~ /pattern/flags` term.
#[derive(Debug, Clone)]
pub struct ContextKeyRegex {
    key: String,
    source: String,
    case_insensitive: bool,
    regex: Regex,
}

impl PartialEq for ContextKeyRegex {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.source == other.source
            && self.case_insensitive == other.case_insensitive
    }
}

impl Eq for ContextKeyRegex {}

impl ContextKeyExpr {
    /// Compiles one serialized clause.
    pub fn deserialize(raw: Option<&str>) -> Self {
        let Some(serialized) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return Self::True;
        };

        Self::or(serialized.split("||").map(deserialize_and).collect())
    }

    /// Builds a conjunction, folding constants and nested conjunctions.
    pub fn and(terms: Vec<ContextKeyExpr>) -> Self {
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                Self::True => {}
                Self::False => return Self::False,
                Self::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::True,
            1 => flat.remove(0),
            _ => Self::And(flat),
        }
    }

    /// Builds a disjunction, folding constants and nested disjunctions.
    pub fn or(terms: Vec<ContextKeyExpr>) -> Self {
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                Self::False => {}
                Self::True => return Self::True,
                Self::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::False,
            1 => flat.remove(0),
            _ => Self::Or(flat),
        }
    }

    pub fn evaluate(&self, context: &ContextKeyValues) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Defined(key) => context.get(key).is_some_and(is_truthy),
            Self::Not(key) => !context.get(key).is_some_and(is_truthy),
            Self::Equals(key, expected) => value_equals(context.get(key), expected),
            Self::NotEquals(key, expected) => !value_equals(context.get(key), expected),
            Self::Regex(term) => context
                .get(&term.key)
                .and_then(value_as_text)
                .is_some_and(|text| term.regex.is_match(&text)),
            Self::And(terms) => terms.iter().all(|term| term.evaluate(context)),
            Self::Or(terms) => terms.iter().any(|term| term.evaluate(context)),
        }
    }

    /// Renders the canonical serialized form.
    pub fn serialize(&self) -> String {
        match self {
            Self::True => "true".to_string(),
            Self::False => "false".to_string(),
            Self::Defined(key) => key.clone(),
            Self::Not(key) => format!("!{key}"),
            Self::Equals(key, value) => format!("{key} == '{value}'"),
            Self::NotEquals(key, value) => format!("{key} != '{value}'"),
            Self::Regex(term) => format!(
                "{} =~ /{}/{}",
                term.key,
                term.source,
                if term.case_insensitive { "i" } else { "" }
            ),
            Self::And(terms) => join_serialized(terms, " && "),
            Self::Or(terms) => join_serialized(terms, " || "),
        }
    }
}

fn deserialize_and(raw: &str) -> ContextKeyExpr {
    ContextKeyExpr::and(raw.split("&&").map(deserialize_one).collect())
}

fn deserialize_one(raw: &str) -> ContextKeyExpr {
    let serialized = raw.trim();

    if let Some((key, pattern)) = serialized.split_once("=~") {
        return deserialize_regex(key.trim(), pattern.trim());
    }
    if let Some((key, value)) = serialized.split_once("!=") {
        return ContextKeyExpr::NotEquals(key.trim().to_string(), unquote(value.trim()));
    }
    if let Some((key, value)) = serialized.split_once("==") {
        return ContextKeyExpr::Equals(key.trim().to_string(), unquote(value.trim()));
    }
    if let Some(key) = serialized.strip_prefix('!') {
        return ContextKeyExpr::Not(key.trim().to_string());
    }

    match serialized {
        "true" => ContextKeyExpr::True,
        "false" => ContextKeyExpr::False,
        key => ContextKeyExpr::Defined(key.to_string()),
    }
}

fn deserialize_regex(key: &str, literal: &str) -> ContextKeyExpr {
    let parsed = literal
        .strip_prefix('/')
        .and_then(|rest| rest.rfind('/').map(|end| (&rest[..end], &rest[end + 1..])));
    let Some((source, flags)) = parsed else {
        warn!(
            "event=when_compile module=contextkey status=error key={} error_code=regex_literal_invalid",
            key
        );
        return ContextKeyExpr::False;
    };

    let case_insensitive = flags.contains('i');
    match RegexBuilder::new(source)
        .case_insensitive(case_insensitive)
        .build()
    {
        Ok(regex) => ContextKeyExpr::Regex(ContextKeyRegex {
            key: key.to_string(),
            source: source.to_string(),
            case_insensitive,
            regex,
        }),
        Err(err) => {
            warn!(
                "event=when_compile module=contextkey status=error key={} error_code=regex_invalid error={}",
                key, err
            );
            ContextKeyExpr::False
        }
    }
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .unwrap_or(value)
        .to_string()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn value_equals(value: Option<&Value>, expected: &str) -> bool {
    value
        .and_then(value_as_text)
        .is_some_and(|text| text == expected)
}

fn join_serialized(terms: &[ContextKeyExpr], separator: &str) -> String {
    terms
        .iter()
        .map(ContextKeyExpr::serialize)
        .collect::<Vec<_>>()
        .join(separator)
}
