//! Condition evaluation for IAM policies
//!
//! Conditions narrow when a policy applies, based on the evaluation context:
//! - String operations (Equals, Like and their negated / case-insensitive forms)
//! - Bool
//! - Numeric operations (Equals, LessThan, GreaterThan, ...)
//! - Date operations (LessThan, GreaterThan; ISO 8601)
//!
//! Condition types live in a registry keyed by name, so deployments can add
//! their own with [`ConditionEvaluator::register`]. Expected values may refer
//! to context entries with `${key}` tokens, e.g. `mfs:/home/${authn::username}/*`.

use super::cache::PatternCache;
use super::pattern::WildcardSyntax;
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Context or expected value (string, number, or bool)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl ConditionValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ConditionValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ConditionValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConditionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::String(s) => f.write_str(s),
            ConditionValue::Number(n) => write!(f, "{}", n),
            ConditionValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::String(value.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        ConditionValue::String(value)
    }
}

impl From<f64> for ConditionValue {
    fn from(value: f64) -> Self {
        ConditionValue::Number(value)
    }
}

impl From<u64> for ConditionValue {
    fn from(value: u64) -> Self {
        ConditionValue::Number(value as f64)
    }
}

impl From<bool> for ConditionValue {
    fn from(value: bool) -> Self {
        ConditionValue::Bool(value)
    }
}

/// Right-hand side of a condition: a single value or a list of alternatives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedValue {
    One(ConditionValue),
    Many(Vec<ConditionValue>),
}

impl ExpectedValue {
    /// The alternatives as a slice (one element for scalars)
    pub fn values(&self) -> &[ConditionValue] {
        match self {
            ExpectedValue::One(value) => std::slice::from_ref(value),
            ExpectedValue::Many(values) => values,
        }
    }

    /// Replace `${var}` tokens in every string value
    pub fn resolve(&self, vars: &Context) -> Result<ExpectedValue, ResolveError> {
        let resolve_one = |value: &ConditionValue| match value {
            ConditionValue::String(s) => resolve(s, vars).map(ConditionValue::String),
            other => Ok(other.clone()),
        };

        match self {
            ExpectedValue::One(value) => resolve_one(value).map(ExpectedValue::One),
            ExpectedValue::Many(values) => values
                .iter()
                .map(resolve_one)
                .collect::<Result<Vec<_>, _>>()
                .map(ExpectedValue::Many),
        }
    }
}

impl From<ConditionValue> for ExpectedValue {
    fn from(value: ConditionValue) -> Self {
        ExpectedValue::One(value)
    }
}

impl From<&str> for ExpectedValue {
    fn from(value: &str) -> Self {
        ExpectedValue::One(value.into())
    }
}

impl From<String> for ExpectedValue {
    fn from(value: String) -> Self {
        ExpectedValue::One(value.into())
    }
}

impl From<bool> for ExpectedValue {
    fn from(value: bool) -> Self {
        ExpectedValue::One(value.into())
    }
}

impl From<f64> for ExpectedValue {
    fn from(value: f64) -> Self {
        ExpectedValue::One(value.into())
    }
}

impl From<Vec<ConditionValue>> for ExpectedValue {
    fn from(values: Vec<ConditionValue>) -> Self {
        ExpectedValue::Many(values)
    }
}

impl From<Vec<&str>> for ExpectedValue {
    fn from(values: Vec<&str>) -> Self {
        ExpectedValue::Many(values.into_iter().map(ConditionValue::from).collect())
    }
}

/// Evaluation context: key → value
pub type Context = HashMap<String, ConditionValue>;

/// Condition type → (context key → expected value), both in insertion order
pub type Conditions = IndexMap<String, IndexMap<String, ExpectedValue>>;

/// A named predicate over a context value
pub trait Condition: Send + Sync {
    /// True if `actual` satisfies `expected`
    fn fulfills(&self, actual: &ConditionValue, expected: &ExpectedValue) -> bool;
}

/// Exact string equality; a list means membership
pub struct StringEquals;

impl Condition for StringEquals {
    fn fulfills(&self, actual: &ConditionValue, expected: &ExpectedValue) -> bool {
        let Some(actual) = actual.as_string() else {
            return false;
        };
        expected
            .values()
            .iter()
            .any(|value| value.as_string() == Some(actual))
    }
}

/// Wildcard match (`*` any run, `?` one character) against the whole string
pub struct StringLike {
    patterns: PatternCache,
}

impl StringLike {
    pub fn new() -> Self {
        StringLike {
            patterns: PatternCache::new(256),
        }
    }
}

impl Default for StringLike {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition for StringLike {
    fn fulfills(&self, actual: &ConditionValue, expected: &ExpectedValue) -> bool {
        let Some(actual) = actual.as_string() else {
            return false;
        };
        expected.values().iter().any(|value| match value.as_string() {
            Some(pattern) => self.patterns.matches(pattern, WildcardSyntax::Shell, actual),
            None => false,
        })
    }
}

/// Strict boolean equality, no coercion
pub struct BoolEquals;

impl Condition for BoolEquals {
    fn fulfills(&self, actual: &ConditionValue, expected: &ExpectedValue) -> bool {
        let Some(actual) = actual.as_bool() else {
            return false;
        };
        expected
            .values()
            .iter()
            .any(|value| value.as_bool() == Some(actual))
    }
}

/// Direction of a date or numeric comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equals,
    LessThan,
    LessThanEquals,
    GreaterThan,
    GreaterThanEquals,
}

impl Comparison {
    fn holds<T: PartialOrd>(self, actual: T, expected: T) -> bool {
        match self {
            Comparison::Equals => actual == expected,
            Comparison::LessThan => actual < expected,
            Comparison::LessThanEquals => actual <= expected,
            Comparison::GreaterThan => actual > expected,
            Comparison::GreaterThanEquals => actual >= expected,
        }
    }
}

/// Compare ISO 8601 timestamps; unparsable input never matches
pub struct DateCompare(pub Comparison);

impl Condition for DateCompare {
    fn fulfills(&self, actual: &ConditionValue, expected: &ExpectedValue) -> bool {
        let Some(actual) = actual.as_string().and_then(parse_timestamp) else {
            return false;
        };
        expected.values().iter().any(|value| {
            value
                .as_string()
                .and_then(parse_timestamp)
                .map(|expected| self.0.holds(actual, expected))
                .unwrap_or(false)
        })
    }
}

/// Compare numbers; non-numbers never match
pub struct NumericCompare(pub Comparison);

impl Condition for NumericCompare {
    fn fulfills(&self, actual: &ConditionValue, expected: &ExpectedValue) -> bool {
        let Some(actual) = actual.as_number() else {
            return false;
        };
        expected.values().iter().any(|value| {
            value
                .as_number()
                .map(|expected| self.0.holds(actual, expected))
                .unwrap_or(false)
        })
    }
}

/// Inverts the wrapped condition
pub struct Not(pub Arc<dyn Condition>);

impl Condition for Not {
    fn fulfills(&self, actual: &ConditionValue, expected: &ExpectedValue) -> bool {
        !self.0.fulfills(actual, expected)
    }
}

/// Lower-cases string values on both sides before delegating
pub struct IgnoreCase(pub Arc<dyn Condition>);

impl Condition for IgnoreCase {
    fn fulfills(&self, actual: &ConditionValue, expected: &ExpectedValue) -> bool {
        let lower = |value: &ConditionValue| match value {
            ConditionValue::String(s) => ConditionValue::String(s.to_lowercase()),
            other => other.clone(),
        };
        let expected = match expected {
            ExpectedValue::One(value) => ExpectedValue::One(lower(value)),
            ExpectedValue::Many(values) => ExpectedValue::Many(values.iter().map(lower).collect()),
        };
        self.0.fulfills(&lower(actual), &expected)
    }
}

fn parse_timestamp(input: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(input)
        .or_else(|_| DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
}

/// Failure to expand `${var}` tokens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("failed to find end of variable token in '{0}'")]
    Unterminated(String),

    #[error("variable '{0}' is not given in context")]
    UnknownVariable(String),
}

/// Expand every `${key}` token in `input` from `vars`
///
/// Single forward scan: substituted text is never re-scanned, so a value
/// containing `${...}` is inserted literally.
pub fn resolve(input: &str, vars: &Context) -> Result<String, ResolveError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let token = &rest[start + 2..];
        let end = token
            .find('}')
            .ok_or_else(|| ResolveError::Unterminated(input.to_string()))?;
        let name = &token[..end];
        let value = vars
            .get(name)
            .ok_or_else(|| ResolveError::UnknownVariable(name.to_string()))?;
        output.push_str(&value.to_string());
        rest = &token[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

/// Result of evaluating a policy's conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionOutcome {
    Satisfied,
    /// First failing check, with a diagnostic reason
    Failed(String),
}

impl ConditionOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, ConditionOutcome::Satisfied)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ConditionOutcome::Satisfied => None,
            ConditionOutcome::Failed(reason) => Some(reason),
        }
    }
}

/// Registry of condition types
#[derive(Clone)]
pub struct ConditionEvaluator {
    types: HashMap<String, Arc<dyn Condition>>,
}

impl ConditionEvaluator {
    /// Evaluator with the built-in condition types registered
    pub fn new() -> Self {
        let mut evaluator = Self::empty();

        let equals: Arc<dyn Condition> = Arc::new(StringEquals);
        let equals_ignore_case: Arc<dyn Condition> = Arc::new(IgnoreCase(equals.clone()));
        let like: Arc<dyn Condition> = Arc::new(StringLike::new());

        evaluator.register("StringEquals", equals.clone());
        evaluator.register("StringNotEquals", Arc::new(Not(equals)));
        evaluator.register("StringEqualsIgnoreCase", equals_ignore_case.clone());
        evaluator.register("StringNotEqualsIgnoreCase", Arc::new(Not(equals_ignore_case)));
        evaluator.register("StringLike", like.clone());
        evaluator.register("StringNotLike", Arc::new(Not(like.clone())));
        evaluator.register("StringLikeIgnoreCase", Arc::new(IgnoreCase(like)));
        evaluator.register("Bool", Arc::new(BoolEquals));
        evaluator.register("DateGreaterThan", Arc::new(DateCompare(Comparison::GreaterThan)));
        evaluator.register("DateLessThan", Arc::new(DateCompare(Comparison::LessThan)));
        evaluator.register("NumericEquals", Arc::new(NumericCompare(Comparison::Equals)));
        evaluator.register("NumericLessThan", Arc::new(NumericCompare(Comparison::LessThan)));
        evaluator.register(
            "NumericLessThanEquals",
            Arc::new(NumericCompare(Comparison::LessThanEquals)),
        );
        evaluator.register(
            "NumericGreaterThan",
            Arc::new(NumericCompare(Comparison::GreaterThan)),
        );
        evaluator.register(
            "NumericGreaterThanEquals",
            Arc::new(NumericCompare(Comparison::GreaterThanEquals)),
        );

        evaluator
    }

    /// Evaluator without any condition types
    pub fn empty() -> Self {
        ConditionEvaluator {
            types: HashMap::new(),
        }
    }

    /// Add or replace a condition type
    pub fn register(&mut self, name: impl Into<String>, condition: Arc<dyn Condition>) {
        self.types.insert(name.into(), condition);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check every condition against `context`, stopping at the first failure
    pub fn evaluate(&self, context: &Context, conditions: &Conditions) -> ConditionOutcome {
        for (name, checks) in conditions {
            let Some(condition) = self.types.get(name) else {
                return ConditionOutcome::Failed(format!("unknown condition type '{}'", name));
            };

            for (field, expected) in checks {
                let Some(actual) = context.get(field) else {
                    return ConditionOutcome::Failed(format!(
                        "field '{}' is not given in context",
                        field
                    ));
                };

                let expected = match expected.resolve(context) {
                    Ok(resolved) => resolved,
                    Err(e) => return ConditionOutcome::Failed(e.to_string()),
                };

                if !condition.fulfills(actual, &expected) {
                    return ConditionOutcome::Failed(format!(
                        "'{}' evaluated to false for field '{}' and right hand side '{}'",
                        name,
                        field,
                        serde_json::to_string(&expected).unwrap_or_default()
                    ));
                }
            }
        }

        ConditionOutcome::Satisfied
    }
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionEvaluator")
            .field("types", &self.names())
            .finish()
    }
}
