//! Query paths selecting a value out of a nested JSON document.
//!
//! The language is a subset of [JMESPath](https://jmespath.org):
//!
//! - `info.time`: field access, `"quoted name"` for odd keys, `@` for the current node;
//! - `inverter[0]`, `inverter[-1]`: indexing from the start or the end;
//! - `inverter[*].d.pac`: projection over all the elements;
//! - ``inverter[?sn==`58500MSU123X9876`]``: projection over the elements matching a predicate;
//! - ``[?a > `1` && !(b || c)]``: predicates combined with `&&`, `||`, `!`, and parentheses;
//! - `… | [0]`: pipe, which stops the projection on its left.
//!
//! Slices, multi-selects, functions, and flatten are not supported.

mod parser;

use std::{cmp::Ordering, fmt::{Display, Formatter}, str::FromStr};

use serde_json::Value;

pub use self::parser::ParseError;

/// Compiled query path.
#[must_use]
#[derive(Clone, Debug)]
pub struct Query {
    source: String,

    /// Chains separated by pipes.
    pipeline: Vec<Chain>,
}

impl Query {
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate the query against the document.
    ///
    /// Returns [`None`] when the path resolves to nothing: a missing key, an out-of-range
    /// index, or `null` on the way.
    pub fn search(&self, document: &Value) -> Result<Option<Value>, EvalError> {
        let mut pipeline = self.pipeline.iter();
        let Some(first) = pipeline.next() else {
            return Ok(None);
        };
        let mut value = first.evaluate(document)?;
        for chain in pipeline {
            value = chain.evaluate(&value)?;
        }
        Ok(if value.is_null() { None } else { Some(value) })
    }
}

impl FromStr for Query {
    type Err = ParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Ok(Self { source: source.to_owned(), pipeline: parser::parse(source)? })
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("cannot access field `{field}` of a non-object value")]
    NotAnObject { field: String },

    #[error("cannot index or project a non-array value")]
    NotAnArray,
}

#[derive(Clone, Debug)]
struct Chain(Vec<Step>);

impl Chain {
    fn evaluate(&self, value: &Value) -> Result<Value, EvalError> {
        evaluate(&self.0, value)
    }
}

#[derive(Clone, Debug)]
enum Step {
    Current,
    Field(String),
    Index(i64),
    Wildcard,
    Filter(Box<Predicate>),
}

#[derive(Clone, Debug)]
enum Predicate {
    /// Truthiness of the operand.
    Truthy(Operand),

    Compare(Operand, Comparator, Operand),
    Not(Box<Self>),
    And(Box<Self>, Box<Self>),
    Or(Box<Self>, Box<Self>),
}

impl Predicate {
    fn matches(&self, element: &Value) -> Result<bool, EvalError> {
        match self {
            Self::Truthy(operand) => Ok(is_truthy(&operand.resolve(element)?)),
            Self::Compare(lhs, comparator, rhs) => {
                Ok(comparator.test(&lhs.resolve(element)?, &rhs.resolve(element)?))
            }
            Self::Not(predicate) => Ok(!predicate.matches(element)?),
            Self::And(lhs, rhs) => Ok(lhs.matches(element)? && rhs.matches(element)?),
            Self::Or(lhs, rhs) => Ok(lhs.matches(element)? || rhs.matches(element)?),
        }
    }
}

#[derive(Clone, Debug)]
enum Operand {
    Literal(Value),
    Chain(Chain),
}

impl Operand {
    fn resolve(&self, element: &Value) -> Result<Value, EvalError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Chain(chain) => chain.evaluate(element),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Comparator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparator {
    fn test(self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            Self::Equal => json_eq(lhs, rhs),
            Self::NotEqual => !json_eq(lhs, rhs),
            Self::Less => json_cmp(lhs, rhs).is_some_and(Ordering::is_lt),
            Self::LessOrEqual => json_cmp(lhs, rhs).is_some_and(Ordering::is_le),
            Self::Greater => json_cmp(lhs, rhs).is_some_and(Ordering::is_gt),
            Self::GreaterOrEqual => json_cmp(lhs, rhs).is_some_and(Ordering::is_ge),
        }
    }
}

fn evaluate(steps: &[Step], value: &Value) -> Result<Value, EvalError> {
    let Some((step, rest)) = steps.split_first() else {
        return Ok(value.clone());
    };
    match step {
        Step::Current => evaluate(rest, value),
        Step::Field(name) => match value {
            Value::Object(object) => object.get(name).map_or(Ok(Value::Null), |value| evaluate(rest, value)),
            Value::Null => Ok(Value::Null),
            _ => Err(EvalError::NotAnObject { field: name.clone() }),
        },
        Step::Index(index) => match value {
            Value::Array(array) => resolve_index(array.len(), *index)
                .and_then(|index| array.get(index))
                .map_or(Ok(Value::Null), |element| evaluate(rest, element)),
            Value::Null => Ok(Value::Null),
            _ => Err(EvalError::NotAnArray),
        },
        Step::Wildcard => project(value, rest, |_| Ok(true)),
        Step::Filter(predicate) => project(value, rest, |element| predicate.matches(element)),
    }
}

/// Apply the rest of the chain to each array element, dropping the `null` results.
fn project(
    value: &Value,
    rest: &[Step],
    filter: impl Fn(&Value) -> Result<bool, EvalError>,
) -> Result<Value, EvalError> {
    match value {
        Value::Array(array) => {
            let mut projected = Vec::new();
            for element in array {
                if filter(element)? {
                    let value = evaluate(rest, element)?;
                    if !value.is_null() {
                        projected.push(value);
                    }
                }
            }
            Ok(Value::Array(projected))
        }
        Value::Null => Ok(Value::Null),
        _ => Err(EvalError::NotAnArray),
    }
}

fn resolve_index(len: usize, index: i64) -> Option<usize> {
    if index >= 0 {
        usize::try_from(index).ok()
    } else {
        len.checked_sub(usize::try_from(index.unsigned_abs()).ok()?)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(string) => !string.is_empty(),
        Value::Array(array) => !array.is_empty(),
        Value::Object(object) => !object.is_empty(),
        Value::Bool(true) | Value::Number(_) => true,
    }
}

/// Numbers compare by value regardless of their representation: `1 == 1.0`.
fn json_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(lhs), Value::Number(rhs)) => lhs.as_f64() == rhs.as_f64(),
        _ => lhs == rhs,
    }
}

fn json_cmp(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    lhs.as_f64()?.partial_cmp(&rhs.as_f64()?)
}
