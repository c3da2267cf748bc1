//! Transformation conditions.
//!
//! A condition compares the value at `key` with `value`. Its subexpressions
//! are folded into the running result left to right: an `OR` entry is only
//! consulted while the result is false, an `AND` entry only while it is true.
//! This is a sequential fold, not a boolean tree; `a OR b AND c` reads as
//! `(a OR b) AND c`.

use crate::path::{display_value, is_truthy, resolve};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expression {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expression>,
    pub key: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subexpressions: Vec<Condition>,
}

impl Condition {
    pub fn new(key: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            expression: None,
            key: key.into(),
            operator,
            value: value.into(),
            subexpressions: Vec::new(),
        }
    }

    pub fn and(mut self, sub: Condition) -> Self {
        self.subexpressions.push(Condition {
            expression: Some(Expression::And),
            ..sub
        });
        self
    }

    pub fn or(mut self, sub: Condition) -> Self {
        self.subexpressions.push(Condition {
            expression: Some(Expression::Or),
            ..sub
        });
        self
    }

    /// Evaluate this condition as a root condition.
    ///
    /// An unresolved or falsy value at `key` makes the result false before any
    /// comparison runs, so `key == 0` or `key == false` never matches here.
    pub fn evaluate(&self, payload: &Value, index: &[usize]) -> bool {
        match resolve(payload, &self.key, index) {
            Some(v) if is_truthy(v) => self.fold(Some(v), payload, index),
            _ => false,
        }
    }

    fn evaluate_nested(&self, payload: &Value, index: &[usize]) -> bool {
        let value = resolve(payload, &self.key, index);
        self.fold(value, payload, index)
    }

    fn fold(&self, value: Option<&Value>, payload: &Value, index: &[usize]) -> bool {
        let mut result = compare(self.operator, value, &self.value);
        for sub in &self.subexpressions {
            match sub.expression {
                Some(Expression::Or) if !result => result = sub.evaluate_nested(payload, index),
                Some(Expression::And) if result => result = sub.evaluate_nested(payload, index),
                _ => {}
            }
        }
        result
    }
}

/// True when the list is empty or any condition holds.
pub fn any_condition_holds(conditions: &[Condition], payload: &Value, index: &[usize]) -> bool {
    conditions.is_empty() || conditions.iter().any(|c| c.evaluate(payload, index))
}

/// Apply `operator` to an actual (possibly unresolved) value and the expected one.
pub fn compare(operator: Operator, actual: Option<&Value>, expected: &Value) -> bool {
    match operator {
        Operator::Exists => actual.is_some(),
        Operator::Eq => actual.map_or(false, |a| same(a, expected)),
        Operator::Ne => actual.map_or(true, |a| !same(a, expected)),
        Operator::In => {
            let Some(actual) = actual else { return false };
            match expected {
                Value::String(list) => {
                    let needle = match actual {
                        Value::String(s) => s.clone(),
                        other => display_value(other),
                    };
                    list.split(',').any(|candidate| candidate == needle)
                }
                Value::Array(items) => items.iter().any(|item| same(actual, item)),
                _ => false,
            }
        }
        Operator::Contains => actual.map_or(false, |a| {
            display_value(a).contains(display_value(expected).as_str())
        }),
        Operator::Gt => order(actual, expected).map_or(false, |o| o == Ordering::Greater),
        Operator::Lt => order(actual, expected).map_or(false, |o| o == Ordering::Less),
        Operator::Ge => order(actual, expected).map_or(false, |o| o != Ordering::Less),
        Operator::Le => order(actual, expected).map_or(false, |o| o != Ordering::Greater),
    }
}

/// Strict equality, except that two numbers compare by value (`5.0 == 5`).
fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Numbers compare numerically, two strings lexically, anything else after
/// numeric coercion. Incomparable pairs have no order.
fn order(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    let actual = actual?;
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            let a = as_number(actual)?;
            let b = as_number(expected)?;
            a.partial_cmp(&b)
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null => 0.0,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Array(_) | Value::Object(_) => return None,
    };
    (!n.is_nan()).then_some(n)
}
