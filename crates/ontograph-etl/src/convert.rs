//! Best-effort conversion of payload values to a key's declared data type.

use crate::path::display_value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use ontograph_schema::{Conversion, DataType};
use serde_json::Value;

/// Convert `value` for a key of type `data_type`.
///
/// Returns `None` when the value already has the right shape and nothing was
/// done. Otherwise the returned [`Conversion`] carries either a
/// `converted_value` or an `errors` message.
pub fn convert_value(data_type: DataType, value: Option<&Value>) -> Option<Conversion> {
    let original = match value {
        None | Some(Value::Null) => {
            return Some(failed(
                value.cloned().unwrap_or(Value::Null),
                "unable to convert value, value is null or undefined",
            ))
        }
        Some(Value::String(s)) if s == "null" => {
            return Some(failed(Value::String(s.clone()), "unable to convert value, value is null or undefined"))
        }
        Some(v) => v,
    };

    match data_type {
        DataType::Number => match original {
            Value::Number(_) => None,
            Value::String(s) => Some(match s.trim().parse::<f64>() {
                Ok(n) => match number(n) {
                    Some(v) => converted(original.clone(), v),
                    None => failed(original.clone(), "unable to convert value to number"),
                },
                Err(_) => failed(original.clone(), "unable to convert value to number"),
            }),
            _ => Some(failed(original.clone(), "unable to convert value to number")),
        },
        DataType::Date => Some(match original {
            Value::Number(n) => match n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()) {
                Some(dt) => converted(original.clone(), Value::String(rfc3339(dt))),
                None => failed(original.clone(), "unable to convert value to date, timestamp out of range"),
            },
            Value::String(s) => match parse_date(s) {
                Some(dt) => converted(original.clone(), Value::String(rfc3339(dt))),
                None => failed(original.clone(), format!("unable to convert value to date: `{s}`")),
            },
            _ => failed(original.clone(), "unable to convert value to date, value is not string or number"),
        }),
        DataType::String | DataType::Enumeration | DataType::File => match original {
            Value::String(_) => None,
            other => Some(converted(other.clone(), Value::String(display_value(other)))),
        },
        DataType::Boolean => match original {
            Value::Bool(_) => None,
            Value::String(s) => {
                let truthy = ["true", "TRUE", "True", "1"].iter().any(|t| s.contains(t));
                Some(converted(original.clone(), Value::Bool(truthy)))
            }
            Value::Number(n) => Some(converted(original.clone(), Value::Bool(n.as_f64() == Some(1.0)))),
            _ => Some(failed(
                original.clone(),
                "unable to convert boolean, must be a boolean, string, or number",
            )),
        },
        DataType::List => match original {
            Value::Array(_) => None,
            other => Some(converted(other.clone(), Value::Array(vec![other.clone()]))),
        },
        DataType::Unknown => None,
    }
}

fn converted(original_value: Value, value: Value) -> Conversion {
    Conversion {
        original_value,
        converted_value: Some(value),
        errors: None,
    }
}

fn failed(original_value: Value, reason: impl Into<String>) -> Conversion {
    Conversion {
        original_value,
        converted_value: None,
        errors: Some(reason.into()),
    }
}

fn number(n: f64) -> Option<Value> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        Some(Value::from(n as i64))
    } else {
        serde_json::Number::from_f64(n).map(Value::Number)
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
