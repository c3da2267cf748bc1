//! Dotted-path resolution over decoded JSON payloads.
//!
//! A path is a sequence of object keys separated by `.`. Array hops are
//! written either as a separate `[]` segment (`items.[].sku`) or glued to
//! the key (`items[].sku`). Each array hop consumes the next entry of the
//! caller's index vector, which is how root-array expansion points a path at
//! "the current element". `items[2]` or `items.2` selects an element
//! explicitly and consumes nothing.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
    Each,
}

fn segments(path: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    for raw in path.split('.').filter(|s| !s.is_empty()) {
        if raw == "[]" {
            out.push(Segment::Each);
            continue;
        }
        if let Some(name) = raw.strip_suffix("[]") {
            if !name.is_empty() {
                out.push(Segment::Key(name));
            }
            out.push(Segment::Each);
            continue;
        }
        if let Some(open) = raw.rfind('[') {
            if let Some(idx) = raw[open + 1..]
                .strip_suffix(']')
                .and_then(|n| n.parse::<usize>().ok())
            {
                if open > 0 {
                    out.push(Segment::Key(&raw[..open]));
                }
                out.push(Segment::Index(idx));
                continue;
            }
        }
        out.push(Segment::Key(raw));
    }
    out
}

/// Resolve `path` against `payload`, consuming `index` at each array hop.
///
/// Returns `None` when a hop hits a scalar, a missing key, an out-of-range
/// element, or when the index vector runs out.
pub fn resolve<'a>(payload: &'a Value, path: &str, index: &[usize]) -> Option<&'a Value> {
    let mut cursor = payload;
    let mut pending = index.iter();

    for segment in segments(path) {
        cursor = match (cursor, segment) {
            (Value::Array(items), Segment::Index(i)) => items.get(i)?,
            (Value::Array(items), Segment::Key(k)) => match k.parse::<usize>() {
                Ok(i) => items.get(i)?,
                // a named hop over an array stands in for the element marker
                Err(_) => items.get(*pending.next()?)?,
            },
            (Value::Array(items), Segment::Each) => items.get(*pending.next()?)?,
            (Value::Object(map), Segment::Key(k)) => map.get(k)?,
            _ => return None,
        };
    }

    Some(cursor)
}

/// String form of a value the way loosely-typed payload producers render it:
/// integral numbers without a fraction, arrays comma-joined, objects opaque.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (None, Some(u), _) => u.to_string(),
            (None, None, Some(f)) => f.to_string(),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| if v.is_null() { String::new() } else { display_value(v) })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Loose truthiness: `null`, `false`, `0`, and `""` are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
