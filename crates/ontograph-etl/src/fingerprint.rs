//! Shape fingerprints.
//!
//! Two payloads with the same key names and the same per-key value types
//! hash identically, whatever their values and array lengths. Arrays are
//! leaves typed `list`; only the first element of an array of objects is
//! sampled, so its fields join the token set as well.
//!
//! ```text
//!   {"id": 1, "parts": [{"sku": "a"}, {"sku": "b"}]}
//!     → ["id:number", "parts:list", "sku:string"]
//!     → sort, concat, SHA-256, base64
//! ```

use crate::path::display_value;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest as _, Sha256};

/// Per-mapping knobs for the fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeHashOptions {
    /// Keys dropped (at any depth) before hashing.
    #[serde(default)]
    pub stop_nodes: Vec<String>,
    /// Keys whose value, not type, goes into the token.
    #[serde(default)]
    pub value_nodes: Vec<String>,
}

impl ShapeHashOptions {
    pub fn is_empty(&self) -> bool {
        self.stop_nodes.is_empty() && self.value_nodes.is_empty()
    }
}

pub fn shape_hash(payload: &Value) -> String {
    shape_hash_with(payload, &ShapeHashOptions::default())
}

pub fn shape_hash_with(payload: &Value, options: &ShapeHashOptions) -> String {
    let mut tokens = shape_tokens(payload, options);
    tokens.sort();

    let mut hasher = Sha256::new();
    for token in &tokens {
        hasher.update(token.as_bytes());
    }
    STANDARD.encode(hasher.finalize())
}

/// Unsorted `key:type` tokens for a payload.
pub fn shape_tokens(payload: &Value, options: &ShapeHashOptions) -> Vec<String> {
    let mut tokens = Vec::new();
    match payload {
        Value::Object(map) => collect(map, "", options, &mut tokens),
        Value::Array(items) => {
            tokens.push(":list".to_string());
            if let Some(Value::Object(first)) = items.first() {
                collect(first, "", options, &mut tokens);
            }
        }
        scalar => tokens.push(format!(":{}", type_token(scalar))),
    }
    tokens
}

fn collect(map: &Map<String, Value>, prefix: &str, options: &ShapeHashOptions, out: &mut Vec<String>) {
    for (key, value) in map {
        if options.stop_nodes.iter().any(|s| s == key) {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            Value::Object(inner) if !inner.is_empty() => collect(inner, &path, options, out),
            Value::Array(items) => {
                out.push(format!("{path}:list"));
                // element fields are recorded without the array's prefix
                if let Some(Value::Object(first)) = items.first() {
                    collect(first, "", options, out);
                }
            }
            leaf => {
                if options.value_nodes.iter().any(|v| v == key) {
                    out.push(format!("{path}:{}", display_value(leaf)));
                } else {
                    out.push(format!("{path}:{}", type_token(leaf)));
                }
            }
        }
    }
}

fn type_token(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "list",
        Value::Null | Value::Object(_) => "object",
    }
}
