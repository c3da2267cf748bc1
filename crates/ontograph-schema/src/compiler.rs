//! Key schema compiler.
//!
//! A type's keys are compiled into a flat list of [`FieldDescriptor`]s which a
//! single generic validator interprets. Nothing is generated per type.
//!
//! ```text
//!   keys ──compile──▶ CompiledSchema { defaults, fields }
//!                         │
//!   payload ──apply──▶ inject defaults ─▶ structural decode ─▶ min/max/regex
//!                                          (SchemaMismatch)    (ValidationFailed)
//! ```

use crate::ontology::{DataType, PropertyKey};
use regex::Regex;
use serde_json::{Map, Value};

// ============================================================================
// Errors
// ============================================================================

/// One structural mismatch found while decoding a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    pub field: String,
    pub expected: String,
    pub found: String,
}

impl std::fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "field `{}`: expected {}, found {}",
            self.field, self.expected, self.found
        )
    }
}

/// One secondary-validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyViolation {
    pub key: String,
    pub reason: String,
}

impl std::fmt::Display for KeyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "key `{}`: {}", self.key, self.reason)
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    #[error("schema mismatch: {}", join(.mismatches))]
    SchemaMismatch { mismatches: Vec<FieldMismatch> },

    #[error("validation failed: {}", join(.violations))]
    ValidationFailed { violations: Vec<KeyViolation> },

    #[error("invalid validation pattern on key `{key}`: {message}")]
    InvalidPattern { key: String, message: String },
}

impl SchemaError {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, SchemaError::SchemaMismatch { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SchemaError::ValidationFailed { .. })
    }
}

// ============================================================================
// Field descriptors
// ============================================================================

/// Structural kind a field must decode as.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Number,
    String,
    Boolean,
    List,
    /// Closed set of string values.
    Enum(Vec<String>),
    Any,
}

impl FieldKind {
    fn for_key(key: &PropertyKey) -> Self {
        match key.data_type {
            DataType::Number => FieldKind::Number,
            DataType::String | DataType::Date => FieldKind::String,
            DataType::Boolean => FieldKind::Boolean,
            DataType::List => FieldKind::List,
            DataType::Enumeration => match &key.options {
                Some(options) if !options.is_empty() => FieldKind::Enum(options.clone()),
                _ => FieldKind::String,
            },
            DataType::File | DataType::Unknown => FieldKind::Any,
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Number => value.is_number(),
            FieldKind::String => value.is_string(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::List => value.is_array(),
            FieldKind::Enum(options) => value
                .as_str()
                .map_or(false, |s| options.iter().any(|o| o == s)),
            FieldKind::Any => true,
        }
    }

    fn describe(&self) -> String {
        match self {
            FieldKind::Number => "number".to_string(),
            FieldKind::String => "string".to_string(),
            FieldKind::Boolean => "boolean".to_string(),
            FieldKind::List => "list".to_string(),
            FieldKind::Enum(options) => format!("one of [{}]", options.join(", ")),
            FieldKind::Any => "any value".to_string(),
        }
    }
}

/// Compiled form of `validation`.
#[derive(Debug, Clone, Default)]
pub struct FieldValidation {
    pub pattern: Option<Regex>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub property_name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub validation: FieldValidation,
}

impl FieldDescriptor {
    fn check_bounds(&self, value: &Value) -> Option<String> {
        let (measure, what) = match value {
            Value::Number(n) => (n.as_f64()?, "value"),
            Value::String(s) => (s.chars().count() as f64, "length"),
            Value::Array(items) => (items.len() as f64, "length"),
            _ => return None,
        };

        if let Some(min) = self.validation.min {
            if measure < min {
                return Some(format!("{what} {measure} is below minimum {min}"));
            }
        }
        if let Some(max) = self.validation.max {
            if measure > max {
                return Some(format!("{what} {measure} is above maximum {max}"));
            }
        }
        None
    }

    fn check_pattern(&self, value: &Value) -> Option<String> {
        let pattern = self.validation.pattern.as_ref()?;
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if pattern.is_match(&text) {
            None
        } else {
            Some(format!("`{text}` does not match /{}/", pattern.as_str()))
        }
    }
}

// ============================================================================
// Compiled schema
// ============================================================================

/// Runtime validator for one set of keys.
#[derive(Debug, Clone, Default)]
pub struct CompiledSchema {
    defaults: Vec<(String, Value)>,
    fields: Vec<FieldDescriptor>,
}

impl CompiledSchema {
    pub fn compile(keys: &[PropertyKey]) -> Result<Self, SchemaError> {
        let mut defaults = Vec::new();
        let mut fields = Vec::with_capacity(keys.len());

        for key in keys {
            if let Some(default) = key.coerced_default() {
                defaults.push((key.property_name.clone(), default));
            }

            let validation = match &key.validation {
                Some(v) => FieldValidation {
                    pattern: v
                        .regex
                        .as_deref()
                        .filter(|p| !p.is_empty())
                        .map(Regex::new)
                        .transpose()
                        .map_err(|e| SchemaError::InvalidPattern {
                            key: key.property_name.clone(),
                            message: e.to_string(),
                        })?,
                    min: v.min,
                    max: v.max,
                },
                None => FieldValidation::default(),
            };

            fields.push(FieldDescriptor {
                property_name: key.property_name.clone(),
                kind: FieldKind::for_key(key),
                required: key.required,
                validation,
            });
        }

        Ok(Self { defaults, fields })
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Validate `payload`, returning it with defaults injected.
    ///
    /// Keys not described by the schema pass through untouched.
    pub fn apply(&self, payload: &Value) -> Result<Map<String, Value>, SchemaError> {
        let Some(input) = payload.as_object() else {
            return Err(SchemaError::SchemaMismatch {
                mismatches: vec![FieldMismatch {
                    field: String::new(),
                    expected: "object".to_string(),
                    found: type_name(Some(payload)).to_string(),
                }],
            });
        };

        let mut out = input.clone();
        for (name, default) in &self.defaults {
            if !out.contains_key(name) {
                out.insert(name.clone(), default.clone());
            }
        }

        let mismatches: Vec<FieldMismatch> = self
            .fields
            .iter()
            .filter_map(|field| {
                let value = out.get(&field.property_name);
                let ok = match value {
                    None | Some(Value::Null) => !field.required,
                    Some(v) => field.kind.accepts(v),
                };
                (!ok).then(|| FieldMismatch {
                    field: field.property_name.clone(),
                    expected: field.kind.describe(),
                    found: match value {
                        Some(Value::String(s)) if matches!(field.kind, FieldKind::Enum(_)) => {
                            format!("\"{s}\"")
                        }
                        other => type_name(other).to_string(),
                    },
                })
            })
            .collect();
        if !mismatches.is_empty() {
            return Err(SchemaError::SchemaMismatch { mismatches });
        }

        let mut violations = Vec::new();
        for field in &self.fields {
            let Some(value) = out.get(&field.property_name).filter(|v| !v.is_null()) else {
                continue;
            };
            for reason in [field.check_bounds(value), field.check_pattern(value)]
                .into_iter()
                .flatten()
            {
                violations.push(KeyViolation {
                    key: field.property_name.clone(),
                    reason,
                });
            }
        }
        if !violations.is_empty() {
            return Err(SchemaError::ValidationFailed { violations });
        }

        Ok(out)
    }
}

fn type_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "nothing",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "list",
        Some(Value::Object(_)) => "object",
    }
}

/// Compile `keys` and validate `payload` in one step.
pub fn validate(keys: &[PropertyKey], payload: &Value) -> Result<Map<String, Value>, SchemaError> {
    CompiledSchema::compile(keys)?.apply(payload)
}
