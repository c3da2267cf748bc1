//! Ontology records: property keys, metatypes, relationships and relationship pairs.
//!
//! These are plain data. The only behaviour attached here is key management
//! (`add_key` / `remove_key` / `replace_keys`) and the shortcut to compile a
//! type's keys into a [`CompiledSchema`](crate::compiler::CompiledSchema).

use crate::compiler::{CompiledSchema, SchemaError};
use crate::diff::{diff_by_id, Identified, SetDiff};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of any persisted record (UUID text in practice).
pub type Id = String;

// ============================================================================
// Property keys
// ============================================================================

/// Declared data type of a property key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Number,
    Date,
    String,
    Boolean,
    Enumeration,
    File,
    List,
    /// Anything we do not recognise. Accepts any value.
    #[serde(other)]
    Unknown,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Number => "number",
            DataType::Date => "date",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Enumeration => "enumeration",
            DataType::File => "file",
            DataType::List => "list",
            DataType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secondary constraints checked after the structural decode succeeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl KeyValidation {
    pub fn is_empty(&self) -> bool {
        self.regex.is_none() && self.min.is_none() && self.max.is_none()
    }
}

/// A property definition owned by exactly one metatype or relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub name: String,
    /// Field name inside a record's `properties` object.
    pub property_name: String,
    #[serde(default)]
    pub description: String,
    pub data_type: DataType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<KeyValidation>,
    #[serde(default)]
    pub archived: bool,
}

impl PropertyKey {
    pub fn new(
        name: impl Into<String>,
        property_name: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            property_name: property_name.into(),
            description: String::new(),
            data_type,
            required: false,
            options: None,
            default_value: None,
            validation: None,
            archived: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_validation(mut self, validation: KeyValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    /// The default value coerced to this key's data type, if one is set.
    ///
    /// Defaults are stored as text by most tooling, so a numeric key turns
    /// `"12"` into `12` and a boolean key reads `"true"` / `"t"` as true and
    /// anything else as false. Everything else is copied as-is.
    pub fn coerced_default(&self) -> Option<Value> {
        let raw = self.default_value.as_ref()?;
        if raw.is_null() {
            return None;
        }

        let coerced = match (self.data_type, raw) {
            (DataType::Number, Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(n) => number_value(n).unwrap_or_else(|| raw.clone()),
                Err(_) => raw.clone(),
            },
            (DataType::Boolean, Value::String(s)) => Value::Bool(s == "true" || s == "t"),
            (DataType::Boolean, Value::Bool(b)) => Value::Bool(*b),
            (DataType::Boolean, _) => Value::Bool(false),
            _ => raw.clone(),
        };
        Some(coerced)
    }
}

/// Build a JSON number, keeping integral values as integers.
pub(crate) fn number_value(n: f64) -> Option<Value> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        Some(Value::from(n as i64))
    } else {
        serde_json::Number::from_f64(n).map(Value::Number)
    }
}

impl Identified for PropertyKey {
    fn identity(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

pub type MetatypeKey = PropertyKey;
pub type MetatypeRelationshipKey = PropertyKey;

// ============================================================================
// Metatypes and relationships
// ============================================================================

/// A node type: a name plus its property keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metatype {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default)]
    pub container_id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keys: Vec<MetatypeKey>,
    #[serde(default)]
    pub archived: bool,
}

/// An edge label: a name plus the properties an edge of this type carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetatypeRelationship {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default)]
    pub container_id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keys: Vec<MetatypeRelationshipKey>,
    #[serde(default)]
    pub archived: bool,
}

macro_rules! keyed_type {
    ($ty:ty) => {
        impl $ty {
            pub fn new(
                container_id: impl Into<Id>,
                name: impl Into<String>,
                description: impl Into<String>,
            ) -> Self {
                Self {
                    id: None,
                    container_id: container_id.into(),
                    name: name.into(),
                    description: description.into(),
                    keys: Vec::new(),
                    archived: false,
                }
            }

            pub fn with_id(mut self, id: impl Into<Id>) -> Self {
                self.id = Some(id.into());
                self
            }

            pub fn add_key(&mut self, key: PropertyKey) {
                self.keys.push(key);
            }

            /// Remove the key with the given id, returning it.
            pub fn remove_key(&mut self, key_id: &str) -> Option<PropertyKey> {
                let pos = self
                    .keys
                    .iter()
                    .position(|k| k.id.as_deref() == Some(key_id))?;
                Some(self.keys.remove(pos))
            }

            /// Replace the full key set and report what was added and removed.
            pub fn replace_keys(&mut self, keys: Vec<PropertyKey>) -> SetDiff<PropertyKey> {
                let diff = diff_by_id(&self.keys, &keys);
                self.keys = keys;
                diff
            }

            pub fn key_by_property(&self, property_name: &str) -> Option<&PropertyKey> {
                self.keys.iter().find(|k| k.property_name == property_name)
            }

            /// Compile the current (non-archived) keys. Recompute after any key change.
            pub fn compile_schema(&self) -> Result<CompiledSchema, SchemaError> {
                let live: Vec<PropertyKey> =
                    self.keys.iter().filter(|k| !k.archived).cloned().collect();
                CompiledSchema::compile(&live)
            }

            /// Validate and default a properties object against this type's keys.
            pub fn validate_properties(&self, input: &Value) -> Result<Map<String, Value>, SchemaError> {
                self.compile_schema()?.apply(input)
            }
        }

        impl Identified for $ty {
            fn identity(&self) -> Option<&str> {
                self.id.as_deref()
            }
        }
    };
}

keyed_type!(Metatype);
keyed_type!(MetatypeRelationship);

// ============================================================================
// Relationship pairs
// ============================================================================

/// How many edges of a pair may touch a given endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "one:one")]
    OneToOne,
    #[serde(rename = "one:many")]
    OneToMany,
    #[serde(rename = "many:one")]
    ManyToOne,
    #[default]
    #[serde(rename = "many:many")]
    ManyToMany,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::OneToOne => "one:one",
            Cardinality::OneToMany => "one:many",
            Cardinality::ManyToOne => "many:one",
            Cardinality::ManyToMany => "many:many",
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, cardinality-constrained allowed relationship between two metatypes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetatypeRelationshipPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default)]
    pub container_id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub origin_metatype_id: Id,
    pub destination_metatype_id: Id,
    pub relationship_id: Id,
    #[serde(default)]
    pub relationship_type: Cardinality,
    #[serde(default)]
    pub archived: bool,
}

impl MetatypeRelationshipPair {
    pub fn new(
        container_id: impl Into<Id>,
        name: impl Into<String>,
        origin_metatype_id: impl Into<Id>,
        destination_metatype_id: impl Into<Id>,
        relationship_id: impl Into<Id>,
        relationship_type: Cardinality,
    ) -> Self {
        Self {
            id: None,
            container_id: container_id.into(),
            name: name.into(),
            description: String::new(),
            origin_metatype_id: origin_metatype_id.into(),
            destination_metatype_id: destination_metatype_id.into(),
            relationship_id: relationship_id.into(),
            relationship_type,
            archived: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A whole ontology in one document, as exported by ontology tooling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OntologySnapshot {
    #[serde(default)]
    pub metatypes: Vec<Metatype>,
    #[serde(default)]
    pub relationships: Vec<MetatypeRelationship>,
    #[serde(default)]
    pub pairs: Vec<MetatypeRelationshipPair>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_data_type_deserializes() {
        let key: PropertyKey = serde_json::from_value(json!({
            "name": "blob",
            "property_name": "blob",
            "data_type": "geometry"
        }))
        .unwrap();
        assert_eq!(key.data_type, DataType::Unknown);
        assert!(!key.required);
    }

    #[test]
    fn cardinality_uses_colon_names() {
        let pair: MetatypeRelationshipPair = serde_json::from_value(json!({
            "name": "owns",
            "origin_metatype_id": "a",
            "destination_metatype_id": "b",
            "relationship_id": "r",
            "relationship_type": "many:one"
        }))
        .unwrap();
        assert_eq!(pair.relationship_type, Cardinality::ManyToOne);
        assert_eq!(
            serde_json::to_value(Cardinality::OneToMany).unwrap(),
            json!("one:many")
        );
    }

    #[test]
    fn defaults_coerce_by_type() {
        let n = PropertyKey::new("n", "n", DataType::Number).with_default("42");
        assert_eq!(n.coerced_default(), Some(json!(42)));

        let f = PropertyKey::new("f", "f", DataType::Number).with_default("1.5");
        assert_eq!(f.coerced_default(), Some(json!(1.5)));

        let t = PropertyKey::new("b", "b", DataType::Boolean).with_default("t");
        assert_eq!(t.coerced_default(), Some(json!(true)));

        let no = PropertyKey::new("b", "b", DataType::Boolean).with_default("yes");
        assert_eq!(no.coerced_default(), Some(json!(false)));

        let s = PropertyKey::new("s", "s", DataType::String).with_default("12");
        assert_eq!(s.coerced_default(), Some(json!("12")));

        let none = PropertyKey::new("s", "s", DataType::String).with_default(Value::Null);
        assert_eq!(none.coerced_default(), None);
    }

    #[test]
    fn replace_keys_reports_diff() {
        let mut metatype = Metatype::new("c1", "Car", "a car");
        metatype.add_key(PropertyKey::new("id", "id", DataType::String).with_id("k1"));
        metatype.add_key(PropertyKey::new("name", "name", DataType::String).with_id("k2"));

        let diff = metatype.replace_keys(vec![
            PropertyKey::new("name", "name", DataType::String).with_id("k2"),
            PropertyKey::new("vin", "vin", DataType::String),
        ]);

        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].id.as_deref(), Some("k1"));
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].property_name, "vin");
        assert_eq!(metatype.keys.len(), 2);
    }

    #[test]
    fn remove_key_by_id() {
        let mut rel = MetatypeRelationship::new("c1", "owns", "");
        rel.add_key(PropertyKey::new("since", "since", DataType::Date).with_id("k1"));
        assert!(rel.remove_key("missing").is_none());
        assert_eq!(rel.remove_key("k1").map(|k| k.name), Some("since".to_string()));
        assert!(rel.keys.is_empty());
    }
}
