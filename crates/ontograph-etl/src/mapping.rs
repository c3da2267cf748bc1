//! Type mappings and the transformation records they hold.

use crate::condition::Condition;
use crate::error::EtlError;
use crate::fingerprint::{shape_hash_with, ShapeHashOptions};
use chrono::{DateTime, Utc};
use ontograph_schema::{diff_by_id, EdgeConnectionParameter, Id, Identified, SetDiff};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Configuration
// ============================================================================

/// What a transformation does when a key cannot be extracted or converted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorAction {
    /// Skip the key.
    #[default]
    #[serde(rename = "ignore")]
    Ignore,
    /// Fail the branch if the target key is required, otherwise skip it.
    #[serde(rename = "fail on required")]
    FailOnRequired,
    /// Fail the branch.
    #[serde(rename = "fail")]
    Fail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationConfig {
    #[serde(default)]
    pub on_key_extraction_error: ErrorAction,
    #[serde(default)]
    pub on_conversion_error: ErrorAction,
    /// Convert values to the target key's data type before routing them.
    #[serde(default)]
    pub convert_values: bool,
}

// ============================================================================
// Transformations
// ============================================================================

/// Routes one payload value, or a constant, to one destination key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    /// Payload path. When set, it wins over `value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metatype_key_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metatype_relationship_key_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl KeyMapping {
    pub fn metatype(key: impl Into<String>, metatype_key_id: impl Into<Id>) -> Self {
        Self {
            key: Some(key.into()),
            metatype_key_id: Some(metatype_key_id.into()),
            ..Default::default()
        }
    }

    pub fn relationship(key: impl Into<String>, relationship_key_id: impl Into<Id>) -> Self {
        Self {
            key: Some(key.into()),
            metatype_relationship_key_id: Some(relationship_key_id.into()),
            ..Default::default()
        }
    }

    pub fn constant_metatype(value: impl Into<Value>, metatype_key_id: impl Into<Id>) -> Self {
        Self {
            value: Some(value.into()),
            metatype_key_id: Some(metatype_key_id.into()),
            ..Default::default()
        }
    }

    /// The single destination key id.
    pub fn destination(&self) -> Result<KeyDestination<'_>, EtlError> {
        match (&self.metatype_key_id, &self.metatype_relationship_key_id) {
            (Some(id), None) => Ok(KeyDestination::Metatype(id)),
            (None, Some(id)) => Ok(KeyDestination::Relationship(id)),
            (Some(_), Some(_)) => Err(EtlError::MalformedTransformation(
                "key mapping targets both a metatype key and a relationship key".into(),
            )),
            (None, None) => Err(EtlError::MalformedTransformation(
                "key mapping has no destination key".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDestination<'a> {
    Metatype(&'a str),
    Relationship(&'a str),
}

/// What a transformation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Node { metatype_id: &'a str },
    Edge { pair_id: &'a str },
}

/// One rule turning (a sub-tree of) a payload into nodes or edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeTransformation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_mapping_id: Option<Id>,
    #[serde(default)]
    pub container_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<Id>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub keys: Vec<KeyMapping>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metatype_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metatype_relationship_pair_id: Option<Id>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_id_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_metatype_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_data_source_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_id_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_metatype_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_data_source_id: Option<Id>,
    /// Node filters used when an endpoint has no id key: the edge is written
    /// once per matching (origin, destination) pair.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub origin_parameters: Vec<EdgeConnectionParameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destination_parameters: Vec<EdgeConnectionParameter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_array: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_identifier_key: Option<String>,

    #[serde(default)]
    pub config: TransformationConfig,
    #[serde(default)]
    pub archived: bool,
}

impl TypeTransformation {
    pub fn node(container_id: impl Into<Id>, metatype_id: impl Into<Id>) -> Self {
        Self {
            container_id: container_id.into(),
            metatype_id: Some(metatype_id.into()),
            ..Default::default()
        }
    }

    pub fn edge(
        container_id: impl Into<Id>,
        pair_id: impl Into<Id>,
        origin_id_key: impl Into<String>,
        destination_id_key: impl Into<String>,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            metatype_relationship_pair_id: Some(pair_id.into()),
            origin_id_key: Some(origin_id_key.into()),
            destination_id_key: Some(destination_id_key.into()),
            ..Default::default()
        }
    }

    /// Edge over parameter-matched endpoints instead of id keys.
    pub fn edge_between_matches(
        container_id: impl Into<Id>,
        pair_id: impl Into<Id>,
        origin_parameters: Vec<EdgeConnectionParameter>,
        destination_parameters: Vec<EdgeConnectionParameter>,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            metatype_relationship_pair_id: Some(pair_id.into()),
            origin_parameters,
            destination_parameters,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_root_array(mut self, root_array: impl Into<String>) -> Self {
        self.root_array = Some(root_array.into());
        self
    }

    pub fn with_unique_key(mut self, key: impl Into<String>) -> Self {
        self.unique_identifier_key = Some(key.into());
        self
    }

    pub fn with_key(mut self, key: KeyMapping) -> Self {
        self.keys.push(key);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Exactly one of `metatype_id` / `metatype_relationship_pair_id` must be set.
    pub fn target(&self) -> Result<Target<'_>, EtlError> {
        match (&self.metatype_id, &self.metatype_relationship_pair_id) {
            (Some(metatype_id), None) => Ok(Target::Node { metatype_id }),
            (None, Some(pair_id)) => Ok(Target::Edge { pair_id }),
            (Some(_), Some(_)) => Err(EtlError::MalformedTransformation(
                "both metatype_id and metatype_relationship_pair_id are set".into(),
            )),
            (None, None) => Err(EtlError::MalformedTransformation(
                "neither metatype_id nor metatype_relationship_pair_id is set".into(),
            )),
        }
    }

    /// Paths to the array at each nesting level of `root_array`.
    ///
    /// `cars[].maintenance[]` yields `["cars", "cars[].maintenance"]`; the
    /// second path is resolved with the index of the enclosing car.
    pub fn root_array_levels(&self) -> Vec<String> {
        let Some(root) = self.root_array.as_deref().filter(|r| !r.trim().is_empty()) else {
            return Vec::new();
        };

        let mut parts: Vec<&str> = root.split("[]").collect();
        if parts.len() > 1 && parts.last().map_or(false, |p| p.trim_matches('.').is_empty()) {
            parts.pop();
        }

        (0..parts.len())
            .map(|depth| parts[..=depth].join("[]").trim_end_matches('.').to_string())
            .collect()
    }
}

impl Identified for TypeTransformation {
    fn identity(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

// ============================================================================
// Type mappings
// ============================================================================

/// A data source's rule set for payloads of one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default)]
    pub container_id: Id,
    #[serde(default)]
    pub data_source_id: Id,
    #[serde(default)]
    pub sample_payload: Value,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub shape_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape_hash_options: Option<ShapeHashOptions>,
    #[serde(default)]
    pub transformations: Vec<TypeTransformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl TypeMapping {
    /// New inactive mapping whose shape is taken from `sample_payload`.
    pub fn new(container_id: impl Into<Id>, data_source_id: impl Into<Id>, sample_payload: Value) -> Self {
        let shape_hash = shape_hash_with(&sample_payload, &ShapeHashOptions::default());
        Self {
            id: None,
            container_id: container_id.into(),
            data_source_id: data_source_id.into(),
            sample_payload,
            active: false,
            shape_hash,
            shape_hash_options: None,
            transformations: Vec::new(),
            created_at: None,
        }
    }

    pub fn with_options(mut self, options: ShapeHashOptions) -> Self {
        self.shape_hash = shape_hash_with(&self.sample_payload, &options);
        self.shape_hash_options = Some(options).filter(|o| !o.is_empty());
        self
    }

    pub fn activate(mut self) -> Self {
        self.active = true;
        self
    }

    /// Fingerprint of `payload` under this mapping's options.
    pub fn fingerprint(&self, payload: &Value) -> String {
        match &self.shape_hash_options {
            Some(options) => shape_hash_with(payload, options),
            None => shape_hash_with(payload, &ShapeHashOptions::default()),
        }
    }

    /// Recompute `shape_hash` from the sample payload.
    pub fn refresh_shape_hash(&mut self) {
        self.shape_hash = self.fingerprint(&self.sample_payload);
    }

    /// Active and same shape as the sample.
    pub fn matches(&self, payload: &Value) -> bool {
        self.active && self.fingerprint(payload) == self.shape_hash
    }

    pub fn add_transformation(&mut self, mut transformation: TypeTransformation) {
        if transformation.type_mapping_id.is_none() {
            transformation.type_mapping_id = self.id.clone();
        }
        self.transformations.push(transformation);
    }

    pub fn remove_transformation(&mut self, id: &str) -> Option<TypeTransformation> {
        let pos = self
            .transformations
            .iter()
            .position(|t| t.id.as_deref() == Some(id))?;
        Some(self.transformations.remove(pos))
    }

    pub fn replace_transformations(
        &mut self,
        transformations: Vec<TypeTransformation>,
    ) -> SetDiff<TypeTransformation> {
        let diff = diff_by_id(&self.transformations, &transformations);
        self.transformations = transformations;
        diff
    }

    pub fn live_transformations(&self) -> impl Iterator<Item = &TypeTransformation> {
        self.transformations.iter().filter(|t| !t.archived)
    }
}

/// A raw payload waiting to be transformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub data_source_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_id: Option<Id>,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl StagedData {
    pub fn new(data_source_id: impl Into<Id>, data: Value) -> Self {
        Self {
            id: None,
            data_source_id: data_source_id.into(),
            import_id: None,
            data,
            created_at: None,
        }
    }
}
