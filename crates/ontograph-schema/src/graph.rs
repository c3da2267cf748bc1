//! Graph records produced by transformations and persisted by the graph store.

use crate::ontology::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Outcome of converting one raw value to its key's declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub original_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<String>,
}

/// Conversion log kept on each record, keyed by property name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conversions: BTreeMap<String, Conversion>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_conversions: BTreeMap<String, Conversion>,
}

impl RecordMetadata {
    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty() && self.failed_conversions.is_empty()
    }
}

/// A typed vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub container_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<Id>,
    pub metatype_id: Id,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_data_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_mapping_transformation_id: Option<Id>,
    /// `{container}+{data_source}+{unique key}+{value}`; unique per data source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_original_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_data_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_staging_id: Option<Id>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "RecordMetadata::is_empty")]
    pub metadata: RecordMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Node {
    pub fn new(container_id: impl Into<Id>, metatype_id: impl Into<Id>) -> Self {
        Self {
            id: None,
            container_id: container_id.into(),
            graph_id: None,
            metatype_id: metatype_id.into(),
            properties: Map::new(),
            original_data_id: None,
            data_source_id: None,
            type_mapping_transformation_id: None,
            composite_original_id: None,
            import_data_id: None,
            data_staging_id: None,
            archived: false,
            metadata: RecordMetadata::default(),
            created_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties = properties;
        self
    }
}

/// What an [`EdgeConnectionParameter`] filters nodes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    DataSource,
    MetatypeId,
    MetatypeName,
    OriginalId,
    /// Value of the node property named by `property`.
    Property,
    Id,
}

/// One filter over candidate endpoint nodes. All parameters of an endpoint
/// must hold; matching is by equality only.
///
/// With `key` set, `value` is taken from the payload at transform time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeConnectionParameter {
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl EdgeConnectionParameter {
    /// Filter on a fixed value.
    pub fn new(kind: ParameterKind, value: impl Into<Value>) -> Self {
        Self {
            kind,
            key: None,
            property: None,
            value: Some(value.into()),
        }
    }

    /// Filter on the value found at payload path `key`.
    pub fn from_key(kind: ParameterKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: Some(key.into()),
            property: None,
            value: None,
        }
    }

    pub fn on_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }
}

/// A directed edge of one relationship pair.
///
/// Endpoints are concrete node ids, original/composite ids, or connection
/// parameters, all resolved against the graph at ingest time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub container_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<Id>,
    pub relationship_pair_id: Id,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_node_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_node_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_node_original_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_node_original_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_node_composite_original_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_node_composite_original_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_metatype_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_metatype_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_data_source_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_data_source_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub origin_parameters: Vec<EdgeConnectionParameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destination_parameters: Vec<EdgeConnectionParameter>,

    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_data_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_original_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_mapping_transformation_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_data_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_staging_id: Option<Id>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "RecordMetadata::is_empty")]
    pub metadata: RecordMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Edge {
    pub fn new(container_id: impl Into<Id>, relationship_pair_id: impl Into<Id>) -> Self {
        Self {
            id: None,
            container_id: container_id.into(),
            graph_id: None,
            relationship_pair_id: relationship_pair_id.into(),
            origin_node_id: None,
            destination_node_id: None,
            origin_node_original_id: None,
            destination_node_original_id: None,
            origin_node_composite_original_id: None,
            destination_node_composite_original_id: None,
            origin_metatype_id: None,
            destination_metatype_id: None,
            origin_data_source_id: None,
            destination_data_source_id: None,
            origin_parameters: Vec::new(),
            destination_parameters: Vec::new(),
            properties: Map::new(),
            original_data_id: None,
            composite_original_id: None,
            data_source_id: None,
            type_mapping_transformation_id: None,
            import_data_id: None,
            data_staging_id: None,
            archived: false,
            metadata: RecordMetadata::default(),
            created_at: None,
        }
    }

    /// Connect two concrete nodes by id.
    pub fn between(mut self, origin_node_id: impl Into<Id>, destination_node_id: impl Into<Id>) -> Self {
        self.origin_node_id = Some(origin_node_id.into());
        self.destination_node_id = Some(destination_node_id.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// One output of a transformation: a node or an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphRecord {
    Node(Node),
    Edge(Edge),
}

impl GraphRecord {
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            GraphRecord::Node(n) => Some(n),
            GraphRecord::Edge(_) => None,
        }
    }

    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            GraphRecord::Edge(e) => Some(e),
            GraphRecord::Node(_) => None,
        }
    }
}
