//! Transactional node/edge persistence.

use crate::error::StorageError;
use crate::lookup::EdgeLookup;
use ontograph_etl::display_value;
use ontograph_schema::{Edge, Id, Node};
use serde_json::Value;

/// One equality test on a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeCondition {
    Id(Id),
    DataSource(Id),
    Metatype(Id),
    OriginalId(String),
    /// Property compared by its string form, so `17` matches `"17"`.
    Property { name: String, value: Value },
}

/// Live nodes of one container satisfying every condition.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFilter {
    pub container_id: Id,
    pub conditions: Vec<NodeCondition>,
}

impl NodeFilter {
    pub fn new(container_id: impl Into<Id>) -> Self {
        Self {
            container_id: container_id.into(),
            conditions: Vec::new(),
        }
    }

    pub fn and(mut self, condition: NodeCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn matches(&self, node: &Node) -> bool {
        !node.archived
            && node.container_id == self.container_id
            && self.conditions.iter().all(|c| match c {
                NodeCondition::Id(id) => node.id.as_deref() == Some(id.as_str()),
                NodeCondition::DataSource(ds) => node.data_source_id.as_deref() == Some(ds.as_str()),
                NodeCondition::Metatype(id) => node.metatype_id == *id,
                NodeCondition::OriginalId(original) => {
                    node.original_data_id.as_deref() == Some(original.as_str())
                }
                NodeCondition::Property { name, value } => node
                    .properties
                    .get(name)
                    .map_or(false, |found| display_value(found) == display_value(value)),
            })
    }
}

/// A store that hands out transactions.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    type Tx: GraphTransaction;

    async fn begin(&self) -> Result<Self::Tx, StorageError>;
}

/// One unit of work. Dropping a transaction without committing discards
/// everything written through it.
#[async_trait::async_trait]
pub trait GraphTransaction: EdgeLookup {
    async fn find_node(&self, id: &str) -> Result<Option<Node>, StorageError>;

    async fn find_node_by_composite_id(
        &self,
        composite_original_id: &str,
        data_source_id: &str,
    ) -> Result<Option<Node>, StorageError>;

    async fn find_node_by_original_id(
        &self,
        original_data_id: &str,
        data_source_id: &str,
        metatype_id: &str,
    ) -> Result<Option<Node>, StorageError>;

    /// Matching nodes, ordered by id.
    async fn find_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>, StorageError>;

    async fn find_edge_by_composite_id(
        &self,
        composite_original_id: &str,
        data_source_id: &str,
    ) -> Result<Option<Edge>, StorageError>;

    /// Upsert by (composite_original_id, data_source_id) when both are set,
    /// else by id. Returns the records as stored.
    async fn create_or_update_nodes(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>, StorageError>;

    /// Same keying as nodes. Both endpoint ids must be set.
    async fn create_or_update_edges(&mut self, edges: Vec<Edge>) -> Result<Vec<Edge>, StorageError>;

    async fn archive_node(&mut self, id: &str) -> Result<(), StorageError>;

    async fn archive_edge(&mut self, id: &str) -> Result<(), StorageError>;

    async fn commit(self) -> Result<(), StorageError>;
}
