//! In-memory stores.
//!
//! [`MemoryGraph`] gives serializable transactions: a transaction holds the
//! graph's async lock from `begin` until it is committed or dropped, and
//! writes go to a private copy of the state that only `commit` publishes.
//! On top of that the graph enforces uniqueness of non-archived
//! (pair, origin, destination) edges at write time, and refuses live edges
//! onto archived nodes. Node lookups never return archived nodes; upserting
//! an archived node by composite id restores it.
//!
//! [`MemoryOntology`] is a plain lock-protected map of ontology records.

use crate::error::StorageError;
use crate::graph::{GraphStore, GraphTransaction, NodeFilter};
use crate::lookup::EdgeLookup;
use chrono::Utc;
use ontograph_schema::{
    Id, Metatype, MetatypeKey, MetatypeRelationship, MetatypeRelationshipKey,
    MetatypeRelationshipPair, OntologyError, OntologySnapshot, OntologyStore, PropertyKey,
};
use ontograph_schema::{Edge, Node};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone, Default)]
struct GraphState {
    nodes: HashMap<Id, Node>,
    edges: HashMap<Id, Edge>,
}

impl GraphState {
    fn live_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values().filter(|e| !e.archived)
    }

    fn sorted_edges(&self, pred: impl Fn(&Edge) -> bool) -> Vec<Edge> {
        let mut out: Vec<Edge> = self.live_edges().filter(|&e| pred(e)).cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    fn node_by_composite(&self, composite: &str, data_source_id: &str) -> Option<&Node> {
        self.nodes.values().find(|n| {
            n.composite_original_id.as_deref() == Some(composite)
                && n.data_source_id.as_deref() == Some(data_source_id)
        })
    }

    fn edge_by_composite(&self, composite: &str, data_source_id: &str) -> Option<&Edge> {
        self.edges.values().find(|e| {
            e.composite_original_id.as_deref() == Some(composite)
                && e.data_source_id.as_deref() == Some(data_source_id)
        })
    }
}

/// Shared in-memory graph. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    state: Arc<Mutex<GraphState>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed nodes, ordered by id.
    pub async fn nodes(&self) -> Vec<Node> {
        let state = self.state.lock().await;
        let mut nodes: Vec<Node> = state.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// Committed edges, ordered by id.
    pub async fn edges(&self) -> Vec<Edge> {
        let state = self.state.lock().await;
        state.sorted_edges(|_| true)
    }
}

#[async_trait::async_trait]
impl GraphStore for MemoryGraph {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(MemoryTransaction { guard, working })
    }
}

/// Transaction over a [`MemoryGraph`].
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<GraphState>,
    working: GraphState,
}

#[async_trait::async_trait]
impl EdgeLookup for MemoryTransaction {
    async fn edges_by_pair_and_origin(
        &self,
        pair_id: &str,
        origin_id: &str,
    ) -> Result<Vec<Edge>, StorageError> {
        Ok(self.working.sorted_edges(|e| {
            e.relationship_pair_id == pair_id && e.origin_node_id.as_deref() == Some(origin_id)
        }))
    }

    async fn edges_by_pair_and_destination(
        &self,
        pair_id: &str,
        destination_id: &str,
    ) -> Result<Vec<Edge>, StorageError> {
        Ok(self.working.sorted_edges(|e| {
            e.relationship_pair_id == pair_id
                && e.destination_node_id.as_deref() == Some(destination_id)
        }))
    }

    async fn edges_by_pair_origin_destination(
        &self,
        pair_id: &str,
        origin_id: &str,
        destination_id: &str,
    ) -> Result<Vec<Edge>, StorageError> {
        Ok(self.working.sorted_edges(|e| {
            e.relationship_pair_id == pair_id
                && e.origin_node_id.as_deref() == Some(origin_id)
                && e.destination_node_id.as_deref() == Some(destination_id)
        }))
    }
}

#[async_trait::async_trait]
impl GraphTransaction for MemoryTransaction {
    async fn find_node(&self, id: &str) -> Result<Option<Node>, StorageError> {
        Ok(self.working.nodes.get(id).filter(|n| !n.archived).cloned())
    }

    async fn find_node_by_composite_id(
        &self,
        composite_original_id: &str,
        data_source_id: &str,
    ) -> Result<Option<Node>, StorageError> {
        Ok(self
            .working
            .node_by_composite(composite_original_id, data_source_id)
            .filter(|n| !n.archived)
            .cloned())
    }

    async fn find_node_by_original_id(
        &self,
        original_data_id: &str,
        data_source_id: &str,
        metatype_id: &str,
    ) -> Result<Option<Node>, StorageError> {
        let mut matches: Vec<&Node> = self
            .working
            .nodes
            .values()
            .filter(|n| {
                !n.archived
                    && n.original_data_id.as_deref() == Some(original_data_id)
                    && n.data_source_id.as_deref() == Some(data_source_id)
                    && n.metatype_id == metatype_id
            })
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches.first().map(|n| (*n).clone()))
    }

    async fn find_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>, StorageError> {
        let mut matches: Vec<Node> = self
            .working
            .nodes
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    async fn find_edge_by_composite_id(
        &self,
        composite_original_id: &str,
        data_source_id: &str,
    ) -> Result<Option<Edge>, StorageError> {
        Ok(self
            .working
            .edge_by_composite(composite_original_id, data_source_id)
            .cloned())
    }

    async fn create_or_update_nodes(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>, StorageError> {
        let mut saved = Vec::with_capacity(nodes.len());
        for mut node in nodes {
            let existing = match (&node.composite_original_id, &node.data_source_id) {
                (Some(composite), Some(ds)) => self.working.node_by_composite(composite, ds),
                _ => node.id.as_deref().and_then(|id| self.working.nodes.get(id)),
            };
            match existing {
                Some(prev) => {
                    node.id = prev.id.clone();
                    node.created_at = prev.created_at.or(node.created_at);
                }
                None => {
                    node.id.get_or_insert_with(|| Uuid::new_v4().to_string());
                    node.created_at.get_or_insert_with(Utc::now);
                }
            }

            let id = node.id.clone().unwrap_or_default();
            self.working.nodes.insert(id, node.clone());
            saved.push(node);
        }
        Ok(saved)
    }

    async fn create_or_update_edges(&mut self, edges: Vec<Edge>) -> Result<Vec<Edge>, StorageError> {
        let mut saved = Vec::with_capacity(edges.len());
        for mut edge in edges {
            let (Some(origin), Some(destination)) =
                (edge.origin_node_id.clone(), edge.destination_node_id.clone())
            else {
                return Err(StorageError::Backend(
                    "edge endpoints must be node ids before they are written".into(),
                ));
            };
            for id in [&origin, &destination] {
                let usable = self
                    .working
                    .nodes
                    .get(id)
                    .map_or(false, |n| edge.archived || !n.archived);
                if !usable {
                    return Err(StorageError::NotFound {
                        kind: "node",
                        id: id.clone(),
                    });
                }
            }

            let existing = match (&edge.composite_original_id, &edge.data_source_id) {
                (Some(composite), Some(ds)) => self.working.edge_by_composite(composite, ds),
                _ => edge.id.as_deref().and_then(|id| self.working.edges.get(id)),
            };
            match existing {
                Some(prev) => {
                    edge.id = prev.id.clone();
                    edge.created_at = prev.created_at.or(edge.created_at);
                }
                None => {
                    edge.id.get_or_insert_with(|| Uuid::new_v4().to_string());
                    edge.created_at.get_or_insert_with(Utc::now);
                }
            }

            if !edge.archived {
                let clash = self.working.live_edges().find(|e| {
                    e.id != edge.id
                        && e.relationship_pair_id == edge.relationship_pair_id
                        && e.origin_node_id.as_deref() == Some(origin.as_str())
                        && e.destination_node_id.as_deref() == Some(destination.as_str())
                });
                if let Some(clash) = clash {
                    return Err(StorageError::UniqueViolation(format!(
                        "edge `{}` already connects `{origin}` to `{destination}` on pair `{}`",
                        clash.id.as_deref().unwrap_or_default(),
                        edge.relationship_pair_id
                    )));
                }
            }

            let id = edge.id.clone().unwrap_or_default();
            self.working.edges.insert(id, edge.clone());
            saved.push(edge);
        }
        Ok(saved)
    }

    async fn archive_node(&mut self, id: &str) -> Result<(), StorageError> {
        let node = self
            .working
            .nodes
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound {
                kind: "node",
                id: id.to_string(),
            })?;
        node.archived = true;

        for edge in self.working.edges.values_mut() {
            if edge.origin_node_id.as_deref() == Some(id)
                || edge.destination_node_id.as_deref() == Some(id)
            {
                edge.archived = true;
            }
        }
        Ok(())
    }

    async fn archive_edge(&mut self, id: &str) -> Result<(), StorageError> {
        let edge = self
            .working
            .edges
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound {
                kind: "edge",
                id: id.to_string(),
            })?;
        edge.archived = true;
        Ok(())
    }

    async fn commit(self) -> Result<(), StorageError> {
        let MemoryTransaction { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}

// ============================================================================
// Ontology
// ============================================================================

#[derive(Debug, Default)]
struct OntologyTables {
    metatypes: HashMap<Id, Metatype>,
    relationships: HashMap<Id, MetatypeRelationship>,
    pairs: HashMap<Id, MetatypeRelationshipPair>,
}

/// Ontology records held in memory, scoped by container.
#[derive(Debug, Default)]
pub struct MemoryOntology {
    tables: RwLock<OntologyTables>,
}

impl MemoryOntology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot into `container_id`. Records without an id cannot be
    /// referenced and are skipped.
    pub fn from_snapshot(container_id: &str, snapshot: OntologySnapshot) -> Self {
        let store = Self::new();
        for mut metatype in snapshot.metatypes {
            if metatype.container_id.is_empty() {
                metatype.container_id = container_id.to_string();
            }
            store.insert_metatype(metatype);
        }
        for mut relationship in snapshot.relationships {
            if relationship.container_id.is_empty() {
                relationship.container_id = container_id.to_string();
            }
            store.insert_relationship(relationship);
        }
        for mut pair in snapshot.pairs {
            if pair.container_id.is_empty() {
                pair.container_id = container_id.to_string();
            }
            store.insert_pair(pair);
        }
        store
    }

    pub fn insert_metatype(&self, metatype: Metatype) {
        match metatype.id.clone() {
            Some(id) => {
                self.tables.write().metatypes.insert(id, metatype);
            }
            None => tracing::warn!(name = %metatype.name, "metatype without id skipped"),
        }
    }

    pub fn insert_relationship(&self, relationship: MetatypeRelationship) {
        match relationship.id.clone() {
            Some(id) => {
                self.tables.write().relationships.insert(id, relationship);
            }
            None => tracing::warn!(name = %relationship.name, "relationship without id skipped"),
        }
    }

    pub fn insert_pair(&self, pair: MetatypeRelationshipPair) {
        match pair.id.clone() {
            Some(id) => {
                self.tables.write().pairs.insert(id, pair);
            }
            None => tracing::warn!(name = %pair.name, "relationship pair without id skipped"),
        }
    }
}

fn live_keys(keys: &[PropertyKey]) -> Vec<PropertyKey> {
    keys.iter().filter(|k| !k.archived).cloned().collect()
}

fn find_key<'a>(mut keys: impl Iterator<Item = &'a PropertyKey>, key_id: &str) -> Option<PropertyKey> {
    keys.find(|k| k.id.as_deref() == Some(key_id)).cloned()
}

#[async_trait::async_trait]
impl OntologyStore for MemoryOntology {
    async fn metatype(&self, container_id: &str, id: &str) -> Result<Metatype, OntologyError> {
        self.tables
            .read()
            .metatypes
            .get(id)
            .filter(|m| m.container_id == container_id && !m.archived)
            .cloned()
            .ok_or_else(|| OntologyError::not_found("metatype", id))
    }

    async fn metatype_by_name(&self, container_id: &str, name: &str) -> Result<Metatype, OntologyError> {
        let tables = self.tables.read();
        let mut found: Vec<&Metatype> = tables
            .metatypes
            .values()
            .filter(|m| m.container_id == container_id && !m.archived && m.name == name)
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
            .first()
            .map(|m| (*m).clone())
            .ok_or_else(|| OntologyError::not_found("metatype", name))
    }

    async fn metatype_keys(
        &self,
        container_id: &str,
        metatype_id: &str,
    ) -> Result<Vec<MetatypeKey>, OntologyError> {
        let metatype = self.metatype(container_id, metatype_id).await?;
        Ok(live_keys(&metatype.keys))
    }

    async fn metatype_key(&self, container_id: &str, key_id: &str) -> Result<MetatypeKey, OntologyError> {
        let tables = self.tables.read();
        find_key(
            tables
                .metatypes
                .values()
                .filter(|m| m.container_id == container_id)
                .flat_map(|m| m.keys.iter()),
            key_id,
        )
        .ok_or_else(|| OntologyError::not_found("metatype key", key_id))
    }

    async fn relationship_pair(
        &self,
        container_id: &str,
        id: &str,
    ) -> Result<MetatypeRelationshipPair, OntologyError> {
        self.tables
            .read()
            .pairs
            .get(id)
            .filter(|p| p.container_id == container_id && !p.archived)
            .cloned()
            .ok_or_else(|| OntologyError::not_found("relationship pair", id))
    }

    async fn relationship_keys(
        &self,
        container_id: &str,
        relationship_id: &str,
    ) -> Result<Vec<MetatypeRelationshipKey>, OntologyError> {
        self.tables
            .read()
            .relationships
            .get(relationship_id)
            .filter(|r| r.container_id == container_id && !r.archived)
            .map(|r| live_keys(&r.keys))
            .ok_or_else(|| OntologyError::not_found("relationship", relationship_id))
    }

    async fn relationship_key(
        &self,
        container_id: &str,
        key_id: &str,
    ) -> Result<MetatypeRelationshipKey, OntologyError> {
        let tables = self.tables.read();
        find_key(
            tables
                .relationships
                .values()
                .filter(|r| r.container_id == container_id)
                .flat_map(|r| r.keys.iter()),
            key_id,
        )
        .ok_or_else(|| OntologyError::not_found("relationship key", key_id))
    }
}
