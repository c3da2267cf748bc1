//! Read-only access to ontology records, owned by whoever persists them.

use crate::ontology::{Metatype, MetatypeKey, MetatypeRelationshipKey, MetatypeRelationshipPair};

#[derive(Debug, Clone, thiserror::Error)]
pub enum OntologyError {
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },

    #[error("ontology backend error: {0}")]
    Backend(String),
}

impl OntologyError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        OntologyError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OntologyError::NotFound { .. })
    }
}

/// Ontology lookups, all scoped by container.
#[async_trait::async_trait]
pub trait OntologyStore: Send + Sync {
    async fn metatype(&self, container_id: &str, id: &str) -> Result<Metatype, OntologyError>;

    /// First live metatype named `name`.
    async fn metatype_by_name(&self, container_id: &str, name: &str) -> Result<Metatype, OntologyError>;

    async fn metatype_keys(
        &self,
        container_id: &str,
        metatype_id: &str,
    ) -> Result<Vec<MetatypeKey>, OntologyError>;

    async fn metatype_key(&self, container_id: &str, key_id: &str)
        -> Result<MetatypeKey, OntologyError>;

    async fn relationship_pair(
        &self,
        container_id: &str,
        id: &str,
    ) -> Result<MetatypeRelationshipPair, OntologyError>;

    async fn relationship_keys(
        &self,
        container_id: &str,
        relationship_id: &str,
    ) -> Result<Vec<MetatypeRelationshipKey>, OntologyError>;

    async fn relationship_key(
        &self,
        container_id: &str,
        key_id: &str,
    ) -> Result<MetatypeRelationshipKey, OntologyError>;
}
