use ontograph_etl::EtlError;
use ontograph_schema::{Cardinality, Id, OntologyError, SchemaError};
use std::fmt;

/// Which end of an edge an error is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Origin,
    Destination,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Origin => f.write_str("origin"),
            Endpoint::Destination => f.write_str("destination"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CardinalityError {
    #[error("{endpoint} node has metatype `{found}`, relationship pair expects `{expected}`")]
    TypeMismatch {
        endpoint: Endpoint,
        expected: Id,
        found: Id,
    },

    #[error("an edge of pair `{pair_id}` already connects `{origin_id}` to `{destination_id}`")]
    DuplicateRelationship {
        pair_id: Id,
        origin_id: Id,
        destination_id: Id,
    },

    #[error("{cardinality} pair `{pair_id}`: {endpoint} node `{node_id}` already has edge `{existing_edge_id}`")]
    CardinalityViolation {
        pair_id: Id,
        cardinality: Cardinality,
        endpoint: Endpoint,
        node_id: Id,
        existing_edge_id: String,
    },

    #[error("{endpoint} node has not been saved")]
    UnsavedNode { endpoint: Endpoint },

    #[error("{endpoint} node `{node_id}` is archived")]
    ArchivedNode { endpoint: Endpoint, node_id: Id },

    #[error("edge lookup failed: {0}")]
    Lookup(#[from] StorageError),
}

/// Failure of one record; the rest of the batch carries on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Transform(#[from] EtlError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Cardinality(#[from] CardinalityError),

    #[error(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{endpoint} node `{reference}` could not be resolved")]
    UnresolvedEndpoint { endpoint: Endpoint, reference: String },

    #[error("no live node matches the {endpoint} connection parameters")]
    NoMatchingNodes { endpoint: Endpoint },
}

/// Failure of a whole ingest call. Nothing from the call is committed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IngestError {
    #[error("type mapping {mapping_id:?} is not active")]
    InactiveMapping { mapping_id: Option<Id> },

    #[error("payload shape `{found}` does not match mapping shape `{expected}`")]
    ShapeMismatch { expected: String, found: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ontology(#[from] OntologyError),

    #[error("ingest cancelled")]
    Cancelled,

    #[error("ingest timed out after {after_ms} ms")]
    TimedOut { after_ms: u64 },
}
