//! # ontograph-storage
//!
//! The write side of the graph:
//!
//! ```text
//!   staged payload ──▶ Ingestor ──▶ GraphTransaction ──▶ commit
//!                         │               ▲
//!                         └─ cardinality ─┘ (same transaction)
//! ```
//!
//! - [`cardinality`]: may this edge exist, given the edges already there?
//! - [`graph`]: the transactional store seam
//! - [`memory`]: in-memory graph and ontology stores
//! - [`ingest`]: mapping + staged data → committed nodes and edges

pub mod cardinality;
pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod lookup;
pub mod memory;

pub use cardinality::{check_cardinality, check_cardinality_excluding};
pub use config::IngestConfig;
pub use error::{CardinalityError, Endpoint, IngestError, RecordError, StorageError};
pub use graph::{GraphStore, GraphTransaction, NodeCondition, NodeFilter};
pub use ingest::{IngestReport, Ingestor, RecordFailure};
pub use lookup::EdgeLookup;
pub use memory::{MemoryGraph, MemoryOntology, MemoryTransaction};
