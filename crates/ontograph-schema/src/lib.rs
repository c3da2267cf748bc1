//! # ontograph-schema
//!
//! The ontology model (metatypes, relationships, keys, relationship pairs),
//! the graph records built from it, and the key schema compiler that turns a
//! type's keys into a runtime validator.
//!
//! Storage of ontology records is not handled here; consumers implement
//! [`OntologyStore`] over whatever backend they use.

pub mod compiler;
pub mod diff;
pub mod graph;
pub mod ontology;
pub mod store;

pub use compiler::{
    validate, CompiledSchema, FieldDescriptor, FieldKind, FieldMismatch, KeyViolation,
    SchemaError,
};
pub use diff::{diff_by_id, Identified, SetDiff};
pub use graph::{
    Conversion, Edge, EdgeConnectionParameter, GraphRecord, Node, ParameterKind, RecordMetadata,
};
pub use ontology::{
    Cardinality, DataType, Id, KeyValidation, Metatype, MetatypeKey, MetatypeRelationship,
    MetatypeRelationshipKey, MetatypeRelationshipPair, OntologySnapshot, PropertyKey,
};
pub use store::{OntologyError, OntologyStore};
