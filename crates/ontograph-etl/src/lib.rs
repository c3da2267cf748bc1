//! # ontograph-etl
//!
//! Turns raw staged payloads into typed graph records:
//!
//! - [`path`]: dotted-path resolution with array index vectors
//! - [`condition`]: transformation gating
//! - [`transform`]: root-array expansion and record generation
//! - [`convert`]: optional value conversion to key data types
//! - [`fingerprint`]: payload shape hashes that select a [`TypeMapping`]

pub mod condition;
pub mod convert;
pub mod error;
pub mod fingerprint;
pub mod mapping;
pub mod path;
pub mod transform;

pub use condition::{any_condition_holds, compare, Condition, Expression, Operator};
pub use convert::convert_value;
pub use error::EtlError;
pub use fingerprint::{shape_hash, shape_hash_with, shape_tokens, ShapeHashOptions};
pub use mapping::{
    ErrorAction, KeyDestination, KeyMapping, StagedData, Target, TransformationConfig,
    TypeMapping, TypeTransformation,
};
pub use path::{display_value, is_truthy, resolve};
pub use transform::{BranchError, BranchRecord, TransformOutput, Transformer};
