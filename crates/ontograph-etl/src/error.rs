use ontograph_schema::OntologyError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EtlError {
    #[error("root array path `{path}` does not resolve to an array at index {index:?}")]
    MalformedRootArray { path: String, index: Vec<usize> },

    #[error("malformed transformation: {0}")]
    MalformedTransformation(String),

    #[error("ontology key `{key_id}` could not be resolved")]
    LookupFailure { key_id: String },

    #[error("no value in payload for required key `{property}`")]
    MissingRequiredKey { property: String },

    #[error("unable to convert value for `{property}`: {reason}")]
    ConversionFailed { property: String, reason: String },

    #[error(transparent)]
    Ontology(#[from] OntologyError),
}

pub type Result<T> = std::result::Result<T, EtlError>;
