use serde::{Deserialize, Serialize};

/// Knobs for [`Ingestor`](crate::ingest::Ingestor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Refuse mappings whose `active` flag is off.
    pub require_active_mapping: bool,
    /// Refuse payloads whose fingerprint differs from the mapping's.
    pub require_shape_match: bool,
    /// Run produced properties through the compiled key schema.
    pub validate_properties: bool,
    /// Abort the whole call after this many milliseconds.
    pub timeout_ms: Option<u64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            require_active_mapping: true,
            require_shape_match: true,
            validate_properties: true,
            timeout_ms: None,
        }
    }
}
