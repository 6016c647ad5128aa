use serde::{Deserialize, Serialize};

/// Engine errors suitable for transport over RPC later.
///
/// `Capability` marks an operation a kind chose not to implement; it is
/// distinct from `Internal`, which wraps an actuation-time failure.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
pub enum StewardError {
    #[error("unsupported kind: {api_version}/{kind}")]
    UnsupportedKind { api_version: String, kind: String },
    #[error("duplicate kind: {api_version}/{kind}")]
    DuplicateKind { api_version: String, kind: String },
    #[error("capability: {0}")]
    Capability(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type StewardResult<T> = Result<T, StewardError>;

impl From<anyhow::Error> for StewardError {
    fn from(e: anyhow::Error) -> Self {
        StewardError::Internal(e.to_string())
    }
}

impl StewardError {
    /// True when the error reports an unimplemented operation rather than a
    /// failed one.
    pub fn is_capability_gap(&self) -> bool {
        matches!(self, StewardError::Capability(_))
    }
}
