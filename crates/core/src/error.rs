use thiserror::Error;

/// Errors surfaced by the condition engine and the persistence facade.
///
/// Backend-specific failures are converted into `BackendUnavailable`,
/// `BackendTimeout` or `MappingConflict` before they reach callers.
#[derive(Error, Debug)]
pub enum CdpError {
    #[error("Unknown condition type: {0}")]
    UnknownConditionType(String),

    #[error("No in-memory evaluator for condition type: {0}")]
    UnsupportedCondition(String),

    #[error("Invalid condition '{condition_type}': {reason}")]
    InvalidCondition {
        condition_type: String,
        reason: String,
    },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend call timed out after {0}ms")]
    BackendTimeout(u64),

    #[error("Mapping conflict on '{index}': {reason}")]
    MappingConflict { index: String, reason: String },

    #[error("Invalid node configuration: {0}")]
    InvalidNodeConfiguration(String),

    #[error("Item '{item_id}' of daily-partitioned type '{item_type}' has no timestamp")]
    MissingTimestamp { item_type: String, item_id: String },

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Definition error: {0}")]
    Definition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CdpError {
    pub fn invalid_condition(condition_type: impl Into<String>, reason: impl Into<String>) -> Self {
        CdpError::InvalidCondition {
            condition_type: condition_type.into(),
            reason: reason.into(),
        }
    }

    /// True for transient infrastructure failures (unavailable, timeout).
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            CdpError::BackendUnavailable(_) | CdpError::BackendTimeout(_)
        )
    }
}

impl From<serde_json::Error> for CdpError {
    fn from(e: serde_json::Error) -> Self {
        CdpError::Serialize(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CdpError>;
