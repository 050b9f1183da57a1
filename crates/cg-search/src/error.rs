use std::time::Duration;

/// Search errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("search cancelled")]
    Cancelled,

    #[error("semantic search unavailable: {0}")]
    SemanticUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] cg_storage::StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// Timeouts are distinguishable from user-driven cancellation.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
