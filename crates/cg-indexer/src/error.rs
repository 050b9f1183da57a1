/// Indexer errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("parser error: {0}")]
    Parser(#[from] cg_parser::ParserError),

    #[error("storage error: {0}")]
    Storage(#[from] cg_storage::StorageError),

    #[error("invalid glob pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("watcher error: {0}")]
    Watcher(String),

    #[error("symbol index build failed for {failed} of {total} files")]
    SymbolIndexFailed { failed: usize, total: usize },

    #[error("build cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}
