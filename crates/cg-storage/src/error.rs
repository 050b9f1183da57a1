/// Storage errors.
///
/// `NotFound` is not an error: point reads return `Option`. Everything
/// here is an actual failure of the engine, the codec, or the on-disk
/// format.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{op} failed for key '{key}': {source}")]
    Op {
        op: &'static str,
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("codec error during {op} for key '{key}': {reason}")]
    Codec {
        op: &'static str,
        key: String,
        reason: String,
    },

    #[error("index format mismatch: expected version {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("transaction conflict: {reason}")]
    TransactionConflict { reason: String },

    #[error("backup stream corrupt: {reason}")]
    BackupCorrupt { reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn op(
        op: &'static str,
        key: &[u8],
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Op {
            op,
            key: String::from_utf8_lossy(key).into_owned(),
            source: Box::new(source),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionConflict { .. })
    }

    /// Version mismatches and backup corruption mean the index itself is
    /// unusable, not just one operation.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::VersionMismatch { .. } | Self::BackupCorrupt { .. }
        )
    }
}
