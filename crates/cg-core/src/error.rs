use serde::{Deserialize, Serialize};

/// Sub-kinds of file access failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileErrorKind {
    NotFound,
    PermissionDenied,
    FileTooBig,
    BinarySkipped,
    UnsupportedFile,
}

/// Logical error kinds recognized across the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Pattern,
    File(FileErrorKind),
    Parse,
    Storage,
    IndexCorrupt,
    Timeout,
    ConcurrencyLimit,
    InsufficientMemory,
}

/// What a caller should do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    SkipFile,
    SkipDirectory,
    Retry,
    Abort,
}

impl ErrorKind {
    /// Recovery policy: pattern failures, timeouts, and system-level
    /// conditions abort; permission problems skip the directory; the rest
    /// skip the file.
    pub fn recovery_action(self) -> RecoveryAction {
        match self {
            Self::File(FileErrorKind::PermissionDenied) => RecoveryAction::SkipDirectory,
            Self::File(_) | Self::Parse => RecoveryAction::SkipFile,
            Self::Pattern | Self::Timeout | Self::IndexCorrupt | Self::InsufficientMemory => {
                RecoveryAction::Abort
            }
            Self::ConcurrencyLimit => RecoveryAction::Retry,
            Self::Storage => RecoveryAction::SkipFile,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::File(FileErrorKind::NotFound) => "not_found",
            Self::File(FileErrorKind::PermissionDenied) => "permission_denied",
            Self::File(FileErrorKind::FileTooBig) => "file_too_big",
            Self::File(FileErrorKind::BinarySkipped) => "binary_skipped",
            Self::File(FileErrorKind::UnsupportedFile) => "unsupported_file",
            Self::Parse => "parse",
            Self::Storage => "storage",
            Self::IndexCorrupt => "index_corrupt",
            Self::Timeout => "timeout",
            Self::ConcurrencyLimit => "concurrency_limit",
            Self::InsufficientMemory => "insufficient_memory",
        }
    }
}
