use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::language::Language;

/// Per-file bookkeeping used for incremental decisions.
///
/// A file is "known" iff its metadata row is present. `hash` and `mtime`
/// together drive the incremental diff: a candidate is re-indexed when no
/// metadata is stored or the filesystem mtime is newer than `mtime`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Relative to project root, forward-slash normalized.
    pub path: String,
    /// Hex SHA-256 of the file contents.
    pub hash: String,
    pub size: u64,
    pub mtime: SystemTime,
    pub language: Language,
    pub symbol_count: u32,
    pub indexed_at: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn mtime_comparison_drives_incremental() {
        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let new = SystemTime::UNIX_EPOCH + Duration::from_secs(200);
        let meta = FileMetadata {
            path: "src/a.rs".to_string(),
            hash: "00".repeat(32),
            size: 10,
            mtime: old,
            language: Language::Rust,
            symbol_count: 1,
            indexed_at: new,
        };
        assert!(meta.mtime < new);
        assert!(!(meta.mtime < old));
    }
}
