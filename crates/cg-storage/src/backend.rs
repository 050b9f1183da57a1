use std::io::{Read, Write};

use crate::error::StorageError;

/// Options for a prefix scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Descending lexicographic order instead of ascending.
    pub reverse: bool,
    /// Stop after this many pairs.
    pub limit: Option<usize>,
    /// Yield empty values (the engine may skip value reads).
    pub keys_only: bool,
    /// Position strictly past this key before yielding.
    pub start_after: Option<Vec<u8>>,
}

/// One mutation inside a write batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A set of mutations applied atomically.
///
/// Readers observe either the pre-batch or post-batch state, never a
/// partial one.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub(crate) ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete(key.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Read-write view handed to a `transaction` closure.
///
/// Reads see a snapshot of the store taken when the transaction began,
/// overlaid with the transaction's own writes. Writes become visible to
/// others only when the closure returns Ok and the commit applies.
pub trait Transaction {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Counters reported by `Storage::stats`.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub keys: u64,
    pub gets: u64,
    pub puts: u64,
    pub deletes: u64,
    pub scans: u64,
    pub batches: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// On-disk footprint; 0 for memory backends.
    pub disk_bytes: u64,
}

/// Ordered byte-key to byte-value store.
///
/// Keys are compared lexicographically. A scan iterator exposes a
/// consistent snapshot for its lifetime.
pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;
    fn has(&self, key: &[u8]) -> Result<bool, StorageError>;

    /// Apply every op in `batch` atomically.
    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError>;

    /// Iterate key-value pairs under `prefix`.
    #[allow(clippy::type_complexity)]
    fn scan(
        &self,
        prefix: &[u8],
        opts: ScanOptions,
    ) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + Send>, StorageError>;

    /// Run `f` against a snapshot-consistent read-write view and commit
    /// its writes atomically. An Err return from `f` aborts the
    /// transaction with nothing applied.
    fn transaction(
        &self,
        f: &mut dyn FnMut(&mut dyn Transaction) -> Result<(), StorageError>,
    ) -> Result<(), StorageError>;

    /// Serialize the full store as an opaque byte stream. Returns the
    /// number of pairs written.
    fn backup(&self, w: &mut dyn Write) -> Result<u64, StorageError>;

    /// Apply a stream produced by `backup`. Returns the number of pairs
    /// restored.
    fn restore(&self, r: &mut dyn Read) -> Result<u64, StorageError>;

    /// Reclaim deleted space. Idempotent.
    fn gc(&self) -> Result<(), StorageError>;

    fn stats(&self) -> StorageStats;
}

/// Magic + version header for backup streams.
pub(crate) const BACKUP_MAGIC: &[u8; 4] = b"CGBK";
pub(crate) const BACKUP_VERSION: u8 = 1;

/// Write one backup pair as `u32-be key len, key, u32-be value len, value`.
pub(crate) fn write_backup_pair(
    w: &mut dyn Write,
    key: &[u8],
    value: &[u8],
) -> Result<(), StorageError> {
    w.write_all(&(key.len() as u32).to_be_bytes())?;
    w.write_all(key)?;
    w.write_all(&(value.len() as u32).to_be_bytes())?;
    w.write_all(value)?;
    Ok(())
}

/// Read one backup pair; None at clean end of stream.
#[allow(clippy::type_complexity)]
pub(crate) fn read_backup_pair(
    r: &mut dyn Read,
) -> Result<Option<(Vec<u8>, Vec<u8>)>, StorageError> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let key_len = u32::from_be_bytes(len_buf) as usize;
    let mut key = vec![0u8; key_len];
    r.read_exact(&mut key)
        .map_err(|_| StorageError::BackupCorrupt {
            reason: "truncated key".to_string(),
        })?;
    r.read_exact(&mut len_buf)
        .map_err(|_| StorageError::BackupCorrupt {
            reason: "truncated value length".to_string(),
        })?;
    let value_len = u32::from_be_bytes(len_buf) as usize;
    let mut value = vec![0u8; value_len];
    r.read_exact(&mut value)
        .map_err(|_| StorageError::BackupCorrupt {
            reason: "truncated value".to_string(),
        })?;
    Ok(Some((key, value)))
}

pub(crate) fn write_backup_header(w: &mut dyn Write) -> Result<(), StorageError> {
    w.write_all(BACKUP_MAGIC)?;
    w.write_all(&[BACKUP_VERSION])?;
    Ok(())
}

pub(crate) fn read_backup_header(r: &mut dyn Read) -> Result<(), StorageError> {
    let mut header = [0u8; 5];
    r.read_exact(&mut header)
        .map_err(|_| StorageError::BackupCorrupt {
            reason: "missing header".to_string(),
        })?;
    if &header[..4] != BACKUP_MAGIC {
        return Err(StorageError::BackupCorrupt {
            reason: "bad magic".to_string(),
        });
    }
    if header[4] != BACKUP_VERSION {
        return Err(StorageError::BackupCorrupt {
            reason: format!("unsupported backup version {}", header[4]),
        });
    }
    Ok(())
}
