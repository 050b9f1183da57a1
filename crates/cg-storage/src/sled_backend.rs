use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::backend::{
    read_backup_header, read_backup_pair, write_backup_header, write_backup_pair, BatchOp,
    ScanOptions, Storage, StorageStats, Transaction, WriteBatch,
};
use crate::error::StorageError;
use crate::memory::{shape_scan, Counters, OverlayTransaction};

/// sled-backed ordered store. One `Db`, default tree.
pub struct SledStorage {
    db: sled::Db,
    write_lock: Mutex<()>,
    counters: Counters,
}

impl SledStorage {
    /// Open or create the sled database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| StorageError::op("open", b"", e))?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            counters: Counters::default(),
        })
    }
}

impl Storage for SledStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        let value = self
            .db
            .get(key)
            .map_err(|e| StorageError::op("get", key, e))?
            .map(|ivec| ivec.to_vec());
        if let Some(v) = &value {
            self.counters
                .bytes_read
                .fetch_add(v.len() as u64, Ordering::Relaxed);
        }
        Ok(value)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.counters.puts.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_written
            .fetch_add((key.len() + value.len()) as u64, Ordering::Relaxed);
        self.db
            .insert(key, value)
            .map_err(|e| StorageError::op("put", key, e))?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        self.db
            .remove(key)
            .map_err(|e| StorageError::op("delete", key, e))?;
        Ok(())
    }

    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        self.db
            .contains_key(key)
            .map_err(|e| StorageError::op("has", key, e))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        let mut sled_batch = sled::Batch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put(k, v) => {
                    self.counters
                        .bytes_written
                        .fetch_add((k.len() + v.len()) as u64, Ordering::Relaxed);
                    sled_batch.insert(k, v);
                }
                BatchOp::Delete(k) => sled_batch.remove(k),
            }
        }
        self.db
            .apply_batch(sled_batch)
            .map_err(|e| StorageError::op("write_batch", b"", e))
    }

    fn scan(
        &self,
        prefix: &[u8],
        opts: ScanOptions,
    ) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + Send>, StorageError> {
        self.counters.scans.fetch_add(1, Ordering::Relaxed);
        // Materialized up front so the iterator exposes one consistent
        // snapshot regardless of concurrent writers.
        let mut pairs = Vec::new();
        for entry in self.db.scan_prefix(prefix) {
            let (k, v) = entry.map_err(|e| StorageError::op("scan", prefix, e))?;
            pairs.push((k.to_vec(), v.to_vec()));
        }
        Ok(Box::new(shape_scan(pairs, &opts).into_iter()))
    }

    fn transaction(
        &self,
        f: &mut dyn FnMut(&mut dyn Transaction) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let read = |key: &[u8]| {
            self.db
                .get(key)
                .map(|opt| opt.map(|ivec| ivec.to_vec()))
                .map_err(|e| StorageError::op("txn_get", key, e))
        };
        let mut txn = OverlayTransaction {
            read: &read,
            overlay: HashMap::new(),
        };
        f(&mut txn)?;
        let mut batch = sled::Batch::default();
        for (key, staged) in txn.overlay {
            match staged {
                Some(value) => batch.insert(key, value),
                None => batch.remove(key),
            }
        }
        self.db
            .apply_batch(batch)
            .map_err(|e| StorageError::op("txn_commit", b"", e))
    }

    fn backup(&self, w: &mut dyn Write) -> Result<u64, StorageError> {
        write_backup_header(w)?;
        let mut count = 0u64;
        for entry in self.db.iter() {
            let (key, value) = entry.map_err(|e| StorageError::op("backup", b"", e))?;
            write_backup_pair(w, &key, &value)?;
            count += 1;
        }
        Ok(count)
    }

    fn restore(&self, r: &mut dyn Read) -> Result<u64, StorageError> {
        read_backup_header(r)?;
        let mut count = 0u64;
        let mut batch = sled::Batch::default();
        while let Some((key, value)) = read_backup_pair(r)? {
            batch.insert(key, value);
            count += 1;
        }
        self.db
            .apply_batch(batch)
            .map_err(|e| StorageError::op("restore", b"", e))?;
        Ok(count)
    }

    fn gc(&self) -> Result<(), StorageError> {
        // sled compacts in the background; flushing is the reclaim hook we
        // have, and repeating it is harmless.
        self.db
            .flush()
            .map_err(|e| StorageError::op("gc", b"", e))?;
        Ok(())
    }

    fn stats(&self) -> StorageStats {
        let mut stats = self.counters.snapshot();
        stats.keys = self.db.len() as u64;
        stats.disk_bytes = self.db.size_on_disk().unwrap_or(0);
        stats
    }
}
