use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::backend::{
    read_backup_header, read_backup_pair, write_backup_header, write_backup_pair, BatchOp,
    ScanOptions, Storage, StorageStats, Transaction, WriteBatch,
};
use crate::error::StorageError;

/// Operation counters shared by both backends.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub gets: AtomicU64,
    pub puts: AtomicU64,
    pub deletes: AtomicU64,
    pub scans: AtomicU64,
    pub batches: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> StorageStats {
        StorageStats {
            keys: 0,
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            disk_bytes: 0,
        }
    }
}

/// Upper bound of the key range sharing `prefix`; None when the prefix is
/// all 0xFF (range is unbounded above).
pub(crate) fn prefix_range_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < u8::MAX {
            *last += 1;
            return Some(end);
        }
        end.pop();
    }
    None
}

/// Apply reverse/start_after/limit/keys_only to an already
/// prefix-restricted, ascending-sorted pair list.
pub(crate) fn shape_scan(
    mut pairs: Vec<(Vec<u8>, Vec<u8>)>,
    opts: &ScanOptions,
) -> Vec<(Vec<u8>, Vec<u8>)> {
    if let Some(start_after) = &opts.start_after {
        pairs.retain(|(k, _)| k.as_slice() > start_after.as_slice());
    }
    if opts.reverse {
        pairs.reverse();
    }
    if let Some(limit) = opts.limit {
        pairs.truncate(limit);
    }
    if opts.keys_only {
        for (_, v) in &mut pairs {
            v.clear();
        }
    }
    pairs
}

/// Buffered read-write view used by both backends' `transaction`.
///
/// The writer mutex is held for the whole transaction, so the snapshot
/// cannot be invalidated mid-flight and commit cannot conflict.
pub(crate) struct OverlayTransaction<'a> {
    pub read: &'a dyn Fn(&[u8]) -> Result<Option<Vec<u8>>, StorageError>,
    pub overlay: HashMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Transaction for OverlayTransaction<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(staged) = self.overlay.get(key) {
            return Ok(staged.clone());
        }
        (self.read)(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.overlay.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.overlay.insert(key.to_vec(), None);
    }
}

/// In-memory ordered store for tests and ephemeral indexes.
#[derive(Default)]
pub struct MemoryStorage {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    write_lock: Mutex<()>,
    counters: Counters,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        let value = self.map.read().get(key).cloned();
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
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        self.map.write().remove(key);
        Ok(())
    }

    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        Ok(self.map.read().contains_key(key))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        let mut map = self.map.write();
        for op in batch.ops {
            match op {
                BatchOp::Put(k, v) => {
                    self.counters
                        .bytes_written
                        .fetch_add((k.len() + v.len()) as u64, Ordering::Relaxed);
                    map.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }

    fn scan(
        &self,
        prefix: &[u8],
        opts: ScanOptions,
    ) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + Send>, StorageError> {
        self.counters.scans.fetch_add(1, Ordering::Relaxed);
        let map = self.map.read();
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = match prefix_range_end(prefix) {
            Some(end) => map
                .range(prefix.to_vec()..end)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => map
                .range(prefix.to_vec()..)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        Ok(Box::new(shape_scan(pairs, &opts).into_iter()))
    }

    fn transaction(
        &self,
        f: &mut dyn FnMut(&mut dyn Transaction) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let read = |key: &[u8]| -> Result<Option<Vec<u8>>, StorageError> {
            Ok(self.map.read().get(key).cloned())
        };
        let mut txn = OverlayTransaction {
            read: &read,
            overlay: HashMap::new(),
        };
        f(&mut txn)?;
        let mut map = self.map.write();
        for (key, staged) in txn.overlay {
            match staged {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn backup(&self, w: &mut dyn Write) -> Result<u64, StorageError> {
        write_backup_header(w)?;
        let map = self.map.read();
        let mut count = 0u64;
        for (key, value) in map.iter() {
            write_backup_pair(w, key, value)?;
            count += 1;
        }
        Ok(count)
    }

    fn restore(&self, r: &mut dyn Read) -> Result<u64, StorageError> {
        read_backup_header(r)?;
        let mut count = 0u64;
        let mut map = self.map.write();
        while let Some((key, value)) = read_backup_pair(r)? {
            map.insert(key, value);
            count += 1;
        }
        Ok(count)
    }

    fn gc(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn stats(&self) -> StorageStats {
        let mut stats = self.counters.snapshot();
        stats.keys = self.map.read().len() as u64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ops() {
        let store = MemoryStorage::new();
        assert!(store.get(b"k").unwrap().is_none());
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap().unwrap(), b"v");
        assert!(store.has(b"k").unwrap());
        store.delete(b"k").unwrap();
        assert!(!store.has(b"k").unwrap());
    }

    #[test]
    fn scan_respects_prefix_and_order() {
        let store = MemoryStorage::new();
        store.put(b"a:1", b"1").unwrap();
        store.put(b"a:2", b"2").unwrap();
        store.put(b"b:1", b"3").unwrap();

        let keys: Vec<Vec<u8>> = store
            .scan(b"a:", ScanOptions::default())
            .unwrap()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"a:1".to_vec(), b"a:2".to_vec()]);

        let reversed: Vec<Vec<u8>> = store
            .scan(
                b"a:",
                ScanOptions {
                    reverse: true,
                    ..Default::default()
                },
            )
            .unwrap()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(reversed, vec![b"a:2".to_vec(), b"a:1".to_vec()]);
    }

    #[test]
    fn scan_start_after_is_exclusive() {
        let store = MemoryStorage::new();
        store.put(b"a:1", b"1").unwrap();
        store.put(b"a:2", b"2").unwrap();
        store.put(b"a:3", b"3").unwrap();

        let keys: Vec<Vec<u8>> = store
            .scan(
                b"a:",
                ScanOptions {
                    start_after: Some(b"a:1".to_vec()),
                    ..Default::default()
                },
            )
            .unwrap()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"a:2".to_vec(), b"a:3".to_vec()]);
    }

    #[test]
    fn batch_is_atomic_over_iteration() {
        let store = MemoryStorage::new();
        store.put(b"x", b"old").unwrap();
        let mut batch = WriteBatch::new();
        batch.put(b"x".to_vec(), b"new".to_vec());
        batch.delete(b"y".to_vec());
        batch.put(b"z".to_vec(), b"z".to_vec());
        store.write_batch(batch).unwrap();
        assert_eq!(store.get(b"x").unwrap().unwrap(), b"new");
        assert!(store.has(b"z").unwrap());
    }

    #[test]
    fn transaction_commits_or_aborts() {
        let store = MemoryStorage::new();
        store.put(b"k", b"1").unwrap();

        store
            .transaction(&mut |txn| {
                let v = txn.get(b"k")?.unwrap();
                assert_eq!(v, b"1");
                txn.put(b"k", b"2");
                txn.put(b"other", b"x");
                Ok(())
            })
            .unwrap();
        assert_eq!(store.get(b"k").unwrap().unwrap(), b"2");

        let result = store.transaction(&mut |txn| {
            txn.put(b"k", b"3");
            Err(StorageError::TransactionConflict {
                reason: "forced".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(store.get(b"k").unwrap().unwrap(), b"2");
    }

    #[test]
    fn backup_restore_round_trip() {
        let store = MemoryStorage::new();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();

        let mut buf = Vec::new();
        let written = store.backup(&mut buf).unwrap();
        assert_eq!(written, 2);

        let other = MemoryStorage::new();
        let restored = other.restore(&mut buf.as_slice()).unwrap();
        assert_eq!(restored, 2);
        assert_eq!(other.get(b"a").unwrap().unwrap(), b"1");
        assert_eq!(other.get(b"b").unwrap().unwrap(), b"2");
    }

    #[test]
    fn restore_rejects_garbage() {
        let store = MemoryStorage::new();
        let garbage = b"definitely not a backup";
        assert!(store.restore(&mut garbage.as_slice()).is_err());
    }

    #[test]
    fn prefix_range_end_handles_0xff() {
        assert_eq!(prefix_range_end(b"a"), Some(b"b".to_vec()));
        assert_eq!(prefix_range_end(&[0x61, 0xFF]), Some(vec![0x62]));
        assert_eq!(prefix_range_end(&[0xFF, 0xFF]), None);
    }
}
