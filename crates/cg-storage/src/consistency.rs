//! Full-store consistency checker.
//!
//! Verifies both directions of the primary/secondary agreement:
//! every stored symbol is reachable from its name/type/tag lists and the
//! `sid:` locator, and no index entry points at a symbol that no longer
//! exists.

use std::collections::HashSet;

use cg_core::{Symbol, SymbolId};

use crate::backend::ScanOptions;
use crate::codec;
use crate::error::StorageError;
use crate::keys;
use crate::symbol_store::SymbolStore;

/// Findings of one consistency pass.
#[derive(Debug, Default)]
pub struct ConsistencyReport {
    pub symbols_checked: usize,
    pub index_entries_checked: usize,
    /// `"{index key}: {symbol id}"` expected but absent.
    pub missing_index_entries: Vec<String>,
    /// Index entries pointing at ids with no stored symbol.
    pub dangling_index_entries: Vec<String>,
    /// `sid:` rows whose target symbol row is gone, or symbols without a
    /// `sid:` row.
    pub locator_faults: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_index_entries.is_empty()
            && self.dangling_index_entries.is_empty()
            && self.locator_faults.is_empty()
    }
}

/// Walk the whole store and cross-check primary rows against the
/// secondary indices.
pub fn check_consistency(store: &SymbolStore) -> Result<ConsistencyReport, StorageError> {
    let storage = store.storage();
    let mut report = ConsistencyReport::default();

    // Pass 1: every symbol row must appear in its expected indices.
    let mut known_ids: HashSet<SymbolId> = HashSet::new();
    for (key, value) in storage.scan(keys::SYM_PREFIX.as_bytes(), ScanOptions::default())? {
        let sym: Symbol = codec::decode("consistency", &key, &value)?;
        report.symbols_checked += 1;
        known_ids.insert(sym.id.clone());

        expect_listed(store, &keys::name_key(&sym.name), &sym.id, &mut report)?;
        if !sym.type_name.is_empty() {
            expect_listed(store, &keys::type_key(&sym.type_name), &sym.id, &mut report)?;
        }
        for tag in &sym.tags {
            expect_listed(store, &keys::tag_key(tag), &sym.id, &mut report)?;
        }

        match storage.get(&keys::sid_key(&sym.id))? {
            Some(fhash) => {
                let expected = keys::file_hash(&sym.file_path);
                if fhash != expected.as_bytes() {
                    report
                        .locator_faults
                        .push(format!("sid:{} points at wrong file hash", sym.id));
                }
            }
            None => report
                .locator_faults
                .push(format!("sid:{} missing", sym.id)),
        }
    }

    // Pass 2: no index entry may point at a non-existent symbol.
    for prefix in [keys::NAME_PREFIX, keys::TYPE_PREFIX, keys::TAG_PREFIX] {
        for (key, value) in storage.scan(prefix.as_bytes(), ScanOptions::default())? {
            let list: Vec<SymbolId> = codec::decode("consistency", &key, &value)?;
            for id in list {
                report.index_entries_checked += 1;
                if !known_ids.contains(&id) {
                    report.dangling_index_entries.push(format!(
                        "{}: {id}",
                        String::from_utf8_lossy(&key)
                    ));
                }
            }
        }
    }

    // Pass 3: every sid: row must resolve to a live symbol.
    for (key, _) in storage.scan(
        keys::SID_PREFIX.as_bytes(),
        ScanOptions {
            keys_only: true,
            ..Default::default()
        },
    )? {
        let id_str = String::from_utf8_lossy(&key[keys::SID_PREFIX.len()..]).into_owned();
        let id = SymbolId::from(id_str);
        if !known_ids.contains(&id) {
            report
                .locator_faults
                .push(format!("sid:{id} has no symbol row"));
        }
    }

    Ok(report)
}

fn expect_listed(
    store: &SymbolStore,
    key: &[u8],
    id: &SymbolId,
    report: &mut ConsistencyReport,
) -> Result<(), StorageError> {
    let listed = match store.storage().get(key)? {
        Some(bytes) => {
            let list: Vec<SymbolId> = codec::decode("consistency", key, &bytes)?;
            list.contains(id)
        }
        None => false,
    };
    if !listed {
        report
            .missing_index_entries
            .push(format!("{}: {id}", String::from_utf8_lossy(key)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use cg_core::SymbolKind;
    use std::sync::Arc;

    fn seeded_store() -> SymbolStore {
        let store = SymbolStore::open(Arc::new(MemoryStorage::new())).unwrap();
        for (name, file) in [("a", "src/a.rs"), ("b", "src/b.rs")] {
            let mut sym = Symbol::new(name, SymbolKind::Function, file, 1, 2, 1, 1);
            sym.type_name = "fn".to_string();
            sym.tags.insert("t".to_string());
            store.store_symbol(&sym).unwrap();
        }
        store
    }

    #[test]
    fn clean_store_is_consistent() {
        let store = seeded_store();
        let report = check_consistency(&store).unwrap();
        assert_eq!(report.symbols_checked, 2);
        assert!(report.is_consistent(), "{report:?}");
    }

    #[test]
    fn consistent_after_mutations() {
        let store = seeded_store();
        let sym = Symbol::new("a", SymbolKind::Function, "src/a.rs", 1, 2, 1, 1);
        store.delete_symbol("src/a.rs", &sym.id).unwrap();
        store.delete_file("src/b.rs").unwrap();
        let report = check_consistency(&store).unwrap();
        assert!(report.is_consistent(), "{report:?}");
    }

    #[test]
    fn detects_dangling_index_entry() {
        let store = seeded_store();
        // Plant a dangling id directly in the name index.
        let ghost = SymbolId::from("ghost.rs:1:1:function:ghost".to_string());
        let key = keys::name_key("ghost");
        let encoded = serde_json::to_vec(&vec![ghost]).unwrap();
        store.storage().put(&key, &encoded).unwrap();

        let report = check_consistency(&store).unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.dangling_index_entries.len(), 1);
    }
}
