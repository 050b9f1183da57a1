use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

use cg_core::{
    FileMetadata, QueryMode, QueryResult, Reference, SortField, Symbol, SymbolId, SymbolQuery,
};

use crate::backend::{ScanOptions, Storage, WriteBatch};
use crate::codec;
use crate::error::StorageError;
use crate::keys;

/// Current on-disk format. Bumped when the key layout or value encoding
/// changes incompatibly.
const FORMAT_VERSION: u32 = 1;

/// Default query-cache TTL (30 minutes).
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Result of `search_symbols`.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub symbols: Vec<Symbol>,
    /// Candidates surviving filters, before pagination.
    pub total: usize,
    pub elapsed: Duration,
    /// Served from the query cache.
    pub cached: bool,
}

/// Domain layer over the ordered KV store.
///
/// Encodes symbols, file metadata, references, and the secondary indices
/// described in `keys`. Mutations take a store-wide writer mutex so that
/// read-modify-write updates of index lists stay atomic with respect to
/// each other; each mutation is a single batch, so readers never observe
/// partial state.
pub struct SymbolStore {
    storage: Arc<dyn Storage>,
    write_lock: Mutex<()>,
    cache_ttl: Duration,
    cache_enabled: bool,
}

impl std::fmt::Debug for SymbolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolStore")
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_enabled", &self.cache_enabled)
            .finish()
    }
}

impl SymbolStore {
    /// Open the store, verifying (or initializing) the format version.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self, StorageError> {
        Self::open_with(storage, DEFAULT_CACHE_TTL, true)
    }

    pub fn open_with(
        storage: Arc<dyn Storage>,
        cache_ttl: Duration,
        cache_enabled: bool,
    ) -> Result<Self, StorageError> {
        match storage.get(keys::VERSION_KEY.as_bytes())? {
            Some(bytes) => {
                let found: u32 = codec::decode("open", keys::VERSION_KEY.as_bytes(), &bytes)?;
                if found != FORMAT_VERSION {
                    return Err(StorageError::VersionMismatch {
                        expected: FORMAT_VERSION,
                        found,
                    });
                }
            }
            None => {
                let encoded = codec::encode("open", keys::VERSION_KEY.as_bytes(), &FORMAT_VERSION)?;
                storage.put(keys::VERSION_KEY.as_bytes(), &encoded)?;
            }
        }
        Ok(Self {
            storage,
            write_lock: Mutex::new(()),
            cache_ttl,
            cache_enabled,
        })
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    // ---- symbols ----

    /// Upsert one symbol and its secondary index entries in one batch.
    ///
    /// A rewrite replaces the previous row; index lists whose key changed
    /// (type or tags differ from the stored row) are cleaned up.
    pub fn store_symbol(&self, sym: &Symbol) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let fhash = keys::file_hash(&sym.file_path);
        let skey = keys::sym_key(&fhash, &sym.id);

        let old: Option<Symbol> = match self.storage.get(&skey)? {
            Some(bytes) => Some(codec::decode("store_symbol", &skey, &bytes)?),
            None => None,
        };

        let mut batch = WriteBatch::new();
        batch.put(skey.clone(), codec::encode("store_symbol", &skey, sym)?);
        batch.put(keys::sid_key(&sym.id), fhash.as_bytes().to_vec());

        if let Some(old) = &old {
            if !old.type_name.is_empty()
                && old.type_name.to_lowercase() != sym.type_name.to_lowercase()
            {
                self.stage_list_remove(&mut batch, keys::type_key(&old.type_name), &sym.id)?;
            }
            for tag in &old.tags {
                if !sym.tags.iter().any(|t| t.to_lowercase() == tag.to_lowercase()) {
                    self.stage_list_remove(&mut batch, keys::tag_key(tag), &sym.id)?;
                }
            }
        }

        self.stage_list_add(&mut batch, keys::name_key(&sym.name), &sym.id)?;
        if !sym.type_name.is_empty() {
            self.stage_list_add(&mut batch, keys::type_key(&sym.type_name), &sym.id)?;
        }
        for tag in &sym.tags {
            self.stage_list_add(&mut batch, keys::tag_key(tag), &sym.id)?;
        }

        self.stage_cache_eviction(&mut batch)?;
        self.storage.write_batch(batch)
    }

    pub fn get_symbol(&self, path: &str, id: &SymbolId) -> Result<Option<Symbol>, StorageError> {
        let key = keys::sym_key(&keys::file_hash(path), id);
        match self.storage.get(&key)? {
            Some(bytes) => Ok(Some(codec::decode("get_symbol", &key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove one symbol and every index entry pointing at it.
    ///
    /// Returns false when the symbol was not stored.
    pub fn delete_symbol(&self, path: &str, id: &SymbolId) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock();
        let fhash = keys::file_hash(path);
        let skey = keys::sym_key(&fhash, id);
        let sym: Symbol = match self.storage.get(&skey)? {
            Some(bytes) => codec::decode("delete_symbol", &skey, &bytes)?,
            None => return Ok(false),
        };

        let mut batch = WriteBatch::new();
        batch.delete(skey);
        batch.delete(keys::sid_key(id));
        self.stage_list_remove(&mut batch, keys::name_key(&sym.name), id)?;
        if !sym.type_name.is_empty() {
            self.stage_list_remove(&mut batch, keys::type_key(&sym.type_name), id)?;
        }
        for tag in &sym.tags {
            self.stage_list_remove(&mut batch, keys::tag_key(tag), id)?;
        }
        self.stage_cache_eviction(&mut batch)?;
        self.storage.write_batch(batch)?;
        Ok(true)
    }

    pub fn get_symbols_in_file(&self, path: &str) -> Result<Vec<Symbol>, StorageError> {
        let prefix = keys::sym_file_prefix(&keys::file_hash(path));
        let mut symbols = Vec::new();
        for (key, value) in self.storage.scan(&prefix, ScanOptions::default())? {
            symbols.push(codec::decode("get_symbols_in_file", &key, &value)?);
        }
        Ok(symbols)
    }

    // ---- file metadata ----

    pub fn store_file_metadata(&self, meta: &FileMetadata) -> Result<(), StorageError> {
        let key = keys::file_key(&keys::file_hash(&meta.path));
        let encoded = codec::encode("store_file_metadata", &key, meta)?;
        self.storage.put(&key, &encoded)
    }

    pub fn get_file_metadata(&self, path: &str) -> Result<Option<FileMetadata>, StorageError> {
        let key = keys::file_key(&keys::file_hash(path));
        match self.storage.get(&key)? {
            Some(bytes) => Ok(Some(codec::decode("get_file_metadata", &key, &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_all_files(&self) -> Result<Vec<FileMetadata>, StorageError> {
        let mut files = Vec::new();
        for (key, value) in self
            .storage
            .scan(keys::FILE_PREFIX.as_bytes(), ScanOptions::default())?
        {
            files.push(codec::decode("get_all_files", &key, &value)?);
        }
        Ok(files)
    }

    /// Cascade delete: the file's metadata, all of its symbols, their
    /// secondary index entries, and the references pointing at them.
    pub fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let fhash = keys::file_hash(path);
        let symbols = self.get_symbols_in_file(path)?;
        tracing::debug!(path, symbols = symbols.len(), "deleting file");

        let mut batch = WriteBatch::new();

        // Group index removals per key so each list is rewritten once.
        let mut removals: HashMap<Vec<u8>, Vec<SymbolId>> = HashMap::new();
        for sym in &symbols {
            batch.delete(keys::sym_key(&fhash, &sym.id));
            batch.delete(keys::sid_key(&sym.id));
            removals
                .entry(keys::name_key(&sym.name))
                .or_default()
                .push(sym.id.clone());
            if !sym.type_name.is_empty() {
                removals
                    .entry(keys::type_key(&sym.type_name))
                    .or_default()
                    .push(sym.id.clone());
            }
            for tag in &sym.tags {
                removals
                    .entry(keys::tag_key(tag))
                    .or_default()
                    .push(sym.id.clone());
            }
        }
        for (key, ids) in removals {
            let mut list = self.load_id_list(&key)?;
            list.retain(|id| !ids.contains(id));
            if list.is_empty() {
                batch.delete(key);
            } else {
                batch.put(key.clone(), codec::encode("delete_file", &key, &list)?);
            }
        }

        for sym in &symbols {
            let prefix = keys::ref_symbol_prefix(&keys::symbol_hash(&sym.id));
            for (key, _) in self.storage.scan(
                &prefix,
                ScanOptions {
                    keys_only: true,
                    ..Default::default()
                },
            )? {
                batch.delete(key);
            }
        }

        batch.delete(keys::file_key(&fhash));
        self.stage_cache_eviction(&mut batch)?;
        self.storage.write_batch(batch)
    }

    // ---- references ----

    pub fn store_reference(&self, reference: &Reference) -> Result<(), StorageError> {
        self.store_reference_batch(std::slice::from_ref(reference))
    }

    /// Write a set of references in a single batch.
    pub fn store_reference_batch(&self, references: &[Reference]) -> Result<(), StorageError> {
        if references.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock();
        let mut batch = WriteBatch::new();
        for reference in references {
            let key = keys::ref_key(
                &keys::symbol_hash(&reference.symbol_id),
                &keys::file_hash(&reference.file_path),
                reference.line,
            );
            batch.put(key.clone(), codec::encode("store_reference", &key, reference)?);
        }
        self.stage_cache_eviction(&mut batch)?;
        self.storage.write_batch(batch)
    }

    pub fn get_references_for_symbol(
        &self,
        id: &SymbolId,
    ) -> Result<Vec<Reference>, StorageError> {
        let prefix = keys::ref_symbol_prefix(&keys::symbol_hash(id));
        let mut refs = Vec::new();
        for (key, value) in self.storage.scan(&prefix, ScanOptions::default())? {
            refs.push(codec::decode("get_references_for_symbol", &key, &value)?);
        }
        Ok(refs)
    }

    /// Remove every reference located in one of `paths`, in a single
    /// scan of the `ref:` space. Used when a build replaces the
    /// reference sets of the files it re-parsed.
    pub fn delete_references_in_files(&self, paths: &[String]) -> Result<(), StorageError> {
        if paths.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock();
        let hashes: HashSet<String> = paths.iter().map(|p| keys::file_hash(p)).collect();
        let mut batch = WriteBatch::new();
        for (key, _) in self.storage.scan(
            keys::REF_PREFIX.as_bytes(),
            ScanOptions {
                keys_only: true,
                ..Default::default()
            },
        )? {
            // Key shape: ref:{symbolHash}:{fileHash}:{line}
            let key_str = String::from_utf8_lossy(&key);
            let mut parts = key_str[keys::REF_PREFIX.len()..].split(':');
            let (Some(_sym_hash), Some(file_hash)) = (parts.next(), parts.next()) else {
                continue;
            };
            if hashes.contains(file_hash) {
                batch.delete(key.clone());
            }
        }
        if !batch.is_empty() {
            self.storage.write_batch(batch)?;
        }
        Ok(())
    }

    pub fn delete_references_for_symbol(&self, id: &SymbolId) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let prefix = keys::ref_symbol_prefix(&keys::symbol_hash(id));
        let mut batch = WriteBatch::new();
        for (key, _) in self.storage.scan(
            &prefix,
            ScanOptions {
                keys_only: true,
                ..Default::default()
            },
        )? {
            batch.delete(key);
        }
        if !batch.is_empty() {
            self.storage.write_batch(batch)?;
        }
        Ok(())
    }

    // ---- search ----

    /// Plan and run a symbol query.
    ///
    /// 1. Fingerprint; return a fresh cache hit if present.
    /// 2. Resolve candidate ids (point-get for name/type/tag, full
    ///    `name:` scan for pattern queries).
    /// 3. Resolve ids to symbols via the `sid:` index.
    /// 4. Filter, sort, paginate.
    /// 5. Cache the page with the configured TTL.
    pub fn search_symbols(&self, query: &SymbolQuery) -> Result<SearchOutcome, StorageError> {
        let start = Instant::now();
        let fingerprint = query.fingerprint();
        let now = SystemTime::now();

        if self.cache_enabled {
            let ckey = keys::query_key(fingerprint);
            if let Some(bytes) = self.storage.get(&ckey)? {
                let cached: QueryResult = codec::decode("search_symbols", &ckey, &bytes)?;
                if !cached.is_expired(now) {
                    return Ok(SearchOutcome {
                        symbols: cached.symbols,
                        total: cached.total,
                        elapsed: start.elapsed(),
                        cached: true,
                    });
                }
            }
        }

        let ids = self.resolve_candidates(&query.mode)?;
        let mut symbols = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(sym) = self.resolve_id(id)? {
                symbols.push(sym);
            }
        }

        symbols.retain(|sym| query.filters.iter().all(|f| f.matches(sym)));
        let total = symbols.len();

        if let Some(sort) = &query.sort {
            match sort.field {
                SortField::Name => symbols.sort_by(|a, b| a.name.cmp(&b.name)),
                SortField::Type => symbols.sort_by(|a, b| a.type_name.cmp(&b.type_name)),
                SortField::FilePath => symbols.sort_by(|a, b| a.file_path.cmp(&b.file_path)),
                SortField::Line => symbols.sort_by(|a, b| a.start_line.cmp(&b.start_line)),
            }
            if sort.descending {
                symbols.reverse();
            }
        }

        let page: Vec<Symbol> = symbols
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        let elapsed = start.elapsed();
        if self.cache_enabled {
            let ckey = keys::query_key(fingerprint);
            let entry = QueryResult {
                fingerprint,
                symbols: page.clone(),
                total,
                elapsed,
                cached_at: now,
                expires_at: now + self.cache_ttl,
            };
            let encoded = codec::encode("search_symbols", &ckey, &entry)?;
            self.storage.put(&ckey, &encoded)?;
        }

        Ok(SearchOutcome {
            symbols: page,
            total,
            elapsed,
            cached: false,
        })
    }

    fn resolve_candidates(&self, mode: &QueryMode) -> Result<Vec<SymbolId>, StorageError> {
        match mode {
            QueryMode::ByName(term) => self.load_id_list(&keys::name_key(term)),
            QueryMode::ByType(term) => self.load_id_list(&keys::type_key(term)),
            QueryMode::ByTag(term) => self.load_id_list(&keys::tag_key(term)),
            QueryMode::ByPattern(term) => {
                let needle = term.to_lowercase();
                let mut seen = HashSet::new();
                let mut ids = Vec::new();
                for (key, value) in self
                    .storage
                    .scan(keys::NAME_PREFIX.as_bytes(), ScanOptions::default())?
                {
                    let name = &key[keys::NAME_PREFIX.len()..];
                    let name = String::from_utf8_lossy(name);
                    if !name.contains(&needle) {
                        continue;
                    }
                    let list: Vec<SymbolId> = codec::decode("search_symbols", &key, &value)?;
                    for id in list {
                        if seen.insert(id.clone()) {
                            ids.push(id);
                        }
                    }
                }
                Ok(ids)
            }
        }
    }

    /// Resolve a symbol id to its record via the `sid:` location index.
    fn resolve_id(&self, id: &SymbolId) -> Result<Option<Symbol>, StorageError> {
        let skey = keys::sid_key(id);
        let fhash = match self.storage.get(&skey)? {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            None => return Ok(None),
        };
        let key = keys::sym_key(&fhash, id);
        match self.storage.get(&key)? {
            Some(bytes) => Ok(Some(codec::decode("resolve_id", &key, &bytes)?)),
            None => Ok(None),
        }
    }

    // ---- internals ----

    fn load_id_list(&self, key: &[u8]) -> Result<Vec<SymbolId>, StorageError> {
        match self.storage.get(key)? {
            Some(bytes) => codec::decode("load_id_list", key, &bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Stage `id` into the list at `key`, preserving insertion order.
    fn stage_list_add(
        &self,
        batch: &mut WriteBatch,
        key: Vec<u8>,
        id: &SymbolId,
    ) -> Result<(), StorageError> {
        let mut list = self.load_id_list(&key)?;
        if !list.contains(id) {
            list.push(id.clone());
            batch.put(key.clone(), codec::encode("index_add", &key, &list)?);
        }
        Ok(())
    }

    /// Stage removal of `id` from the list at `key`; empty lists are
    /// deleted outright.
    fn stage_list_remove(
        &self,
        batch: &mut WriteBatch,
        key: Vec<u8>,
        id: &SymbolId,
    ) -> Result<(), StorageError> {
        let mut list = self.load_id_list(&key)?;
        let before = list.len();
        list.retain(|entry| entry != id);
        if list.len() == before {
            return Ok(());
        }
        if list.is_empty() {
            batch.delete(key);
        } else {
            batch.put(key.clone(), codec::encode("index_remove", &key, &list)?);
        }
        Ok(())
    }

    /// Eager invalidation: stage deletion of every cached query in the
    /// same batch as the mutation.
    fn stage_cache_eviction(&self, batch: &mut WriteBatch) -> Result<(), StorageError> {
        for (key, _) in self.storage.scan(
            keys::QUERY_PREFIX.as_bytes(),
            ScanOptions {
                keys_only: true,
                ..Default::default()
            },
        )? {
            batch.delete(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_core::{FilterField, FilterOp, Language, QueryFilter, QuerySort, SymbolKind};
    use crate::memory::MemoryStorage;

    fn open_store() -> SymbolStore {
        SymbolStore::open(Arc::new(MemoryStorage::new())).unwrap()
    }

    fn make_symbol(name: &str, file: &str, line: u32) -> Symbol {
        let mut sym = Symbol::new(name, SymbolKind::Function, file, line, line + 4, 1, 1);
        sym.type_name = "fn".to_string();
        sym
    }

    fn make_meta(path: &str) -> FileMetadata {
        FileMetadata {
            path: path.to_string(),
            hash: "ab".repeat(32),
            size: 64,
            mtime: SystemTime::UNIX_EPOCH,
            language: Language::Rust,
            symbol_count: 1,
            indexed_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn symbol_round_trip_field_by_field() {
        let store = open_store();
        let mut sym = make_symbol("process", "src/a.rs", 10);
        sym.signature = Some("fn process(input: &str) -> usize".to_string());
        sym.doc = Some("Processes input.".to_string());
        sym.tags.insert("public".to_string());
        sym.properties.insert("visibility".to_string(), "pub".to_string());
        sym.properties.insert("async".to_string(), "false".to_string());

        store.store_symbol(&sym).unwrap();
        let fetched = store.get_symbol("src/a.rs", &sym.id).unwrap().unwrap();
        assert_eq!(fetched, sym);
        // Insertion order of properties survives the codec.
        let props: Vec<&String> = fetched.properties.keys().collect();
        assert_eq!(props, vec!["visibility", "async"]);
    }

    #[test]
    fn secondary_indices_populated() {
        let store = open_store();
        let mut sym = make_symbol("Handler", "src/h.rs", 1);
        sym.tags.insert("Net".to_string());
        store.store_symbol(&sym).unwrap();

        let by_name = store
            .search_symbols(&SymbolQuery::new(QueryMode::ByName("handler".to_string())))
            .unwrap();
        assert_eq!(by_name.symbols.len(), 1);

        let by_type = store
            .search_symbols(&SymbolQuery::new(QueryMode::ByType("FN".to_string())))
            .unwrap();
        assert_eq!(by_type.symbols.len(), 1);

        let by_tag = store
            .search_symbols(&SymbolQuery::new(QueryMode::ByTag("net".to_string())))
            .unwrap();
        assert_eq!(by_tag.symbols.len(), 1);
    }

    #[test]
    fn rewrite_with_new_type_cleans_old_index() {
        let store = open_store();
        let mut sym = make_symbol("f", "src/a.rs", 1);
        store.store_symbol(&sym).unwrap();

        sym.type_name = "closure".to_string();
        store.store_symbol(&sym).unwrap();

        let old = store
            .search_symbols(&SymbolQuery::new(QueryMode::ByType("fn".to_string())))
            .unwrap();
        assert!(old.symbols.is_empty());
        let new = store
            .search_symbols(&SymbolQuery::new(QueryMode::ByType("closure".to_string())))
            .unwrap();
        assert_eq!(new.symbols.len(), 1);
    }

    #[test]
    fn delete_symbol_removes_index_entries() {
        let store = open_store();
        let sym = make_symbol("gone", "src/a.rs", 1);
        store.store_symbol(&sym).unwrap();
        assert!(store.delete_symbol("src/a.rs", &sym.id).unwrap());
        assert!(store.get_symbol("src/a.rs", &sym.id).unwrap().is_none());
        let hits = store
            .search_symbols(&SymbolQuery::new(QueryMode::ByName("gone".to_string())))
            .unwrap();
        assert!(hits.symbols.is_empty());
        // Deleting again reports absence.
        assert!(!store.delete_symbol("src/a.rs", &sym.id).unwrap());
    }

    #[test]
    fn delete_file_cascade() {
        let store = open_store();
        let mut s1 = make_symbol("alpha", "/src/x.go", 1);
        s1.tags.insert("a".to_string());
        s1.tags.insert("b".to_string());
        let mut s2 = make_symbol("beta", "/src/x.go", 10);
        s2.tags.insert("a".to_string());
        store.store_symbol(&s1).unwrap();
        store.store_symbol(&s2).unwrap();
        store.store_file_metadata(&make_meta("/src/x.go")).unwrap();
        store
            .store_reference(&Reference {
                symbol_id: s1.id.clone(),
                file_path: "/src/y.go".to_string(),
                line: 7,
                column: 2,
                kind: Default::default(),
                context: None,
            })
            .unwrap();

        store.delete_file("/src/x.go").unwrap();

        assert!(store.get_file_metadata("/src/x.go").unwrap().is_none());
        assert!(store.get_symbols_in_file("/src/x.go").unwrap().is_empty());
        for term in ["alpha", "beta"] {
            let hits = store
                .search_symbols(&SymbolQuery::new(QueryMode::ByName(term.to_string())))
                .unwrap();
            assert!(hits.symbols.is_empty(), "{term} should be gone");
        }
        for tag in ["a", "b"] {
            let hits = store
                .search_symbols(&SymbolQuery::new(QueryMode::ByTag(tag.to_string())))
                .unwrap();
            assert!(hits.symbols.is_empty(), "tag {tag} should be gone");
        }
        assert!(store.get_references_for_symbol(&s1.id).unwrap().is_empty());
    }

    #[test]
    fn reference_round_trip_and_prefix_delete() {
        let store = open_store();
        let sym = make_symbol("target", "src/t.rs", 1);
        store.store_symbol(&sym).unwrap();

        let refs: Vec<Reference> = (1..=3)
            .map(|line| Reference {
                symbol_id: sym.id.clone(),
                file_path: "src/user.rs".to_string(),
                line,
                column: 4,
                kind: Default::default(),
                context: Some(format!("line {line}")),
            })
            .collect();
        store.store_reference_batch(&refs).unwrap();

        let fetched = store.get_references_for_symbol(&sym.id).unwrap();
        assert_eq!(fetched.len(), 3);

        store.delete_references_for_symbol(&sym.id).unwrap();
        assert!(store.get_references_for_symbol(&sym.id).unwrap().is_empty());
    }

    #[test]
    fn pattern_search_filters_sorts_paginates() {
        let store = open_store();
        for (name, file, line) in [
            ("parse_args", "src/cli.rs", 5),
            ("parse_config", "src/config.rs", 9),
            ("parser_new", "src/parser.rs", 2),
            ("unrelated", "src/other.rs", 1),
        ] {
            store.store_symbol(&make_symbol(name, file, line)).unwrap();
        }

        let mut query = SymbolQuery::new(QueryMode::ByPattern("parse".to_string()));
        query.sort = Some(QuerySort {
            field: SortField::Name,
            descending: false,
        });
        let outcome = store.search_symbols(&query).unwrap();
        assert_eq!(outcome.total, 3);
        let names: Vec<&str> = outcome.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["parse_args", "parse_config", "parser_new"]);

        query.filters.push(QueryFilter {
            field: FilterField::FilePath,
            op: FilterOp::Contains,
            value: "config".to_string(),
        });
        let filtered = store.search_symbols(&query).unwrap();
        assert_eq!(filtered.total, 1);
        assert_eq!(filtered.symbols[0].name, "parse_config");

        query.filters.clear();
        query.offset = 1;
        query.limit = Some(1);
        let page = store.search_symbols(&query).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.symbols.len(), 1);
        assert_eq!(page.symbols[0].name, "parse_config");
    }

    #[test]
    fn query_cache_hit_and_invalidation() {
        let store = open_store();
        store
            .store_symbol(&make_symbol("cached", "src/c.rs", 1))
            .unwrap();

        let query = SymbolQuery::new(QueryMode::ByName("cached".to_string()));
        let first = store.search_symbols(&query).unwrap();
        assert!(!first.cached);
        let second = store.search_symbols(&query).unwrap();
        assert!(second.cached);

        // Any mutation evicts the cache.
        store
            .store_symbol(&make_symbol("other", "src/o.rs", 1))
            .unwrap();
        let third = store.search_symbols(&query).unwrap();
        assert!(!third.cached);
    }

    #[test]
    fn cache_can_be_disabled() {
        let store = SymbolStore::open_with(
            Arc::new(MemoryStorage::new()),
            Duration::from_secs(60),
            false,
        )
        .unwrap();
        store
            .store_symbol(&make_symbol("nocache", "src/n.rs", 1))
            .unwrap();
        let query = SymbolQuery::new(QueryMode::ByName("nocache".to_string()));
        assert!(!store.search_symbols(&query).unwrap().cached);
        assert!(!store.search_symbols(&query).unwrap().cached);
    }

    #[test]
    fn version_mismatch_is_corruption() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let encoded = serde_json::to_vec(&99u32).unwrap();
        storage.put(keys::VERSION_KEY.as_bytes(), &encoded).unwrap();
        let err = SymbolStore::open(storage).unwrap_err();
        assert!(err.is_corruption());
    }
}
