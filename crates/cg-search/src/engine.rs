use std::collections::HashSet;

use cg_core::CancelToken;

use crate::error::SearchError;
use crate::options::SearchOptions;
use crate::regex_search::RegexSearcher;
use crate::semantic::SemanticSearcher;
use crate::types::{SearchResult, SearchStats};

/// Top-level coordinator: picks the engine, enforces the timeout, and
/// merges hybrid streams.
pub struct Engine {
    regex: RegexSearcher,
    semantic: Option<SemanticSearcher>,
}

impl Engine {
    pub fn new(semantic: Option<SemanticSearcher>) -> Self {
        Self {
            regex: RegexSearcher::new(),
            semantic,
        }
    }

    /// Run a search. With a timeout configured the work runs on a helper
    /// thread; on expiry the cancel token propagates and the error is
    /// `SearchError::Timeout`, distinct from a user cancel.
    pub fn search(
        &self,
        opts: &SearchOptions,
    ) -> Result<(Vec<SearchResult>, SearchStats), SearchError> {
        let cancel = CancelToken::new();
        let Some(timeout) = opts.timeout else {
            return self.dispatch(opts, &cancel);
        };

        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                let _ = tx.send(self.dispatch(opts, &cancel));
            });
            match rx.recv_timeout(timeout) {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    // The scope joins the worker; it exits at its next
                    // cancellation poll.
                    Err(SearchError::Timeout(timeout))
                }
            }
        })
    }

    fn dispatch(
        &self,
        opts: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<(Vec<SearchResult>, SearchStats), SearchError> {
        if opts.hybrid {
            return self.hybrid(opts, cancel);
        }
        if opts.semantic_mode() {
            let semantic = self.semantic.as_ref().ok_or_else(|| {
                SearchError::SemanticUnavailable("no index opened for this run".to_string())
            })?;
            return semantic.search(opts, cancel);
        }
        self.regex.search(opts, cancel)
    }

    /// Both engines, regex stream first, deduplicated by
    /// (file path, line number).
    fn hybrid(
        &self,
        opts: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<(Vec<SearchResult>, SearchStats), SearchError> {
        let semantic = self.semantic.as_ref().ok_or_else(|| {
            SearchError::SemanticUnavailable("hybrid search needs an index".to_string())
        })?;

        let (mut results, mut stats) = self.regex.search(opts, cancel)?;
        let (semantic_results, semantic_stats) = semantic.search(opts, cancel)?;

        let mut seen: HashSet<(String, u64)> = results
            .iter()
            .map(|r| (r.file_path.clone(), r.line_number))
            .collect();
        for result in semantic_results {
            if seen.insert((result.file_path.clone(), result.line_number)) {
                results.push(result);
            }
        }

        stats.matches = results.len() as u64;
        stats.matched_lines = stats.matches;
        stats.files_searched += semantic_stats.files_searched;
        stats.engine = "hybrid";
        Ok((results, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_core::{Symbol, SymbolKind};
    use cg_storage::{MemoryStorage, SymbolStore};
    use std::fs;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn dir_with_files(count: usize) -> tempfile::TempDir {
        let tmp = tempfile::TempDir::new().unwrap();
        for i in 0..count {
            fs::write(
                tmp.path().join(format!("f{i}.txt")),
                "test line\nother\n".repeat(50),
            )
            .unwrap();
        }
        tmp
    }

    #[test]
    fn regex_mode_is_the_default() {
        let tmp = dir_with_files(2);
        let mut opts = SearchOptions::new("test");
        opts.paths = vec![tmp.path().to_path_buf()];
        let engine = Engine::new(None);
        let (results, stats) = engine.search(&opts).unwrap();
        assert!(!results.is_empty());
        assert_eq!(stats.engine, "regex");
    }

    #[test]
    fn semantic_mode_without_index_is_an_error() {
        let mut opts = SearchOptions::new("thing");
        opts.symbols = true;
        let engine = Engine::new(None);
        assert!(matches!(
            engine.search(&opts),
            Err(SearchError::SemanticUnavailable(_))
        ));
    }

    #[test]
    fn timeout_aborts_and_releases_workers() {
        let tmp = dir_with_files(20);
        let mut opts = SearchOptions::new("test");
        opts.paths = vec![tmp.path().to_path_buf()];
        opts.timeout = Some(Duration::from_nanos(1));

        let engine = Engine::new(None);
        let started = Instant::now();
        let err = engine.search(&opts).unwrap_err();
        assert!(err.is_timeout());
        // Workers must have drained within the grace window.
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn generous_timeout_still_returns_results() {
        let tmp = dir_with_files(2);
        let mut opts = SearchOptions::new("test");
        opts.paths = vec![tmp.path().to_path_buf()];
        opts.timeout = Some(Duration::from_secs(30));
        let engine = Engine::new(None);
        let (results, _) = engine.search(&opts).unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn hybrid_merges_and_dedupes_by_path_and_line() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("src.rs"), "fn target() {}\n").unwrap();

        let store = Arc::new(SymbolStore::open(Arc::new(MemoryStorage::new())).unwrap());
        // The same (file, line) as the regex hit, plus one extra.
        store
            .store_symbol(&Symbol::new(
                "target",
                SymbolKind::Function,
                "src.rs",
                1,
                1,
                4,
                10,
            ))
            .unwrap();
        store
            .store_symbol(&Symbol::new(
                "target_other",
                SymbolKind::Function,
                "other.rs",
                7,
                7,
                1,
                5,
            ))
            .unwrap();

        let mut opts = SearchOptions::new("target");
        opts.paths = vec![tmp.path().to_path_buf()];
        opts.hybrid = true;
        opts.symbols = true;

        let engine = Engine::new(Some(SemanticSearcher::new(store)));
        let (results, stats) = engine.search(&opts).unwrap();
        assert_eq!(stats.engine, "hybrid");

        let keys: Vec<(String, u64)> = results
            .iter()
            .map(|r| (r.file_path.clone(), r.line_number))
            .collect();
        let unique: HashSet<_> = keys.iter().cloned().collect();
        assert_eq!(keys.len(), unique.len(), "hybrid results must be deduped");
        assert!(keys.contains(&("other.rs".to_string(), 7)));
    }
}
