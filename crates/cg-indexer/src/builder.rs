use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use cg_core::{CancelToken, FileMetadata, Reference, SymbolId};
use cg_parser::{ParserError, SymbolIndex, SymbolParser};
use cg_storage::SymbolStore;

use crate::error::IndexerError;
use crate::report::{BuildReport, IndexConfig, Phase, ProgressSnapshot, ProgressState};
use crate::scanner::{normalize_path, scan_files};

/// How often a failing `parse_references` call is retried, and the pause
/// between attempts.
const REFERENCE_RETRIES: usize = 2;
const REFERENCE_BACKOFF: Duration = Duration::from_millis(100);

/// Outcome of phase 1 for a single file.
enum FileOutcome {
    Indexed(usize),
    Skipped,
}

/// Two-phase index builder: discover → filter → incremental diff →
/// parse symbols (parallel) → resolve references (parallel).
pub struct IndexBuilder {
    store: Arc<SymbolStore>,
    parser: Arc<dyn SymbolParser>,
    config: IndexConfig,
    progress: RwLock<Arc<ProgressState>>,
}

impl IndexBuilder {
    pub fn new(store: Arc<SymbolStore>, parser: Arc<dyn SymbolParser>, config: IndexConfig) -> Self {
        Self {
            store,
            parser,
            config,
            progress: RwLock::new(Arc::new(ProgressState::new())),
        }
    }

    pub fn store(&self) -> &Arc<SymbolStore> {
        &self.store
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Snapshot of the currently running (or last) build.
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.read().snapshot()
    }

    /// Build the index for `root`, honoring the incremental setting.
    #[tracing::instrument(skip(self, cancel))]
    pub fn build_index(
        &self,
        root: &Path,
        cancel: &CancelToken,
    ) -> Result<BuildReport, IndexerError> {
        let scan = scan_files(root, &self.config)?;
        tracing::info!(files = scan.files.len(), "index build started");

        let mut work = Vec::new();
        let mut unchanged = 0u64;
        if self.config.incremental {
            for rel in scan.files {
                if self.needs_reindex(root, &rel)? {
                    work.push(rel);
                } else {
                    unchanged += 1;
                }
            }
        } else {
            work = scan.files;
        }

        self.run_build(root, work, unchanged, cancel)
    }

    /// Re-index exactly the given relative paths, bypassing the
    /// incremental diff. Used by the watcher after change events.
    #[tracing::instrument(skip(self, paths, cancel))]
    pub fn build_paths(
        &self,
        root: &Path,
        paths: &[PathBuf],
        cancel: &CancelToken,
    ) -> Result<BuildReport, IndexerError> {
        self.run_build(root, paths.to_vec(), 0, cancel)
    }

    /// Drop every indexed file (cascading to symbols and references) and
    /// rebuild from scratch.
    #[tracing::instrument(skip(self, cancel))]
    pub fn rebuild_index(
        &self,
        root: &Path,
        cancel: &CancelToken,
    ) -> Result<BuildReport, IndexerError> {
        for meta in self.store.get_all_files()? {
            self.store.delete_file(&meta.path)?;
        }
        let scan = scan_files(root, &self.config)?;
        self.run_build(root, scan.files, 0, cancel)
    }

    /// A candidate needs re-parsing iff nothing is stored for it or the
    /// filesystem mtime is newer than the stored one.
    fn needs_reindex(&self, root: &Path, rel: &Path) -> Result<bool, IndexerError> {
        let rel_str = normalize_path(rel);
        let Some(stored) = self.store.get_file_metadata(&rel_str)? else {
            return Ok(true);
        };
        let fs_mtime = match std::fs::metadata(root.join(rel)).and_then(|m| m.modified()) {
            Ok(t) => t,
            // Races with deletion; let phase 1 record the read failure.
            Err(_) => return Ok(true),
        };
        Ok(stored.mtime < fs_mtime)
    }

    fn run_build(
        &self,
        root: &Path,
        work: Vec<PathBuf>,
        unchanged: u64,
        cancel: &CancelToken,
    ) -> Result<BuildReport, IndexerError> {
        let started = Instant::now();
        let progress = Arc::new(ProgressState::new());
        *self.progress.write() = Arc::clone(&progress);
        progress
            .discovered
            .store(work.len() as u64 + unchanged, Ordering::Relaxed);
        progress.skipped.store(unchanged, Ordering::Relaxed);

        let (ticker_stop_tx, ticker_stop_rx) = crossbeam_channel::bounded::<()>(0);
        let ticker = if self.config.progress_enabled {
            let progress = Arc::clone(&progress);
            let interval = self.config.progress_interval;
            Some(std::thread::spawn(move || loop {
                match ticker_stop_rx.recv_timeout(interval) {
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                        let snap = progress.snapshot();
                        tracing::info!(
                            phase = %snap.phase,
                            discovered = snap.files_discovered,
                            processed = snap.files_processed,
                            skipped = snap.files_skipped,
                            errored = snap.files_errored,
                            symbols = snap.symbols_indexed,
                            references = snap.references_indexed,
                            eta_secs = snap.eta.map(|d| d.as_secs()),
                            current = %snap.current_file,
                            "index progress"
                        );
                    }
                    _ => break,
                }
            }))
        } else {
            None
        };

        let result = self.run_phases(root, &work, &progress, cancel);

        drop(ticker_stop_tx);
        if let Some(handle) = ticker {
            let _ = handle.join();
        }

        result?;
        if cancel.is_cancelled() {
            return Err(IndexerError::Cancelled);
        }

        let report = BuildReport {
            files_discovered: progress.discovered.load(Ordering::Relaxed) as usize,
            files_processed: progress.processed.load(Ordering::Relaxed) as usize,
            files_skipped: progress.skipped.load(Ordering::Relaxed) as usize,
            files_errored: progress.errored.load(Ordering::Relaxed) as usize,
            symbols_indexed: progress.symbols.load(Ordering::Relaxed) as usize,
            references_indexed: progress.references.load(Ordering::Relaxed) as usize,
            errors: progress.take_errors(),
            duration: started.elapsed(),
        };
        tracing::info!(
            processed = report.files_processed,
            skipped = report.files_skipped,
            errored = report.files_errored,
            symbols = report.symbols_indexed,
            references = report.references_indexed,
            duration_secs = %format!("{:.2}", report.duration.as_secs_f64()),
            "index build completed"
        );
        Ok(report)
    }

    fn run_phases(
        &self,
        root: &Path,
        work: &[PathBuf],
        progress: &Arc<ProgressState>,
        cancel: &CancelToken,
    ) -> Result<(), IndexerError> {
        // Phase 1: a feeder pushes paths onto a bounded channel; workers
        // drain it, parse, and store.
        progress.set_phase(Phase::Symbols);
        let workers = self.config.effective_workers();
        let (tx, rx) = crossbeam_channel::bounded::<PathBuf>(self.config.batch_size.max(1));

        std::thread::scope(|scope| {
            scope.spawn(move || {
                for rel in work {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if tx.send(rel.clone()).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..workers {
                let rx = rx.clone();
                scope.spawn(move || {
                    for rel in rx.iter() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let rel_str = normalize_path(&rel);
                        progress.set_current_file(&rel_str);
                        match self.index_one_file(root, &rel, &rel_str) {
                            Ok(FileOutcome::Indexed(count)) => {
                                progress.processed.fetch_add(1, Ordering::Relaxed);
                                progress.symbols.fetch_add(count as u64, Ordering::Relaxed);
                            }
                            Ok(FileOutcome::Skipped) => {
                                progress.skipped.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(message) => progress.record_error(&rel_str, message),
                        }
                    }
                });
            }
            drop(rx);
        });

        if cancel.is_cancelled() {
            return Ok(());
        }

        // Phase 2: resolve references against an in-memory symbol index.
        if !self.parser.supports_references() {
            return Ok(());
        }
        progress.set_phase(Phase::References);

        let files = self.store.get_all_files()?;
        let mut index = SymbolIndex::new();
        let mut known: HashSet<SymbolId> = HashSet::new();
        let mut failed = 0usize;
        for meta in &files {
            match self.store.get_symbols_in_file(&meta.path) {
                Ok(symbols) => {
                    for sym in symbols {
                        index.insert(&sym.name, sym.id.clone());
                        known.insert(sym.id);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %meta.path, error = %e, "symbol load failed");
                    failed += 1;
                }
            }
        }
        if !files.is_empty() && failed * 2 > files.len() {
            return Err(IndexerError::SymbolIndexFailed {
                failed,
                total: files.len(),
            });
        }

        // Each build fully replaces the reference sets of the files it
        // re-parsed.
        let work_strs: Vec<String> = work.iter().map(|p| normalize_path(p)).collect();
        self.store.delete_references_in_files(&work_strs)?;

        work.par_iter().for_each(|rel| {
            if cancel.is_cancelled() {
                return;
            }
            let rel_str = normalize_path(rel);
            progress.set_current_file(&rel_str);
            match self.resolve_one_file(root, rel, &rel_str, &index, &known) {
                Ok(count) => {
                    progress.references.fetch_add(count as u64, Ordering::Relaxed);
                }
                Err(message) => progress.record_error(&rel_str, message),
            }
        });

        Ok(())
    }

    /// Phase 1 for one file: hash, parse, replace metadata and symbols.
    /// Per-file failures come back as messages and never abort the build.
    fn index_one_file(
        &self,
        root: &Path,
        rel: &Path,
        rel_str: &str,
    ) -> Result<FileOutcome, String> {
        let abs = root.join(rel);
        let content = std::fs::read(&abs).map_err(|e| format!("read failed: {e}"))?;

        // The file may have grown past the cap since discovery.
        if self.config.max_file_size > 0 && content.len() as u64 > self.config.max_file_size {
            return Ok(FileOutcome::Skipped);
        }

        let symbols = match self.parser.parse_file(rel_str, &content) {
            Ok(symbols) => symbols,
            Err(ParserError::UnsupportedLanguage { .. }) => return Ok(FileOutcome::Skipped),
            Err(e) => return Err(e.to_string()),
        };

        let mtime = std::fs::metadata(&abs)
            .and_then(|m| m.modified())
            .map_err(|e| format!("stat failed: {e}"))?;

        let hash = {
            let digest = Sha256::digest(&content);
            digest.iter().map(|b| format!("{b:02x}")).collect::<String>()
        };
        let language = Path::new(rel_str)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(cg_core::Language::from_extension)
            .unwrap_or(cg_core::Language::Rust);

        // Replace: drop stored symbols that no longer exist, upsert the
        // rest, then swap the metadata row.
        let old = self
            .store
            .get_symbols_in_file(rel_str)
            .map_err(|e| format!("load failed: {e}"))?;
        let new_ids: HashSet<&SymbolId> = symbols.iter().map(|s| &s.id).collect();
        for gone in old.iter().filter(|s| !new_ids.contains(&s.id)) {
            self.store
                .delete_symbol(rel_str, &gone.id)
                .map_err(|e| format!("delete failed: {e}"))?;
        }
        for sym in &symbols {
            self.store
                .store_symbol(sym)
                .map_err(|e| format!("store failed: {e}"))?;
        }
        self.store
            .store_file_metadata(&FileMetadata {
                path: rel_str.to_string(),
                hash,
                size: content.len() as u64,
                mtime,
                language,
                symbol_count: symbols.len() as u32,
                indexed_at: std::time::SystemTime::now(),
            })
            .map_err(|e| format!("metadata store failed: {e}"))?;

        Ok(FileOutcome::Indexed(symbols.len()))
    }

    /// Phase 2 for one file: parse references with retry/back-off,
    /// validate, filter orphans, and write in fixed-size batches.
    fn resolve_one_file(
        &self,
        root: &Path,
        rel: &Path,
        rel_str: &str,
        index: &SymbolIndex,
        known: &HashSet<SymbolId>,
    ) -> Result<usize, String> {
        let abs = root.join(rel);
        let content = std::fs::read(&abs).map_err(|e| format!("read failed: {e}"))?;

        let mut references = None;
        let mut last_error = String::new();
        for attempt in 0..=REFERENCE_RETRIES {
            match self.parser.parse_references(rel_str, &content, index) {
                Ok(refs) => {
                    references = Some(refs);
                    break;
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < REFERENCE_RETRIES {
                        std::thread::sleep(REFERENCE_BACKOFF);
                    }
                }
            }
        }
        let Some(references) = references else {
            return Err(format!("reference parse failed: {last_error}"));
        };

        let valid: Vec<Reference> = references
            .into_iter()
            .map(|mut r| {
                if r.file_path.is_empty() {
                    r.file_path = rel_str.to_string();
                }
                r
            })
            .filter(|r| r.is_valid() && known.contains(&r.symbol_id))
            .collect();

        let mut written = 0usize;
        for chunk in valid.chunks(self.config.batch_size.max(1)) {
            self.store
                .store_reference_batch(chunk)
                .map_err(|e| format!("reference store failed: {e}"))?;
            written += chunk.len();
        }
        Ok(written)
    }
}
