use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::RwLock;

/// Configuration for the indexing pipeline.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Degree of parallelism; 0 = number of logical CPUs.
    pub workers: usize,
    /// Files per internal queue segment and reference write batch.
    pub batch_size: usize,
    /// Re-parse only files whose mtime advanced past the stored one.
    pub incremental: bool,
    /// Globs matched against basename and full relative path.
    pub include_patterns: Vec<String>,
    /// Exclusion wins over inclusion on ties.
    pub exclude_patterns: Vec<String>,
    /// Bytes; 0 = unlimited.
    pub max_file_size: u64,
    pub follow_symlinks: bool,
    pub progress_enabled: bool,
    pub progress_interval: Duration,
    pub verbose: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            batch_size: 100,
            incremental: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_file_size: 10 * 1024 * 1024,
            follow_symlinks: false,
            progress_enabled: false,
            progress_interval: Duration::from_secs(1),
            verbose: false,
        }
    }
}

impl IndexConfig {
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

/// The two builder stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Symbols,
    References,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbols => f.write_str("symbols"),
            Self::References => f.write_str("references"),
        }
    }
}

/// One per-file failure recorded during a build.
#[derive(Debug, Clone)]
pub struct IndexError {
    pub path: String,
    pub message: String,
    pub timestamp: SystemTime,
}

/// Report produced by a completed build.
#[derive(Debug)]
pub struct BuildReport {
    pub files_discovered: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_errored: usize,
    pub symbols_indexed: usize,
    pub references_indexed: usize,
    pub errors: Vec<IndexError>,
    pub duration: Duration,
}

/// Point-in-time view of a running build.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub phase: Phase,
    pub files_discovered: u64,
    pub files_processed: u64,
    pub files_skipped: u64,
    pub files_errored: u64,
    pub symbols_indexed: u64,
    pub references_indexed: u64,
    pub elapsed: Duration,
    /// `elapsed / processed × remaining`; None until the first file lands.
    pub eta: Option<Duration>,
    pub current_file: String,
}

/// Shared counters updated by workers and read by the progress ticker.
///
/// Counters are atomics; the error list and current file sit behind a
/// read-write lock.
#[derive(Debug)]
pub(crate) struct ProgressState {
    phase: RwLock<Phase>,
    pub discovered: AtomicU64,
    pub processed: AtomicU64,
    pub skipped: AtomicU64,
    pub errored: AtomicU64,
    pub symbols: AtomicU64,
    pub references: AtomicU64,
    current_file: RwLock<String>,
    errors: RwLock<Vec<IndexError>>,
    started: Instant,
}

impl ProgressState {
    pub fn new() -> Self {
        Self {
            phase: RwLock::new(Phase::Symbols),
            discovered: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            errored: AtomicU64::new(0),
            symbols: AtomicU64::new(0),
            references: AtomicU64::new(0),
            current_file: RwLock::new(String::new()),
            errors: RwLock::new(Vec::new()),
            started: Instant::now(),
        }
    }

    pub fn set_phase(&self, phase: Phase) {
        *self.phase.write() = phase;
    }

    pub fn set_current_file(&self, path: &str) {
        *self.current_file.write() = path.to_string();
    }

    pub fn record_error(&self, path: &str, message: String) {
        self.errored.fetch_add(1, Ordering::Relaxed);
        self.errors.write().push(IndexError {
            path: path.to_string(),
            message,
            timestamp: SystemTime::now(),
        });
    }

    pub fn take_errors(&self) -> Vec<IndexError> {
        std::mem::take(&mut *self.errors.write())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let discovered = self.discovered.load(Ordering::Relaxed);
        let processed = self.processed.load(Ordering::Relaxed);
        let skipped = self.skipped.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed();
        let remaining = discovered.saturating_sub(processed + skipped);
        let eta = if processed > 0 && remaining > 0 {
            Some(Duration::from_secs_f64(
                elapsed.as_secs_f64() / processed as f64 * remaining as f64,
            ))
        } else {
            None
        };
        ProgressSnapshot {
            phase: *self.phase.read(),
            files_discovered: discovered,
            files_processed: processed,
            files_skipped: skipped,
            files_errored: self.errored.load(Ordering::Relaxed),
            symbols_indexed: self.symbols.load(Ordering::Relaxed),
            references_indexed: self.references.load(Ordering::Relaxed),
            elapsed,
            eta,
            current_file: self.current_file.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = IndexConfig::default();
        assert_eq!(config.batch_size, 100);
        assert!(config.incremental);
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert!(!config.follow_symlinks);
        assert_eq!(config.progress_interval, Duration::from_secs(1));
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn eta_scales_with_remaining() {
        let state = ProgressState::new();
        state.discovered.store(10, Ordering::Relaxed);
        state.processed.store(5, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(20));
        let snap = state.snapshot();
        let eta = snap.eta.expect("eta should be available");
        // 5 remaining at the same rate as the 5 processed.
        let ratio = eta.as_secs_f64() / snap.elapsed.as_secs_f64();
        assert!((ratio - 1.0).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn errors_counted_and_drained() {
        let state = ProgressState::new();
        state.record_error("a.rs", "boom".to_string());
        state.record_error("b.rs", "bang".to_string());
        assert_eq!(state.snapshot().files_errored, 2);
        let errors = state.take_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path, "a.rs");
    }
}
