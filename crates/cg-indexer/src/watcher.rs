use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use notify::{Event, EventKind, RecursiveMode, Watcher as _};

use cg_core::CancelToken;

use crate::builder::IndexBuilder;
use crate::error::IndexerError;
use crate::scanner::SKIP_DIRS;

/// Filesystem operations the watcher reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOp {
    Create,
    Write,
    Remove,
    Rename,
}

/// One filtered filesystem event.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// Relative to the watched root.
    pub path: PathBuf,
    pub op: WatchOp,
    pub time: SystemTime,
    pub size: u64,
}

/// Watcher tuning knobs.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet interval after the last event before a batch is flushed.
    pub debounce: Duration,
    /// Queue length that forces an immediate flush.
    pub batch_size: usize,
    /// Extra directory names to skip, on top of the built-in list.
    pub exclude_patterns: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            batch_size: 50,
            exclude_patterns: Vec::new(),
        }
    }
}

/// Terminal state of a path after collapsing its queued events.
#[derive(Debug, PartialEq, Eq)]
enum PathAction {
    Reindex,
    Delete,
}

/// Handle to a running watcher. `stop` flushes the outstanding batch and
/// joins the processing thread.
pub struct WatcherHandle {
    stop_tx: Sender<()>,
    thread: Option<std::thread::JoinHandle<()>>,
    _watcher: notify::RecommendedWatcher,
}

impl WatcherHandle {
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Watch `root`, debounce and batch change events, and apply them:
/// deletes through the store, re-indexes through the builder with the
/// incremental diff bypassed.
pub fn start_watching(
    root: &Path,
    builder: Arc<IndexBuilder>,
    config: WatcherConfig,
) -> Result<WatcherHandle, IndexerError> {
    let root = root
        .canonicalize()
        .map_err(|e| IndexerError::Watcher(format!("cannot canonicalize root: {e}")))?;

    let (event_tx, event_rx) = bounded::<WatchEvent>(4096);
    let (stop_tx, stop_rx) = bounded::<()>(1);

    let event_root = root.clone();
    let excludes = config.exclude_patterns.clone();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let Ok(event) = result else { return };
        let Some(op) = map_event_kind(&event.kind) else {
            return;
        };
        for path in &event.paths {
            let Ok(rel) = path.strip_prefix(&event_root) else {
                continue;
            };
            if !is_watchable(rel, &excludes) {
                continue;
            }
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            // Best-effort send; drop events if the consumer is gone.
            let _ = event_tx.send(WatchEvent {
                path: rel.to_path_buf(),
                op,
                time: SystemTime::now(),
                size,
            });
        }
    })
    .map_err(|e| IndexerError::Watcher(format!("failed to create watcher: {e}")))?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| IndexerError::Watcher(format!("failed to watch root: {e}")))?;

    let thread = std::thread::spawn(move || {
        run_loop(&root, &builder, &config, &event_rx, &stop_rx);
    });

    Ok(WatcherHandle {
        stop_tx,
        thread: Some(thread),
        _watcher: watcher,
    })
}

/// Debounce/batch loop. The timer re-arms on every event; a full queue
/// flushes immediately; shutdown flushes whatever is left.
fn run_loop(
    root: &Path,
    builder: &Arc<IndexBuilder>,
    config: &WatcherConfig,
    events: &Receiver<WatchEvent>,
    stop: &Receiver<()>,
) {
    let mut queue: Vec<WatchEvent> = Vec::new();
    let mut deadline: Option<Instant> = None;

    loop {
        if stop.try_recv().is_ok() {
            break;
        }
        let timeout = match deadline {
            Some(d) => d.saturating_duration_since(Instant::now()),
            None => Duration::from_millis(200),
        };
        match events.recv_timeout(timeout) {
            Ok(event) => {
                queue.push(event);
                deadline = Some(Instant::now() + config.debounce);
                if queue.len() >= config.batch_size {
                    process_batch(root, builder, std::mem::take(&mut queue));
                    deadline = None;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    deadline = None;
                    if !queue.is_empty() {
                        process_batch(root, builder, std::mem::take(&mut queue));
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if !queue.is_empty() {
        process_batch(root, builder, queue);
    }
}

/// Collapse a batch to one terminal action per path.
fn collapse(batch: Vec<WatchEvent>) -> HashMap<PathBuf, PathAction> {
    let mut actions = HashMap::new();
    for event in batch {
        let action = match event.op {
            WatchOp::Create | WatchOp::Write => PathAction::Reindex,
            WatchOp::Remove | WatchOp::Rename => PathAction::Delete,
        };
        actions.insert(event.path, action);
    }
    actions
}

/// Deletes first, then a targeted re-index of the surviving paths.
fn process_batch(root: &Path, builder: &Arc<IndexBuilder>, batch: Vec<WatchEvent>) {
    let count = batch.len();
    let actions = collapse(batch);
    tracing::debug!(events = count, paths = actions.len(), "watch batch");

    let mut reindex = Vec::new();
    for (path, action) in actions {
        match action {
            PathAction::Delete => {
                let rel_str = path.to_string_lossy().replace('\\', "/");
                if let Err(e) = builder.store().delete_file(&rel_str) {
                    tracing::warn!(path = %rel_str, error = %e, "delete failed");
                }
            }
            PathAction::Reindex => reindex.push(path),
        }
    }

    if !reindex.is_empty() {
        let cancel = CancelToken::new();
        match builder.build_paths(root, &reindex, &cancel) {
            Ok(report) => tracing::debug!(
                processed = report.files_processed,
                errored = report.files_errored,
                "watch re-index done"
            ),
            Err(e) => tracing::warn!(error = %e, "watch re-index failed"),
        }
    }
}

fn map_event_kind(kind: &EventKind) -> Option<WatchOp> {
    match kind {
        EventKind::Create(_) => Some(WatchOp::Create),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => Some(WatchOp::Rename),
        EventKind::Modify(_) => Some(WatchOp::Write),
        EventKind::Remove(_) => Some(WatchOp::Remove),
        _ => None,
    }
}

/// Path filter: skip hidden components (the scanner never indexes them,
/// and the index directory itself lives under one), version-control and
/// build directories, plus configured excludes.
fn is_watchable(rel: &Path, excludes: &[String]) -> bool {
    for component in rel.components() {
        if let Component::Normal(name) = component {
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                return false;
            }
            if SKIP_DIRS.contains(&name.as_ref()) {
                return false;
            }
            if excludes.iter().any(|pattern| pattern == name.as_ref()) {
                return false;
            }
        }
    }
    true
}
