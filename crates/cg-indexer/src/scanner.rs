use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;

use crate::error::IndexerError;
use crate::report::IndexConfig;

/// Directories never entered, by the builder and the watcher alike.
pub(crate) const SKIP_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".bzr",
    "node_modules",
    "vendor",
    "target",
    ".vscode",
    ".idea",
    "__pycache__",
];

/// Compiled include/exclude globs, matched against both the basename and
/// the full relative path. Exclusion wins ties.
pub(crate) struct FilePatterns {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl FilePatterns {
    pub fn build(include: &[String], exclude: &[String]) -> Result<Self, IndexerError> {
        Ok(Self {
            include: Self::compile(include)?,
            exclude: Self::compile(exclude)?,
        })
    }

    fn compile(patterns: &[String]) -> Result<Option<GlobSet>, IndexerError> {
        if patterns.is_empty() {
            return Ok(None);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| IndexerError::Pattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        builder.build().map(Some).map_err(|e| IndexerError::Pattern {
            pattern: patterns.join(","),
            reason: e.to_string(),
        })
    }

    fn matches(set: &GlobSet, rel: &Path) -> bool {
        if set.is_match(rel) {
            return true;
        }
        rel.file_name()
            .is_some_and(|name| set.is_match(Path::new(name)))
    }

    pub fn accepts(&self, rel: &Path) -> bool {
        if let Some(exclude) = &self.exclude {
            if Self::matches(exclude, rel) {
                return false;
            }
        }
        match &self.include {
            Some(include) => Self::matches(include, rel),
            None => true,
        }
    }
}

/// Result of scanning a root for candidate files.
pub struct ScanResult {
    /// Paths relative to the root.
    pub files: Vec<PathBuf>,
    /// Entries seen, including skipped ones.
    pub total_entries: usize,
}

/// Discover candidate files under `root`.
///
/// Depth-first, gitignore-aware walk. Directories are entered unless
/// named in `SKIP_DIRS` or excluded by pattern; entries are dropped for
/// being symlinks (unless followed), oversized, or pattern-rejected.
pub fn scan_files(root: &Path, config: &IndexConfig) -> Result<ScanResult, IndexerError> {
    let patterns = FilePatterns::build(&config.include_patterns, &config.exclude_patterns)?;
    let dir_patterns = FilePatterns::build(&[], &config.exclude_patterns)?;

    let mut files = Vec::new();
    let mut total_entries = 0usize;

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .follow_links(config.follow_symlinks)
        .filter_entry(move |entry| {
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                if let Some(name) = entry.file_name().to_str() {
                    if SKIP_DIRS.contains(&name) {
                        return false;
                    }
                    if !dir_patterns.accepts(Path::new(name)) {
                        return false;
                    }
                }
            }
            true
        })
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        total_entries += 1;

        let Some(ft) = entry.file_type() else { continue };
        if ft.is_dir() {
            continue;
        }
        if ft.is_symlink() && !config.follow_symlinks {
            continue;
        }

        if config.max_file_size > 0 {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > config.max_file_size {
                continue;
            }
        }

        let rel = match entry.path().strip_prefix(root) {
            Ok(r) => r.to_path_buf(),
            Err(_) => continue,
        };
        if !patterns.accepts(&rel) {
            continue;
        }

        files.push(rel);
    }

    files.sort();
    Ok(ScanResult {
        files,
        total_entries,
    })
}

/// Normalize a relative path to the forward-slash string form used in
/// stored keys.
pub(crate) fn normalize_path(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "/")
}
