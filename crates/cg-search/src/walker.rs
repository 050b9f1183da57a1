use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;

use cg_core::Language;

use crate::error::SearchError;
use crate::options::SearchOptions;

/// Collect the files a search run will visit, applying hidden/depth,
/// glob, type, and size filters.
pub(crate) fn collect_files(opts: &SearchOptions) -> Result<Vec<PathBuf>, SearchError> {
    let include_exts = extensions_for(&opts.include_types);
    let exclude_exts = extensions_for(&opts.exclude_types);

    let mut files = Vec::new();
    for root in &opts.paths {
        if root.is_file() {
            // Explicit file arguments bypass the filters.
            files.push(root.clone());
            continue;
        }

        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(!opts.hidden)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(false)
            .max_depth(opts.max_depth);

        if !opts.globs.is_empty() {
            let mut overrides = OverrideBuilder::new(root);
            for glob in &opts.globs {
                overrides.add(glob).map_err(|e| SearchError::Pattern {
                    pattern: glob.clone(),
                    reason: e.to_string(),
                })?;
            }
            let overrides = overrides.build().map_err(|e| SearchError::Pattern {
                pattern: opts.globs.join(","),
                reason: e.to_string(),
            })?;
            builder.overrides(overrides);
        }

        for entry in builder.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let Some(ft) = entry.file_type() else {
                continue;
            };
            if !ft.is_file() {
                continue;
            }
            let path = entry.path();

            if !type_filter_accepts(path, &include_exts, &exclude_exts) {
                continue;
            }
            if let Some(max) = opts.max_filesize {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                if size > max {
                    continue;
                }
            }
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

fn extensions_for(type_names: &[String]) -> Vec<&'static str> {
    let mut exts = Vec::new();
    for name in type_names {
        if let Some(lang) = Language::from_type_name(name) {
            exts.extend_from_slice(lang.extensions());
        }
    }
    exts
}

fn type_filter_accepts(path: &Path, include: &[&str], exclude: &[&str]) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if exclude.contains(&ext) {
        return false;
    }
    if include.is_empty() {
        return true;
    }
    include.contains(&ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn names(files: &[PathBuf]) -> Vec<String> {
        let mut names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn hidden_files_skipped_by_default() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("seen.txt"), "x").unwrap();
        fs::write(tmp.path().join(".hidden"), "x").unwrap();

        let mut opts = SearchOptions::new("x");
        opts.paths = vec![tmp.path().to_path_buf()];
        assert_eq!(names(&collect_files(&opts).unwrap()), vec!["seen.txt"]);

        opts.hidden = true;
        assert_eq!(
            names(&collect_files(&opts).unwrap()),
            vec![".hidden", "seen.txt"]
        );
    }

    #[test]
    fn type_filters_include_and_exclude() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("a.rs"), "x").unwrap();
        fs::write(tmp.path().join("b.py"), "x").unwrap();
        fs::write(tmp.path().join("c.txt"), "x").unwrap();

        let mut opts = SearchOptions::new("x");
        opts.paths = vec![tmp.path().to_path_buf()];
        opts.include_types = vec!["rust".to_string()];
        assert_eq!(names(&collect_files(&opts).unwrap()), vec!["a.rs"]);

        opts.include_types.clear();
        opts.exclude_types = vec!["python".to_string()];
        assert_eq!(
            names(&collect_files(&opts).unwrap()),
            vec!["a.rs", "c.txt"]
        );
    }

    #[test]
    fn globs_with_negation() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("keep.rs"), "x").unwrap();
        fs::write(tmp.path().join("skip.rs"), "x").unwrap();
        fs::write(tmp.path().join("other.py"), "x").unwrap();

        let mut opts = SearchOptions::new("x");
        opts.paths = vec![tmp.path().to_path_buf()];
        opts.globs = vec!["*.rs".to_string(), "!skip.rs".to_string()];
        assert_eq!(names(&collect_files(&opts).unwrap()), vec!["keep.rs"]);
    }

    #[test]
    fn max_depth_limits_walk() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("top.txt"), "x").unwrap();
        let deep = tmp.path().join("a").join("b");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("deep.txt"), "x").unwrap();

        let mut opts = SearchOptions::new("x");
        opts.paths = vec![tmp.path().to_path_buf()];
        opts.max_depth = Some(1);
        assert_eq!(names(&collect_files(&opts).unwrap()), vec!["top.txt"]);
    }

    #[test]
    fn explicit_file_path_always_included() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join(".hidden.bin");
        fs::write(&file, "x").unwrap();

        let mut opts = SearchOptions::new("x");
        opts.paths = vec![file.clone()];
        assert_eq!(collect_files(&opts).unwrap(), vec![file]);
    }
}
