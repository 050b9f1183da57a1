mod args;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cg_core::{CancelToken, ErrorKind, FileErrorKind};
use cg_indexer::{start_watching, IndexBuilder, IndexConfig, IndexError, WatcherConfig};
use cg_output::{JsonFormatter, TextFormatter};
use cg_parser::TreeSitterParser;
use cg_search::{ColorMode, Engine, SearchError, SearchOptions, SemanticSearcher};
use cg_storage::{SledStorage, SymbolStore};

use args::{Cli, Commands, IndexArgs, SearchArgs, WatchArgs};

/// Exit codes: 0 = match found, 1 = no match, 2 = error.
const EXIT_MATCH: i32 = 0;
const EXIT_NO_MATCH: i32 = 1;
const EXIT_ERROR: i32 = 2;

/// First K error details printed in the end-of-run summary.
const ERROR_DETAIL_LIMIT: usize = 10;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Some(Commands::Index(args)) => cmd_index(args),
        Some(Commands::Watch(args)) => cmd_watch(args),
        None => cmd_search(cli.search),
    };
    std::process::exit(code);
}

fn cmd_search(args: SearchArgs) -> i32 {
    let Some(pattern) = args.pattern.clone() else {
        eprintln!("codegrep: a pattern is required (see --help)");
        return EXIT_ERROR;
    };

    let opts = match to_search_options(pattern, &args) {
        Ok(opts) => opts,
        Err(message) => {
            eprintln!("codegrep: {message}");
            return EXIT_ERROR;
        }
    };

    let semantic = if opts.semantic_mode() || opts.hybrid {
        match open_semantic(&args, &opts) {
            Ok(searcher) => Some(searcher),
            Err(message) => {
                eprintln!("codegrep: {message}");
                return EXIT_ERROR;
            }
        }
    } else {
        None
    };

    let engine = Engine::new(semantic);
    let (results, stats) = match engine.search(&opts) {
        Ok(ok) => ok,
        Err(SearchError::Timeout(d)) => {
            eprintln!("codegrep: search timed out after {d:?}");
            return EXIT_ERROR;
        }
        Err(e) => {
            eprintln!("codegrep: {e}");
            return EXIT_ERROR;
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let written = if opts.json {
        JsonFormatter::new(&opts).write(&results, &stats, &mut out)
    } else {
        TextFormatter::new(&opts).write(&results, &stats, &mut out)
    };
    if let Err(e) = written.and_then(|_| out.flush().map_err(Into::into)) {
        eprintln!("codegrep: write failed: {e}");
        return EXIT_ERROR;
    }

    if opts.stats {
        eprintln!(
            "{} files searched, {} lines, {} matches in {:.3}s ({} engine)",
            stats.files_searched,
            stats.lines_searched,
            stats.matches,
            stats.elapsed.as_secs_f64(),
            stats.engine,
        );
    }

    if results.is_empty() {
        EXIT_NO_MATCH
    } else {
        EXIT_MATCH
    }
}

fn to_search_options(pattern: String, args: &SearchArgs) -> Result<SearchOptions, String> {
    let mut opts = SearchOptions::new(pattern);
    if !args.paths.is_empty() {
        opts.paths = args.paths.clone();
    }
    opts.case_insensitive = args.ignore_case;
    opts.word_regexp = args.word_regexp;
    opts.line_regexp = args.line_regexp;
    opts.fixed_strings = args.fixed_strings;
    opts.invert_match = args.invert_match;
    opts.no_heading = args.no_heading;
    opts.count = args.count;
    opts.files_with_matches = args.files_with_matches;
    opts.only_matching = args.only_matching;
    opts.column = args.column;
    if args.with_filename {
        opts.with_filename = Some(true);
    }
    if let Some(n) = args.context {
        opts.before_context = n;
        opts.after_context = n;
    }
    if let Some(n) = args.before_context {
        opts.before_context = n;
    }
    if let Some(n) = args.after_context {
        opts.after_context = n;
    }
    opts.include_types = args.type_include.clone();
    opts.exclude_types = args.type_exclude.clone();
    opts.globs = args.globs.clone();
    opts.max_count = args.max_count;
    opts.max_depth = args.max_depth;
    opts.max_filesize = args.max_filesize;
    opts.hidden = args.hidden;
    opts.binary = args.binary;
    opts.threads = args.threads.unwrap_or(0);
    opts.json = args.json;
    if let Some(mode) = &args.color {
        opts.color = ColorMode::parse(mode)
            .ok_or_else(|| format!("invalid --color mode '{mode}' (always/never/auto)"))?;
    }
    opts.multiline = args.multiline;
    opts.multiline_dotall = args.multiline_dotall;
    if let Some(secs) = args.timeout {
        if secs <= 0.0 {
            return Err("--timeout must be positive".to_string());
        }
        opts.timeout = Some(Duration::from_secs_f64(secs));
    }
    opts.stats = args.stats;
    opts.symbols = args.symbols;
    opts.refs = args.refs;
    opts.types_query = args.types;
    opts.call_graph = args.call_graph;
    opts.hybrid = args.hybrid;
    Ok(opts)
}

/// Open the on-disk index for semantic queries.
fn open_semantic(args: &SearchArgs, opts: &SearchOptions) -> Result<SemanticSearcher, String> {
    let dir = match &args.index_dir {
        Some(dir) => dir.clone(),
        None => index_dir_for(opts.paths.first().map(PathBuf::as_path)),
    };
    if !dir.exists() {
        return Err(format!(
            "no index at {} (run `codegrep index` first)",
            dir.display()
        ));
    }
    let storage = SledStorage::open(&dir).map_err(|e| format!("cannot open index: {e}"))?;
    let store = SymbolStore::open(Arc::new(storage)).map_err(|e| format!("index unusable: {e}"))?;
    Ok(SemanticSearcher::new(Arc::new(store)))
}

fn index_dir_for(root: Option<&Path>) -> PathBuf {
    let base = match root {
        Some(path) if path.is_file() => path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from("."),
    };
    base.join(".codegrep")
}

fn cmd_index(args: IndexArgs) -> i32 {
    let root = args.path.clone().unwrap_or_else(|| PathBuf::from("."));
    let builder = match open_builder(&root, &args) {
        Ok(builder) => builder,
        Err(message) => {
            eprintln!("codegrep: {message}");
            return EXIT_ERROR;
        }
    };

    let cancel = CancelToken::new();
    let built = if args.rebuild {
        builder.rebuild_index(&root, &cancel)
    } else {
        builder.build_index(&root, &cancel)
    };
    let report = match built {
        Ok(report) => report,
        Err(e) => {
            eprintln!("codegrep: index build failed: {e}");
            return EXIT_ERROR;
        }
    };

    println!(
        "indexed {} files ({} skipped, {} errors): {} symbols, {} references in {:.2}s",
        report.files_processed,
        report.files_skipped,
        report.files_errored,
        report.symbols_indexed,
        report.references_indexed,
        report.duration.as_secs_f64(),
    );
    print_error_summary(&report.errors);
    EXIT_MATCH
}

fn open_builder(root: &Path, args: &IndexArgs) -> Result<Arc<IndexBuilder>, String> {
    let dir = root.join(".codegrep");
    std::fs::create_dir_all(&dir).map_err(|e| format!("cannot create {}: {e}", dir.display()))?;
    let storage = SledStorage::open(&dir).map_err(|e| format!("cannot open index: {e}"))?;
    let store = SymbolStore::open(Arc::new(storage)).map_err(|e| format!("index unusable: {e}"))?;

    let mut config = IndexConfig {
        include_patterns: args.include.clone(),
        exclude_patterns: args.exclude.clone(),
        follow_symlinks: args.follow_symlinks,
        progress_enabled: args.progress,
        verbose: args.verbose,
        ..Default::default()
    };
    if let Some(threads) = args.threads {
        config.workers = threads;
    }
    if let Some(max) = args.max_filesize {
        config.max_file_size = max;
    }

    Ok(Arc::new(IndexBuilder::new(
        Arc::new(store),
        Arc::new(TreeSitterParser::new()),
        config,
    )))
}

fn cmd_watch(args: WatchArgs) -> i32 {
    let root = args.path.clone().unwrap_or_else(|| PathBuf::from("."));
    let index_args = IndexArgs {
        path: Some(root.clone()),
        rebuild: false,
        threads: None,
        include: Vec::new(),
        exclude: Vec::new(),
        max_filesize: None,
        follow_symlinks: false,
        progress: false,
        verbose: false,
    };
    let builder = match open_builder(&root, &index_args) {
        Ok(builder) => builder,
        Err(message) => {
            eprintln!("codegrep: {message}");
            return EXIT_ERROR;
        }
    };

    // Bring the index current before watching.
    let cancel = CancelToken::new();
    if let Err(e) = builder.build_index(&root, &cancel) {
        eprintln!("codegrep: initial build failed: {e}");
        return EXIT_ERROR;
    }

    let config = WatcherConfig {
        debounce: Duration::from_millis(args.debounce_ms),
        batch_size: args.batch_size,
        ..Default::default()
    };
    let _handle = match start_watching(&root, Arc::clone(&builder), config) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("codegrep: {e}");
            return EXIT_ERROR;
        }
    };

    eprintln!("watching {} (Ctrl-C to stop)", root.display());
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

/// "Encountered N errors: kind1: n1, kind2: n2" plus the first few
/// details.
fn print_error_summary(errors: &[IndexError]) {
    if errors.is_empty() {
        return;
    }
    let mut by_kind: BTreeMap<&'static str, usize> = BTreeMap::new();
    for error in errors {
        *by_kind.entry(classify(&error.message)).or_insert(0) += 1;
    }
    let summary: Vec<String> = by_kind
        .iter()
        .map(|(kind, n)| format!("{kind}: {n}"))
        .collect();
    eprintln!(
        "Encountered {} errors: {}",
        errors.len(),
        summary.join(", ")
    );
    for error in errors.iter().take(ERROR_DETAIL_LIMIT) {
        eprintln!("  {}: {}", error.path, error.message);
    }
    if errors.len() > ERROR_DETAIL_LIMIT {
        eprintln!("  ... and {} more", errors.len() - ERROR_DETAIL_LIMIT);
    }
}

/// Map a recorded per-file failure onto the error taxonomy.
fn classify(message: &str) -> &'static str {
    let kind = if message.contains("too large") {
        ErrorKind::File(FileErrorKind::FileTooBig)
    } else if message.contains("No such file") {
        ErrorKind::File(FileErrorKind::NotFound)
    } else if message.contains("ermission denied") {
        ErrorKind::File(FileErrorKind::PermissionDenied)
    } else if message.contains("read failed") || message.contains("stat failed") {
        ErrorKind::File(FileErrorKind::UnsupportedFile)
    } else if message.contains("encoding") || message.contains("parse") {
        ErrorKind::Parse
    } else if message.contains("store") || message.contains("metadata") {
        ErrorKind::Storage
    } else {
        return "other";
    };
    kind.label()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_search_args() -> SearchArgs {
        use clap::Parser;
        Cli::parse_from(["codegrep", "pat"]).search
    }

    #[test]
    fn options_mapping_covers_context() {
        let mut args = default_search_args();
        args.context = Some(3);
        args.after_context = Some(5);
        let opts = to_search_options("p".to_string(), &args).unwrap();
        // -C sets both; a later -A overrides one side.
        assert_eq!(opts.before_context, 3);
        assert_eq!(opts.after_context, 5);
    }

    #[test]
    fn invalid_color_mode_is_an_error() {
        let mut args = default_search_args();
        args.color = Some("rainbow".to_string());
        assert!(to_search_options("p".to_string(), &args).is_err());
    }

    #[test]
    fn index_dir_defaults_next_to_the_search_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("a.rs");
        std::fs::write(&file, "x").unwrap();
        assert_eq!(index_dir_for(Some(&file)), tmp.path().join(".codegrep"));
        assert_eq!(
            index_dir_for(Some(tmp.path())),
            tmp.path().join(".codegrep")
        );
    }

    #[test]
    fn error_classification() {
        assert_eq!(
            classify("read failed: No such file or directory (os error 2)"),
            "not_found"
        );
        assert_eq!(
            classify("read failed: Permission denied (os error 13)"),
            "permission_denied"
        );
        assert_eq!(classify("parse failed for x: bad"), "parse");
        assert_eq!(classify("store failed: sled"), "storage");
        assert_eq!(classify("surprising"), "other");
    }
}
