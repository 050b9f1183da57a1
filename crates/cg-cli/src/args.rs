use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Top-level CLI entrypoint for `codegrep`.
///
/// `-h` is ripgrep's `--no-heading`, so clap's short help flag is
/// disabled; help remains available as `--help`.
#[derive(Parser, Debug)]
#[command(
    name = "codegrep",
    about = "ripgrep-compatible code search with a persistent symbol index",
    disable_help_flag = true,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[arg(long = "help", action = ArgAction::Help, help = "Print help")]
    help: Option<bool>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub search: SearchArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build or update the persistent symbol index.
    Index(IndexArgs),
    /// Watch a tree and keep its index current until interrupted.
    Watch(WatchArgs),
}

/// Arguments of the default (search) invocation.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search pattern.
    #[arg(value_name = "PATTERN")]
    pub pattern: Option<String>,

    /// Files or directories to search (default: current directory).
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    #[arg(short = 'i', long = "ignore-case")]
    pub ignore_case: bool,

    #[arg(short = 'w', long = "word-regexp")]
    pub word_regexp: bool,

    #[arg(short = 'x', long = "line-regexp")]
    pub line_regexp: bool,

    #[arg(short = 'F', long = "fixed-strings")]
    pub fixed_strings: bool,

    #[arg(short = 'v', long = "invert-match")]
    pub invert_match: bool,

    #[arg(short = 'n', long = "line-number")]
    pub line_number: bool,

    /// Always print the filename.
    #[arg(short = 'H', long = "with-filename")]
    pub with_filename: bool,

    /// Never print a filename heading; prefix each line instead.
    #[arg(short = 'h', long = "no-heading")]
    pub no_heading: bool,

    #[arg(short = 'c', long = "count")]
    pub count: bool,

    #[arg(short = 'l', long = "files-with-matches")]
    pub files_with_matches: bool,

    #[arg(short = 'o', long = "only-matching")]
    pub only_matching: bool,

    /// Show the 1-based column of the first match.
    #[arg(long = "column")]
    pub column: bool,

    #[arg(short = 'A', long = "after-context", value_name = "N")]
    pub after_context: Option<usize>,

    #[arg(short = 'B', long = "before-context", value_name = "N")]
    pub before_context: Option<usize>,

    #[arg(short = 'C', long = "context", value_name = "N")]
    pub context: Option<usize>,

    /// Only search files of TYPE (e.g. rust, python).
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub type_include: Vec<String>,

    /// Skip files of TYPE.
    #[arg(short = 'T', long = "type-not", value_name = "TYPE")]
    pub type_exclude: Vec<String>,

    /// Include files matching GLOB; prefix with ! to exclude.
    #[arg(short = 'g', long = "glob", value_name = "GLOB")]
    pub globs: Vec<String>,

    #[arg(long = "max-count", value_name = "N")]
    pub max_count: Option<u64>,

    #[arg(long = "max-depth", value_name = "N")]
    pub max_depth: Option<usize>,

    #[arg(long = "max-filesize", value_name = "BYTES")]
    pub max_filesize: Option<u64>,

    /// Search hidden files and directories.
    #[arg(long = "hidden")]
    pub hidden: bool,

    /// Search binary files too.
    #[arg(long = "binary")]
    pub binary: bool,

    /// Worker count (0 = number of CPUs).
    #[arg(short = 'j', long = "threads", value_name = "N")]
    pub threads: Option<usize>,

    #[arg(long = "json")]
    pub json: bool,

    /// always, never, or auto.
    #[arg(long = "color", value_name = "MODE")]
    pub color: Option<String>,

    #[arg(long = "multiline")]
    pub multiline: bool,

    #[arg(long = "multiline-dotall")]
    pub multiline_dotall: bool,

    /// Abort the search after this many seconds.
    #[arg(long = "timeout", value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Print run statistics to stderr.
    #[arg(long = "stats")]
    pub stats: bool,

    // Semantic mode.
    /// Look the pattern up as a symbol name.
    #[arg(long = "symbols")]
    pub symbols: bool,

    /// Show the definition and references of the named symbol.
    #[arg(long = "refs")]
    pub refs: bool,

    /// Look the pattern up in the type index.
    #[arg(long = "types")]
    pub types: bool,

    /// Reserved; currently behaves like --refs.
    #[arg(long = "call-graph")]
    pub call_graph: bool,

    /// Merge regex and semantic result streams.
    #[arg(long = "hybrid")]
    pub hybrid: bool,

    /// Index directory (default: <first path>/.codegrep).
    #[arg(long = "index-dir", value_name = "DIR")]
    pub index_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Tree to index (default: current directory).
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Delete the existing index first and rebuild from scratch.
    #[arg(long = "rebuild")]
    pub rebuild: bool,

    #[arg(short = 'j', long = "threads", value_name = "N")]
    pub threads: Option<usize>,

    /// Glob of files to include.
    #[arg(long = "include", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Glob of files to exclude (wins over --include).
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    #[arg(long = "max-filesize", value_name = "BYTES")]
    pub max_filesize: Option<u64>,

    #[arg(long = "follow-symlinks")]
    pub follow_symlinks: bool,

    /// Emit progress snapshots while building.
    #[arg(long = "progress")]
    pub progress: bool,

    #[arg(long = "verbose")]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Tree to watch (default: current directory).
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Debounce window in milliseconds.
    #[arg(long = "debounce-ms", value_name = "MS", default_value_t = 500)]
    pub debounce_ms: u64,

    /// Event count that forces an immediate flush.
    #[arg(long = "batch-size", value_name = "N", default_value_t = 50)]
    pub batch_size: usize,
}
