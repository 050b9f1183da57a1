use std::path::PathBuf;
use std::time::Duration;

/// When to emit ANSI colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    Always,
    Never,
    #[default]
    Auto,
}

impl ColorMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "always" => Some(Self::Always),
            "never" => Some(Self::Never),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Everything a search run can be asked to do. The CLI maps its flags
/// onto this; library callers fill it directly.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub pattern: String,
    /// Roots (or single files) to search; defaults to `.`.
    pub paths: Vec<PathBuf>,

    // Pattern behavior.
    pub case_insensitive: bool,
    pub word_regexp: bool,
    pub line_regexp: bool,
    pub fixed_strings: bool,
    pub invert_match: bool,
    pub multiline: bool,
    pub multiline_dotall: bool,

    // Output selection.
    pub line_number: bool,
    /// None = decide from the number of paths searched.
    pub with_filename: Option<bool>,
    pub no_heading: bool,
    pub count: bool,
    pub files_with_matches: bool,
    pub only_matching: bool,
    pub column: bool,
    pub before_context: usize,
    pub after_context: usize,
    pub json: bool,
    pub color: ColorMode,
    pub stats: bool,

    // File selection.
    pub include_types: Vec<String>,
    pub exclude_types: Vec<String>,
    /// `!`-prefixed entries exclude.
    pub globs: Vec<String>,
    pub max_depth: Option<usize>,
    pub max_filesize: Option<u64>,
    pub hidden: bool,
    pub binary: bool,

    // Limits and scheduling.
    pub max_count: Option<u64>,
    /// 0 = number of logical CPUs.
    pub threads: usize,
    pub timeout: Option<Duration>,

    // Semantic mode.
    pub symbols: bool,
    pub refs: bool,
    pub types_query: bool,
    pub call_graph: bool,
    pub hybrid: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            paths: vec![PathBuf::from(".")],
            case_insensitive: false,
            word_regexp: false,
            line_regexp: false,
            fixed_strings: false,
            invert_match: false,
            multiline: false,
            multiline_dotall: false,
            line_number: true,
            with_filename: None,
            no_heading: false,
            count: false,
            files_with_matches: false,
            only_matching: false,
            column: false,
            before_context: 0,
            after_context: 0,
            json: false,
            color: ColorMode::Auto,
            stats: false,
            include_types: Vec::new(),
            exclude_types: Vec::new(),
            globs: Vec::new(),
            max_depth: None,
            max_filesize: None,
            hidden: false,
            binary: false,
            max_count: None,
            threads: 0,
            timeout: None,
            symbols: false,
            refs: false,
            types_query: false,
            call_graph: false,
            hybrid: false,
        }
    }
}

impl SearchOptions {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Default::default()
        }
    }

    /// Symmetric `-C` context: sets both sides.
    pub fn with_context(mut self, n: usize) -> Self {
        self.before_context = n;
        self.after_context = n;
        self
    }

    /// Any semantic flag switches the engine to semantic mode.
    pub fn semantic_mode(&self) -> bool {
        self.symbols || self.refs || self.types_query || self.call_graph
    }

    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}
