use std::time::Duration;

/// A contiguous matching span within a line. Offsets are 0-based bytes
/// relative to the line start, the form the JSON output needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubMatch {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// A context line adjacent to a match, with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLine {
    pub line_number: u64,
    pub text: String,
}

/// Semantic annotations attached to results from the symbol engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMetadata {
    /// `symbol`, `reference`, `type`, or `call`.
    pub kind: String,
    pub scope: String,
    pub symbol_name: String,
    pub symbol_type: String,
    /// `path:line` of the definition, when known.
    pub definition: Option<String>,
    /// `path:line` of each known use-site.
    pub references: Vec<String>,
}

/// One match (or inverted non-match, or semantic hit).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub file_path: String,
    /// 1-based.
    pub line_number: u64,
    /// 1-based byte column of the first submatch.
    pub column: u64,
    /// The whole matching line, or just the match in only-matching mode.
    pub line: String,
    /// Exact matched text.
    pub matched: String,
    /// Byte offset of the line start within the file.
    pub absolute_offset: u64,
    pub submatches: Vec<SubMatch>,
    pub context_before: Vec<ContextLine>,
    pub context_after: Vec<ContextLine>,
    pub metadata: Option<ResultMetadata>,
}

/// Run statistics fed to the summary output.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub files_searched: u64,
    pub files_with_matches: u64,
    pub files_errored: u64,
    pub lines_searched: u64,
    pub bytes_searched: u64,
    pub matched_lines: u64,
    pub matches: u64,
    pub elapsed: Duration,
    /// `regex`, `semantic`, or `hybrid`.
    pub engine: &'static str,
}
