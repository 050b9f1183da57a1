use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_channel::Sender;
use regex::Regex;

use cg_core::CancelToken;

use crate::error::SearchError;
use crate::options::SearchOptions;
use crate::pattern::PatternCache;
use crate::types::{ContextLine, SearchResult, SearchStats, SubMatch};
use crate::walker::collect_files;

/// Capacity of the path and result channels feeding the worker pool.
const PATH_QUEUE: usize = 128;
const RESULT_QUEUE: usize = 1024;

#[derive(Default)]
struct Counts {
    files_searched: AtomicU64,
    files_with_matches: AtomicU64,
    files_errored: AtomicU64,
    lines_searched: AtomicU64,
    bytes_searched: AtomicU64,
    matched_lines: AtomicU64,
    matches: AtomicU64,
}

/// One source line with its byte offset in the file.
struct Line<'a> {
    number: u64,
    offset: u64,
    text: &'a str,
}

/// Streaming parallel regex search: a feeder pushes file paths onto a
/// bounded channel, workers match and emit results, the caller collects.
/// Within one file results arrive in ascending line order; across files
/// order is unspecified (the formatter sorts).
#[derive(Default)]
pub struct RegexSearcher {
    cache: PatternCache,
}

impl RegexSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip(self, opts, cancel), fields(pattern = %opts.pattern))]
    pub fn search(
        &self,
        opts: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<(Vec<SearchResult>, SearchStats), SearchError> {
        let started = Instant::now();
        let regex = self.cache.compile(opts)?;
        let files = collect_files(opts)?;
        let threads = opts.effective_threads().max(1);
        let counts = Counts::default();

        let (path_tx, path_rx) = crossbeam_channel::bounded(PATH_QUEUE);
        let (result_tx, result_rx) = crossbeam_channel::bounded(RESULT_QUEUE);

        let files_ref = &files;
        let results = std::thread::scope(|scope| {
            scope.spawn(move || {
                for path in files_ref {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if path_tx.send(path.as_path()).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..threads {
                let path_rx = path_rx.clone();
                let result_tx = result_tx.clone();
                let regex = &regex;
                let counts = &counts;
                scope.spawn(move || {
                    for path in path_rx.iter() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        search_file(path, regex, opts, counts, &result_tx, cancel);
                    }
                });
            }
            drop(path_rx);
            drop(result_tx);

            result_rx.iter().collect::<Vec<SearchResult>>()
        });

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let stats = SearchStats {
            files_searched: counts.files_searched.load(Ordering::Relaxed),
            files_with_matches: counts.files_with_matches.load(Ordering::Relaxed),
            files_errored: counts.files_errored.load(Ordering::Relaxed),
            lines_searched: counts.lines_searched.load(Ordering::Relaxed),
            bytes_searched: counts.bytes_searched.load(Ordering::Relaxed),
            matched_lines: counts.matched_lines.load(Ordering::Relaxed),
            matches: counts.matches.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
            engine: "regex",
        };
        Ok((results, stats))
    }
}

fn search_file(
    path: &Path,
    regex: &Regex,
    opts: &SearchOptions,
    counts: &Counts,
    out: &Sender<SearchResult>,
    cancel: &CancelToken,
) {
    let content = match std::fs::read(path) {
        Ok(c) => c,
        Err(_) => {
            counts.files_errored.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    if !opts.binary && looks_binary(&content) {
        return;
    }
    if let Some(max) = opts.max_filesize {
        if content.len() as u64 > max {
            return;
        }
    }

    counts.files_searched.fetch_add(1, Ordering::Relaxed);
    counts
        .bytes_searched
        .fetch_add(content.len() as u64, Ordering::Relaxed);

    let text = String::from_utf8_lossy(&content);
    let path_str = path.to_string_lossy().into_owned();
    let path_str = path_str.strip_prefix("./").unwrap_or(&path_str).to_string();

    let results = if opts.multiline {
        let results = match_multiline(&text, &path_str, regex, opts);
        counts
            .lines_searched
            .fetch_add(text.lines().count() as u64, Ordering::Relaxed);
        counts
            .matches
            .fetch_add(results.len() as u64, Ordering::Relaxed);
        let distinct: std::collections::HashSet<u64> =
            results.iter().map(|r| r.line_number).collect();
        counts
            .matched_lines
            .fetch_add(distinct.len() as u64, Ordering::Relaxed);
        results
    } else {
        match_lines(&text, &path_str, regex, opts, counts, cancel)
    };

    if !results.is_empty() {
        counts.files_with_matches.fetch_add(1, Ordering::Relaxed);
    }
    for result in results {
        if out.send(result).is_err() {
            return;
        }
    }
}

/// Binary sniff: NUL byte or invalid UTF-8 in the first 8 KiB.
fn looks_binary(content: &[u8]) -> bool {
    let window = &content[..content.len().min(8192)];
    if window.contains(&0) {
        return true;
    }
    match std::str::from_utf8(window) {
        Ok(_) => false,
        Err(e) => !(e.error_len().is_none() && content.len() > window.len()),
    }
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0u64;
    let mut number = 0u64;
    for raw in text.split_inclusive('\n') {
        number += 1;
        let stripped = raw.strip_suffix('\n').unwrap_or(raw);
        let stripped = stripped.strip_suffix('\r').unwrap_or(stripped);
        lines.push(Line {
            number,
            offset,
            text: stripped,
        });
        offset += raw.len() as u64;
    }
    lines
}

/// Line mode. Emits one result per matching line (or per submatch in
/// only-matching mode, or per non-matching line when inverted), capped
/// by max_count matching lines per file.
fn match_lines(
    text: &str,
    path: &str,
    regex: &Regex,
    opts: &SearchOptions,
    counts: &Counts,
    cancel: &CancelToken,
) -> Vec<SearchResult> {
    let lines = split_lines(text);
    counts
        .lines_searched
        .fetch_add(lines.len() as u64, Ordering::Relaxed);

    // (line index, result) pairs so context can be attached afterwards.
    let mut hits: Vec<(usize, SearchResult)> = Vec::new();
    let mut emitted_lines = 0u64;

    for (idx, line) in lines.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let found: Vec<(usize, usize)> = regex
            .find_iter(line.text)
            .map(|m| (m.start(), m.end()))
            .collect();
        // A pattern matching only the empty string yields exactly one
        // match per line, at column 1.
        let found = if !found.is_empty() && found.iter().all(|(s, e)| s == e) {
            vec![(0usize, 0usize)]
        } else {
            found
        };

        if opts.invert_match {
            if found.is_empty() {
                counts.matched_lines.fetch_add(1, Ordering::Relaxed);
                counts.matches.fetch_add(1, Ordering::Relaxed);
                hits.push((
                    idx,
                    SearchResult {
                        file_path: path.to_string(),
                        line_number: line.number,
                        column: 1,
                        line: line.text.to_string(),
                        matched: String::new(),
                        absolute_offset: line.offset,
                        submatches: Vec::new(),
                        context_before: Vec::new(),
                        context_after: Vec::new(),
                        metadata: None,
                    },
                ));
                emitted_lines += 1;
            }
        } else if !found.is_empty() {
            counts.matched_lines.fetch_add(1, Ordering::Relaxed);
            counts
                .matches
                .fetch_add(found.len() as u64, Ordering::Relaxed);
            let submatches: Vec<SubMatch> = found
                .iter()
                .map(|&(start, end)| SubMatch {
                    text: line.text[start..end].to_string(),
                    start,
                    end,
                })
                .collect();
            if opts.only_matching {
                for sub in &submatches {
                    hits.push((
                        idx,
                        SearchResult {
                            file_path: path.to_string(),
                            line_number: line.number,
                            column: sub.start as u64 + 1,
                            line: sub.text.clone(),
                            matched: sub.text.clone(),
                            absolute_offset: line.offset,
                            submatches: vec![sub.clone()],
                            context_before: Vec::new(),
                            context_after: Vec::new(),
                            metadata: None,
                        },
                    ));
                }
            } else {
                hits.push((
                    idx,
                    SearchResult {
                        file_path: path.to_string(),
                        line_number: line.number,
                        column: submatches[0].start as u64 + 1,
                        line: line.text.to_string(),
                        matched: submatches[0].text.clone(),
                        absolute_offset: line.offset,
                        submatches,
                        context_before: Vec::new(),
                        context_after: Vec::new(),
                        metadata: None,
                    },
                ));
            }
            emitted_lines += 1;
        }

        if opts.max_count.is_some_and(|cap| emitted_lines >= cap) {
            break;
        }
    }

    attach_context(&lines, &mut hits, opts);
    hits.into_iter().map(|(_, r)| r).collect()
}

fn attach_context(lines: &[Line<'_>], hits: &mut [(usize, SearchResult)], opts: &SearchOptions) {
    if opts.before_context == 0 && opts.after_context == 0 {
        return;
    }
    for (idx, result) in hits.iter_mut() {
        let start = idx.saturating_sub(opts.before_context);
        result.context_before = lines[start..*idx]
            .iter()
            .map(|l| ContextLine {
                line_number: l.number,
                text: l.text.to_string(),
            })
            .collect();
        let end = (*idx + 1 + opts.after_context).min(lines.len());
        result.context_after = lines[*idx + 1..end]
            .iter()
            .map(|l| ContextLine {
                line_number: l.number,
                text: l.text.to_string(),
            })
            .collect();
    }
}

/// Multiline mode: the pattern runs against the whole file. Each match
/// is reported at the line containing its start.
fn match_multiline(
    text: &str,
    path: &str,
    regex: &Regex,
    opts: &SearchOptions,
) -> Vec<SearchResult> {
    let lines = split_lines(text);
    let mut results = Vec::new();

    for m in regex.find_iter(text) {
        if m.start() == m.end() {
            continue;
        }
        let idx = lines
            .partition_point(|l| (l.offset as usize) <= m.start())
            .saturating_sub(1);
        let line = &lines[idx];
        let rel_start = m.start() - line.offset as usize;
        let rel_end = (m.end() - line.offset as usize).min(line.text.len());

        results.push(SearchResult {
            file_path: path.to_string(),
            line_number: line.number,
            column: rel_start as u64 + 1,
            line: line.text.to_string(),
            matched: m.as_str().to_string(),
            absolute_offset: line.offset,
            submatches: vec![SubMatch {
                text: m.as_str().to_string(),
                start: rel_start,
                end: rel_end.max(rel_start),
            }],
            context_before: Vec::new(),
            context_after: Vec::new(),
            metadata: None,
        });
        if opts.max_count.is_some_and(|cap| results.len() as u64 >= cap) {
            break;
        }
    }
    results
}
