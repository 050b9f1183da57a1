use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use cg_search::{SearchOptions, SearchResult, SearchStats};

use crate::error::OutputError;

/// ripgrep-compatible newline-delimited JSON stream.
///
/// One `begin` record, `match` records sorted like the text output, one
/// `summary` record. The `semantic` block on match records is additive:
/// stripping it yields plain ripgrep output.
pub struct JsonFormatter<'a> {
    opts: &'a SearchOptions,
}

#[derive(Serialize)]
struct Record<T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: T,
}

#[derive(Serialize)]
struct Text<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BeginData<'a> {
    timestamp: u64,
    pattern: &'a str,
    semantic: bool,
}

#[derive(Serialize)]
struct SubMatchData<'a> {
    #[serde(rename = "match")]
    matched: Text<'a>,
    start: usize,
    end: usize,
}

#[derive(Serialize)]
struct SemanticData<'a> {
    symbol_type: &'a str,
    symbol_name: &'a str,
    scope: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    definition: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    references: Vec<&'a str>,
}

#[derive(Serialize)]
struct MatchData<'a> {
    path: Text<'a>,
    lines: Text<'a>,
    line_number: u64,
    absolute_offset: u64,
    submatches: Vec<SubMatchData<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    semantic: Option<SemanticData<'a>>,
}

#[derive(Serialize)]
struct CountData<'a> {
    path: Text<'a>,
    count: usize,
}

#[derive(Serialize)]
struct PathData<'a> {
    path: Text<'a>,
}

#[derive(Serialize)]
struct Elapsed {
    secs: u64,
    nanos: u32,
}

#[derive(Serialize)]
struct SummaryData {
    elapsed_total: Elapsed,
    searches: u64,
    searches_with_match: u64,
    bytes_searched: u64,
    bytes_printed: u64,
    matched_lines: u64,
    matches: u64,
}

impl<'a> JsonFormatter<'a> {
    pub fn new(opts: &'a SearchOptions) -> Self {
        Self { opts }
    }

    /// Write the stream; returns the number of bytes printed.
    pub fn write(
        &self,
        results: &[SearchResult],
        stats: &SearchStats,
        out: &mut dyn Write,
    ) -> Result<u64, OutputError> {
        let mut printed = 0u64;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        printed += emit(
            out,
            &Record {
                kind: "begin",
                data: BeginData {
                    timestamp,
                    pattern: &self.opts.pattern,
                    semantic: self.opts.semantic_mode(),
                },
            },
        )?;

        if self.opts.files_with_matches {
            let files: BTreeSet<&str> = results.iter().map(|r| r.file_path.as_str()).collect();
            for file in files {
                printed += emit(
                    out,
                    &Record {
                        kind: "match",
                        data: PathData {
                            path: Text { text: file },
                        },
                    },
                )?;
            }
        } else if self.opts.count {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for result in results {
                *counts.entry(result.file_path.as_str()).or_insert(0) += 1;
            }
            for (file, count) in counts {
                printed += emit(
                    out,
                    &Record {
                        kind: "match",
                        data: CountData {
                            path: Text { text: file },
                            count,
                        },
                    },
                )?;
            }
        } else {
            let mut sorted: Vec<&SearchResult> = results.iter().collect();
            sorted.sort_by(|a, b| {
                (a.file_path.as_str(), a.line_number, a.column).cmp(&(
                    b.file_path.as_str(),
                    b.line_number,
                    b.column,
                ))
            });
            for result in sorted {
                // `lines.text` always carries the trailing newline.
                let line = format!("{}\n", result.line);
                let semantic = result.metadata.as_ref().map(|meta| SemanticData {
                    symbol_type: &meta.symbol_type,
                    symbol_name: &meta.symbol_name,
                    scope: &meta.scope,
                    definition: meta.definition.as_deref(),
                    references: meta.references.iter().map(String::as_str).collect(),
                });
                printed += emit(
                    out,
                    &Record {
                        kind: "match",
                        data: MatchData {
                            path: Text {
                                text: &result.file_path,
                            },
                            lines: Text { text: &line },
                            line_number: result.line_number,
                            absolute_offset: result.absolute_offset,
                            submatches: result
                                .submatches
                                .iter()
                                .map(|s| SubMatchData {
                                    matched: Text { text: &s.text },
                                    start: s.start,
                                    end: s.end,
                                })
                                .collect(),
                            semantic,
                        },
                    },
                )?;
            }
        }

        printed += emit(
            out,
            &Record {
                kind: "summary",
                data: SummaryData {
                    elapsed_total: Elapsed {
                        secs: stats.elapsed.as_secs(),
                        nanos: stats.elapsed.subsec_nanos(),
                    },
                    searches: stats.files_searched,
                    searches_with_match: stats.files_with_matches,
                    bytes_searched: stats.bytes_searched,
                    bytes_printed: printed,
                    matched_lines: stats.matched_lines,
                    matches: stats.matches,
                },
            },
        )?;
        Ok(printed)
    }
}

fn emit<T: Serialize>(out: &mut dyn Write, record: &Record<T>) -> Result<u64, OutputError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    out.write_all(&line)?;
    Ok(line.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_search::{ResultMetadata, SubMatch};
    use serde_json::Value;

    fn go_result() -> SearchResult {
        SearchResult {
            file_path: "a.go".to_string(),
            line_number: 1,
            column: 6,
            line: "func test() {".to_string(),
            matched: "test".to_string(),
            absolute_offset: 0,
            submatches: vec![SubMatch {
                text: "test".to_string(),
                start: 5,
                end: 9,
            }],
            context_before: Vec::new(),
            context_after: Vec::new(),
            metadata: None,
        }
    }

    fn render(results: &[SearchResult], mutate: impl FnOnce(&mut SearchOptions)) -> Vec<Value> {
        let mut opts = SearchOptions::new("test");
        opts.json = true;
        mutate(&mut opts);
        let stats = SearchStats {
            files_searched: 1,
            files_with_matches: 1,
            matched_lines: 1,
            matches: 1,
            bytes_searched: 14,
            ..Default::default()
        };
        let mut buf = Vec::new();
        JsonFormatter::new(&opts).write(results, &stats, &mut buf).unwrap();
        String::from_utf8(buf)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn stream_shape_matches_ripgrep() {
        let records = render(&[go_result()], |_| {});
        assert_eq!(records.len(), 3);

        assert_eq!(records[0]["type"], "begin");
        assert_eq!(records[0]["data"]["pattern"], "test");
        assert_eq!(records[0]["data"]["semantic"], false);

        let m = &records[1];
        assert_eq!(m["type"], "match");
        assert_eq!(m["data"]["path"]["text"], "a.go");
        assert_eq!(m["data"]["lines"]["text"], "func test() {\n");
        assert_eq!(m["data"]["line_number"], 1);
        assert_eq!(m["data"]["absolute_offset"], 0);
        assert_eq!(m["data"]["submatches"][0]["match"]["text"], "test");
        assert_eq!(m["data"]["submatches"][0]["start"], 5);
        assert_eq!(m["data"]["submatches"][0]["end"], 9);
        assert!(m["data"].get("semantic").is_none());

        let s = &records[2];
        assert_eq!(s["type"], "summary");
        assert_eq!(s["data"]["matches"], 1);
        assert_eq!(s["data"]["matched_lines"], 1);
        assert!(s["data"]["elapsed_total"]["secs"].is_u64());
        assert!(s["data"]["elapsed_total"]["nanos"].is_u64());
        assert!(s["data"]["bytes_printed"].as_u64().unwrap() > 0);
    }

    #[test]
    fn count_mode_emits_count_records() {
        let records = render(&[go_result()], |o| o.count = true);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1]["data"]["path"]["text"], "a.go");
        assert_eq!(records[1]["data"]["count"], 1);
        assert!(records[1]["data"].get("lines").is_none());
    }

    #[test]
    fn files_mode_emits_path_records() {
        let records = render(&[go_result()], |o| o.files_with_matches = true);
        assert_eq!(records[1]["data"]["path"]["text"], "a.go");
        assert!(records[1]["data"].get("count").is_none());
    }

    #[test]
    fn semantic_block_is_additive() {
        let mut result = go_result();
        result.metadata = Some(ResultMetadata {
            kind: "symbol".to_string(),
            scope: "function".to_string(),
            symbol_name: "test".to_string(),
            symbol_type: "fn".to_string(),
            definition: Some("a.go:1".to_string()),
            references: vec!["b.go:3".to_string()],
        });
        let records = render(&[result], |o| o.symbols = true);
        let semantic = &records[1]["data"]["semantic"];
        assert_eq!(semantic["symbol_name"], "test");
        assert_eq!(semantic["symbol_type"], "fn");
        assert_eq!(semantic["scope"], "function");
        assert_eq!(semantic["definition"], "a.go:1");
        assert_eq!(semantic["references"][0], "b.go:3");
        assert_eq!(records[0]["data"]["semantic"], true);
    }

    #[test]
    fn match_records_sorted_by_path_then_line() {
        let mut early = go_result();
        early.file_path = "z.go".to_string();
        let mut late = go_result();
        late.file_path = "a.go".to_string();
        late.line_number = 9;
        let records = render(&[early, late.clone()], |_| {});
        assert_eq!(records[1]["data"]["path"]["text"], "a.go");
        assert_eq!(records[2]["data"]["path"]["text"], "z.go");
    }
}
