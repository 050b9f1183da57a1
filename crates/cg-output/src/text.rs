use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::Write;

use cg_search::{SearchOptions, SearchResult, SearchStats};

use crate::color::ColorScheme;
use crate::error::OutputError;

/// ripgrep-style text output.
///
/// Results are grouped by file (ascending), sorted by line within each
/// file. Match rows join fields with `:`, context rows with `-`.
pub struct TextFormatter<'a> {
    opts: &'a SearchOptions,
    colors: ColorScheme,
}

impl<'a> TextFormatter<'a> {
    pub fn new(opts: &'a SearchOptions) -> Self {
        Self {
            colors: ColorScheme::for_mode(opts.color),
            opts,
        }
    }

    pub fn with_colors(opts: &'a SearchOptions, colors: ColorScheme) -> Self {
        Self { opts, colors }
    }

    /// Write the report; returns the number of bytes printed.
    pub fn write(
        &self,
        results: &[SearchResult],
        stats: &SearchStats,
        out: &mut dyn Write,
    ) -> Result<u64, OutputError> {
        let groups = group_results(results);
        let mut printed = 0u64;

        if self.opts.files_with_matches {
            let files: BTreeSet<&str> = results.iter().map(|r| r.file_path.as_str()).collect();
            for file in files {
                printed += self.emit(
                    out,
                    &format!("{}{}{}\n", self.colors.file, file, self.colors.reset),
                )?;
            }
            return Ok(printed);
        }

        let with_filename = self
            .opts
            .with_filename
            .unwrap_or(groups.len() > 1 || stats.files_searched > 1);

        if self.opts.count {
            for (file, file_results) in &groups {
                let n = file_results.len();
                let line = if stats.files_searched == 1 && self.opts.with_filename.is_none() {
                    format!("{n}\n")
                } else if with_filename {
                    format!("{}{}{}:{n}\n", self.colors.file, file, self.colors.reset)
                } else {
                    format!("{n}\n")
                };
                printed += self.emit(out, &line)?;
            }
            return Ok(printed);
        }

        let heading = with_filename && !self.opts.no_heading;
        let mut first_block = true;
        for (file, file_results) in &groups {
            if heading {
                if !first_block {
                    printed += self.emit(out, "\n")?;
                }
                printed += self.emit(
                    out,
                    &format!("{}{}{}\n", self.colors.file, file, self.colors.reset),
                )?;
            }
            first_block = false;
            printed += self.write_file_block(file, file_results, with_filename, heading, out)?;
        }
        Ok(printed)
    }

    fn write_file_block(
        &self,
        file: &str,
        results: &[&SearchResult],
        with_filename: bool,
        heading: bool,
        out: &mut dyn Write,
    ) -> Result<u64, OutputError> {
        let mut printed = 0u64;
        let has_context = self.opts.before_context > 0 || self.opts.after_context > 0;

        // Context rows for lines that are not themselves match lines.
        let match_lines: HashSet<u64> = results.iter().map(|r| r.line_number).collect();
        let mut context: BTreeMap<u64, &str> = BTreeMap::new();
        for result in results {
            for ctx in result.context_before.iter().chain(&result.context_after) {
                if !match_lines.contains(&ctx.line_number) {
                    context.entry(ctx.line_number).or_insert(ctx.text.as_str());
                }
            }
        }

        let mut line_numbers: BTreeSet<u64> = match_lines.iter().copied().collect();
        line_numbers.extend(context.keys().copied());

        let mut previous: Option<u64> = None;
        for number in line_numbers {
            if has_context {
                if let Some(prev) = previous {
                    if number > prev + 1 {
                        printed += self.emit(
                            out,
                            &format!("{}--{}\n", self.colors.separator, self.colors.reset),
                        )?;
                    }
                }
            }
            previous = Some(number);

            if let Some(text) = context.get(&number) {
                printed += self.emit(
                    out,
                    &self.render_row(file, number, None, text, with_filename, heading, false),
                )?;
                continue;
            }
            for result in results.iter().filter(|r| r.line_number == number) {
                let content = self.highlight(result);
                printed += self.emit(
                    out,
                    &self.render_row(
                        file,
                        number,
                        Some(result.column),
                        &content,
                        with_filename,
                        heading,
                        true,
                    ),
                )?;
            }
        }
        Ok(printed)
    }

    /// One output row. Match rows use `:` separators, context rows `-`.
    #[allow(clippy::too_many_arguments)]
    fn render_row(
        &self,
        file: &str,
        number: u64,
        column: Option<u64>,
        content: &str,
        with_filename: bool,
        heading: bool,
        is_match: bool,
    ) -> String {
        let sep = if is_match { ':' } else { '-' };
        let mut row = String::new();
        if with_filename && !heading {
            row.push_str(&format!("{}{}{}{sep}", self.colors.file, file, self.colors.reset));
        }
        if self.opts.line_number {
            let style = if is_match {
                self.colors.line
            } else {
                self.colors.context
            };
            row.push_str(&format!("{style}{number}{}{sep}", self.colors.reset));
        }
        if self.opts.column && is_match {
            if let Some(column) = column {
                row.push_str(&format!("{column}{sep}"));
            }
        }
        if is_match {
            row.push_str(content);
        } else {
            row.push_str(&format!("{}{content}{}", self.colors.context, self.colors.reset));
        }
        row.push('\n');
        row
    }

    /// Paint submatch spans red inside the line.
    fn highlight(&self, result: &SearchResult) -> String {
        if !self.colors.is_enabled() || result.submatches.is_empty() {
            return result.line.clone();
        }
        let line = &result.line;
        let mut output = String::with_capacity(line.len() + 16);
        let mut cursor = 0;
        for sub in &result.submatches {
            if sub.start < cursor || sub.end > line.len() {
                continue;
            }
            output.push_str(&line[cursor..sub.start]);
            output.push_str(self.colors.matched);
            output.push_str(&line[sub.start..sub.end]);
            output.push_str(self.colors.reset);
            cursor = sub.end;
        }
        output.push_str(&line[cursor..]);
        output
    }

    fn emit(&self, out: &mut dyn Write, s: &str) -> Result<u64, OutputError> {
        out.write_all(s.as_bytes())?;
        Ok(s.len() as u64)
    }
}

/// File path → results sorted by (line, column).
fn group_results(results: &[SearchResult]) -> BTreeMap<&str, Vec<&SearchResult>> {
    let mut groups: BTreeMap<&str, Vec<&SearchResult>> = BTreeMap::new();
    for result in results {
        groups.entry(result.file_path.as_str()).or_default().push(result);
    }
    for file_results in groups.values_mut() {
        file_results.sort_by_key(|r| (r.line_number, r.column));
    }
    groups
}
