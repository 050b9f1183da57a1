use std::io::BufRead;

use serde_json::Value;

/// A rejected line in a JSON stream.
#[derive(Debug, thiserror::Error)]
#[error("invalid JSON stream at line {line}: {reason}")]
pub struct ValidateError {
    pub line: usize,
    pub reason: String,
}

const KNOWN_TYPES: &[&str] = &["begin", "match", "end", "summary"];

/// Validate a newline-delimited JSON stream against the ripgrep record
/// shapes. Returns the number of records accepted.
pub fn validate_stream(input: &mut dyn BufRead) -> Result<usize, ValidateError> {
    let mut count = 0usize;
    let mut line = String::new();
    loop {
        line.clear();
        let read = input.read_line(&mut line).map_err(|e| ValidateError {
            line: count + 1,
            reason: format!("read failed: {e}"),
        })?;
        if read == 0 {
            return Ok(count);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        count += 1;
        validate_line(trimmed).map_err(|reason| ValidateError {
            line: count,
            reason,
        })?;
    }
}

fn validate_line(line: &str) -> Result<(), String> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| format!("not valid JSON: {e}"))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or("missing 'type' field")?;
    if !KNOWN_TYPES.contains(&kind) {
        return Err(format!("unknown record type '{kind}'"));
    }
    let data = value
        .get("data")
        .and_then(Value::as_object)
        .ok_or("missing 'data' object")?;

    match kind {
        "begin" | "end" => Ok(()),
        "match" => {
            let path_ok = data
                .get("path")
                .and_then(|p| p.get("text"))
                .is_some_and(Value::is_string);
            if !path_ok {
                return Err("match record missing path.text".to_string());
            }
            // Full match records carry lines/line_number/submatches;
            // count and files records carry just path (+ count).
            if let Some(lines) = data.get("lines") {
                if !lines.get("text").is_some_and(Value::is_string) {
                    return Err("match record missing lines.text".to_string());
                }
                if !data.get("line_number").is_some_and(Value::is_u64) {
                    return Err("match record missing line_number".to_string());
                }
                if !data.get("submatches").is_some_and(Value::is_array) {
                    return Err("match record missing submatches".to_string());
                }
            }
            Ok(())
        }
        "summary" => {
            let elapsed_ok = data
                .get("elapsed_total")
                .is_some_and(|e| e.get("secs").is_some() && e.get("nanos").is_some());
            if !elapsed_ok {
                return Err("summary missing elapsed_total.{secs,nanos}".to_string());
            }
            for field in [
                "searches",
                "searches_with_match",
                "bytes_searched",
                "bytes_printed",
                "matched_lines",
                "matches",
            ] {
                if !data.contains_key(field) {
                    return Err(format!("summary missing '{field}'"));
                }
            }
            Ok(())
        }
        _ => unreachable!("filtered above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(s: &str) -> Result<usize, ValidateError> {
        validate_stream(&mut s.as_bytes())
    }

    #[test]
    fn accepts_a_well_formed_stream() {
        let stream = concat!(
            "{\"type\":\"begin\",\"data\":{\"timestamp\":0,\"pattern\":\"x\",\"semantic\":false}}\n",
            "{\"type\":\"match\",\"data\":{\"path\":{\"text\":\"a.go\"},\"lines\":{\"text\":\"x\\n\"},\"line_number\":1,\"absolute_offset\":0,\"submatches\":[]}}\n",
            "{\"type\":\"summary\",\"data\":{\"elapsed_total\":{\"secs\":0,\"nanos\":5},\"searches\":1,\"searches_with_match\":1,\"bytes_searched\":2,\"bytes_printed\":10,\"matched_lines\":1,\"matches\":1}}\n",
        );
        assert_eq!(validate(stream).unwrap(), 3);
    }

    #[test]
    fn accepts_count_and_files_match_records() {
        let stream = concat!(
            "{\"type\":\"match\",\"data\":{\"path\":{\"text\":\"a.go\"},\"count\":3}}\n",
            "{\"type\":\"match\",\"data\":{\"path\":{\"text\":\"b.go\"}}}\n",
        );
        assert_eq!(validate(stream).unwrap(), 2);
    }

    #[test]
    fn rejects_non_json() {
        let err = validate("not json at all\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.reason.contains("not valid JSON"));
    }

    #[test]
    fn rejects_unknown_type() {
        let err = validate("{\"type\":\"surprise\",\"data\":{}}\n").unwrap_err();
        assert!(err.reason.contains("unknown record type"));
    }

    #[test]
    fn rejects_match_without_path() {
        let err = validate("{\"type\":\"match\",\"data\":{\"lines\":{\"text\":\"x\\n\"}}}\n")
            .unwrap_err();
        assert!(err.reason.contains("path.text"));
    }

    #[test]
    fn rejects_summary_missing_fields() {
        let err = validate(
            "{\"type\":\"summary\",\"data\":{\"elapsed_total\":{\"secs\":0,\"nanos\":0}}}\n",
        )
        .unwrap_err();
        assert!(err.reason.contains("missing"));
    }

    #[test]
    fn formatter_output_passes_validation() {
        use cg_search::{SearchOptions, SearchStats};
        let opts = SearchOptions::new("test");
        let stats = SearchStats::default();
        let mut buf = Vec::new();
        crate::json::JsonFormatter::new(&opts)
            .write(&[], &stats, &mut buf)
            .unwrap();
        assert_eq!(validate_stream(&mut buf.as_slice()).unwrap(), 2);
    }
}
