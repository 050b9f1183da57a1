use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;

use crate::error::SearchError;
use crate::options::SearchOptions;

/// Flag bits participating in the cache key.
const FLAG_CASE: u8 = 1 << 0;
const FLAG_WORD: u8 = 1 << 1;
const FLAG_LINE: u8 = 1 << 2;
const FLAG_FIXED: u8 = 1 << 3;
const FLAG_MULTILINE: u8 = 1 << 4;
const FLAG_DOTALL: u8 = 1 << 5;

fn flags_of(opts: &SearchOptions) -> u8 {
    let mut flags = 0;
    if opts.case_insensitive {
        flags |= FLAG_CASE;
    }
    if opts.word_regexp {
        flags |= FLAG_WORD;
    }
    if opts.line_regexp {
        flags |= FLAG_LINE;
    }
    if opts.fixed_strings {
        flags |= FLAG_FIXED;
    }
    if opts.multiline {
        flags |= FLAG_MULTILINE;
    }
    if opts.multiline_dotall {
        flags |= FLAG_DOTALL;
    }
    flags
}

/// One compilation per unique (pattern, flags) tuple. Read-mostly; a
/// write lock is taken only on miss.
#[derive(Default)]
pub struct PatternCache {
    inner: RwLock<HashMap<(String, u8), Arc<Regex>>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&self, opts: &SearchOptions) -> Result<Arc<Regex>, SearchError> {
        let key = (opts.pattern.clone(), flags_of(opts));
        if let Some(regex) = self.inner.read().get(&key) {
            return Ok(Arc::clone(regex));
        }

        let source = build_pattern(opts)?;
        let regex = Regex::new(&source).map_err(|e| SearchError::Pattern {
            pattern: opts.pattern.clone(),
            reason: e.to_string(),
        })?;
        let regex = Arc::new(regex);
        self.inner.write().insert(key, Arc::clone(&regex));
        Ok(regex)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }
}

/// Transform the user pattern, in order: literal escaping, word
/// boundaries, line anchors, then the inline flag group.
pub fn build_pattern(opts: &SearchOptions) -> Result<String, SearchError> {
    if opts.pattern.is_empty() && !opts.fixed_strings {
        return Err(SearchError::Pattern {
            pattern: String::new(),
            reason: "empty pattern (use --fixed-strings to search for nothing)".to_string(),
        });
    }

    let mut pattern = if opts.fixed_strings {
        regex::escape(&opts.pattern)
    } else {
        opts.pattern.clone()
    };
    if opts.word_regexp {
        pattern = format!(r"\b(?:{pattern})\b");
    }
    if opts.line_regexp {
        pattern = format!("^(?:{pattern})$");
    }

    let mut inline = String::new();
    if opts.case_insensitive {
        inline.push('i');
    }
    if opts.multiline {
        inline.push('m');
    }
    if opts.multiline_dotall {
        inline.push('s');
    }
    if !inline.is_empty() {
        pattern = format!("(?{inline}){pattern}");
    }
    Ok(pattern)
}
