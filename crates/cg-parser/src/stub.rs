use std::path::Path;

use cg_core::{Reference, Symbol, SymbolKind};

use crate::error::ParserError;
use crate::{SymbolIndex, SymbolParser};

/// Deterministic parser for pipeline and watcher tests.
///
/// Emits one function symbol per non-empty line that starts with `sym `,
/// named by the rest of the line; other content is ignored. References
/// are never produced.
#[derive(Debug, Default)]
pub struct StubParser {
    supports_references: bool,
}

impl StubParser {
    pub fn new() -> Self {
        Self {
            supports_references: false,
        }
    }

    pub fn with_references(mut self) -> Self {
        self.supports_references = true;
        self
    }
}

impl SymbolParser for StubParser {
    fn parse_file(&self, path: &str, content: &[u8]) -> Result<Vec<Symbol>, ParserError> {
        let source = std::str::from_utf8(content).map_err(|_| ParserError::InvalidEncoding {
            path: path.to_string(),
        })?;
        let mut symbols = Vec::new();
        for (idx, line) in source.lines().enumerate() {
            if let Some(name) = line.strip_prefix("sym ") {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                let line_no = idx as u32 + 1;
                symbols.push(Symbol::new(
                    name,
                    SymbolKind::Function,
                    path,
                    line_no,
                    line_no,
                    1,
                    line.len() as u32,
                ));
            }
        }
        if symbols.is_empty() {
            // Every file yields at least its module symbol, mirroring real
            // parsers that always know the file-level scope.
            let stem = Path::new(path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string());
            symbols.push(Symbol::new(stem, SymbolKind::Module, path, 1, 1, 1, 1));
        }
        Ok(symbols)
    }

    fn parse_references(
        &self,
        _path: &str,
        _content: &[u8],
        _index: &SymbolIndex,
    ) -> Result<Vec<Reference>, ParserError> {
        Ok(Vec::new())
    }

    fn supports_references(&self) -> bool {
        self.supports_references
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_declared_symbols() {
        let parser = StubParser::new();
        let symbols = parser
            .parse_file("src/a.rs", b"sym alpha\nnoise\nsym beta\n")
            .unwrap();
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(symbols[1].start_line, 3);
    }

    #[test]
    fn falls_back_to_module_symbol() {
        let parser = StubParser::new();
        let symbols = parser.parse_file("src/empty.rs", b"nothing here").unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "empty");
        assert_eq!(symbols[0].kind, SymbolKind::Module);
    }
}
