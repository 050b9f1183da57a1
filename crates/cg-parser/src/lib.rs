pub mod error;
pub mod registry;
pub mod stub;
mod file_check;
mod visitor;

use std::collections::HashMap;

use cg_core::{Reference, Symbol, SymbolId};

pub use error::ParserError;
pub use file_check::{check_file_size, is_binary};
pub use registry::ParserRegistry;
pub use stub::StubParser;
pub use visitor::TreeSitterParser;

/// In-memory name → ids map handed to `parse_references`.
///
/// Built by the index builder in phase 2 from every stored symbol. Ids
/// under one name are kept sorted so reference extraction is
/// deterministic regardless of build order.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    by_name: HashMap<String, Vec<SymbolId>>,
    len: usize,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, id: SymbolId) {
        let ids = self.by_name.entry(name.to_string()).or_default();
        if let Err(pos) = ids.binary_search(&id) {
            ids.insert(pos, id);
            self.len += 1;
        }
    }

    pub fn get(&self, name: &str) -> &[SymbolId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A language-parsing plug-in.
///
/// `parse_file` extracts declarations; `parse_references` resolves
/// use-sites against a prebuilt symbol index. Parsers that cannot produce
/// references return false from `supports_references` and the builder
/// skips phase 2.
pub trait SymbolParser: Send + Sync {
    fn parse_file(&self, path: &str, content: &[u8]) -> Result<Vec<Symbol>, ParserError>;

    fn parse_references(
        &self,
        path: &str,
        content: &[u8],
        index: &SymbolIndex,
    ) -> Result<Vec<Reference>, ParserError>;

    fn supports_references(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_core::SymbolKind;

    #[test]
    fn symbol_index_sorted_and_deduplicated() {
        let mut index = SymbolIndex::new();
        let b = SymbolId::derive("b.rs", 1, 1, SymbolKind::Function, "f");
        let a = SymbolId::derive("a.rs", 1, 1, SymbolKind::Function, "f");
        index.insert("f", b.clone());
        index.insert("f", a.clone());
        index.insert("f", b.clone());

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("f"), &[a, b]);
        assert!(index.get("g").is_empty());
    }
}
