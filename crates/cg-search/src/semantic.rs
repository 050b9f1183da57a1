use std::sync::Arc;
use std::time::Instant;

use cg_core::{CancelToken, QueryMode, Reference, ReferenceKind, Symbol, SymbolQuery};
use cg_storage::SymbolStore;

use crate::error::SearchError;
use crate::options::SearchOptions;
use crate::types::{ResultMetadata, SearchResult, SearchStats};

/// Thin reader over the symbol store. The option flags pick the
/// operation: `symbols` (name lookup), `types` (type lookup), `refs` and
/// `call_graph` (definitions plus use-sites).
pub struct SemanticSearcher {
    store: Arc<SymbolStore>,
}

impl SemanticSearcher {
    pub fn new(store: Arc<SymbolStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, opts, cancel), fields(pattern = %opts.pattern))]
    pub fn search(
        &self,
        opts: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<(Vec<SearchResult>, SearchStats), SearchError> {
        let started = Instant::now();
        let term = opts.pattern.clone();

        let mut results = Vec::new();
        if opts.types_query {
            let outcome = self
                .store
                .search_symbols(&SymbolQuery::new(QueryMode::ByType(term)))?;
            for sym in &outcome.symbols {
                results.push(symbol_result(sym, "type"));
            }
        } else if opts.refs || opts.call_graph {
            // call_graph is reserved; it currently behaves as refs.
            for sym in self.lookup_symbols(&term)? {
                if cancel.is_cancelled() {
                    return Err(SearchError::Cancelled);
                }
                let refs = self.store.get_references_for_symbol(&sym.id)?;
                results.push(definition_result(&sym, &refs));
                for reference in &refs {
                    results.push(reference_result(&sym, reference));
                }
            }
        } else {
            for sym in self.lookup_symbols(&term)? {
                results.push(symbol_result(&sym, "symbol"));
            }
        }

        let files: std::collections::HashSet<&str> =
            results.iter().map(|r| r.file_path.as_str()).collect();
        let stats = SearchStats {
            files_searched: files.len() as u64,
            files_with_matches: files.len() as u64,
            matched_lines: results.len() as u64,
            matches: results.len() as u64,
            elapsed: started.elapsed(),
            engine: "semantic",
            ..Default::default()
        };
        Ok((results, stats))
    }

    /// Exact name lookup first; fall back to a substring scan so partial
    /// names still resolve.
    fn lookup_symbols(&self, term: &str) -> Result<Vec<Symbol>, SearchError> {
        let exact = self
            .store
            .search_symbols(&SymbolQuery::new(QueryMode::ByName(term.to_string())))?;
        if !exact.symbols.is_empty() {
            return Ok(exact.symbols);
        }
        let fuzzy = self
            .store
            .search_symbols(&SymbolQuery::new(QueryMode::ByPattern(term.to_string())))?;
        Ok(fuzzy.symbols)
    }
}

fn scope_of(sym: &Symbol) -> String {
    sym.properties
        .get("container")
        .cloned()
        .unwrap_or_else(|| sym.kind.as_str().to_string())
}

fn symbol_result(sym: &Symbol, kind: &str) -> SearchResult {
    SearchResult {
        file_path: sym.file_path.clone(),
        line_number: sym.start_line as u64,
        column: sym.start_column as u64,
        line: sym
            .signature
            .clone()
            .unwrap_or_else(|| sym.name.clone()),
        matched: sym.name.clone(),
        absolute_offset: 0,
        submatches: Vec::new(),
        context_before: Vec::new(),
        context_after: Vec::new(),
        metadata: Some(ResultMetadata {
            kind: kind.to_string(),
            scope: scope_of(sym),
            symbol_name: sym.name.clone(),
            symbol_type: sym.type_name.clone(),
            definition: Some(format!("{}:{}", sym.file_path, sym.start_line)),
            references: Vec::new(),
        }),
    }
}

fn definition_result(sym: &Symbol, refs: &[Reference]) -> SearchResult {
    let mut result = symbol_result(sym, "symbol");
    if let Some(meta) = &mut result.metadata {
        meta.references = refs
            .iter()
            .map(|r| format!("{}:{}", r.file_path, r.line))
            .collect();
    }
    result
}

fn reference_result(sym: &Symbol, reference: &Reference) -> SearchResult {
    let kind = match reference.kind {
        ReferenceKind::Call => "call",
        _ => "reference",
    };
    SearchResult {
        file_path: reference.file_path.clone(),
        line_number: reference.line as u64,
        // Internal reference columns are 0-based.
        column: reference.column as u64 + 1,
        line: reference.context.clone().unwrap_or_default(),
        matched: sym.name.clone(),
        absolute_offset: 0,
        submatches: Vec::new(),
        context_before: Vec::new(),
        context_after: Vec::new(),
        metadata: Some(ResultMetadata {
            kind: kind.to_string(),
            scope: scope_of(sym),
            symbol_name: sym.name.clone(),
            symbol_type: sym.type_name.clone(),
            definition: Some(format!("{}:{}", sym.file_path, sym.start_line)),
            references: Vec::new(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_core::SymbolKind;
    use cg_storage::MemoryStorage;

    fn seeded() -> SemanticSearcher {
        let store = Arc::new(SymbolStore::open(Arc::new(MemoryStorage::new())).unwrap());
        let mut sym = Symbol::new("handle", SymbolKind::Function, "src/h.rs", 5, 9, 1, 1);
        sym.type_name = "fn".to_string();
        sym.signature = Some("fn handle(req: Request) -> Response".to_string());
        store.store_symbol(&sym).unwrap();
        store
            .store_reference(&Reference {
                symbol_id: sym.id.clone(),
                file_path: "src/server.rs".to_string(),
                line: 42,
                column: 8,
                kind: ReferenceKind::Call,
                context: Some("handle(request)".to_string()),
            })
            .unwrap();
        SemanticSearcher::new(store)
    }

    fn opts(pattern: &str) -> SearchOptions {
        SearchOptions::new(pattern)
    }

    #[test]
    fn symbols_mode_returns_definitions() {
        let searcher = seeded();
        let mut o = opts("handle");
        o.symbols = true;
        let (results, stats) = searcher.search(&o, &CancelToken::new()).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.file_path, "src/h.rs");
        assert_eq!(r.line_number, 5);
        assert_eq!(r.line, "fn handle(req: Request) -> Response");
        let meta = r.metadata.as_ref().unwrap();
        assert_eq!(meta.kind, "symbol");
        assert_eq!(meta.symbol_type, "fn");
        assert_eq!(stats.engine, "semantic");
    }

    #[test]
    fn refs_mode_returns_definition_and_uses() {
        let searcher = seeded();
        let mut o = opts("handle");
        o.refs = true;
        let (results, _) = searcher.search(&o, &CancelToken::new()).unwrap();
        assert_eq!(results.len(), 2);
        let def = &results[0];
        assert_eq!(def.metadata.as_ref().unwrap().kind, "symbol");
        assert_eq!(
            def.metadata.as_ref().unwrap().references,
            vec!["src/server.rs:42"]
        );
        let use_site = &results[1];
        assert_eq!(use_site.file_path, "src/server.rs");
        assert_eq!(use_site.line_number, 42);
        assert_eq!(use_site.column, 9);
        assert_eq!(use_site.metadata.as_ref().unwrap().kind, "call");
    }

    #[test]
    fn partial_name_falls_back_to_pattern_scan() {
        let searcher = seeded();
        let mut o = opts("hand");
        o.symbols = true;
        let (results, _) = searcher.search(&o, &CancelToken::new()).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn types_mode_queries_the_type_index() {
        let searcher = seeded();
        let mut o = opts("fn");
        o.types_query = true;
        let (results, _) = searcher.search(&o, &CancelToken::new()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.as_ref().unwrap().kind, "type");
    }
}
