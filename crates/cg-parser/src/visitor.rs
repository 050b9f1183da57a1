use std::path::Path;

use cg_core::{Language, Reference, ReferenceKind, Symbol};

use crate::error::ParserError;
use crate::file_check::is_binary;
use crate::registry::ParserRegistry;
use crate::{SymbolIndex, SymbolParser};

mod python;
mod rust_lang;

/// Tree-sitter backed implementation of the parser plug-in.
#[derive(Debug, Default)]
pub struct TreeSitterParser;

impl TreeSitterParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_tree<'a>(
        &self,
        path: &'a str,
        content: &'a [u8],
    ) -> Result<(VisitorContext<'a>, tree_sitter::Tree, Language), ParserError> {
        if is_binary(content) {
            return Err(ParserError::InvalidEncoding {
                path: path.to_string(),
            });
        }
        let source = std::str::from_utf8(content).map_err(|_| ParserError::InvalidEncoding {
            path: path.to_string(),
        })?;

        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let language = ParserRegistry::language_for_extension(ext).ok_or_else(|| {
            ParserError::UnsupportedLanguage {
                path: path.to_string(),
            }
        })?;
        let grammar =
            ParserRegistry::grammar_for(language).ok_or_else(|| ParserError::UnsupportedLanguage {
                path: path.to_string(),
            })?;

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&grammar)
            .map_err(|e| ParserError::ParseFailed {
                path: path.to_string(),
                reason: format!("failed to set language: {e}"),
            })?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ParserError::ParseFailed {
                path: path.to_string(),
                reason: "tree-sitter returned no tree".to_string(),
            })?;

        let ctx = VisitorContext {
            file_path: path,
            source,
        };
        Ok((ctx, tree, language))
    }
}

impl SymbolParser for TreeSitterParser {
    #[tracing::instrument(skip(self, content), fields(symbol_count))]
    fn parse_file(&self, path: &str, content: &[u8]) -> Result<Vec<Symbol>, ParserError> {
        let (ctx, tree, language) = self.parse_tree(path, content)?;
        let symbols = match language {
            Language::Rust => rust_lang::extract(&ctx, &tree),
            Language::Python => python::extract(&ctx, &tree),
            _ => {
                return Err(ParserError::UnsupportedLanguage {
                    path: path.to_string(),
                })
            }
        }?;
        tracing::Span::current().record("symbol_count", symbols.len());
        Ok(symbols)
    }

    #[tracing::instrument(skip(self, content, index))]
    fn parse_references(
        &self,
        path: &str,
        content: &[u8],
        index: &SymbolIndex,
    ) -> Result<Vec<Reference>, ParserError> {
        let (ctx, tree, _language) = self.parse_tree(path, content)?;
        Ok(scan_references(&ctx, &tree, index))
    }

    fn supports_references(&self) -> bool {
        true
    }
}

/// Shared context for the per-language visitors.
pub(crate) struct VisitorContext<'a> {
    pub file_path: &'a str,
    pub source: &'a str,
}

impl VisitorContext<'_> {
    pub fn node_text(&self, node: tree_sitter::Node<'_>) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// First line of the node's text, used as the signature.
    pub fn signature_line(&self, node: tree_sitter::Node<'_>) -> String {
        self.node_text(node)
            .lines()
            .next()
            .unwrap_or("")
            .trim_end()
            .to_string()
    }

    /// The full source line containing `node`, trimmed.
    pub fn line_text(&self, node: tree_sitter::Node<'_>) -> String {
        self.source
            .lines()
            .nth(node.start_position().row)
            .unwrap_or("")
            .trim()
            .to_string()
    }
}

/// Fill a symbol's location from a tree-sitter node (1-based lines and
/// columns, per the external convention).
pub(crate) fn locate(sym: &mut Symbol, node: tree_sitter::Node<'_>) {
    sym.start_line = node.start_position().row as u32 + 1;
    sym.end_line = node.end_position().row as u32 + 1;
    sym.start_column = node.start_position().column as u32 + 1;
    sym.end_column = node.end_position().column as u32 + 1;
}

/// Node kinds that carry a `name` field naming a declaration. Identifier
/// nodes in that position are definition sites, not references.
const DEF_KINDS: &[&str] = &[
    "function_item",
    "struct_item",
    "enum_item",
    "trait_item",
    "mod_item",
    "const_item",
    "static_item",
    "type_item",
    "field_declaration",
    "function_definition",
    "class_definition",
];

/// Walk every identifier in the tree and emit a reference for each one
/// that names a known symbol. Call sites get `ReferenceKind::Call`.
fn scan_references(
    ctx: &VisitorContext<'_>,
    tree: &tree_sitter::Tree,
    index: &SymbolIndex,
) -> Vec<Reference> {
    let mut refs = Vec::new();
    walk(tree.root_node(), &mut |node| {
        if !matches!(
            node.kind(),
            "identifier" | "type_identifier" | "field_identifier"
        ) {
            return;
        }
        let name = ctx.node_text(node);
        let ids = index.get(name);
        if ids.is_empty() {
            return;
        }
        if is_definition_site(node) {
            return;
        }
        let kind = if is_call_site(node) {
            ReferenceKind::Call
        } else {
            ReferenceKind::Reference
        };
        for id in ids {
            refs.push(Reference {
                symbol_id: id.clone(),
                file_path: ctx.file_path.to_string(),
                line: node.start_position().row as u32 + 1,
                // 0-based internally; output conversion happens later.
                column: node.start_position().column as u32,
                kind,
                context: Some(ctx.line_text(node)),
            });
        }
    });
    refs
}

fn is_definition_site(node: tree_sitter::Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    if !DEF_KINDS.contains(&parent.kind()) {
        return false;
    }
    parent
        .child_by_field_name("name")
        .is_some_and(|name_node| name_node.id() == node.id())
}

fn is_call_site(node: tree_sitter::Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "call_expression" | "call" => parent
            .child_by_field_name("function")
            .is_some_and(|f| f.id() == node.id()),
        // `recv.method(...)`: the identifier sits one level down.
        "field_expression" | "attribute" => parent
            .parent()
            .is_some_and(|gp| matches!(gp.kind(), "call_expression" | "call")),
        "scoped_identifier" => parent
            .parent()
            .is_some_and(|gp| gp.kind() == "call_expression"),
        _ => false,
    }
}

fn walk<'t>(node: tree_sitter::Node<'t>, f: &mut impl FnMut(tree_sitter::Node<'t>)) {
    f(node);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, f);
    }
}
