use cg_core::{Symbol, SymbolId, SymbolKind};

use crate::error::ParserError;
use crate::visitor::{locate, VisitorContext};

pub(crate) fn extract(
    ctx: &VisitorContext<'_>,
    tree: &tree_sitter::Tree,
) -> Result<Vec<Symbol>, ParserError> {
    let mut symbols = Vec::new();
    extract_items(ctx, tree.root_node(), None, false, &mut symbols);
    Ok(symbols)
}

fn extract_items(
    ctx: &VisitorContext<'_>,
    parent: tree_sitter::Node<'_>,
    container: Option<&str>,
    in_impl: bool,
    symbols: &mut Vec<Symbol>,
) {
    let mut cursor = parent.walk();
    for child in parent.children(&mut cursor) {
        match child.kind() {
            "function_item" => {
                let kind = if in_impl {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                if let Some(mut sym) = named_symbol(ctx, child, kind, container) {
                    sym.type_name = child
                        .child_by_field_name("return_type")
                        .map(|n| ctx.node_text(n).to_string())
                        .unwrap_or_default();
                    symbols.push(sym);
                }
            }
            "struct_item" => {
                if let Some(sym) = named_symbol(ctx, child, SymbolKind::Struct, container) {
                    let name = sym.name.clone();
                    symbols.push(sym);
                    if let Some(body) = child.child_by_field_name("body") {
                        extract_fields(ctx, body, &name, symbols);
                    }
                }
            }
            "enum_item" => {
                if let Some(sym) = named_symbol(ctx, child, SymbolKind::Enum, container) {
                    symbols.push(sym);
                }
            }
            "trait_item" => {
                if let Some(sym) = named_symbol(ctx, child, SymbolKind::Interface, container) {
                    let name = sym.name.clone();
                    symbols.push(sym);
                    if let Some(body) = child.child_by_field_name("body") {
                        extract_items(ctx, body, Some(&name), true, symbols);
                    }
                }
            }
            "mod_item" => {
                if let Some(sym) = named_symbol(ctx, child, SymbolKind::Module, container) {
                    let name = sym.name.clone();
                    symbols.push(sym);
                    if let Some(body) = child.child_by_field_name("body") {
                        extract_items(ctx, body, Some(&name), false, symbols);
                    }
                }
            }
            "impl_item" => {
                let type_name = child
                    .child_by_field_name("type")
                    .map(|n| ctx.node_text(n).to_string());
                if let Some(body) = child.child_by_field_name("body") {
                    extract_items(ctx, body, type_name.as_deref(), true, symbols);
                }
            }
            "const_item" | "static_item" => {
                if let Some(mut sym) = named_symbol(ctx, child, SymbolKind::Constant, container) {
                    sym.type_name = child
                        .child_by_field_name("type")
                        .map(|n| ctx.node_text(n).to_string())
                        .unwrap_or_default();
                    symbols.push(sym);
                }
            }
            "type_item" => {
                if let Some(sym) = named_symbol(ctx, child, SymbolKind::Type, container) {
                    symbols.push(sym);
                }
            }
            "use_declaration" => {
                if let Some(arg) = child.child_by_field_name("argument") {
                    let path_text = ctx.node_text(arg);
                    let name = path_text
                        .rsplit("::")
                        .next()
                        .unwrap_or(path_text)
                        .trim()
                        .to_string();
                    if name.is_empty() || name.contains(['{', '*']) {
                        continue;
                    }
                    let mut sym = blank_symbol(ctx, child, name, SymbolKind::Import);
                    sym.signature = Some(ctx.signature_line(child));
                    symbols.push(sym);
                }
            }
            _ => {}
        }
    }
}

fn extract_fields(
    ctx: &VisitorContext<'_>,
    body: tree_sitter::Node<'_>,
    container: &str,
    symbols: &mut Vec<Symbol>,
) {
    let mut cursor = body.walk();
    for field in body.children(&mut cursor) {
        if field.kind() != "field_declaration" {
            continue;
        }
        if let Some(mut sym) = named_symbol(ctx, field, SymbolKind::Field, Some(container)) {
            sym.type_name = field
                .child_by_field_name("type")
                .map(|n| ctx.node_text(n).to_string())
                .unwrap_or_default();
            symbols.push(sym);
        }
    }
}

/// Build a symbol from a node with a `name` field, attaching signature,
/// doc comment, visibility tag, and container property.
fn named_symbol(
    ctx: &VisitorContext<'_>,
    node: tree_sitter::Node<'_>,
    kind: SymbolKind,
    container: Option<&str>,
) -> Option<Symbol> {
    let name = ctx.node_text(node.child_by_field_name("name")?).to_string();
    let mut sym = blank_symbol(ctx, node, name, kind);
    sym.signature = Some(ctx.signature_line(node));
    sym.doc = doc_comment(ctx, node);
    if has_visibility(node) {
        sym.tags.insert("public".to_string());
    }
    if let Some(container) = container {
        sym.properties
            .insert("container".to_string(), container.to_string());
    }
    Some(sym)
}

fn blank_symbol(
    ctx: &VisitorContext<'_>,
    node: tree_sitter::Node<'_>,
    name: String,
    kind: SymbolKind,
) -> Symbol {
    let mut sym = Symbol::new(name, kind, ctx.file_path, 1, 1, 1, 1);
    locate(&mut sym, node);
    sym.id = SymbolId::derive(
        ctx.file_path,
        sym.start_line,
        sym.start_column,
        kind,
        &sym.name,
    );
    sym
}

fn has_visibility(node: tree_sitter::Node<'_>) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor)
        .any(|c| c.kind() == "visibility_modifier");
    result
}

/// Contiguous `///` comments immediately above the node.
fn doc_comment(ctx: &VisitorContext<'_>, node: tree_sitter::Node<'_>) -> Option<String> {
    let mut lines = Vec::new();
    let mut current = node.prev_sibling();
    while let Some(sibling) = current {
        if sibling.kind() != "line_comment" {
            break;
        }
        let text = ctx.node_text(sibling);
        let Some(stripped) = text.strip_prefix("///") else {
            break;
        };
        lines.push(stripped.trim().to_string());
        current = sibling.prev_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use crate::{SymbolParser, TreeSitterParser};
    use cg_core::SymbolKind;

    fn parse(source: &str) -> Vec<cg_core::Symbol> {
        TreeSitterParser::new()
            .parse_file("src/lib.rs", source.as_bytes())
            .unwrap()
    }

    #[test]
    fn extracts_functions_and_structs() {
        let symbols = parse(
            "/// Adds numbers.\npub fn add(a: u32, b: u32) -> u32 { a + b }\n\nstruct Point { x: f64, y: f64 }\n",
        );
        let add = symbols.iter().find(|s| s.name == "add").unwrap();
        assert_eq!(add.kind, SymbolKind::Function);
        assert_eq!(add.start_line, 2);
        assert_eq!(add.type_name, "u32");
        assert_eq!(add.doc.as_deref(), Some("Adds numbers."));
        assert!(add.tags.contains("public"));
        assert_eq!(
            add.signature.as_deref(),
            Some("pub fn add(a: u32, b: u32) -> u32 { a + b }")
        );

        let point = symbols.iter().find(|s| s.name == "Point").unwrap();
        assert_eq!(point.kind, SymbolKind::Struct);
        assert!(!point.tags.contains("public"));

        let x = symbols.iter().find(|s| s.name == "x").unwrap();
        assert_eq!(x.kind, SymbolKind::Field);
        assert_eq!(x.type_name, "f64");
        assert_eq!(x.properties.get("container").map(String::as_str), Some("Point"));
    }

    #[test]
    fn impl_methods_carry_container() {
        let symbols = parse(
            "struct S;\nimpl S {\n    pub fn run(&self) {}\n}\n",
        );
        let run = symbols.iter().find(|s| s.name == "run").unwrap();
        assert_eq!(run.kind, SymbolKind::Method);
        assert_eq!(run.properties.get("container").map(String::as_str), Some("S"));
    }

    #[test]
    fn consts_modules_aliases_imports() {
        let symbols = parse(
            "use std::collections::HashMap;\nconst MAX: usize = 10;\ntype Alias = u8;\nmod inner {\n    fn hidden() {}\n}\n",
        );
        let import = symbols.iter().find(|s| s.kind == SymbolKind::Import).unwrap();
        assert_eq!(import.name, "HashMap");
        let max = symbols.iter().find(|s| s.name == "MAX").unwrap();
        assert_eq!(max.kind, SymbolKind::Constant);
        assert_eq!(max.type_name, "usize");
        assert!(symbols.iter().any(|s| s.name == "Alias" && s.kind == SymbolKind::Type));
        let hidden = symbols.iter().find(|s| s.name == "hidden").unwrap();
        assert_eq!(
            hidden.properties.get("container").map(String::as_str),
            Some("inner")
        );
    }

    #[test]
    fn ids_are_location_stable() {
        let a = parse("fn f() {}\n");
        let b = parse("fn f() {}\n");
        assert_eq!(a[0].id, b[0].id);

        let moved = parse("\nfn f() {}\n");
        assert_ne!(a[0].id, moved[0].id);
    }
}
