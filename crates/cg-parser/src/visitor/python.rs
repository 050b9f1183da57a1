use cg_core::{Symbol, SymbolId, SymbolKind};

use crate::error::ParserError;
use crate::visitor::{locate, VisitorContext};

pub(crate) fn extract(
    ctx: &VisitorContext<'_>,
    tree: &tree_sitter::Tree,
) -> Result<Vec<Symbol>, ParserError> {
    let mut symbols = Vec::new();
    extract_block(ctx, tree.root_node(), None, &mut symbols);
    Ok(symbols)
}

fn extract_block(
    ctx: &VisitorContext<'_>,
    parent: tree_sitter::Node<'_>,
    container: Option<&str>,
    symbols: &mut Vec<Symbol>,
) {
    let mut cursor = parent.walk();
    for child in parent.children(&mut cursor) {
        // Decorators wrap the real definition.
        let node = if child.kind() == "decorated_definition" {
            match child.child_by_field_name("definition") {
                Some(def) => def,
                None => continue,
            }
        } else {
            child
        };

        match node.kind() {
            "function_definition" => {
                let kind = if container.is_some() {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                if let Some(mut sym) = named_symbol(ctx, node, kind, container) {
                    sym.type_name = node
                        .child_by_field_name("return_type")
                        .map(|n| ctx.node_text(n).to_string())
                        .unwrap_or_default();
                    sym.doc = docstring(ctx, node);
                    symbols.push(sym);
                }
            }
            "class_definition" => {
                if let Some(mut sym) = named_symbol(ctx, node, SymbolKind::Class, container) {
                    sym.doc = docstring(ctx, node);
                    let name = sym.name.clone();
                    symbols.push(sym);
                    if let Some(body) = node.child_by_field_name("body") {
                        extract_block(ctx, body, Some(&name), symbols);
                    }
                }
            }
            "expression_statement" => {
                // Module-level assignments become variables/constants.
                if container.is_some() {
                    continue;
                }
                let Some(assign) = node.child(0).filter(|n| n.kind() == "assignment") else {
                    continue;
                };
                let Some(left) = assign.child_by_field_name("left") else {
                    continue;
                };
                if left.kind() != "identifier" {
                    continue;
                }
                let name = ctx.node_text(left).to_string();
                let kind = if name.chars().all(|c| !c.is_ascii_lowercase()) {
                    SymbolKind::Constant
                } else {
                    SymbolKind::Variable
                };
                let mut sym = blank_symbol(ctx, left, name, kind);
                sym.signature = Some(ctx.signature_line(node));
                sym.type_name = assign
                    .child_by_field_name("type")
                    .map(|n| ctx.node_text(n).to_string())
                    .unwrap_or_default();
                symbols.push(sym);
            }
            "import_statement" | "import_from_statement" => {
                for module in import_names(ctx, node) {
                    let sym = blank_symbol(ctx, node, module, SymbolKind::Import);
                    symbols.push(sym);
                }
            }
            _ => {}
        }
    }
}

fn import_names(ctx: &VisitorContext<'_>, node: tree_sitter::Node<'_>) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "dotted_name" | "aliased_import" => {
                let text = ctx.node_text(child);
                let last = text
                    .rsplit(&[' ', '.'][..])
                    .next()
                    .unwrap_or(text)
                    .to_string();
                if !last.is_empty() && last != "import" {
                    names.push(last);
                }
            }
            _ => {}
        }
    }
    names
}

fn named_symbol(
    ctx: &VisitorContext<'_>,
    node: tree_sitter::Node<'_>,
    kind: SymbolKind,
    container: Option<&str>,
) -> Option<Symbol> {
    let name = ctx.node_text(node.child_by_field_name("name")?).to_string();
    let mut sym = blank_symbol(ctx, node, name, kind);
    sym.signature = Some(ctx.signature_line(node).trim_end_matches(':').to_string());
    if sym.name.starts_with('_') {
        sym.tags.insert("private".to_string());
    } else {
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

/// A literal string expression as the first body statement.
fn docstring(ctx: &VisitorContext<'_>, node: tree_sitter::Node<'_>) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.child(0).filter(|n| n.kind() == "string")?;
    let text = ctx
        .node_text(string)
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string();
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use crate::{SymbolParser, TreeSitterParser};
    use cg_core::SymbolKind;

    fn parse(source: &str) -> Vec<cg_core::Symbol> {
        TreeSitterParser::new()
            .parse_file("pkg/app.py", source.as_bytes())
            .unwrap()
    }

    #[test]
    fn functions_classes_methods() {
        let symbols = parse(
            "def run():\n    \"\"\"Entry point.\"\"\"\n    pass\n\nclass Server:\n    def start(self):\n        pass\n",
        );
        let run = symbols.iter().find(|s| s.name == "run").unwrap();
        assert_eq!(run.kind, SymbolKind::Function);
        assert_eq!(run.doc.as_deref(), Some("Entry point."));
        assert_eq!(run.signature.as_deref(), Some("def run()"));

        let server = symbols.iter().find(|s| s.name == "Server").unwrap();
        assert_eq!(server.kind, SymbolKind::Class);

        let start = symbols.iter().find(|s| s.name == "start").unwrap();
        assert_eq!(start.kind, SymbolKind::Method);
        assert_eq!(
            start.properties.get("container").map(String::as_str),
            Some("Server")
        );
    }

    #[test]
    fn module_level_assignments() {
        let symbols = parse("MAX_SIZE = 100\ncount = 0\n");
        let max = symbols.iter().find(|s| s.name == "MAX_SIZE").unwrap();
        assert_eq!(max.kind, SymbolKind::Constant);
        let count = symbols.iter().find(|s| s.name == "count").unwrap();
        assert_eq!(count.kind, SymbolKind::Variable);
    }

    #[test]
    fn imports_and_privacy_tags() {
        let symbols = parse("import os\nfrom typing import List\n\ndef _internal():\n    pass\n");
        assert!(symbols
            .iter()
            .any(|s| s.kind == SymbolKind::Import && s.name == "os"));
        assert!(symbols
            .iter()
            .any(|s| s.kind == SymbolKind::Import && s.name == "List"));
        let internal = symbols.iter().find(|s| s.name == "_internal").unwrap();
        assert!(internal.tags.contains("private"));
    }

    #[test]
    fn decorated_functions_extracted() {
        let symbols = parse("@cached\ndef compute():\n    return 1\n");
        assert!(symbols
            .iter()
            .any(|s| s.name == "compute" && s.kind == SymbolKind::Function));
    }
}
