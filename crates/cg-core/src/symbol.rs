use std::collections::BTreeSet;
use std::fmt;
use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Deterministic symbol identifier, derived as
/// `{file_path}:{start_line}:{start_column}:{kind}:{name}`.
///
/// Stable across identical parses; a moved declaration gets a new id.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub String);

impl SymbolId {
    /// Derive the id from a symbol's identifying fields.
    pub fn derive(
        file_path: &str,
        start_line: u32,
        start_column: u32,
        kind: SymbolKind,
        name: &str,
    ) -> Self {
        Self(format!(
            "{file_path}:{start_line}:{start_column}:{}:{name}",
            kind.as_str()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SymbolId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kinds of declarations that can be extracted from source files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Variable,
    Constant,
    Type,
    Class,
    Interface,
    Struct,
    Enum,
    Field,
    Parameter,
    Import,
    Namespace,
    Module,
    Property,
}

impl SymbolKind {
    /// Stable lowercase form used inside SymbolId strings and filters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Type => "type",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Field => "field",
            Self::Parameter => "parameter",
            Self::Import => "import",
            Self::Namespace => "namespace",
            Self::Module => "module",
            Self::Property => "property",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(Self::Function),
            "method" => Some(Self::Method),
            "variable" => Some(Self::Variable),
            "constant" => Some(Self::Constant),
            "type" => Some(Self::Type),
            "class" => Some(Self::Class),
            "interface" => Some(Self::Interface),
            "struct" => Some(Self::Struct),
            "enum" => Some(Self::Enum),
            "field" => Some(Self::Field),
            "parameter" => Some(Self::Parameter),
            "import" => Some(Self::Import),
            "namespace" => Some(Self::Namespace),
            "module" => Some(Self::Module),
            "property" => Some(Self::Property),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declaration in one file.
///
/// Line and column numbers are 1-based. The record round-trips through
/// serde_json without loss; unknown fields from newer writers are ignored
/// and absent optional fields default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    /// Free-form type string from the parser; empty when unknown.
    #[serde(rename = "type", default)]
    pub type_name: String,
    pub kind: SymbolKind,
    /// Relative to project root, forward-slash normalized.
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub start_column: u32,
    pub end_column: u32,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Insertion-ordered string properties.
    #[serde(default)]
    pub properties: IndexMap<String, String>,
    pub updated_at: SystemTime,
}

impl Symbol {
    /// Build a symbol with its id derived from the location fields.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        kind: SymbolKind,
        file_path: impl Into<String>,
        start_line: u32,
        end_line: u32,
        start_column: u32,
        end_column: u32,
    ) -> Self {
        let name = name.into();
        let file_path = file_path.into();
        let id = SymbolId::derive(&file_path, start_line, start_column, kind, &name);
        Self {
            id,
            name,
            type_name: String::new(),
            kind,
            file_path,
            start_line,
            end_line,
            start_column,
            end_column,
            signature: None,
            doc: None,
            tags: BTreeSet::new(),
            properties: IndexMap::new(),
            updated_at: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_id_deterministic() {
        let a = SymbolId::derive("src/main.rs", 10, 5, SymbolKind::Function, "run");
        let b = SymbolId::derive("src/main.rs", 10, 5, SymbolKind::Function, "run");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "src/main.rs:10:5:function:run");
    }

    #[test]
    fn symbol_id_changes_when_moved() {
        let a = SymbolId::derive("src/main.rs", 10, 5, SymbolKind::Function, "run");
        let b = SymbolId::derive("src/main.rs", 11, 5, SymbolKind::Function, "run");
        assert_ne!(a, b);
    }

    #[test]
    fn symbol_kind_string_round_trip() {
        let kinds = [
            SymbolKind::Function,
            SymbolKind::Method,
            SymbolKind::Variable,
            SymbolKind::Constant,
            SymbolKind::Type,
            SymbolKind::Class,
            SymbolKind::Interface,
            SymbolKind::Struct,
            SymbolKind::Enum,
            SymbolKind::Field,
            SymbolKind::Parameter,
            SymbolKind::Import,
            SymbolKind::Namespace,
            SymbolKind::Module,
            SymbolKind::Property,
        ];
        for kind in kinds {
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
        }
        assert!(SymbolKind::parse("gadget").is_none());
    }

    #[test]
    fn new_derives_matching_id() {
        let sym = Symbol::new("parse", SymbolKind::Function, "src/lib.rs", 3, 9, 1, 2);
        assert_eq!(sym.id.as_str(), "src/lib.rs:3:1:function:parse");
    }
}
