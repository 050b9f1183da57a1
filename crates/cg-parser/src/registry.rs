use cg_core::Language;
use tree_sitter::Language as TSLanguage;

/// Maps file extensions to languages and tree-sitter grammars.
///
/// Only languages with a grammar compiled in can be parsed; the rest of
/// the `Language` enum still participates in search type filters.
pub struct ParserRegistry;

impl ParserRegistry {
    /// Get the tree-sitter grammar for a parseable language.
    pub fn grammar_for(lang: Language) -> Option<TSLanguage> {
        match lang {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            _ => None,
        }
    }

    /// Resolve a file extension to a Language.
    pub fn language_for_extension(ext: &str) -> Option<Language> {
        Language::from_extension(ext)
    }

    /// Whether a grammar is available for files with this extension.
    pub fn can_parse_extension(ext: &str) -> bool {
        Language::from_extension(ext)
            .and_then(Self::grammar_for)
            .is_some()
    }
}
