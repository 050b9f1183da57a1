pub mod engine;
pub mod error;
pub mod options;
pub mod pattern;
pub mod regex_search;
pub mod semantic;
pub mod types;
mod walker;

pub use engine::Engine;
pub use error::SearchError;
pub use options::{ColorMode, SearchOptions};
pub use pattern::PatternCache;
pub use regex_search::RegexSearcher;
pub use semantic::SemanticSearcher;
pub use types::{ContextLine, ResultMetadata, SearchResult, SearchStats, SubMatch};
