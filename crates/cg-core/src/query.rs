use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::symbol::Symbol;

/// How candidate symbol ids are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryMode {
    /// Point lookup in the name index.
    ByName(String),
    /// Point lookup in the type index.
    ByType(String),
    /// Point lookup in the tag index.
    ByTag(String),
    /// Substring scan over the whole name index.
    ByPattern(String),
}

impl QueryMode {
    pub fn term(&self) -> &str {
        match self {
            Self::ByName(t) | Self::ByType(t) | Self::ByTag(t) | Self::ByPattern(t) => t,
        }
    }
}

/// Post-resolution filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Equals,
    Contains,
    StartsWith,
}

/// Fields a filter can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Name,
    Type,
    Kind,
    FilePath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: FilterField,
    pub op: FilterOp,
    pub value: String,
}

impl QueryFilter {
    /// Apply the filter to one symbol. Comparisons are case-insensitive.
    pub fn matches(&self, sym: &Symbol) -> bool {
        let subject = match self.field {
            FilterField::Name => sym.name.as_str(),
            FilterField::Type => sym.type_name.as_str(),
            FilterField::Kind => sym.kind.as_str(),
            FilterField::FilePath => sym.file_path.as_str(),
        };
        let subject = subject.to_lowercase();
        let value = self.value.to_lowercase();
        match self.op {
            FilterOp::Equals => subject == value,
            FilterOp::Contains => subject.contains(&value),
            FilterOp::StartsWith => subject.starts_with(&value),
        }
    }
}

/// Sortable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    Type,
    FilePath,
    Line,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySort {
    pub field: SortField,
    pub descending: bool,
}

/// A symbol-shaped query against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolQuery {
    pub mode: QueryMode,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    #[serde(default)]
    pub sort: Option<QuerySort>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SymbolQuery {
    pub fn new(mode: QueryMode) -> Self {
        Self {
            mode,
            filters: Vec::new(),
            sort: None,
            offset: 0,
            limit: None,
        }
    }

    /// Fingerprint of the normalized query, used as the cache key.
    ///
    /// Normalization lower-cases the term so `Foo` and `foo` share a cache
    /// entry, matching the lower-cased secondary indices.
    pub fn fingerprint(&self) -> u64 {
        let tag = match &self.mode {
            QueryMode::ByName(_) => "name",
            QueryMode::ByType(_) => "type",
            QueryMode::ByTag(_) => "tag",
            QueryMode::ByPattern(_) => "pattern",
        };
        let mut input = format!("{tag}|{}", self.mode.term().to_lowercase());
        for f in &self.filters {
            input.push_str(&format!(
                "|f:{:?}:{:?}:{}",
                f.field,
                f.op,
                f.value.to_lowercase()
            ));
        }
        if let Some(sort) = &self.sort {
            input.push_str(&format!("|s:{:?}:{}", sort.field, sort.descending));
        }
        input.push_str(&format!("|o:{}|l:{:?}", self.offset, self.limit));
        xxh3_64(input.as_bytes())
    }
}

/// A cached search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub fingerprint: u64,
    pub symbols: Vec<Symbol>,
    /// Total candidates before pagination.
    pub total: usize,
    pub elapsed: Duration,
    pub cached_at: SystemTime,
    pub expires_at: SystemTime,
}

impl QueryResult {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}
