//! Cache key generators for consistent key naming.
//!
//! Direct entities live at `<namespace>:<id>`, collection results at
//! `<namespace>:list:<query>`. An optional deployment prefix is prepended to
//! both.

use crate::CacheCategory;
use std::fmt;

/// Segment separating a namespace from list query keys.
const LIST_SEGMENT: &str = "list";

/// Key builder for one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheKeys {
    prefix: Option<String>,
}

impl CacheKeys {
    /// Keys without a deployment prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys under `prefix:`. Empty prefixes are ignored.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches(':').to_string();
        Self {
            prefix: (!prefix.is_empty()).then_some(prefix),
        }
    }

    /// The deployment prefix, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn namespaced(&self, rest: fmt::Arguments<'_>) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, rest),
            None => rest.to_string(),
        }
    }

    /// Key for a single entity. List categories get the list form.
    #[must_use]
    pub fn entity(&self, category: CacheCategory, id: impl fmt::Display) -> String {
        if category.is_list() {
            return self.list(category, id);
        }
        self.namespaced(format_args!("{}:{}", category.namespace(), id))
    }

    /// Key for a collection/query result in `category`'s namespace.
    #[must_use]
    pub fn list(&self, category: CacheCategory, query_key: impl fmt::Display) -> String {
        self.namespaced(format_args!("{}:{}:{}", category.namespace(), LIST_SEGMENT, query_key))
    }

    /// Glob matching every list key in `category`'s namespace.
    ///
    /// The prefix is escaped, so it only ever matches itself.
    #[must_use]
    pub fn list_pattern(&self, category: CacheCategory) -> String {
        let namespace = escape_glob(category.namespace());
        match &self.prefix {
            Some(prefix) => format!("{}:{}:{}:*", escape_glob(prefix), namespace, LIST_SEGMENT),
            None => format!("{}:{}:*", namespace, LIST_SEGMENT),
        }
    }

    /// Glob matching every key of this deployment, when prefixed.
    #[must_use]
    pub fn deployment_pattern(&self) -> Option<String> {
        self.prefix
            .as_ref()
            .map(|prefix| format!("{}:*", escape_glob(prefix)))
    }
}

/// Backslash-escapes the characters Redis treats as pattern syntax.
#[must_use]
pub fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Normalizes a free-text search so equivalent queries share one key.
///
/// Trims, lowercases and collapses internal whitespace.
#[must_use]
pub fn normalize_search_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
