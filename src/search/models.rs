//! Canonical request and result shapes shared by every backend

use super::error::SearchError;
use serde::{Deserialize, Serialize};

/// A backend-agnostic search request: one free-text term plus a result window.
///
/// The query is trimmed on construction. Fields are read-only after that; the
/// `with_*` methods consume the request and are meant for building it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    query: String,
    size: u32,
    from: u32,
    unit_no: Option<String>,
}

impl SearchRequest {
    /// Create a request for the first `size` hits of `query`
    pub fn new(query: impl Into<String>, size: u32) -> Self {
        Self {
            query: query.into().trim().to_string(),
            size,
            from: 0,
            unit_no: None,
        }
    }

    /// Set the starting offset of the result window
    pub fn with_from(mut self, from: u32) -> Self {
        self.from = from;
        self
    }

    /// Restrict the search to one unit (partition)
    pub fn with_unit_no(mut self, unit_no: impl Into<String>) -> Self {
        let unit_no = unit_no.into();
        let trimmed = unit_no.trim();
        self.unit_no = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn from(&self) -> u32 {
        self.from
    }

    pub fn unit_no(&self) -> Option<&str> {
        self.unit_no.as_deref()
    }

    /// Exclusive end of the window `[from, from + size)`
    pub fn end(&self) -> u64 {
        u64::from(self.from) + u64::from(self.size)
    }

    /// Check the preconditions every backend relies on
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.query.is_empty() {
            return Err(SearchError::InvalidQuery(
                "query must not be empty".to_string(),
            ));
        }
        if self.size == 0 {
            return Err(SearchError::InvalidQuery(
                "size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Normalized search result.
///
/// Only counts and rank order are exposed. Relevance scores are left out on
/// purpose: they come from different scoring models and cannot be compared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Number of matching documents as reported by the backend (may be an estimate)
    pub total: u64,
    /// Backend-reported or locally measured time of the native call
    #[serde(rename = "took")]
    pub took_ms: u64,
    /// Document identifiers in backend rank order
    pub ids: Vec<String>,
}

impl SearchResult {
    /// Build a result, clamping `ids` to the request window and `total` to at
    /// least the number of returned ids
    pub fn new(total: u64, took_ms: u64, mut ids: Vec<String>, request: &SearchRequest) -> Self {
        ids.truncate(request.size() as usize);
        let total = total.max(ids.len() as u64);
        Self { total, took_ms, ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
