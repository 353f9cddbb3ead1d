//! Canonical error taxonomy for search calls

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single search call.
///
/// Adapters convert every backend-native failure into one of these variants,
/// so no client library error type escapes the search contract.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// The request failed validation, or the backend rejected the query
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// The backend could not be reached or refused to serve the request
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// The call exceeded its deadline
    #[error("backend timed out after {0:?}")]
    BackendTimeout(Duration),
    /// The backend answered but the payload could not be mapped
    #[error("could not map backend response: {0}")]
    MappingError(String),
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Self::BackendTimeout(_) => ErrorKind::BackendTimeout,
            Self::MappingError(_) => ErrorKind::MappingError,
        }
    }

    /// Map a non-2xx HTTP status from a search backend.
    ///
    /// A timeout status reports `elapsed`, the time the call took to fail.
    pub fn from_status(status: u16, backend: &str, elapsed: Duration) -> Self {
        match status {
            400 => Self::InvalidQuery(format!("{} rejected the query", backend)),
            401 | 403 => Self::BackendUnavailable(format!("{} denied access", backend)),
            404 => Self::BackendUnavailable(format!("{} has no such search target", backend)),
            408 | 504 => Self::BackendTimeout(elapsed),
            _ => Self::BackendUnavailable(format!("{} answered with status {}", backend, status)),
        }
    }
}

/// Fieldless projection of [`SearchError`], used in samples and API bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidQuery,
    BackendUnavailable,
    BackendTimeout,
    MappingError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuery => write!(f, "invalid_query"),
            Self::BackendUnavailable => write!(f, "backend_unavailable"),
            Self::BackendTimeout => write!(f, "backend_timeout"),
            Self::MappingError => write!(f, "mapping_error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ELAPSED: Duration = Duration::from_millis(40);

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            SearchError::from_status(400, "solr", ELAPSED).kind(),
            ErrorKind::InvalidQuery
        );
        assert_eq!(
            SearchError::from_status(404, "elasticsearch", ELAPSED).kind(),
            ErrorKind::BackendUnavailable
        );
        assert_eq!(
            SearchError::from_status(503, "solr", ELAPSED).kind(),
            ErrorKind::BackendUnavailable
        );
    }

    #[test]
    fn test_timeout_statuses_are_timeouts() {
        for status in [408, 504] {
            match SearchError::from_status(status, "solr", ELAPSED) {
                SearchError::BackendTimeout(d) => assert_eq!(d, ELAPSED),
                other => panic!("expected timeout for {}, got {:?}", status, other),
            }
        }
        assert_eq!(
            SearchError::from_status(502, "solr", ELAPSED).kind(),
            ErrorKind::BackendUnavailable
        );
    }

    #[test]
    fn test_messages_do_not_leak_backend_vocabulary() {
        let err = SearchError::from_status(404, "elasticsearch", ELAPSED);
        assert!(!err.to_string().contains("index_not_found"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::BackendTimeout).unwrap();
        assert_eq!(json, "\"backend_timeout\"");
        assert_eq!(ErrorKind::MappingError.to_string(), "mapping_error");
    }
}
