use crate::search::{ErrorKind, SearchError};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors surfaced by the HTTP layer
#[derive(Debug)]
pub enum ApiError {
    /// No engine is registered under this id
    UnknownEngine(String),
    /// The request was rejected before reaching an engine
    BadRequest(String),
    Search(SearchError),
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        ApiError::Search(err)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownEngine(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Search(err) => match err.kind() {
                ErrorKind::InvalidQuery => StatusCode::BAD_REQUEST,
                ErrorKind::BackendUnavailable | ErrorKind::MappingError => StatusCode::BAD_GATEWAY,
                ErrorKind::BackendTimeout => StatusCode::GATEWAY_TIMEOUT,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, kind) = match self {
            ApiError::UnknownEngine(name) => {
                (format!("unknown backend: {}", name), "unknown_backend".to_string())
            }
            ApiError::BadRequest(msg) => (msg, ErrorKind::InvalidQuery.to_string()),
            ApiError::Search(err) => (err.to_string(), err.kind().to_string()),
        };

        (status, Json(json!({ "error": message, "kind": kind }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let status = |err: SearchError| ApiError::from(err).status();

        assert_eq!(status(SearchError::InvalidQuery("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(SearchError::BackendUnavailable("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status(SearchError::MappingError("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status(SearchError::BackendTimeout(Duration::from_secs(1))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::UnknownEngine("nope".into()).status(),
            StatusCode::NOT_FOUND
        );
    }
}
