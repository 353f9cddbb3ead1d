//! HTTP request handlers

use super::error::ApiError;
use super::state::AppState;
use crate::engines::EngineInfo;
use crate::search::{SearchRequest, SearchResult};
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

/// Result size when a simple search does not name one
pub const DEFAULT_SIZE: u32 = 10;

/// Query parameters for the simple search
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub size: Option<i64>,
}

/// Body of the advanced search
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedSearchBody {
    pub query: String,
    pub size: i64,
    #[serde(default)]
    pub from: i64,
    pub unit_no: Option<String>,
}

/// Health check handler
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// List the configured engines
pub async fn backends(State(state): State<AppState>) -> Json<Vec<EngineInfo>> {
    Json(state.registry.infos())
}

/// Free-text search against one engine
pub async fn search(
    State(state): State<AppState>,
    Path(backend): Path<String>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResult>, ApiError> {
    let Query(params) = params?;
    let engine = state
        .engine(&backend)
        .ok_or(ApiError::UnknownEngine(backend))?;

    let query = match params.query {
        Some(q) if !q.trim().is_empty() => q,
        _ => return Err(ApiError::BadRequest("query must not be empty".to_string())),
    };
    let size = match params.size {
        Some(size) => non_negative("size", size)?,
        None => DEFAULT_SIZE,
    };

    let request = SearchRequest::new(query, size);
    let result = engine.search(&request).await?;
    Ok(Json(result))
}

/// Paginated, optionally unit-scoped search against one engine
pub async fn advanced_search(
    State(state): State<AppState>,
    Path(backend): Path<String>,
    body: Result<Json<AdvancedSearchBody>, JsonRejection>,
) -> Result<Json<SearchResult>, ApiError> {
    let Json(body) = body?;
    let engine = state
        .engine(&backend)
        .ok_or(ApiError::UnknownEngine(backend))?;

    let size = non_negative("size", body.size)?;
    let from = non_negative("from", body.from)?;

    let mut request = SearchRequest::new(body.query, size).with_from(from);
    if let Some(unit_no) = body.unit_no {
        request = request.with_unit_no(unit_no);
    }

    let result = engine.search(&request).await?;
    Ok(Json(result))
}

fn non_negative(name: &str, value: i64) -> Result<u32, ApiError> {
    u32::try_from(value)
        .map_err(|_| ApiError::BadRequest(format!("{} must be between 0 and {}", name, u32::MAX)))
}
