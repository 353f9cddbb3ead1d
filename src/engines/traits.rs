//! Engine traits and types

use crate::config::EngineKind;
use crate::network::HttpClient;
use crate::search::{SearchError, SearchRequest, SearchResult};
use async_trait::async_trait;
use base64::Engine as _;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Native outcome of one engine call, before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineResults {
    /// Matching documents as counted by the engine
    pub total: u64,
    /// Engine-reported processing time, if the engine reports one
    pub took_ms: Option<u64>,
    /// Document identifiers in engine rank order
    pub ids: Vec<String>,
}

impl EngineResults {
    pub fn new(total: u64, ids: Vec<String>) -> Self {
        Self {
            total,
            took_ms: None,
            ids,
        }
    }

    pub fn with_took(mut self, took_ms: u64) -> Self {
        self.took_ms = Some(took_ms);
        self
    }

    /// Normalize into the canonical result, using `elapsed` when the engine
    /// did not report its own timing
    pub fn into_result(self, elapsed: Duration, request: &SearchRequest) -> SearchResult {
        let took_ms = self.took_ms.unwrap_or(elapsed.as_millis() as u64);
        SearchResult::new(self.total, took_ms, self.ids, request)
    }
}

/// HTTP request to be made by an engine
#[derive(Debug, Clone)]
pub struct EngineRequest {
    /// URL to request
    pub url: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Query parameters
    pub params: HashMap<String, String>,
    /// Body
    pub data: Option<RequestBody>,
}

impl EngineRequest {
    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: HashMap::new(),
            params: HashMap::new(),
            data: None,
        }
    }

    /// Create a POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            headers: HashMap::new(),
            params: HashMap::new(),
            data: None,
        }
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add JSON body
    pub fn json(mut self, data: serde_json::Value) -> Self {
        self.data = Some(RequestBody::Json(data));
        self
    }

    /// Add basic auth credentials, if configured
    pub fn basic_auth(self, credentials: Option<&Credentials>) -> Self {
        match credentials {
            Some(c) => self.header("Authorization", c.header_value()),
            None => self,
        }
    }
}

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Request body types
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
}

/// HTTP response from engine request
#[derive(Debug)]
pub struct EngineResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub text: String,
}

impl EngineResponse {
    /// Parse response as JSON
    pub fn json(&self) -> Result<serde_json::Value, SearchError> {
        serde_json::from_str(&self.text)
            .map_err(|e| SearchError::MappingError(format!("response is not JSON: {}", e)))
    }

    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Basic auth credentials for an HTTP engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Build credentials when a username is configured
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        username.map(|u| Self {
            username: u.to_string(),
            password: password.unwrap_or_default().to_string(),
        })
    }

    fn header_value(&self) -> String {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

/// The search contract every engine implements.
///
/// Callers hold an `Arc<dyn Engine>` and only ever call [`Engine::search`];
/// which adapter sits behind it is decided by configuration at startup.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Engine id, as configured
    fn name(&self) -> &str;

    /// Adapter kind
    fn kind(&self) -> EngineKind;

    /// Deadline for a single call
    fn timeout(&self) -> Duration;

    /// Run one already-validated request against the engine.
    ///
    /// Exactly one round-trip, no retries. Every failure must be mapped into
    /// [`SearchError`].
    async fn execute(&self, request: &SearchRequest) -> Result<SearchResult, SearchError>;

    /// Validate the request, then run it. Invalid requests never reach the engine.
    async fn search(&self, request: &SearchRequest) -> Result<SearchResult, SearchError> {
        request.validate()?;
        self.execute(request).await
    }
}

/// An engine reached over HTTP with a JSON API.
///
/// Building the native request and mapping the native response are kept
/// pure so they can be tested without a server.
pub trait HttpEngine: Send + Sync {
    /// Engine id, used in log lines and error messages
    fn label(&self) -> &str;

    /// Translate the canonical request into the engine's native query
    fn request(&self, request: &SearchRequest) -> Result<EngineRequest, SearchError>;

    /// Map a 2xx response into native results
    fn response(&self, response: EngineResponse) -> Result<EngineResults, SearchError>;
}

/// Execute one request against an [`HttpEngine`] under `timeout`
pub async fn execute_http<E: HttpEngine + ?Sized>(
    engine: &E,
    client: &HttpClient,
    request: &SearchRequest,
    timeout: Duration,
) -> Result<SearchResult, SearchError> {
    let native = engine.request(request)?;
    let start = Instant::now();

    let response = match tokio::time::timeout(timeout, client.execute_with_timeout(native, timeout)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            warn!("Request failed for {}: {}", engine.label(), e);
            return Err(e);
        }
        Err(_) => {
            warn!("Timeout for engine {}", engine.label());
            return Err(SearchError::BackendTimeout(timeout));
        }
    };
    let elapsed = start.elapsed();

    if !response.is_success() {
        warn!("Engine {} answered with status {}", engine.label(), response.status);
        return Err(SearchError::from_status(response.status, engine.label(), elapsed));
    }

    let results = engine.response(response).map_err(|e| {
        warn!("Failed to map response from {}: {}", engine.label(), e);
        e
    })?;

    debug!(
        "Engine {} returned {} of {} hits in {:?}",
        engine.label(),
        results.ids.len(),
        results.total,
        elapsed
    );

    Ok(results.into_result(elapsed, request))
}

/// Read a document identifier that may be stored as a string or a number
pub fn id_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        // Multi-valued fields: take the first value
        serde_json::Value::Array(values) => values.first().and_then(id_value),
        _ => None,
    }
}
