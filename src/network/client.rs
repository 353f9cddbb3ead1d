//! HTTP client shared by the HTTP search engines

use crate::config::OutgoingSettings;
use crate::engines::{EngineRequest, EngineResponse, HttpMethod, RequestBody};
use crate::search::SearchError;
use anyhow::Result;
use reqwest::{Client, Response};
use std::time::Duration;

/// Pooled HTTP client. Cloning is cheap and shares the connection pool.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self> {
        Self::with_settings(&OutgoingSettings::default())
    }

    /// Create a new HTTP client with custom settings
    pub fn with_settings(settings: &OutgoingSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs_f64(settings.request_timeout))
            .pool_max_idle_per_host(settings.pool_maxsize)
            .user_agent(concat!("search-bench/", env!("CARGO_PKG_VERSION")))
            .gzip(true);

        // SSL verification
        if !settings.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        // Proxy settings
        if let Some(ref proxy_url) = settings.proxies.all {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        } else {
            if let Some(ref http) = settings.proxies.http {
                builder = builder.proxy(reqwest::Proxy::http(http)?);
            }
            if let Some(ref https) = settings.proxies.https {
                builder = builder.proxy(reqwest::Proxy::https(https)?);
            }
        }

        let client = builder.build()?;

        Ok(Self { client })
    }

    /// Execute an engine request with custom timeout
    pub async fn execute_with_timeout(
        &self,
        request: EngineRequest,
        timeout: Duration,
    ) -> Result<EngineResponse, SearchError> {
        let mut req_builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        req_builder = req_builder
            .timeout(timeout)
            .header("Accept", "application/json");

        // Add custom headers
        for (key, value) in &request.headers {
            req_builder = req_builder.header(key, value);
        }

        // Add query parameters
        if !request.params.is_empty() {
            req_builder = req_builder.query(&request.params);
        }

        // Add body
        if let Some(body) = request.data {
            req_builder = match body {
                RequestBody::Json(json) => req_builder.json(&json),
            };
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        Self::parse_response(response, timeout).await
    }

    /// Parse response into EngineResponse
    async fn parse_response(response: Response, timeout: Duration) -> Result<EngineResponse, SearchError> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        Ok(EngineResponse { status, text })
    }
}

/// Classify a reqwest failure into the canonical taxonomy
fn transport_error(err: reqwest::Error, timeout: Duration) -> SearchError {
    if err.is_timeout() {
        SearchError::BackendTimeout(timeout)
    } else if err.is_decode() {
        SearchError::MappingError(format!("could not decode response body: {}", err))
    } else if err.is_connect() {
        SearchError::BackendUnavailable(format!("connection failed: {}", err))
    } else {
        SearchError::BackendUnavailable(format!("transport error: {}", err))
    }
}
