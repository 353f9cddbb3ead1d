//! Solr engine implementation
//!
//! Queries the `select` request handler with `edismax` parameters.

use super::traits::*;
use crate::config::{EngineConfig, EngineKind};
use crate::network::HttpClient;
use crate::search::{SearchError, SearchRequest, SearchResult};
use anyhow::{anyhow, Result as AnyhowResult};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Solr search engine
pub struct Solr {
    name: String,
    select_url: String,
    id_field: String,
    fields: Vec<String>,
    unit_field: String,
    credentials: Option<Credentials>,
    client: HttpClient,
    timeout: Duration,
}

impl Solr {
    pub fn new(config: &EngineConfig, client: HttpClient, timeout: Duration) -> AnyhowResult<Self> {
        let base = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("engine {} has no url", config.name))?;
        let select_url = format!("{}/{}/select", base.trim_end_matches('/'), config.index);
        Url::parse(&select_url)?;

        Ok(Self {
            name: config.name.clone(),
            select_url,
            id_field: config.id_field.clone(),
            fields: config.fields.clone(),
            unit_field: config.unit_field.clone(),
            credentials: Credentials::from_parts(
                config.username.as_deref(),
                config.password.as_deref(),
            ),
            client,
            timeout,
        })
    }
}

/// Quote a value for use in a Solr field query
fn quote_term(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

impl HttpEngine for Solr {
    fn label(&self) -> &str {
        &self.name
    }

    fn request(&self, request: &SearchRequest) -> Result<EngineRequest, SearchError> {
        let mut native = EngineRequest::get(&self.select_url)
            .param("q", request.query())
            .param("defType", "edismax")
            // Every term must match, as on the other engines
            .param("q.op", "AND")
            .param("mm", "100%")
            .param("start", request.from().to_string())
            .param("rows", request.size().to_string())
            .param("fl", &self.id_field)
            // Ties are broken by id so repeated requests rank identically
            .param("sort", format!("score desc,{} asc", self.id_field))
            .param("wt", "json")
            .basic_auth(self.credentials.as_ref());

        if !self.fields.is_empty() {
            native = native.param("qf", self.fields.join(" "));
        }

        if let Some(unit_no) = request.unit_no() {
            native = native.param("fq", format!("{}:{}", self.unit_field, quote_term(unit_no)));
        }

        Ok(native)
    }

    fn response(&self, response: EngineResponse) -> Result<EngineResults, SearchError> {
        let json = response.json()?;

        let body = json
            .get("response")
            .ok_or_else(|| SearchError::MappingError("missing response section".to_string()))?;

        let total = body
            .get("numFound")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchError::MappingError("missing hit count".to_string()))?;

        let ids = body
            .get("docs")
            .and_then(Value::as_array)
            .ok_or_else(|| SearchError::MappingError("missing document list".to_string()))?
            .iter()
            .map(|doc| {
                doc.get(&self.id_field).and_then(id_value).ok_or_else(|| {
                    SearchError::MappingError(format!(
                        "document without identifier field {}",
                        self.id_field
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut results = EngineResults::new(total, ids);
        if let Some(qtime) = json
            .get("responseHeader")
            .and_then(|h| h.get("QTime"))
            .and_then(Value::as_u64)
        {
            results = results.with_took(qtime);
        }
        Ok(results)
    }
}

#[async_trait]
impl Engine for Solr {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Solr
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, request: &SearchRequest) -> Result<SearchResult, SearchError> {
        execute_http(self, &self.client, request, self.timeout).await
    }
}
