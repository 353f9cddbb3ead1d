//! Elasticsearch engine implementation
//!
//! Uses the `_search` API with a JSON query body. Works with OpenSearch too.

use super::traits::*;
use crate::config::{EngineConfig, EngineKind};
use crate::network::HttpClient;
use crate::search::{SearchError, SearchRequest, SearchResult};
use anyhow::{anyhow, Result as AnyhowResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Reads identifiers from the hit metadata instead of `_source`
const META_ID: &str = "_id";

/// Elasticsearch search engine
pub struct Elasticsearch {
    name: String,
    search_url: String,
    id_field: String,
    fields: Vec<String>,
    unit_field: String,
    credentials: Option<Credentials>,
    client: HttpClient,
    timeout: Duration,
}

impl Elasticsearch {
    pub fn new(config: &EngineConfig, client: HttpClient, timeout: Duration) -> AnyhowResult<Self> {
        let base = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("engine {} has no url", config.name))?;
        let search_url = format!("{}/{}/_search", base.trim_end_matches('/'), config.index);
        Url::parse(&search_url)?;

        Ok(Self {
            name: config.name.clone(),
            search_url,
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

    fn query_body(&self, request: &SearchRequest) -> Value {
        // Every term must match, as on the other engines
        let mut text_query = json!({ "query": request.query(), "default_operator": "and" });
        if !self.fields.is_empty() {
            text_query["fields"] = json!(self.fields);
        }

        let mut bool_query = json!({
            "must": [{ "simple_query_string": text_query }]
        });
        if let Some(unit_no) = request.unit_no() {
            let mut term = serde_json::Map::new();
            term.insert(self.unit_field.clone(), json!(unit_no));
            bool_query["filter"] = json!([{ "term": term }]);
        }

        let source = if self.id_field == META_ID {
            json!(false)
        } else {
            json!([self.id_field])
        };

        json!({
            "from": request.from(),
            "size": request.size(),
            "track_total_hits": true,
            "_source": source,
            "query": { "bool": bool_query }
        })
    }

    fn hit_id(&self, hit: &Value) -> Option<String> {
        if self.id_field == META_ID {
            hit.get(META_ID).and_then(id_value)
        } else {
            hit.get("_source")
                .and_then(|s| s.get(&self.id_field))
                .and_then(id_value)
        }
    }
}

/// `hits.total` is a plain number before 7.0 and an object afterwards
fn total_hits(hits: &Value) -> Option<u64> {
    match hits.get("total")? {
        Value::Number(n) => n.as_u64(),
        Value::Object(o) => o.get("value").and_then(Value::as_u64),
        _ => None,
    }
}

impl HttpEngine for Elasticsearch {
    fn label(&self) -> &str {
        &self.name
    }

    fn request(&self, request: &SearchRequest) -> Result<EngineRequest, SearchError> {
        Ok(EngineRequest::post(&self.search_url)
            .header("Content-Type", "application/json")
            .json(self.query_body(request))
            .basic_auth(self.credentials.as_ref()))
    }

    fn response(&self, response: EngineResponse) -> Result<EngineResults, SearchError> {
        let json = response.json()?;

        let hits = json
            .get("hits")
            .ok_or_else(|| SearchError::MappingError("missing hits section".to_string()))?;

        let total = total_hits(hits)
            .ok_or_else(|| SearchError::MappingError("missing hit count".to_string()))?;

        let ids = hits
            .get("hits")
            .and_then(Value::as_array)
            .ok_or_else(|| SearchError::MappingError("missing hit list".to_string()))?
            .iter()
            .map(|hit| {
                self.hit_id(hit).ok_or_else(|| {
                    SearchError::MappingError(format!("hit without identifier field {}", self.id_field))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut results = EngineResults::new(total, ids);
        if let Some(took) = json.get("took").and_then(Value::as_u64) {
            results = results.with_took(took);
        }
        Ok(results)
    }
}

#[async_trait]
impl Engine for Elasticsearch {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Elasticsearch
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, request: &SearchRequest) -> Result<SearchResult, SearchError> {
        execute_http(self, &self.client, request, self.timeout).await
    }
}
