//! Settings structures for search-bench configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Main settings structure, loaded from settings.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub server: ServerSettings,
    pub outgoing: OutgoingSettings,
    pub engines: Vec<EngineConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            server: ServerSettings::default(),
            outgoing: OutgoingSettings::default(),
            engines: default_engines(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Merge with environment variables (SEARCH_BENCH_* prefix)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("SEARCH_BENCH_DEBUG") {
            self.general.debug = val.parse().unwrap_or(false);
        }
        if let Ok(val) = std::env::var("SEARCH_BENCH_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("SEARCH_BENCH_BIND_ADDRESS") {
            self.server.bind_address = val;
        }
    }

    /// Reject configurations the loader cannot turn into backends
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for engine in &self.engines {
            if engine.name.trim().is_empty() {
                bail!("engine name must not be empty");
            }
            if !seen.insert(engine.name.as_str()) {
                bail!("duplicate engine name: {}", engine.name);
            }
            match engine.kind {
                EngineKind::Elasticsearch | EngineKind::Solr => {
                    if engine.url.as_deref().map_or(true, str::is_empty) {
                        bail!("engine {} requires a url", engine.name);
                    }
                    if engine.index.is_empty() {
                        bail!("engine {} requires an index", engine.name);
                    }
                }
                EngineKind::Sqlite => {
                    if engine.path.is_none() {
                        bail!("engine {} requires a database path", engine.name);
                    }
                }
            }
            if matches!(engine.timeout, Some(t) if t <= 0.0) {
                bail!("engine {} has a non-positive timeout", engine.name);
            }
        }
        Ok(())
    }

    /// Get backend config by name
    pub fn get_engine(&self, name: &str) -> Option<&EngineConfig> {
        self.engines.iter().find(|b| b.name == name)
    }

    /// Get all enabled backends
    pub fn enabled_engines(&self) -> Vec<&EngineConfig> {
        self.engines.iter().filter(|b| !b.disabled).collect()
    }
}

/// General settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Enable debug logging
    pub debug: bool,
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Server port
    pub port: u16,
    /// Bind address
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8888,
            bind_address: "127.0.0.1".to_string(),
        }
    }
}

/// Outgoing request settings for the HTTP backends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    /// Default request timeout in seconds
    pub request_timeout: f64,
    /// Idle connections kept per host
    pub pool_maxsize: usize,
    /// Verify SSL certificates
    pub verify_ssl: bool,
    /// Proxy settings
    pub proxies: ProxySettings,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            request_timeout: 5.0,
            pool_maxsize: 20,
            verify_ssl: true,
            proxies: ProxySettings::default(),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
}

/// Which adapter a backend entry is served by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[default]
    Elasticsearch,
    Solr,
    Sqlite,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Elasticsearch => write!(f, "elasticsearch"),
            Self::Solr => write!(f, "solr"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Individual backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend id (unique), used by the API and the benchmark
    pub name: String,
    /// Adapter to use
    pub kind: EngineKind,
    /// Base URL of the engine (HTTP kinds)
    pub url: Option<String>,
    /// Index (Elasticsearch), core (Solr) or FTS5 table (SQLite)
    pub index: String,
    /// Field holding the document identifier
    pub id_field: String,
    /// Fields the free-text term is matched against
    pub fields: Vec<String>,
    /// Field used for the unit scope filter
    pub unit_field: String,
    /// Database file (SQLite)
    pub path: Option<PathBuf>,
    /// Per-backend timeout in seconds
    pub timeout: Option<f64>,
    /// Basic auth user
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Whether the backend is disabled
    pub disabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: EngineKind::default(),
            url: None,
            index: "parts".to_string(),
            id_field: "id".to_string(),
            fields: vec![],
            unit_field: "unitNo".to_string(),
            path: None,
            timeout: None,
            username: None,
            password: None,
            disabled: false,
        }
    }
}

impl EngineConfig {
    /// Effective timeout, falling back to the outgoing default
    pub fn effective_timeout(&self, outgoing: &OutgoingSettings) -> f64 {
        self.timeout.unwrap_or(outgoing.request_timeout)
    }
}

/// Default backend configurations, pointing at local development instances
fn default_engines() -> Vec<EngineConfig> {
    vec![
        EngineConfig {
            name: "elasticsearch".to_string(),
            kind: EngineKind::Elasticsearch,
            url: Some("http://localhost:9200".to_string()),
            id_field: "_id".to_string(),
            ..Default::default()
        },
        EngineConfig {
            name: "solr".to_string(),
            kind: EngineKind::Solr,
            url: Some("http://localhost:8983/solr".to_string()),
            ..Default::default()
        },
        EngineConfig {
            name: "sqlite".to_string(),
            kind: EngineKind::Sqlite,
            path: Some(PathBuf::from("parts.db")),
            id_field: "doc_id".to_string(),
            unit_field: "unit_no".to_string(),
            ..Default::default()
        },
    ]
}
