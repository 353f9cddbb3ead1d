//! Engine loader for initializing engines from configuration

use super::elasticsearch::Elasticsearch;
use super::registry::EngineRegistry;
use super::solr::Solr;
use super::sqlite::SqliteFts;
use super::traits::Engine;
use crate::config::{EngineConfig, EngineKind, Settings};
use crate::network::HttpClient;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Loader for initializing engines from configuration
pub struct EngineLoader;

impl EngineLoader {
    /// Load all enabled engines from settings.
    ///
    /// The HTTP engines share `client`. A misconfigured engine fails the whole
    /// load, since a half-populated registry would silently skew comparisons.
    pub fn load(settings: &Settings, client: &HttpClient) -> Result<EngineRegistry> {
        for config in settings.engines.iter().filter(|c| c.disabled) {
            info!("Skipping disabled engine: {}", config.name);
        }
        Self::build(settings, settings.enabled_engines(), client)
    }

    /// Load only the named engines, in the given order.
    ///
    /// Names that are not configured, or disabled, are left out of the
    /// registry so the caller can report them; other engines are never
    /// opened.
    pub fn load_named(
        settings: &Settings,
        names: &[String],
        client: &HttpClient,
    ) -> Result<EngineRegistry> {
        let configs = names
            .iter()
            .filter_map(|name| match settings.get_engine(name) {
                Some(config) if config.disabled => {
                    info!("Skipping disabled engine: {}", name);
                    None
                }
                other => other,
            })
            .collect();
        Self::build(settings, configs, client)
    }

    fn build(
        settings: &Settings,
        configs: Vec<&EngineConfig>,
        client: &HttpClient,
    ) -> Result<EngineRegistry> {
        let mut registry = EngineRegistry::new();

        for config in configs {
            let timeout = Duration::from_secs_f64(config.effective_timeout(&settings.outgoing));
            let engine = Self::create_engine(config, client, timeout)
                .with_context(|| format!("failed to load engine {}", config.name))?;

            info!("Loaded engine: {} ({})", config.name, config.kind);
            registry.register(engine);
        }

        info!("Loaded {} engines", registry.len());
        Ok(registry)
    }

    /// Create an engine instance for its configured kind
    fn create_engine(
        config: &EngineConfig,
        client: &HttpClient,
        timeout: Duration,
    ) -> Result<Arc<dyn Engine>> {
        let engine: Arc<dyn Engine> = match config.kind {
            EngineKind::Elasticsearch => {
                Arc::new(Elasticsearch::new(config, client.clone(), timeout)?)
            }
            EngineKind::Solr => Arc::new(Solr::new(config, client.clone(), timeout)?),
            EngineKind::Sqlite => Arc::new(SqliteFts::open(config, timeout)?),
        };
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loads_http_engines_without_contacting_them() {
        let yaml = r#"
engines:
  - name: es
    kind: elasticsearch
    url: http://127.0.0.1:1
  - name: solr
    kind: solr
    url: http://127.0.0.1:1/solr
    timeout: 0.5
  - name: off
    kind: sqlite
    path: /nonexistent.db
    disabled: true
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        let registry = EngineLoader::load(&settings, &HttpClient::new().unwrap()).unwrap();

        assert_eq!(registry.names(), vec!["es", "solr"]);
        assert_eq!(
            registry.get("solr").unwrap().timeout(),
            Duration::from_millis(500)
        );
        assert!(registry.get("off").is_none());
    }

    #[test]
    fn test_missing_database_fails_load() {
        let yaml = r#"
engines:
  - name: fts
    kind: sqlite
    path: /nonexistent/parts.db
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert!(EngineLoader::load(&settings, &HttpClient::new().unwrap()).is_err());
    }

    #[test]
    fn test_load_named_leaves_other_engines_closed() {
        let yaml = r#"
engines:
  - name: es
    kind: elasticsearch
    url: http://127.0.0.1:1
  - name: solr
    kind: solr
    url: http://127.0.0.1:1/solr
  - name: off
    kind: solr
    url: http://127.0.0.1:1/solr
    disabled: true
  - name: fts
    kind: sqlite
    path: /nonexistent/parts.db
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        let client = HttpClient::new().unwrap();

        // the sqlite database is missing, but it is not asked for
        let names = vec!["solr".to_string(), "es".to_string(), "off".to_string(), "nope".to_string()];
        let registry = EngineLoader::load_named(&settings, &names, &client).unwrap();
        assert_eq!(registry.names(), vec!["solr", "es"]);

        let names = vec!["fts".to_string()];
        assert!(EngineLoader::load_named(&settings, &names, &client).is_err());
    }
}
