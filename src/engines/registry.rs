//! Engine registry for managing configured search engines

use super::traits::Engine;
use crate::config::EngineKind;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of all configured search engines, keyed by engine id
pub struct EngineRegistry {
    /// Engines by name
    engines: HashMap<String, Arc<dyn Engine>>,
    /// Registration order, for stable listings
    order: Vec<String>,
}

/// Public description of a registered engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineInfo {
    pub name: String,
    pub kind: EngineKind,
    pub timeout_ms: u64,
}

impl EngineRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register an engine, replacing any engine with the same name
    pub fn register(&mut self, engine: Arc<dyn Engine>) {
        let name = engine.name().to_string();
        if self.engines.insert(name.clone(), engine).is_none() {
            self.order.push(name);
        }
    }

    /// Get an engine by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Engine>> {
        self.engines.get(name)
    }

    /// Get all engine names, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Describe all engines, in registration order
    pub fn infos(&self) -> Vec<EngineInfo> {
        self.order
            .iter()
            .filter_map(|name| self.engines.get(name))
            .map(|engine| EngineInfo {
                name: engine.name().to_string(),
                kind: engine.kind(),
                timeout_ms: engine.timeout().as_millis() as u64,
            })
            .collect()
    }


    /// Get number of registered engines
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{SearchError, SearchRequest, SearchResult};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixed(&'static str);

    #[async_trait]
    impl Engine for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn kind(&self) -> EngineKind {
            EngineKind::Solr
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(1500)
        }

        async fn execute(&self, request: &SearchRequest) -> Result<SearchResult, SearchError> {
            Ok(SearchResult::new(0, 0, vec![], request))
        }
    }

    #[test]
    fn test_registry() {
        let mut registry = EngineRegistry::new();
        registry.register(Arc::new(Fixed("solr-a")));
        registry.register(Arc::new(Fixed("solr-b")));
        registry.register(Arc::new(Fixed("solr-a")));

        assert!(registry.get("solr-a").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["solr-a", "solr-b"]);

        let infos = registry.infos();
        assert_eq!(infos[1].kind, EngineKind::Solr);
        assert_eq!(infos[1].timeout_ms, 1500);
    }
}
