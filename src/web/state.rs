//! Application state shared across handlers

use crate::engines::{Engine, EngineRegistry};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Engine registry
    pub registry: Arc<EngineRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self { registry }
    }

    /// Look up an engine by id
    pub fn engine(&self, name: &str) -> Option<Arc<dyn Engine>> {
        self.registry.get(name).cloned()
    }
}
