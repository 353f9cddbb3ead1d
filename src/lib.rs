//! search-bench: one search contract over several full-text backends
//!
//! Elasticsearch, Solr and SQLite FTS5 sit behind the same [`Engine`] trait,
//! so callers and the latency benchmark harness never branch on the backend.

pub mod bench;
pub mod config;
pub mod engines;
pub mod network;
pub mod search;
pub mod web;

pub use config::Settings;
pub use engines::Engine;
pub use search::{ErrorKind, SearchError, SearchRequest, SearchResult};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
