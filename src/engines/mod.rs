//! Search engine module
//!
//! Defines the Engine trait (the search contract), its three adapters and a
//! registry for the engines configured at startup.

mod loader;
mod registry;
mod traits;

// Engine implementations
pub mod elasticsearch;
pub mod solr;
pub mod sqlite;

pub use loader::EngineLoader;
pub use registry::{EngineInfo, EngineRegistry};
pub use traits::*;
