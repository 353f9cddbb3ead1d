//! Canonical search model
//!
//! The request/result vocabulary and the error taxonomy every backend speaks.

mod error;
mod models;

pub use error::{ErrorKind, SearchError};
pub use models::{SearchRequest, SearchResult};
