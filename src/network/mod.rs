//! HTTP networking module
//!
//! Provides the pooled HTTP client used by the HTTP search engines.

mod client;

pub use client::HttpClient;
