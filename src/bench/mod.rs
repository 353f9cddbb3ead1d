//! Latency benchmark harness
//!
//! Runs a cartesian sweep of engines, queries and result sizes through the
//! search contract and aggregates the wall-clock latency of every cell.

mod report;
mod runner;
mod stats;

pub use report::{format_duration, render_text, BenchmarkReport};
pub use runner::{BenchError, BenchmarkPlan, BenchmarkRun, BenchmarkRunner};
pub use stats::{
    percentile, summarize, BenchmarkSample, BenchmarkSummary, CellKey, LatencyStats,
};
