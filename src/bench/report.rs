//! Report formatters (text and JSON).

use super::runner::{BenchmarkPlan, BenchmarkRun};
use super::stats::{summarize, BenchmarkSample, BenchmarkSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Serializable outcome of a run. The raw samples travel with the summaries
/// so the aggregation can be recomputed later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub version: String,
    pub plan: BenchmarkPlan,
    pub summaries: Vec<BenchmarkSummary>,
    pub samples: Vec<BenchmarkSample>,
}

impl BenchmarkReport {
    pub fn from_run(run: BenchmarkRun) -> Self {
        Self {
            summaries: run.summaries(),
            run_id: run.id,
            started_at: run.started_at,
            finished_at: run.finished_at,
            version: crate::VERSION.to_string(),
            plan: run.plan,
            samples: run.samples,
        }
    }

    /// Read a report written by [`BenchmarkReport::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open report {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse report {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("failed to create report {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.write_json(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Recompute the summaries from the raw samples
    pub fn resummarize(&mut self) {
        self.summaries = summarize(&self.samples);
    }

    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// Render the summaries as a text table
pub fn render_text(report: &BenchmarkReport) -> String {
    let mut out = String::new();
    let plan = &report.plan;

    let _ = writeln!(out, "=== search-bench: {} ===", report.run_id);
    let _ = writeln!(out);
    let _ = writeln!(out, "Config:");
    let _ = writeln!(out, "  Engines:          {}", plan.engines().join(", "));
    let _ = writeln!(out, "  Queries:          {}", plan.queries().len());
    let _ = writeln!(
        out,
        "  Sizes:            {}",
        plan.sizes()
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    let _ = writeln!(
        out,
        "  Iterations:       {} ({} warm-up, {} measured)",
        plan.iterations(),
        plan.warmup(),
        plan.measured()
    );
    let _ = writeln!(out, "  Elapsed:          {:.2}s", report.elapsed().as_secs_f64());
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "{:<16} {:<24} {:>5} {:>6} {:>7} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "Engine", "Query", "Size", "OK", "Errors", "Mean", "P50", "P95", "P99", "StdDev"
    );

    for summary in &report.summaries {
        let _ = write!(
            out,
            "{:<16} {:<24} {:>5} {:>6} {:>6.1}%",
            truncate(&summary.engine, 16),
            truncate(&summary.query, 24),
            summary.size,
            summary.count,
            summary.error_rate() * 100.0
        );
        match &summary.latency {
            Some(latency) => {
                let _ = writeln!(
                    out,
                    " {:>9} {:>9} {:>9} {:>9} {:>9}",
                    format_duration(latency.mean),
                    format_duration(latency.p50),
                    format_duration(latency.p95),
                    format_duration(latency.p99),
                    format_duration(latency.std_dev)
                );
            }
            None => {
                let _ = writeln!(out, " {:>9} {:>9} {:>9} {:>9} {:>9}", "-", "-", "-", "-", "-");
            }
        }
    }

    let failed: Vec<&BenchmarkSummary> = report
        .summaries
        .iter()
        .filter(|s| s.errors > 0)
        .collect();
    if !failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Errors:");
        for summary in failed {
            let kinds = summary
                .errors_by_kind
                .iter()
                .map(|(kind, n)| format!("{}={}", kind, n))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(
                out,
                "  {} / {:?} / {}: {}",
                summary.engine, summary.query, summary.size, kinds
            );
        }
    }

    out
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(width - 1).collect();
        t.push('~');
        t
    }
}

pub fn format_duration(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms < 1.0 {
        format!("{:.1}us", d.as_secs_f64() * 1_000_000.0)
    } else if ms < 1000.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}
