//! Benchmark samples and their aggregation
//!
//! Aggregation is a pure function of the raw samples: nothing is streamed or
//! approximated, so a saved sample set always re-aggregates to the same table.

use crate::search::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// One measured trial of one cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkSample {
    engine: String,
    query: String,
    size: u32,
    sequence: usize,
    #[serde(with = "millis")]
    latency: Duration,
    succeeded: bool,
    error_kind: Option<ErrorKind>,
}

impl BenchmarkSample {
    pub fn success(cell: &CellKey, sequence: usize, latency: Duration) -> Self {
        Self {
            engine: cell.engine.clone(),
            query: cell.query.clone(),
            size: cell.size,
            sequence,
            latency,
            succeeded: true,
            error_kind: None,
        }
    }

    pub fn failure(cell: &CellKey, sequence: usize, latency: Duration, kind: ErrorKind) -> Self {
        Self {
            engine: cell.engine.clone(),
            query: cell.query.clone(),
            size: cell.size,
            sequence,
            latency,
            succeeded: false,
            error_kind: Some(kind),
        }
    }

    pub fn cell(&self) -> CellKey {
        CellKey {
            engine: self.engine.clone(),
            query: self.query.clone(),
            size: self.size,
        }
    }

    /// Position of the trial within its cell, in call order
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    /// Wall-clock duration of the call, measured by the harness
    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded && self.error_kind.is_none()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }
}

/// Identifies one measurement cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub engine: String,
    pub query: String,
    pub size: u32,
}

impl CellKey {
    pub fn new(engine: impl Into<String>, query: impl Into<String>, size: u32) -> Self {
        Self {
            engine: engine.into(),
            query: query.into(),
            size,
        }
    }
}

/// Latency statistics over the successful samples of a cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    #[serde(with = "millis")]
    pub min: Duration,
    #[serde(with = "millis")]
    pub max: Duration,
    #[serde(with = "millis")]
    pub mean: Duration,
    #[serde(with = "millis")]
    pub p50: Duration,
    #[serde(with = "millis")]
    pub p95: Duration,
    #[serde(with = "millis")]
    pub p99: Duration,
    #[serde(with = "millis")]
    pub std_dev: Duration,
}

impl LatencyStats {
    /// Compute statistics, or `None` for an empty set
    pub fn from_latencies(latencies: &[Duration]) -> Option<Self> {
        if latencies.is_empty() {
            return None;
        }

        let mut sorted = latencies.to_vec();
        sorted.sort();

        let n = sorted.len() as f64;
        let mean_nanos = sorted.iter().map(|d| d.as_nanos() as f64).sum::<f64>() / n;
        // Population standard deviation: the samples are the whole measured set
        let variance = sorted
            .iter()
            .map(|d| {
                let diff = d.as_nanos() as f64 - mean_nanos;
                diff * diff
            })
            .sum::<f64>()
            / n;

        Some(Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: nanos(mean_nanos),
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            std_dev: nanos(variance.sqrt()),
        })
    }
}

fn nanos(value: f64) -> Duration {
    Duration::from_nanos(value.max(0.0).round() as u64)
}

/// Nearest-rank percentile of a sorted slice
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Aggregate of one cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub engine: String,
    pub query: String,
    pub size: u32,
    /// Measured trials, successful or not
    pub trials: usize,
    /// Successful trials, the ones latency statistics are computed from
    pub count: usize,
    /// Failed trials
    pub errors: usize,
    pub errors_by_kind: BTreeMap<ErrorKind, usize>,
    /// Absent when no trial succeeded
    pub latency: Option<LatencyStats>,
}

impl BenchmarkSummary {
    /// Summarize the samples of one cell
    pub fn from_samples(cell: &CellKey, samples: &[&BenchmarkSample]) -> Self {
        let latencies: Vec<Duration> = samples
            .iter()
            .filter(|s| s.succeeded())
            .map(|s| s.latency())
            .collect();

        let mut errors_by_kind = BTreeMap::new();
        for kind in samples.iter().filter_map(|s| s.error_kind()) {
            *errors_by_kind.entry(kind).or_insert(0) += 1;
        }

        Self {
            engine: cell.engine.clone(),
            query: cell.query.clone(),
            size: cell.size,
            trials: samples.len(),
            count: latencies.len(),
            errors: samples.len() - latencies.len(),
            errors_by_kind,
            latency: LatencyStats::from_latencies(&latencies),
        }
    }

    pub fn cell(&self) -> CellKey {
        CellKey::new(self.engine.clone(), self.query.clone(), self.size)
    }

    /// Failed trials over all trials of the cell
    pub fn error_rate(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.errors as f64 / self.trials as f64
        }
    }
}

/// Group samples by cell and summarize each, keeping first-seen cell order
pub fn summarize(samples: &[BenchmarkSample]) -> Vec<BenchmarkSummary> {
    let mut order: Vec<CellKey> = Vec::new();
    let mut groups: HashMap<CellKey, Vec<&BenchmarkSample>> = HashMap::new();

    for sample in samples {
        let cell = sample.cell();
        if !groups.contains_key(&cell) {
            order.push(cell.clone());
        }
        groups.entry(cell).or_default().push(sample);
    }

    order
        .iter()
        .map(|cell| BenchmarkSummary::from_samples(cell, &groups[cell]))
        .collect()
}

/// Serialize durations as fractional milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_nanos() as f64 / 1e6)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        if !ms.is_finite() || ms < 0.0 {
            return Err(serde::de::Error::custom("latency must be a non-negative number"));
        }
        Ok(Duration::from_nanos((ms * 1e6).round() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    fn cell() -> CellKey {
        CellKey::new("sqlite", "bearing", 10)
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let data: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        assert_eq!(percentile(&data, 50.0), Duration::from_millis(50));
        assert_eq!(percentile(&data, 95.0), Duration::from_millis(95));
        assert_eq!(percentile(&data, 99.0), Duration::from_millis(99));
        assert_eq!(percentile(&data, 100.0), Duration::from_millis(100));
        assert_eq!(percentile(&data, 0.0), Duration::from_millis(1));
    }

    #[test]
    fn test_percentile_small_sets() {
        assert_eq!(percentile(&[], 50.0), Duration::ZERO);

        let one = ms(&[7]);
        assert_eq!(percentile(&one, 50.0), Duration::from_millis(7));
        assert_eq!(percentile(&one, 99.0), Duration::from_millis(7));

        let four = ms(&[1, 2, 3, 4]);
        assert_eq!(percentile(&four, 50.0), Duration::from_millis(2));
        assert_eq!(percentile(&four, 95.0), Duration::from_millis(4));
    }

    #[test]
    fn test_latency_stats() {
        let stats = LatencyStats::from_latencies(&ms(&[4, 2, 8, 6])).unwrap();
        assert_eq!(stats.min, Duration::from_millis(2));
        assert_eq!(stats.max, Duration::from_millis(8));
        assert_eq!(stats.mean, Duration::from_millis(5));
        // population variance of 2,4,6,8 is 5 ms^2
        let expected = Duration::from_secs_f64(5f64.sqrt() / 1000.0);
        let diff = stats.std_dev.as_nanos() as i128 - expected.as_nanos() as i128;
        assert!(diff.abs() <= 1, "std_dev {:?} vs {:?}", stats.std_dev, expected);

        assert!(LatencyStats::from_latencies(&[]).is_none());
    }

    #[test]
    fn test_percentiles_are_ordered() {
        let sets = [
            ms(&[1]),
            ms(&[9, 1]),
            ms(&[5, 5, 5, 5]),
            ms(&[100, 1, 50, 3, 77, 12, 12, 400, 2, 8, 31]),
            (0..1000).map(|i| Duration::from_micros((i * 7919) % 1013)).collect(),
        ];
        for set in sets {
            let stats = LatencyStats::from_latencies(&set).unwrap();
            assert!(stats.p50 <= stats.p95);
            assert!(stats.p95 <= stats.p99);
            assert!(stats.min <= stats.p50 && stats.p99 <= stats.max);
            assert!(stats.mean >= stats.min && stats.mean <= stats.max);
        }
    }

    #[test]
    fn test_failures_excluded_from_latency_but_counted() {
        let cell = cell();
        let samples: Vec<BenchmarkSample> = (0..20)
            .map(|i| {
                if i == 4 || i == 11 {
                    BenchmarkSample::failure(&cell, i, Duration::from_secs(5), ErrorKind::BackendTimeout)
                } else {
                    BenchmarkSample::success(&cell, i, Duration::from_millis(10))
                }
            })
            .collect();

        let summaries = summarize(&samples);
        assert_eq!(summaries.len(), 1);

        let summary = &summaries[0];
        assert_eq!(summary.trials, 20);
        assert_eq!(summary.count, 18);
        assert_eq!(summary.errors, 2);
        assert!((summary.error_rate() - 0.1).abs() < f64::EPSILON);
        assert_eq!(summary.errors_by_kind[&ErrorKind::BackendTimeout], 2);
        // the 5s timeouts must not leak into the latency figures
        assert_eq!(summary.latency.unwrap().max, Duration::from_millis(10));
    }

    #[test]
    fn test_all_failed_cell_has_no_latency() {
        let cell = cell();
        let samples = vec![
            BenchmarkSample::failure(&cell, 0, Duration::from_millis(1), ErrorKind::BackendUnavailable),
            BenchmarkSample::failure(&cell, 1, Duration::from_millis(1), ErrorKind::BackendUnavailable),
        ];
        let summary = &summarize(&samples)[0];
        assert_eq!(summary.count, 0);
        assert_eq!(summary.error_rate(), 1.0);
        assert!(summary.latency.is_none());
    }

    #[test]
    fn test_summaries_keep_cell_order() {
        let a = CellKey::new("solr", "seal", 10);
        let b = CellKey::new("elasticsearch", "bearing", 10);
        let samples = vec![
            BenchmarkSample::success(&a, 0, Duration::from_millis(3)),
            BenchmarkSample::success(&b, 0, Duration::from_millis(4)),
            BenchmarkSample::success(&a, 1, Duration::from_millis(5)),
        ];
        let cells: Vec<CellKey> = summarize(&samples).iter().map(|s| s.cell()).collect();
        assert_eq!(cells, vec![a, b]);
    }

    #[test]
    fn test_aggregation_survives_json() {
        let cell = cell();
        let samples = vec![
            BenchmarkSample::success(&cell, 0, Duration::from_micros(1500)),
            BenchmarkSample::success(&cell, 1, Duration::from_micros(2500)),
            BenchmarkSample::failure(&cell, 2, Duration::from_micros(900), ErrorKind::MappingError),
        ];
        let json = serde_json::to_string(&samples).unwrap();
        let restored: Vec<BenchmarkSample> = serde_json::from_str(&json).unwrap();

        assert_eq!(summarize(&restored), summarize(&samples));
    }
}
