//! Benchmark execution
//!
//! Sweeps engines x queries x sizes. Every cell runs its warm-up calls and
//! then its measured calls back to back, one call in flight at a time, before
//! the next cell starts. Running calls concurrently would fold queueing delay
//! into the latencies this harness exists to compare.

use super::stats::{summarize, BenchmarkSample, BenchmarkSummary, CellKey};
use crate::engines::{Engine, EngineRegistry};
use crate::search::SearchRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Setup errors. These are the only failures that abort a run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BenchError {
    #[error("unknown engine: {0}")]
    UnknownEngine(String),
    #[error("at least one engine is required")]
    NoEngines,
    #[error("at least one query is required")]
    NoQueries,
    #[error("at least one result size is required")]
    NoSizes,
    #[error("engine {0} is listed twice")]
    DuplicateEngine(String),
    #[error("query {0:?} is listed twice")]
    DuplicateQuery(String),
    #[error("size {0} is listed twice")]
    DuplicateSize(u32),
    #[error("warm-up ({warmup}) must be smaller than iterations ({iterations})")]
    NoMeasuredIterations { iterations: usize, warmup: usize },
}

/// What to measure. Every parameter is explicit; nothing is defaulted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkPlan {
    engines: Vec<String>,
    queries: Vec<String>,
    sizes: Vec<u32>,
    iterations: usize,
    warmup: usize,
}

impl BenchmarkPlan {
    /// `iterations` counts every call made per cell, the first `warmup` of
    /// which are discarded
    pub fn new(
        engines: Vec<String>,
        queries: Vec<String>,
        sizes: Vec<u32>,
        iterations: usize,
        warmup: usize,
    ) -> Result<Self, BenchError> {
        if engines.is_empty() {
            return Err(BenchError::NoEngines);
        }
        if queries.is_empty() {
            return Err(BenchError::NoQueries);
        }
        if sizes.is_empty() {
            return Err(BenchError::NoSizes);
        }
        if let Some(name) = first_duplicate(engines.iter().map(String::as_str)) {
            return Err(BenchError::DuplicateEngine(name.to_string()));
        }
        // Queries are trimmed before they reach an engine
        if let Some(query) = first_duplicate(queries.iter().map(|q| q.trim())) {
            return Err(BenchError::DuplicateQuery(query.to_string()));
        }
        if let Some(size) = first_duplicate(sizes.iter().copied()) {
            return Err(BenchError::DuplicateSize(size));
        }
        if warmup >= iterations {
            return Err(BenchError::NoMeasuredIterations { iterations, warmup });
        }

        Ok(Self {
            engines,
            queries,
            sizes,
            iterations,
            warmup,
        })
    }

    pub fn engines(&self) -> &[String] {
        &self.engines
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn warmup(&self) -> usize {
        self.warmup
    }

    /// Recorded calls per cell
    pub fn measured(&self) -> usize {
        self.iterations - self.warmup
    }

    /// Number of cells in the sweep
    pub fn cells(&self) -> usize {
        self.engines.len() * self.queries.len() * self.sizes.len()
    }
}

/// Each cell must be measured exactly once
fn first_duplicate<T: Eq + Hash + Copy>(values: impl IntoIterator<Item = T>) -> Option<T> {
    let mut seen = HashSet::new();
    values.into_iter().find(|value| !seen.insert(*value))
}

/// Raw outcome of a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub plan: BenchmarkPlan,
    /// Samples in call order
    pub samples: Vec<BenchmarkSample>,
}

impl BenchmarkRun {
    /// Aggregate the samples, one summary per cell in sweep order
    pub fn summaries(&self) -> Vec<BenchmarkSummary> {
        summarize(&self.samples)
    }
}

/// Drives a [`BenchmarkPlan`] through the search contract
pub struct BenchmarkRunner {
    registry: Arc<EngineRegistry>,
}

impl BenchmarkRunner {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self { registry }
    }

    /// Run the sweep. Engine ids are resolved before the first call, so an
    /// unknown id fails the run without touching any engine.
    pub async fn run(&self, plan: &BenchmarkPlan) -> Result<BenchmarkRun, BenchError> {
        let engines = plan
            .engines()
            .iter()
            .map(|name| {
                self.registry
                    .get(name)
                    .cloned()
                    .ok_or_else(|| BenchError::UnknownEngine(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Benchmarking {} cells ({} engines x {} queries x {} sizes), {} warm-up + {} measured calls each",
            plan.cells(),
            engines.len(),
            plan.queries().len(),
            plan.sizes().len(),
            plan.warmup(),
            plan.measured()
        );

        let started_at = Utc::now();
        let mut samples = Vec::with_capacity(plan.cells() * plan.measured());

        for engine in &engines {
            for query in plan.queries() {
                for &size in plan.sizes() {
                    let cell = CellKey::new(engine.name(), query.as_str(), size);
                    run_cell(engine.as_ref(), &cell, plan, &mut samples).await;
                }
            }
        }

        Ok(BenchmarkRun {
            id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            plan: plan.clone(),
            samples,
        })
    }
}

/// Warm up, then measure one cell
async fn run_cell(
    engine: &dyn Engine,
    cell: &CellKey,
    plan: &BenchmarkPlan,
    samples: &mut Vec<BenchmarkSample>,
) {
    let request = SearchRequest::new(cell.query.as_str(), cell.size);

    for round in 0..plan.warmup() {
        if let Err(e) = engine.search(&request).await {
            debug!("Warm-up {} of {:?} failed: {}", round, cell, e);
        }
    }

    let mut failures = 0;
    for sequence in 0..plan.measured() {
        let start = Instant::now();
        let outcome = engine.search(&request).await;
        let latency = start.elapsed();

        let sample = match outcome {
            Ok(_) => BenchmarkSample::success(cell, sequence, latency),
            Err(e) => {
                debug!("Trial {} of {:?} failed: {}", sequence, cell, e);
                failures += 1;
                BenchmarkSample::failure(cell, sequence, latency, e.kind())
            }
        };
        samples.push(sample);
    }

    info!(
        "Cell {} / {:?} / size {}: {} trials, {} failed",
        cell.engine,
        cell.query,
        cell.size,
        plan.measured(),
        failures
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, EngineKind};
    use crate::engines::sqlite::SqliteFts;
    use crate::search::{SearchError, SearchResult};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Engine that logs every call and fails on chosen call numbers
    struct ScriptedEngine {
        name: String,
        fail_on: HashSet<usize>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        log: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl ScriptedEngine {
        fn new(name: &str, fail_on: &[usize], log: Arc<Mutex<Vec<(String, String)>>>) -> Self {
            Self {
                name: name.to_string(),
                fail_on: fail_on.iter().copied().collect(),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                log,
            }
        }
    }

    #[async_trait]
    impl Engine for ScriptedEngine {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> EngineKind {
            EngineKind::Elasticsearch
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn execute(&self, request: &SearchRequest) -> Result<SearchResult, SearchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .push((self.name.clone(), request.query().to_string()));

            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.contains(&call) {
                Err(SearchError::BackendTimeout(self.timeout()))
            } else {
                Ok(SearchResult::new(1, 0, vec!["doc".to_string()], request))
            }
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plan_validation() {
        assert_eq!(
            BenchmarkPlan::new(vec![], strings(&["q"]), vec![10], 5, 1),
            Err(BenchError::NoEngines)
        );
        assert_eq!(
            BenchmarkPlan::new(strings(&["a"]), vec![], vec![10], 5, 1),
            Err(BenchError::NoQueries)
        );
        assert_eq!(
            BenchmarkPlan::new(strings(&["a"]), strings(&["q"]), vec![], 5, 1),
            Err(BenchError::NoSizes)
        );
        assert_eq!(
            BenchmarkPlan::new(strings(&["a"]), strings(&["q"]), vec![10], 2, 2),
            Err(BenchError::NoMeasuredIterations {
                iterations: 2,
                warmup: 2
            })
        );

        let plan = BenchmarkPlan::new(strings(&["a", "b"]), strings(&["q"]), vec![10, 50], 10, 2).unwrap();
        assert_eq!(plan.measured(), 8);
        assert_eq!(plan.cells(), 4);
    }

    #[test]
    fn test_plan_rejects_repeated_cells() {
        assert_eq!(
            BenchmarkPlan::new(strings(&["fts", "fts"]), strings(&["bearing"]), vec![10], 10, 2),
            Err(BenchError::DuplicateEngine("fts".to_string()))
        );
        assert_eq!(
            BenchmarkPlan::new(strings(&["fts"]), strings(&["bearing", " bearing "]), vec![10], 10, 2),
            Err(BenchError::DuplicateQuery("bearing".to_string()))
        );
        assert_eq!(
            BenchmarkPlan::new(strings(&["fts"]), strings(&["bearing"]), vec![10, 50, 10], 10, 2),
            Err(BenchError::DuplicateSize(10))
        );
    }

    #[tokio::test]
    async fn test_every_cell_gets_its_own_summary() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = EngineRegistry::new();
        registry.register(Arc::new(ScriptedEngine::new("a", &[], log.clone())));
        registry.register(Arc::new(ScriptedEngine::new("b", &[], log)));
        let runner = BenchmarkRunner::new(Arc::new(registry));

        let plan = BenchmarkPlan::new(strings(&["a", "b"]), strings(&["bearing", "seal"]), vec![10], 10, 2).unwrap();
        let run = runner.run(&plan).await.unwrap();

        let summaries = run.summaries();
        assert_eq!(summaries.len(), plan.cells());
        for summary in &summaries {
            assert_eq!(summary.trials, 8);
        }
        for chunk in run.samples.chunks(8) {
            let sequences: Vec<usize> = chunk.iter().map(|s| s.sequence()).collect();
            assert_eq!(sequences, (0..8).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_sweep_two_engines_two_queries() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::new(ScriptedEngine::new("a", &[3], log.clone()));
        let b = Arc::new(ScriptedEngine::new("b", &[], log.clone()));

        let mut registry = EngineRegistry::new();
        registry.register(a.clone());
        registry.register(b.clone());
        let runner = BenchmarkRunner::new(Arc::new(registry));

        let plan = BenchmarkPlan::new(strings(&["a", "b"]), strings(&["bearing", "seal"]), vec![10], 10, 2).unwrap();
        let run = runner.run(&plan).await.unwrap();

        let summaries = run.summaries();
        assert_eq!(summaries.len(), 4);
        for summary in &summaries {
            assert_eq!(summary.trials, 8);
            assert!(summary.count <= 8);
        }
        // call 3 of engine "a" is the second measured call of its first cell
        assert_eq!(summaries[0].errors, 1);
        assert_eq!(summaries[0].count, 7);

        assert_eq!(a.calls.load(Ordering::SeqCst), 20);
        assert_eq!(b.calls.load(Ordering::SeqCst), 20);
        assert_eq!(a.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(b.max_in_flight.load(Ordering::SeqCst), 1);

        // each cell's calls are contiguous: the call log changes cell exactly 3 times
        let log = log.lock().unwrap();
        let switches = log.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(log.len(), 40);
        assert_eq!(switches, 3);
    }

    #[tokio::test]
    async fn test_samples_in_call_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = EngineRegistry::new();
        registry.register(Arc::new(ScriptedEngine::new("a", &[], log)));
        let runner = BenchmarkRunner::new(Arc::new(registry));

        let plan = BenchmarkPlan::new(strings(&["a"]), strings(&["bearing"]), vec![5, 20], 4, 1).unwrap();
        let run = runner.run(&plan).await.unwrap();

        let sequences: Vec<usize> = run.samples.iter().map(|s| s.sequence()).collect();
        assert_eq!(sequences, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(run.summaries().len(), 2);
        assert!(run.finished_at >= run.started_at);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_the_sweep() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let flaky = Arc::new(ScriptedEngine::new("flaky", &[5, 12], log));
        let mut registry = EngineRegistry::new();
        registry.register(flaky.clone());
        let runner = BenchmarkRunner::new(Arc::new(registry));

        let plan = BenchmarkPlan::new(strings(&["flaky"]), strings(&["bearing"]), vec![10], 20, 0).unwrap();
        let run = runner.run(&plan).await.unwrap();

        let summary = &run.summaries()[0];
        assert_eq!(summary.trials, 20);
        assert_eq!(summary.count, 18);
        assert_eq!(summary.errors, 2);
        assert!((summary.error_rate() - 0.1).abs() < f64::EPSILON);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_failed_warm_up_is_not_measured() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cold = Arc::new(ScriptedEngine::new("cold", &[0, 1], log));
        let mut registry = EngineRegistry::new();
        registry.register(cold.clone());
        let runner = BenchmarkRunner::new(Arc::new(registry));

        let plan = BenchmarkPlan::new(strings(&["cold"]), strings(&["bearing"]), vec![10], 6, 2).unwrap();
        let run = runner.run(&plan).await.unwrap();

        let summary = &run.summaries()[0];
        assert_eq!(summary.trials, 4);
        assert_eq!(summary.errors, 0);
        assert_eq!(cold.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_unknown_engine_fails_before_any_call() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::new(ScriptedEngine::new("a", &[], log));
        let mut registry = EngineRegistry::new();
        registry.register(a.clone());
        let runner = BenchmarkRunner::new(Arc::new(registry));

        let plan = BenchmarkPlan::new(strings(&["a", "nope"]), strings(&["bearing"]), vec![10], 3, 1).unwrap();
        let err = runner.run(&plan).await.unwrap_err();

        assert_eq!(err, BenchError::UnknownEngine("nope".to_string()));
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_queries_are_recorded_as_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::new(ScriptedEngine::new("a", &[], log));
        let mut registry = EngineRegistry::new();
        registry.register(a.clone());
        let runner = BenchmarkRunner::new(Arc::new(registry));

        let plan = BenchmarkPlan::new(strings(&["a"]), strings(&["  "]), vec![10], 3, 1).unwrap();
        let run = runner.run(&plan).await.unwrap();

        let summary = &run.summaries()[0];
        assert_eq!(summary.count, 0);
        assert_eq!(summary.errors, 2);
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sweep_over_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE VIRTUAL TABLE parts USING fts5(doc_id UNINDEXED, unit_no UNINDEXED, title);
             INSERT INTO parts VALUES ('P-1', 'U1', 'ball bearing');
             INSERT INTO parts VALUES ('P-2', 'U1', 'roller bearing');
             INSERT INTO parts VALUES ('P-3', 'U2', 'needle bearing');
             INSERT INTO parts VALUES ('P-4', 'U2', 'shaft seal');",
        )
        .unwrap();
        let config = EngineConfig {
            name: "fts".to_string(),
            kind: EngineKind::Sqlite,
            id_field: "doc_id".to_string(),
            unit_field: "unit_no".to_string(),
            ..Default::default()
        };
        let fts = SqliteFts::from_connection(&config, conn, Duration::from_secs(2)).unwrap();

        let mut registry = EngineRegistry::new();
        registry.register(Arc::new(fts));
        let runner = BenchmarkRunner::new(Arc::new(registry));

        let plan = BenchmarkPlan::new(strings(&["fts"]), strings(&["bearing", "seal"]), vec![10], 6, 1).unwrap();
        let run = runner.run(&plan).await.unwrap();

        for summary in run.summaries() {
            assert_eq!(summary.count, 5);
            assert_eq!(summary.errors, 0);
            let latency = summary.latency.unwrap();
            assert!(latency.p50 <= latency.p95 && latency.p95 <= latency.p99);
        }
    }
}
