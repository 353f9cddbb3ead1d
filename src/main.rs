//! search-bench
//!
//! Serves the search contract over HTTP and benchmarks it.
//!
//! # Usage
//!
//! ```bash
//! # HTTP API on the configured port:
//! search-bench serve
//!
//! # Latency sweep, 2 engines x 2 queries, 50 calls per cell of which 5 warm-up:
//! search-bench bench --engine elasticsearch --engine solr \
//!     --query bearing --query "shaft seal" --iterations 50 --warmup 5 \
//!     --size 10 --size 100 --report run.json
//!
//! # Re-aggregate a saved report:
//! search-bench summarize run.json
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use search_bench::{
    bench::{render_text, BenchmarkPlan, BenchmarkReport, BenchmarkRunner},
    config::{self, Settings},
    engines::{EngineLoader, EngineRegistry},
    network::HttpClient,
    web::{create_router, AppState},
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "search-bench", version)]
struct Cli {
    /// Settings file (otherwise the default locations are searched)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API.
    Serve,

    /// Run a latency benchmark sweep.
    Bench(BenchArgs),

    /// List the configured backends.
    Backends,

    /// Recompute the summaries of a saved JSON report.
    Summarize {
        report: PathBuf,

        /// Report format.
        #[arg(long, default_value = "text")]
        output: OutputFormat,
    },
}

#[derive(Args, Clone)]
struct BenchArgs {
    /// Engine id to benchmark (repeatable).
    #[arg(long = "engine", required = true)]
    engines: Vec<String>,

    /// Query text (repeatable).
    #[arg(long = "query")]
    queries: Vec<String>,

    /// File with one query per line; blank lines are skipped.
    #[arg(long)]
    queries_file: Option<PathBuf>,

    /// Calls per cell, warm-up included.
    #[arg(long)]
    iterations: usize,

    /// Leading calls per cell that are discarded.
    #[arg(long)]
    warmup: usize,

    /// Result size (repeatable).
    #[arg(long = "size", default_value = "10")]
    sizes: Vec<u32>,

    /// Report format.
    #[arg(long, default_value = "text")]
    output: OutputFormat,

    /// Write the JSON report, raw samples included, to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::load(cli.config.as_deref())?;

    // Initialize logging; RUST_LOG wins over the debug setting
    let default_level = if settings.general.debug { "debug" } else { "info" };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    info!("Loaded settings with {} engines", settings.engines.len());

    match cli.command {
        Command::Serve => serve(settings).await,
        Command::Bench(args) => bench(settings, args).await,
        Command::Backends => {
            let registry = load_registry(&settings)?;
            for info in registry.infos() {
                println!("{:<20} {:<14} {}ms", info.name, info.kind.to_string(), info.timeout_ms);
            }
            Ok(())
        }
        Command::Summarize { report, output } => {
            let mut report = BenchmarkReport::load(&report)?;
            report.resummarize();
            print_report(&report, &output)
        }
    }
}

/// Build the shared HTTP client and every enabled engine
fn load_registry(settings: &Settings) -> Result<EngineRegistry> {
    let client = HttpClient::with_settings(&settings.outgoing)?;
    EngineLoader::load(settings, &client)
}

async fn serve(settings: Settings) -> Result<()> {
    info!("Starting search-bench v{}", search_bench::VERSION);

    let registry = Arc::new(load_registry(&settings)?);
    if registry.is_empty() {
        bail!("no engines enabled");
    }

    let addr = SocketAddr::new(
        settings
            .server
            .bind_address
            .parse()
            .with_context(|| format!("invalid bind address {}", settings.server.bind_address))?,
        settings.server.port,
    );

    info!("Serving engines: {}", registry.names().join(", "));
    let app = create_router(AppState::new(registry));

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn bench(settings: Settings, args: BenchArgs) -> Result<()> {
    let mut queries = args.queries.clone();
    if let Some(path) = &args.queries_file {
        queries.extend(read_queries(path)?);
    }

    let plan = BenchmarkPlan::new(
        args.engines.clone(),
        queries,
        args.sizes.clone(),
        args.iterations,
        args.warmup,
    )?;

    // Only the engines under test are opened
    let client = HttpClient::with_settings(&settings.outgoing)?;
    let registry = Arc::new(EngineLoader::load_named(&settings, plan.engines(), &client)?);
    let run = BenchmarkRunner::new(registry).run(&plan).await?;
    let report = BenchmarkReport::from_run(run);

    if let Some(path) = &args.report {
        report.save(path)?;
        info!("Wrote report to {}", path.display());
    }

    print_report(&report, &args.output)
}

fn print_report(report: &BenchmarkReport, output: &OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Text => print!("{}", render_text(report)),
        OutputFormat::Json => {
            report.write_json(std::io::stdout().lock())?;
            println!();
        }
    }
    Ok(())
}

fn read_queries(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read queries from {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
