//! rpc-measure: fan out concurrent RPC attempts against one target and
//! report per-stage timings, connectivity transitions and errors.

use anyhow::{Context, Result};
use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// Concurrent RPC measurement tool
#[derive(Parser)]
#[command(name = "rpc-measure")]
#[command(about = "Measure connection and call latency of an RPC endpoint", long_about = None)]
#[command(version)]
struct Cli {
    /// Target address as host:port
    #[arg(env = "RPC_MEASURE_TARGET")]
    target: Option<String>,

    /// Path to a TOML config file (flags override its values)
    #[arg(long, env = "RPC_MEASURE_CONFIG")]
    config: Option<PathBuf>,

    /// Number of concurrent attempts
    #[arg(short = 'n', long = "requests", env = "RPC_MEASURE_REQUESTS")]
    requests: Option<u32>,

    /// Per-attempt timeout in milliseconds
    #[arg(short = 't', long, env = "RPC_MEASURE_TIMEOUT")]
    timeout: Option<u64>,

    /// Dial with TLS
    #[arg(long, env = "RPC_MEASURE_TLS")]
    tls: bool,

    /// Remote method to invoke
    #[arg(long, env = "RPC_MEASURE_CALL")]
    call: Option<String>,

    /// Call parameters as a JSON value
    #[arg(long, env = "RPC_MEASURE_PARAMS", value_parser = parse_json)]
    params: Option<serde_json::Value>,

    /// HTTP path of the JSON-RPC endpoint
    #[arg(long, env = "RPC_MEASURE_PATH")]
    path: Option<String>,

    /// Write a JSON report into this directory
    #[arg(long, env = "RPC_MEASURE_REPORT")]
    report: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let workers = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    tracing::info!(workers, "starting runtime");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let overrides = commands::run::RunOverrides {
        target: cli.target,
        requests: cli.requests,
        timeout_ms: cli.timeout,
        tls: cli.tls,
        call: cli.call,
        params: cli.params,
        path: cli.path,
    };

    runtime.block_on(commands::run::execute_run(
        cli.config,
        overrides,
        cli.report,
        cli.no_color,
    ))
}

/// Structured logs go to stderr so the summary on stdout stays clean.
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
