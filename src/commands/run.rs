//! `rpc-measure` run command implementation.

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use rpc_measure::measure::client::HttpConnector;
use rpc_measure::measure::config::{CallSelector, RunOptions};
use rpc_measure::measure::dispatcher::Dispatcher;
use rpc_measure::measure::report::{write_report, RunReport};
use rpc_measure::measure::summary::render_summary;
use tokio_util::sync::CancellationToken;

/// Command-line values layered on top of the loaded config.
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub target: Option<String>,
    pub requests: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub tls: bool,
    pub call: Option<String>,
    pub params: Option<serde_json::Value>,
    pub path: Option<String>,
}

/// Execute a measurement run.
///
/// Loads config (explicit path or defaults), applies CLI overrides, runs the
/// dispatcher, prints the summary, and writes the JSON report when asked.
pub async fn execute_run(
    config_path: Option<PathBuf>,
    overrides: RunOverrides,
    report_dir: Option<PathBuf>,
    no_color: bool,
) -> Result<()> {
    // Step 1: Load config
    let mut options = match &config_path {
        Some(path) => {
            eprintln!("Loading config from: {}", path.display());
            RunOptions::read(path)
                .with_context(|| format!("Failed to load config '{}'", path.display()))?
        }
        None => RunOptions::default(),
    };

    // Step 2: Apply CLI overrides
    apply_overrides(&mut options, overrides);

    // Step 3: Wire Ctrl+C to the run-level shutdown token
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling in-flight attempts");
            signal_token.cancel();
        }
    });

    // Step 4: Dispatch and join
    let dispatcher =
        Dispatcher::new(options, Arc::new(HttpConnector::new())).with_shutdown(shutdown);
    let result = dispatcher.run().await;
    signal_task.abort();
    let report = result.context("Measurement run failed")?;

    // Step 5: Terminal summary
    if no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
    println!("{}", render_summary(&report, dispatcher.options()));

    // Step 6: JSON report, only when requested
    if let Some(dir) = report_dir {
        let json_report = RunReport::from_report(&report, dispatcher.options());
        match write_report(&json_report, &dir) {
            Ok(path) => {
                eprintln!();
                eprintln!("Report written to: {}", path.display());
            }
            Err(e) => {
                eprintln!();
                eprintln!("Warning: Failed to write report: {}", e);
            }
        }
    }

    Ok(())
}

/// Apply CLI flag overrides to a loaded config.
///
/// `--params` without `--call` replaces the parameters of the configured call.
fn apply_overrides(options: &mut RunOptions, overrides: RunOverrides) {
    if let Some(target) = overrides.target {
        options.target = target;
    }
    if let Some(n) = overrides.requests {
        options.trials = n;
    }
    if let Some(t) = overrides.timeout_ms {
        options.timeout_ms = t;
    }
    if overrides.tls {
        options.tls = true;
    }
    if let Some(method) = overrides.call {
        let params = std::mem::take(&mut options.call.params);
        options.call = CallSelector::new(method);
        if !params.is_null() {
            options.call.params = params;
        }
    }
    if let Some(params) = overrides.params {
        options.call.params = params;
    }
    if let Some(path) = overrides.path {
        options.path = path;
    }
}
