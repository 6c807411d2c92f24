//! JSON report serialization for measurement runs.
//!
//! Produces a schema-versioned JSON document holding the resolved run options
//! and the report's three record sequences, with durations in milliseconds.
//! Written only when the user asks for it with `--report <DIR>`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::measure::config::RunOptions;
use crate::measure::recorder::Report;

/// Schema version for the JSON report format.
///
/// Increment when making breaking changes to the report structure.
const SCHEMA_VERSION: &str = "1.0";

/// Top-level JSON report structure.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Report format version for parser compatibility.
    pub schema_version: String,
    /// RFC 3339 time the run started.
    pub start_time: String,
    /// RFC 3339 time the join barrier released.
    pub end_time: String,
    /// Elapsed run time in milliseconds.
    pub total_ms: f64,
    /// Resolved options the run used.
    pub options: RunOptions,
    /// Attempts whose invoke stage succeeded.
    pub succeeded: usize,
    pub states: Vec<StateEntry>,
    pub responses: Vec<ResponseEntry>,
    pub errors: Vec<ErrorEntry>,
    /// Error counts by classification.
    pub error_categories: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub struct StateEntry {
    pub pid: u64,
    pub state: String,
    pub duration_ms: f64,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseEntry {
    pub pid: u64,
    pub status: String,
    pub stage: String,
    pub duration_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct ErrorEntry {
    pub pid: u64,
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<serde_json::Value>,
    pub category: String,
    pub timestamp: String,
}

impl RunReport {
    /// Build the serializable form of `report` for a run configured with
    /// `options`.
    pub fn from_report(report: &Report, options: &RunOptions) -> Self {
        let states = report
            .states
            .iter()
            .map(|s| StateEntry {
                pid: s.pid.get(),
                state: s.state.to_string(),
                duration_ms: as_millis(s.duration),
                timestamp: s.timestamp.to_rfc3339(),
            })
            .collect();

        let responses = report
            .responses
            .iter()
            .map(|r| ResponseEntry {
                pid: r.pid.get(),
                status: r.status.to_string(),
                stage: r.stage.to_string(),
                duration_ms: as_millis(r.duration),
            })
            .collect();

        let errors = report
            .errors
            .iter()
            .map(|e| ErrorEntry {
                pid: e.pid.get(),
                code: e.code,
                message: e.message.clone(),
                details: e.details.clone(),
                category: e.category.to_string(),
                timestamp: e.timestamp.to_rfc3339(),
            })
            .collect();

        let error_categories = report
            .error_categories()
            .into_iter()
            .map(|(category, count)| (category.to_string(), count))
            .collect();

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            start_time: report.start_time.to_rfc3339(),
            end_time: report.end_time.to_rfc3339(),
            total_ms: as_millis(report.total),
            options: options.clone(),
            succeeded: report.successful_attempts(),
            states,
            responses,
            errors,
            error_categories,
        }
    }
}

fn as_millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Write a JSON report file into `dir`.
///
/// Creates the directory if it does not exist. The filename is timestamped:
/// `measure-YYYY-MM-DDTHH-MM-SS.json` (hyphens, not colons, for Windows
/// compatibility).
///
/// Returns the path to the written report file.
pub fn write_report(report: &RunReport, dir: &Path) -> Result<PathBuf, std::io::Error> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }

    let report_path = dir.join(report_filename(&chrono::Utc::now()));
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&report_path, json)?;

    Ok(report_path)
}

/// Generate the report filename for a given timestamp.
pub fn report_filename(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    format!("measure-{}.json", timestamp.format("%Y-%m-%dT%H-%M-%S"))
}
