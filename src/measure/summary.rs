//! Terminal summary renderer for a finished run.
//!
//! Produces a human-readable summary with:
//! - Configuration echo (target, total elapsed, options)
//! - Dotted-line stage totals (metric.........: value)
//! - Process tracking table (one row per stage record)
//! - Dial state trace (connectivity transitions)
//! - Error description table and category breakdown
//!
//! [`render_summary`] is a pure function of the report and options: no I/O,
//! no clock reads, so rendering the same report twice gives the same text.
//! Colour goes through `colored`, which respects the global override set
//! when `--no-color` is active or stdout is piped.

use colored::Colorize;
use std::time::Duration;

use crate::measure::config::RunOptions;
use crate::measure::recorder::{Report, Stage, Status};

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 32;

/// Render the summary of `report` for a run configured with `options`.
///
/// # Layout
///
/// ```text
/// Summary:
///   Target: localhost:50051
///   Total: 12.402ms
///   Options:
///      tls: false
///      call: SayHello
///      requests: 2
///      timeout: 1000ms
///
///   configure.................: ok=2 error=0
///   dial......................: ok=2 error=0
///   invoke....................: ok=1 error=1
///
/// Process Tracking:
///   Pid    Status   Stage       Duration
///   1      [OK   ]  configure   41.2µs
///   ...
///
/// Dial State Trace:
///   Pid    State               Duration
///   1      [CONNECTING]        0.2ms
///   ...
///
/// Error Description:
///   Pid    Code     Message
///   2      [-32601]  JSON-RPC error -32601: Method not found
/// ```
pub fn render_summary(report: &Report, options: &RunOptions) -> String {
    let mut lines = Vec::new();

    lines.push(String::new());
    lines.push("Summary:".bold().to_string());
    lines.push(format!("  Target: {}", options.target));
    lines.push(format!("  Total: {}", format_duration(report.total)));
    lines.push("  Options:".to_string());
    lines.push(format!("     tls: {}", options.tls));
    lines.push(format!("     call: {}", options.call));
    lines.push(format!("     requests: {}", options.trials));
    lines.push(format!("     timeout: {}ms", options.timeout_ms));
    lines.push(String::new());

    for stage in [Stage::Configure, Stage::Dial, Stage::Invoke] {
        let ok = report.stage_count(stage, Status::Ok);
        let error = report.stage_count(stage, Status::Error);
        let error_str = if error > 0 {
            format!("error={error}").red().to_string()
        } else {
            format!("error={error}")
        };
        let value = format!("{} {}", format!("ok={ok}").green(), error_str);
        lines.push(format_metric_row(&stage.to_string(), &value, PAD_WIDTH));
    }

    let succeeded = report.successful_attempts();
    let succeeded_str = format!("{succeeded}/{}", options.trials);
    let succeeded_colored = if succeeded == options.trials as usize {
        succeeded_str.green().to_string()
    } else {
        succeeded_str.yellow().to_string()
    };
    lines.push(format_metric_row("succeeded", &succeeded_colored, PAD_WIDTH));

    if !report.responses.is_empty() {
        lines.push(String::new());
        lines.push("Process Tracking:".bold().to_string());
        lines.push(format!(
            "  {:<6} {:<8} {:<11} {}",
            "Pid", "Status", "Stage", "Duration"
        ));
        for response in &report.responses {
            let status = format!("[{:<5}]", response.status.to_string());
            let status = match response.status {
                Status::Ok => status.green().to_string(),
                Status::Error => status.red().to_string(),
            };
            lines.push(format!(
                "  {:<6} {}  {:<11} {}",
                response.pid.to_string(),
                status,
                response.stage.to_string(),
                format_duration(response.duration)
            ));
        }
    }

    if !report.states.is_empty() {
        lines.push(String::new());
        lines.push("Dial State Trace:".bold().to_string());
        lines.push(format!("  {:<6} {:<19} {}", "Pid", "State", "Duration"));
        for state in &report.states {
            lines.push(format!(
                "  {:<6} {:<19} {}",
                state.pid.to_string(),
                format!("[{}]", state.state),
                format_duration(state.duration)
            ));
        }
    }

    if !report.errors.is_empty() {
        lines.push(String::new());
        lines.push("Error Description:".bold().to_string());
        lines.push(format!("  {:<6} {:<8} {}", "Pid", "Code", "Message"));
        for err in &report.errors {
            lines.push(format!(
                "  {:<6} {:<8} {}",
                err.pid.to_string(),
                format!("[{}]", err.code),
                err.message.red()
            ));
        }

        lines.push(String::new());
        lines.push("  errors:".to_string());
        let mut categories: Vec<_> = report.error_categories().into_iter().collect();
        // Highest count first; ties keep alphabetical order for stable output.
        categories.sort_by(|a, b| b.1.cmp(&a.1));
        for (category, count) in categories {
            lines.push(format_metric_row(
                &format!("    {category}"),
                &count.to_string().red().to_string(),
                PAD_WIDTH,
            ));
        }
    }

    lines.push(String::new());
    lines.join("\n")
}

/// Format a single metric row with dot-padding.
///
/// Produces: `"  metric_name..................: value_string"`
fn format_metric_row(name: &str, value: &str, pad_width: usize) -> String {
    format!("  {name:.<pad_width$}: {value}")
}

/// Millisecond-based duration text, sub-millisecond values in microseconds.
fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_millis(1) {
        format!("{}µs", duration.as_micros())
    } else {
        format!("{:.3}ms", duration.as_secs_f64() * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::config::CallSelector;
    use crate::measure::error::AttemptError;
    use crate::measure::recorder::{
        ConnectState, ConnectivityState, ErrorStatus, Pid, ResponseState,
    };

    /// Disable colors in tests for deterministic assertions.
    fn setup_no_color() {
        colored::control::set_override(false);
    }

    fn options() -> RunOptions {
        RunOptions {
            target: "localhost:50051".to_string(),
            trials: 2,
            timeout_ms: 1500,
            call: CallSelector::new("SayHello"),
            ..RunOptions::default()
        }
    }

    fn response(pid: u64, stage: Stage, status: Status) -> ResponseState {
        ResponseState {
            pid: Pid::new(pid),
            status,
            stage,
            duration: Duration::from_millis(3),
        }
    }

    fn mixed_report() -> Report {
        let mut report = Report::new();
        report.total = Duration::from_millis(42);
        report.responses = vec![
            response(1, Stage::Configure, Status::Ok),
            response(2, Stage::Configure, Status::Ok),
            response(1, Stage::Dial, Status::Ok),
            response(2, Stage::Dial, Status::Ok),
            response(1, Stage::Invoke, Status::Ok),
            response(2, Stage::Invoke, Status::Error),
        ];
        report.states = vec![ConnectState {
            pid: Pid::new(1),
            state: ConnectivityState::Ready,
            duration: Duration::from_micros(250),
            timestamp: report.start_time,
        }];
        let mut error = ErrorStatus::from_attempt_error(
            Pid::new(2),
            &AttemptError::JsonRpc {
                code: -32601,
                message: "Method not found".to_string(),
                data: None,
            },
        );
        error.timestamp = report.start_time;
        report.errors = vec![error];
        report
    }

    #[test]
    fn test_render_contains_configuration_echo() {
        setup_no_color();
        let output = render_summary(&mixed_report(), &options());
        assert!(output.contains("Target: localhost:50051"));
        assert!(output.contains("Total: 42.000ms"));
        assert!(output.contains("call: SayHello"));
        assert!(output.contains("requests: 2"));
        assert!(output.contains("timeout: 1500ms"));
    }

    #[test]
    fn test_render_contains_all_tables() {
        setup_no_color();
        let output = render_summary(&mixed_report(), &options());
        assert!(output.contains("Process Tracking:"));
        assert!(output.contains("Dial State Trace:"));
        assert!(output.contains("[READY]"));
        assert!(output.contains("Error Description:"));
        assert!(output.contains("[-32601]"));
        assert!(output.contains("Method not found"));
        assert!(output.contains("jsonrpc"));
    }

    #[test]
    fn test_render_stage_totals() {
        setup_no_color();
        let output = render_summary(&mixed_report(), &options());
        assert!(output.contains("ok=1 error=1"), "invoke totals missing");
        assert!(output.contains("1/2"), "succeeded ratio missing");
    }

    #[test]
    fn test_render_omits_empty_sections() {
        setup_no_color();
        let mut report = Report::new();
        report.responses = vec![
            response(1, Stage::Configure, Status::Ok),
            response(1, Stage::Dial, Status::Ok),
            response(1, Stage::Invoke, Status::Ok),
        ];
        let output = render_summary(&report, &options());
        assert!(output.contains("Process Tracking:"));
        assert!(!output.contains("Dial State Trace:"));
        assert!(!output.contains("Error Description:"));
    }

    #[test]
    fn test_render_is_idempotent() {
        setup_no_color();
        let report = mixed_report();
        let opts = options();
        assert_eq!(render_summary(&report, &opts), render_summary(&report, &opts));
    }

    #[test]
    fn test_format_metric_row_dot_padding() {
        let row = format_metric_row("dial", "ok=1", 20);
        assert!(row.starts_with("  dial...."));
        assert!(row.ends_with(": ok=1"));
    }

    #[test]
    fn test_format_duration_units() {
        assert_eq!(format_duration(Duration::from_micros(250)), "250µs");
        assert_eq!(format_duration(Duration::from_millis(12)), "12.000ms");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.500ms");
    }
}
