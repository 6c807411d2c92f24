//! Concurrent fan-out of measurement attempts with a join barrier.
//!
//! [`Dispatcher::run`] validates the options, spawns exactly `trials`
//! attempts as independent tokio tasks, and returns only after every one of
//! them has reached a terminal state. Each attempt runs its stages strictly
//! in order (configure, dial, invoke) and stops at the first failed stage;
//! failures are recorded, never raised, so one attempt cannot abort another.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::measure::client::{ConnectionGuard, Connector};
use crate::measure::config::RunOptions;
use crate::measure::context::{mint_pid, AttemptContext};
use crate::measure::error::{AttemptError, MeasureError};
use crate::measure::recorder::{
    ConnectivityState, ErrorStatus, OutcomeRecorder, Pid, Report, Stage, StateTrace,
};

/// Top-level measurement entry point.
pub struct Dispatcher {
    options: Arc<RunOptions>,
    connector: Arc<dyn Connector>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Creates a dispatcher for `options` using `connector` as transport.
    pub fn new(options: RunOptions, connector: Arc<dyn Connector>) -> Self {
        Self {
            options: Arc::new(options),
            connector,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use `token` as the run-level shutdown signal. Every attempt's scope is
    /// a child of it.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Returns a reference to the run options.
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every attempt and return the frozen report.
    ///
    /// Only invalid options are an error; they are rejected before any
    /// attempt is spawned.
    pub async fn run(&self) -> Result<Report, MeasureError> {
        self.options.validate()?;

        let trials = self.options.trials;
        tracing::info!(
            addr = %self.options.target,
            trials,
            timeout_ms = self.options.timeout_ms,
            tls = self.options.tls,
            call = %self.options.call,
            transport = self.connector.name(),
            "dispatching attempts"
        );

        let recorder = OutcomeRecorder::new();
        let run_start = Instant::now();
        let mut attempts = JoinSet::new();

        for _ in 0..trials {
            attempts.spawn(run_attempt(
                self.options.clone(),
                self.connector.clone(),
                recorder.clone(),
                self.shutdown.clone(),
            ));
        }

        // Join barrier: every attempt is terminal before the report is read.
        while let Some(joined) = attempts.join_next().await {
            if let Err(err) = joined {
                tracing::warn!(error = %err, "attempt task ended abnormally");
            }
        }

        let report = recorder.finish(run_start.elapsed())?;
        tracing::info!(
            elapsed_ms = report.total.as_millis() as u64,
            succeeded = report.successful_attempts(),
            errors = report.errors.len(),
            "all attempts finished"
        );
        Ok(report)
    }
}

/// One attempt, from identity minting to connection release.
///
/// A panic anywhere in the stages is caught here and charged to the stage
/// that was in flight; the connection guard has already been dropped by the
/// unwind.
async fn run_attempt(
    options: Arc<RunOptions>,
    connector: Arc<dyn Connector>,
    recorder: OutcomeRecorder,
    shutdown: CancellationToken,
) {
    let pid = mint_pid();
    let span = tracing::debug_span!("attempt", %pid);
    let cursor = StageCursor::new(pid, &recorder);
    let stages = run_stages(&cursor, &options, connector.as_ref(), &recorder, &shutdown);

    if let Err(panic) = AssertUnwindSafe(stages.instrument(span)).catch_unwind().await {
        let err = AttemptError::Panicked {
            message: panic_message(panic.as_ref()),
        };
        tracing::warn!(%pid, error = %err, "attempt panicked");
        match cursor.interrupted() {
            Some((stage, started)) => {
                recorder.record_stage::<()>(pid, stage, started.elapsed(), Err(err));
            }
            None => recorder.record_error(ErrorStatus::from_attempt_error(pid, &err)),
        }
    }
}

/// Stage currently in flight for one attempt.
struct StageCursor<'a> {
    pid: Pid,
    recorder: &'a OutcomeRecorder,
    current: Mutex<Option<(Stage, Instant)>>,
}

impl<'a> StageCursor<'a> {
    fn new(pid: Pid, recorder: &'a OutcomeRecorder) -> Self {
        Self {
            pid,
            recorder,
            current: Mutex::new(None),
        }
    }

    fn enter(&self, stage: Stage) {
        *self.current.lock() = Some((stage, Instant::now()));
    }

    /// Record the outcome of the entered stage and leave it.
    fn record<T>(&self, result: Result<T, AttemptError>) -> Option<T> {
        let current = self.current.lock().take();
        match current {
            Some((stage, started)) => {
                self.recorder
                    .record_stage(self.pid, stage, started.elapsed(), result)
            }
            None => result.ok(),
        }
    }

    /// Stage left unrecorded by an unwind, with its start instant.
    fn interrupted(&self) -> Option<(Stage, Instant)> {
        self.current.lock().take()
    }
}

async fn run_stages(
    cursor: &StageCursor<'_>,
    options: &RunOptions,
    connector: &dyn Connector,
    recorder: &OutcomeRecorder,
    shutdown: &CancellationToken,
) {
    let pid = cursor.pid;

    cursor.enter(Stage::Configure);
    let configured = AttemptContext::derive(pid, options, shutdown);
    let Some((ctx, dial_options)) = cursor.record(configured) else {
        return;
    };

    let trace = StateTrace::new(pid, ctx.started(), recorder.clone());

    cursor.enter(Stage::Dial);
    let dialed = ctx.bound(connector.dial(&dial_options, &trace)).await;
    if dialed.is_err() && trace.last_state() != Some(ConnectivityState::TransientFailure) {
        // Deadline or cancellation dropped the dial before the transport saw it fail.
        trace.observe(ConnectivityState::TransientFailure);
    }
    let Some(connection) = cursor.record(dialed) else {
        return;
    };
    let mut connection = ConnectionGuard::new(connection, trace);

    cursor.enter(Stage::Invoke);
    let invoked = ctx.bound(connection.invoke(&options.call)).await;
    if let Some(reply) = cursor.record(invoked) {
        tracing::debug!(result = %reply.result, "call returned");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::client::HttpConnector;
    use crate::measure::config::CallSelector;
    use crate::measure::recorder::Status;

    #[test]
    fn test_panic_message_variants() {
        let static_str: Box<dyn std::any::Any + Send> = Box::new("boom");
        let owned: Box<dyn std::any::Any + Send> = Box::new("kaboom".to_string());
        let other: Box<dyn std::any::Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(static_str.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "kaboom");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_zero_trials_rejected() {
        let options = RunOptions {
            trials: 0,
            call: CallSelector::new("ping"),
            ..RunOptions::default()
        };
        let dispatcher = Dispatcher::new(options, Arc::new(HttpConnector::new()));
        let result = dispatcher.run().await;
        assert!(matches!(
            result.unwrap_err(),
            MeasureError::ConfigValidation { .. }
        ));
    }

    #[tokio::test]
    async fn test_malformed_target_fails_configure_for_every_attempt() {
        let options = RunOptions {
            target: "no-port-here".to_string(),
            trials: 4,
            call: CallSelector::new("ping"),
            ..RunOptions::default()
        };
        let dispatcher = Dispatcher::new(options, Arc::new(HttpConnector::new()));
        let report = dispatcher.run().await.unwrap();

        assert_eq!(report.stage_count(Stage::Configure, Status::Error), 4);
        assert_eq!(report.responses.len(), 4);
        assert_eq!(report.errors.len(), 4);
        assert!(report.states.is_empty());
        assert_eq!(report.pids().len(), 4);
    }

    #[tokio::test]
    async fn test_end_to_end_against_http_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#)
            .expect(3)
            .create_async()
            .await;

        let options = RunOptions {
            target: server.host_with_port(),
            trials: 3,
            timeout_ms: 5_000,
            call: CallSelector::new("ping"),
            ..RunOptions::default()
        };
        let dispatcher = Dispatcher::new(options, Arc::new(HttpConnector::new()));
        let report = dispatcher.run().await.unwrap();

        assert_eq!(report.stage_count(Stage::Configure, Status::Ok), 3);
        assert_eq!(report.stage_count(Stage::Dial, Status::Ok), 3);
        assert_eq!(report.stage_count(Stage::Invoke, Status::Ok), 3);
        assert!(report.errors.is_empty());
        mock.assert_async().await;
    }
}
