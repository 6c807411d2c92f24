//! Report data model and the synchronized recorder that fills it.
//!
//! Every attempt holds a clone of one [`OutcomeRecorder`]. Records are built
//! outside the lock and appended inside a minimal critical section, so
//! concurrent attempts never interleave partial writes and never lose one.
//! Once the dispatcher's join barrier has released every attempt,
//! [`OutcomeRecorder::finish`] freezes the [`Report`] for rendering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::measure::error::{AttemptError, MeasureError};

/// Opaque per-attempt identifier correlating records across the report's
/// sequences. Not an operating-system process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u64);

impl Pid {
    /// Wrap a raw identifier. Use [`crate::measure::context::mint_pid`] to
    /// obtain a fresh, process-unique one.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle stage within one attempt. Stages run strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Deriving the attempt context and dial options.
    Configure,
    /// Establishing the connection to the target.
    Dial,
    /// Invoking the configured remote call.
    Invoke,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configure => "configure",
            Self::Dial => "dial",
            Self::Invoke => "invoke",
        };
        f.write_str(s)
    }
}

/// Outcome of one executed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Error => f.write_str("ERROR"),
        }
    }
}

/// Transport connectivity state, named after the gRPC channel states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Ready => "READY",
            Self::TransientFailure => "TRANSIENT_FAILURE",
            Self::Shutdown => "SHUTDOWN",
        };
        f.write_str(s)
    }
}

/// One observed connectivity transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectState {
    /// Attempt that observed the transition.
    pub pid: Pid,
    /// State entered.
    pub state: ConnectivityState,
    /// Time since the attempt started.
    pub duration: Duration,
    /// Wall-clock time of the transition.
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one executed stage of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseState {
    pub pid: Pid,
    pub status: Status,
    pub stage: Stage,
    /// Time spent in this stage alone.
    pub duration: Duration,
}

/// A recorded stage failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorStatus {
    pub pid: Pid,
    /// Status code; see [`crate::measure::error::code`].
    pub code: i32,
    /// Developer-facing message.
    pub message: String,
    /// Structured detail payloads, if the failure carried any.
    pub details: Vec<serde_json::Value>,
    /// Classification used for the summary breakdown.
    pub category: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl ErrorStatus {
    /// Build the record for `err` observed by attempt `pid`.
    pub fn from_attempt_error(pid: Pid, err: &AttemptError) -> Self {
        Self {
            pid,
            code: err.code(),
            message: err.to_string(),
            details: err.details(),
            category: err.category(),
            timestamp: Utc::now(),
        }
    }
}

/// Aggregation of every attempt's outcomes for one run.
///
/// Append-only while the run is in flight; read-only once
/// [`OutcomeRecorder::finish`] hands it out.
#[derive(Debug, Clone)]
pub struct Report {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Elapsed time from dispatch start to the join barrier.
    pub total: Duration,
    pub states: Vec<ConnectState>,
    pub responses: Vec<ResponseState>,
    pub errors: Vec<ErrorStatus>,
}

impl Report {
    /// Empty report starting now.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            end_time: now,
            total: Duration::ZERO,
            states: Vec::new(),
            responses: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Every attempt identity that recorded at least one stage.
    pub fn pids(&self) -> BTreeSet<Pid> {
        self.responses.iter().map(|r| r.pid).collect()
    }

    /// Stage records of one attempt, in the order they were appended.
    pub fn responses_for(&self, pid: Pid) -> impl Iterator<Item = &ResponseState> + '_ {
        self.responses.iter().filter(move |r| r.pid == pid)
    }

    /// Number of stage records with the given stage and status.
    pub fn stage_count(&self, stage: Stage, status: Status) -> usize {
        self.responses
            .iter()
            .filter(|r| r.stage == stage && r.status == status)
            .count()
    }

    /// Attempts whose invoke stage succeeded.
    pub fn successful_attempts(&self) -> usize {
        self.stage_count(Stage::Invoke, Status::Ok)
    }

    /// Error counts keyed by category.
    pub fn error_categories(&self) -> BTreeMap<&'static str, u64> {
        let mut counts = BTreeMap::new();
        for err in &self.errors {
            *counts.entry(err.category).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared, synchronized entry point for appending to the run's [`Report`].
///
/// [`OutcomeRecorder::finish`] seals the recorder: the report is taken out
/// under the lock and any append through a handle that outlived the join
/// barrier is dropped with a warning instead of reaching the frozen report.
#[derive(Debug, Clone)]
pub struct OutcomeRecorder {
    report: Arc<Mutex<Option<Report>>>,
}

impl OutcomeRecorder {
    /// Allocate the run's report; its start time is now.
    pub fn new() -> Self {
        Self {
            report: Arc::new(Mutex::new(Some(Report::new()))),
        }
    }

    fn append(&self, record: &'static str, push: impl FnOnce(&mut Report)) {
        let mut guard = self.report.lock();
        if let Some(report) = guard.as_mut() {
            push(report);
            return;
        }
        drop(guard);
        tracing::warn!(record, "report already sealed, dropping late record");
    }

    /// Append a connectivity transition.
    pub fn record_state(&self, state: ConnectState) {
        self.append("state", |report| report.states.push(state));
    }

    /// Append a stage outcome.
    pub fn record_response(&self, response: ResponseState) {
        self.append("response", |report| report.responses.push(response));
    }

    /// Append a failure.
    pub fn record_error(&self, error: ErrorStatus) {
        self.append("error", |report| report.errors.push(error));
    }

    /// Record a finished stage and hand back its value on success.
    ///
    /// The stage record and, on failure, its error record are appended in one
    /// critical section. Returns `None` when the stage failed, which ends the
    /// attempt.
    pub fn record_stage<T>(
        &self,
        pid: Pid,
        stage: Stage,
        duration: Duration,
        result: Result<T, AttemptError>,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                self.record_response(ResponseState {
                    pid,
                    status: Status::Ok,
                    stage,
                    duration,
                });
                Some(value)
            }
            Err(err) => {
                tracing::debug!(%pid, %stage, error = %err, "stage failed");
                let response = ResponseState {
                    pid,
                    status: Status::Error,
                    stage,
                    duration,
                };
                let error = ErrorStatus::from_attempt_error(pid, &err);
                self.append("stage failure", |report| {
                    report.responses.push(response);
                    report.errors.push(error);
                });
                None
            }
        }
    }

    /// Seal the recorder after the join barrier and hand out the report.
    ///
    /// Fails with [`MeasureError::RecorderSealed`] if the report was already
    /// taken by an earlier call.
    pub fn finish(&self, total: Duration) -> Result<Report, MeasureError> {
        let mut report = self
            .report
            .lock()
            .take()
            .ok_or_else(|| MeasureError::RecorderSealed {
                message: "finish called more than once".to_string(),
            })?;
        report.end_time = Utc::now();
        report.total = total;
        Ok(report)
    }
}

impl Default for OutcomeRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-attempt sink for connectivity transitions.
///
/// Stamps each transition with the attempt's identity and the time since the
/// attempt's own start instant. Clones share the last observed state.
#[derive(Debug, Clone)]
pub struct StateTrace {
    pid: Pid,
    started: Instant,
    recorder: OutcomeRecorder,
    last: Arc<Mutex<Option<ConnectivityState>>>,
}

impl StateTrace {
    pub fn new(pid: Pid, started: Instant, recorder: OutcomeRecorder) -> Self {
        Self {
            pid,
            started,
            recorder,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Attempt this trace belongs to.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Most recent state observed through this trace or any of its clones.
    pub fn last_state(&self) -> Option<ConnectivityState> {
        *self.last.lock()
    }

    /// Record that the attempt's connection entered `state`.
    pub fn observe(&self, state: ConnectivityState) {
        *self.last.lock() = Some(state);
        self.recorder.record_state(ConnectState {
            pid: self.pid,
            state,
            duration: self.started.elapsed(),
            timestamp: Utc::now(),
        });
    }
}
