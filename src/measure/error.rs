//! Error types for the measurement harness.
//!
//! Defines [`MeasureError`] for run-level failures that abort before (or
//! instead of) producing a report, and [`AttemptError`] for failures of a
//! single attempt stage, which are recorded into the report and never
//! propagated to sibling attempts.

/// gRPC-style status codes used for [`crate::measure::recorder::ErrorStatus::code`].
///
/// Remote JSON-RPC errors keep their own (negative) codes; everything the
/// harness classifies itself lands on one of these.
pub mod code {
    pub const CANCELLED: i32 = 1;
    pub const UNKNOWN: i32 = 2;
    pub const INVALID_ARGUMENT: i32 = 3;
    pub const DEADLINE_EXCEEDED: i32 = 4;
    pub const PERMISSION_DENIED: i32 = 7;
    pub const UNIMPLEMENTED: i32 = 12;
    pub const INTERNAL: i32 = 13;
    pub const UNAVAILABLE: i32 = 14;
    pub const UNAUTHENTICATED: i32 = 16;
}

/// Run-level errors: configuration parsing, validation, file I/O, and
/// internal recorder invariants.
#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    /// TOML parse failure -- the config file contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// The options parsed but contain values no run can start with
    /// (zero trials, zero timeout, empty call selector).
    #[error("Config validation error: {message}")]
    ConfigValidation { message: String },

    /// File I/O failure -- the config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// The report was already taken out of the recorder.
    /// Indicates a second `finish` on one run, never a user error.
    #[error("Recorder already sealed: {message}")]
    RecorderSealed { message: String },
}

/// Failure of one stage inside one attempt.
///
/// Every variant is recorded as an `ErrorStatus`; [`AttemptError::code`]
/// supplies the status code and [`AttemptError::category`] the
/// classification used in the summary breakdown.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum AttemptError {
    /// The target could not be turned into an endpoint during configure.
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// Connection-level failure (DNS resolution, TCP connect, TLS handshake).
    #[error("connection error: {message}")]
    Connection { message: String },

    /// The attempt deadline expired while the stage was in flight.
    #[error("deadline exceeded")]
    Timeout,

    /// The attempt context was cancelled before the stage finished.
    #[error("attempt cancelled")]
    Cancelled,

    /// Non-success HTTP status from the endpoint.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// JSON-RPC error object returned by the remote method.
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The endpoint answered with something that is not a JSON-RPC response.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The attempt task panicked; caught at the attempt boundary.
    #[error("attempt panicked: {message}")]
    Panicked { message: String },
}

impl AttemptError {
    /// Status code recorded in `ErrorStatus.code`.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidTarget { .. } => code::INVALID_ARGUMENT,
            Self::Connection { .. } => code::UNAVAILABLE,
            Self::Timeout => code::DEADLINE_EXCEEDED,
            Self::Cancelled => code::CANCELLED,
            Self::Http { status, .. } => http_status_to_code(*status),
            Self::JsonRpc { code, .. } => *code,
            Self::Protocol { .. } | Self::Panicked { .. } => code::INTERNAL,
        }
    }

    /// Returns the error category as a static string for the summary breakdown.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidTarget { .. } => "config",
            Self::Connection { .. } => "connection",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Http { .. } => "http",
            Self::JsonRpc { .. } => "jsonrpc",
            Self::Protocol { .. } => "protocol",
            Self::Panicked { .. } => "panic",
        }
    }

    /// Structured detail payloads carried alongside the message.
    pub fn details(&self) -> Vec<serde_json::Value> {
        match self {
            Self::JsonRpc {
                data: Some(data), ..
            } => vec![data.clone()],
            _ => Vec::new(),
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`AttemptError`] variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}

/// Map an HTTP status onto a status code the way gRPC clients do when the
/// server answers without a grpc-status.
pub fn http_status_to_code(status: u16) -> i32 {
    match status {
        400 => code::INTERNAL,
        401 => code::UNAUTHENTICATED,
        403 => code::PERMISSION_DENIED,
        404 => code::UNIMPLEMENTED,
        429 | 502 | 503 | 504 => code::UNAVAILABLE,
        _ => code::UNKNOWN,
    }
}
