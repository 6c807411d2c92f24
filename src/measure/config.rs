//! Run configuration for a measurement.
//!
//! [`RunOptions`] is built once at process start (defaults, then an optional
//! TOML file, then command-line overrides), validated, and shared read-only
//! by every attempt. It is never mutated after dispatch begins.
//!
//! # Example TOML
//!
//! ```toml
//! target = "localhost:50051"
//! trials = 20
//! timeout_ms = 2000
//! tls = false
//! path = "/rpc"
//!
//! [call]
//! method = "SayHello"
//! params = { name = "world" }
//! ```
//!
//! All durations are milliseconds, in the file, on the command line, and in
//! every rendered report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::measure::error::MeasureError;

/// Default target when none is configured.
pub const DEFAULT_TARGET: &str = "localhost:50051";

/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// The remote method every attempt invokes, plus its parameters.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CallSelector {
    /// JSON-RPC method name.
    pub method: String,
    /// Parameters sent with the call (defaults to an empty object).
    #[serde(default = "default_params")]
    pub params: serde_json::Value,
}

fn default_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl CallSelector {
    /// Selector for `method` with empty parameters.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: default_params(),
        }
    }

    /// Replace the call parameters.
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

impl fmt::Display for CallSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.method)
    }
}

/// Immutable run configuration shared by every attempt.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RunOptions {
    /// Target address as `host:port`.
    #[serde(default = "default_target")]
    pub target: String,
    /// Number of concurrent attempts to dispatch.
    #[serde(default = "default_trials")]
    pub trials: u32,
    /// Per-attempt deadline in milliseconds, measured from attempt start.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Dial with TLS (`https`) instead of plaintext (`http`).
    #[serde(default)]
    pub tls: bool,
    /// HTTP path of the JSON-RPC endpoint on the target.
    #[serde(default = "default_path")]
    pub path: String,
    /// The call every attempt invokes.
    #[serde(default)]
    pub call: CallSelector,
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

fn default_trials() -> u32 {
    1
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_path() -> String {
    "/".to_string()
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            target: default_target(),
            trials: default_trials(),
            timeout_ms: default_timeout_ms(),
            tls: false,
            path: default_path(),
            call: CallSelector::default(),
        }
    }
}

impl RunOptions {
    /// Parse a TOML string into validated [`RunOptions`].
    pub fn from_toml(content: &str) -> Result<Self, MeasureError> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Load and validate [`RunOptions`] from a file path.
    ///
    /// Returns [`MeasureError::ConfigIo`] if the file cannot be read,
    /// [`MeasureError::ConfigParse`] if the TOML is malformed, or
    /// [`MeasureError::ConfigValidation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, MeasureError> {
        let options = Self::read(path)?;
        options.validate()?;
        Ok(options)
    }

    /// Read [`RunOptions`] from a file path without validating them.
    ///
    /// Used when command-line overrides still have to be layered on top; the
    /// dispatcher validates the merged result.
    pub fn read(path: &Path) -> Result<Self, MeasureError> {
        let content = std::fs::read_to_string(path).map_err(|source| MeasureError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Check the options a run cannot start without.
    ///
    /// The target is deliberately not parsed here: a malformed target is an
    /// attempt-level configure failure and shows up in the report.
    pub fn validate(&self) -> Result<(), MeasureError> {
        if self.trials == 0 {
            return Err(MeasureError::ConfigValidation {
                message: "trials must be at least 1".to_string(),
            });
        }

        if self.timeout_ms == 0 {
            return Err(MeasureError::ConfigValidation {
                message: "timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.call.method.trim().is_empty() {
            return Err(MeasureError::ConfigValidation {
                message: "a call method is required (--call or [call].method)".to_string(),
            });
        }

        if !self.path.starts_with('/') {
            return Err(MeasureError::ConfigValidation {
                message: format!("path must start with '/', got '{}'", self.path),
            });
        }

        Ok(())
    }

    /// Convert the `timeout_ms` field to a [`Duration`].
    pub fn timeout_as_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// URL scheme implied by the TLS flag.
    pub fn scheme(&self) -> &'static str {
        if self.tls {
            "https"
        } else {
            "http"
        }
    }
}
