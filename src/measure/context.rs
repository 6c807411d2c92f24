//! Per-attempt execution context.
//!
//! [`AttemptContext::derive`] turns the shared [`RunOptions`] into everything
//! one attempt needs: its own start instant, a deadline of
//! `start + timeout_ms`, a cancellation scope that is a child of the run's
//! shutdown token (cancelling it never touches a sibling), and the
//! [`DialOptions`] for the transport.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::measure::config::RunOptions;
use crate::measure::error::AttemptError;
use crate::measure::recorder::Pid;

static NEXT_PID: AtomicU64 = AtomicU64::new(1);

/// Mint a fresh attempt identity, unique for the lifetime of the process.
pub fn mint_pid() -> Pid {
    Pid::new(NEXT_PID.fetch_add(1, Ordering::Relaxed))
}

/// Transport options derived for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DialOptions {
    /// Attempt the connection belongs to; doubles as the JSON-RPC request id.
    pub pid: Pid,
    /// Endpoint URL, scheme chosen by the TLS flag.
    pub endpoint: Url,
    /// Whether the connection must use TLS.
    pub tls: bool,
    /// Upper bound for connection establishment: the attempt's whole budget.
    pub connect_timeout: Duration,
}

/// Bounded-lifetime context of one attempt.
///
/// Dropping the context cancels its scope, so anything still bound to it
/// unblocks once the attempt is over.
#[derive(Debug)]
pub struct AttemptContext {
    pid: Pid,
    started: Instant,
    deadline: tokio::time::Instant,
    cancel: CancellationToken,
}

impl AttemptContext {
    /// Derive the context and dial options for attempt `pid`.
    ///
    /// Fails only when the target cannot be turned into an endpoint.
    pub fn derive(
        pid: Pid,
        options: &RunOptions,
        shutdown: &CancellationToken,
    ) -> Result<(Self, DialOptions), AttemptError> {
        let started = Instant::now();
        let timeout = options.timeout_as_duration();
        let endpoint = parse_endpoint(&options.target, options.scheme(), &options.path)?;

        let context = Self {
            pid,
            started,
            deadline: tokio::time::Instant::from_std(started + timeout),
            cancel: shutdown.child_token(),
        };
        let dial = DialOptions {
            pid,
            endpoint,
            tls: options.tls,
            connect_timeout: timeout,
        };
        Ok((context, dial))
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The attempt's own start instant.
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Time left before the deadline (zero once it has passed).
    pub fn remaining(&self) -> Duration {
        self.deadline
            .saturating_duration_since(tokio::time::Instant::now())
    }

    /// Cancel this attempt only.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut` within this attempt's deadline and cancellation scope.
    ///
    /// Returns [`AttemptError::Cancelled`] if the scope is cancelled first and
    /// [`AttemptError::Timeout`] if the deadline passes first. Either way the
    /// stage future is dropped.
    pub async fn bound<T, F>(&self, fut: F) -> Result<T, AttemptError>
    where
        F: Future<Output = Result<T, AttemptError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AttemptError::Cancelled),
            result = tokio::time::timeout_at(self.deadline, fut) => {
                result.unwrap_or(Err(AttemptError::Timeout))
            }
        }
    }
}

impl Drop for AttemptContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Build the endpoint URL for a `host:port` target.
fn parse_endpoint(target: &str, scheme: &str, path: &str) -> Result<Url, AttemptError> {
    let invalid = |reason: &str| AttemptError::InvalidTarget {
        target: target.to_string(),
        reason: reason.to_string(),
    };

    if target.contains("://") {
        return Err(invalid("expected host:port without a scheme"));
    }
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| invalid("expected host:port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    port.parse::<u16>()
        .map_err(|_| invalid("port must be a number between 0 and 65535"))?;

    let url = Url::parse(&format!("{scheme}://{target}{path}"))
        .map_err(|e| invalid(&e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::config::CallSelector;

    fn options(target: &str, tls: bool, timeout_ms: u64) -> RunOptions {
        RunOptions {
            target: target.to_string(),
            timeout_ms,
            tls,
            call: CallSelector::new("ping"),
            ..RunOptions::default()
        }
    }

    #[test]
    fn test_mint_pid_is_unique() {
        let pids: std::collections::HashSet<Pid> = (0..1000).map(|_| mint_pid()).collect();
        assert_eq!(pids.len(), 1000);
    }

    #[test]
    fn test_derive_plaintext_endpoint() {
        let shutdown = CancellationToken::new();
        let (ctx, dial) =
            AttemptContext::derive(Pid::new(1), &options("localhost:50051", false, 500), &shutdown)
                .unwrap();
        assert_eq!(dial.endpoint.as_str(), "http://localhost:50051/");
        assert!(!dial.tls);
        assert_eq!(dial.connect_timeout, Duration::from_millis(500));
        assert_eq!(ctx.pid(), Pid::new(1));
        assert!(ctx.remaining() <= Duration::from_millis(500));
    }

    #[test]
    fn test_derive_tls_endpoint_with_path() {
        let shutdown = CancellationToken::new();
        let mut opts = options("[::1]:8443", true, 500);
        opts.path = "/rpc".to_string();
        let (_ctx, dial) = AttemptContext::derive(Pid::new(2), &opts, &shutdown).unwrap();
        assert_eq!(dial.endpoint.scheme(), "https");
        assert_eq!(dial.endpoint.path(), "/rpc");
        assert!(dial.tls);
    }

    #[test]
    fn test_derive_rejects_malformed_targets() {
        let shutdown = CancellationToken::new();
        for target in ["localhost", ":8080", "host:notaport", "http://host:80", "host:70000"] {
            let result = AttemptContext::derive(Pid::new(3), &options(target, false, 500), &shutdown);
            assert!(
                matches!(result, Err(AttemptError::InvalidTarget { .. })),
                "target {target} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_bound_passes_through_result() {
        let shutdown = CancellationToken::new();
        let (ctx, _) =
            AttemptContext::derive(Pid::new(4), &options("h:1", false, 1000), &shutdown).unwrap();
        let result = ctx.bound(async { Ok::<_, AttemptError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_bound_times_out() {
        let shutdown = CancellationToken::new();
        let (ctx, _) =
            AttemptContext::derive(Pid::new(5), &options("h:1", false, 20), &shutdown).unwrap();
        let result: Result<(), _> = ctx.bound(std::future::pending()).await;
        assert_eq!(result, Err(AttemptError::Timeout));
    }

    #[tokio::test]
    async fn test_bound_observes_cancellation() {
        let shutdown = CancellationToken::new();
        let (ctx, _) =
            AttemptContext::derive(Pid::new(6), &options("h:1", false, 60_000), &shutdown).unwrap();
        ctx.cancel();
        let result: Result<(), _> = ctx.bound(std::future::pending()).await;
        assert_eq!(result, Err(AttemptError::Cancelled));
    }

    #[test]
    fn test_cancelling_one_attempt_leaves_siblings() {
        let shutdown = CancellationToken::new();
        let opts = options("h:1", false, 1000);
        let (first, _) = AttemptContext::derive(Pid::new(7), &opts, &shutdown).unwrap();
        let (second, _) = AttemptContext::derive(Pid::new(8), &opts, &shutdown).unwrap();

        first.cancel();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!shutdown.is_cancelled());

        drop(first);
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_shutdown_reaches_every_attempt() {
        let shutdown = CancellationToken::new();
        let opts = options("h:1", false, 1000);
        let (first, _) = AttemptContext::derive(Pid::new(9), &opts, &shutdown).unwrap();
        let (second, _) = AttemptContext::derive(Pid::new(10), &opts, &shutdown).unwrap();
        shutdown.cancel();
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
    }
}
