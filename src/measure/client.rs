//! The RPC capability the harness measures.
//!
//! The dispatcher only ever calls [`Connector::dial`] and
//! [`Connection::invoke`]; the wire protocol lives behind these traits.
//! [`HttpConnector`] speaks JSON-RPC 2.0 over HTTP(S) with one dedicated
//! `reqwest` client per attempt, so no connection is ever shared between
//! attempts.
//!
//! Connections are released through [`ConnectionGuard`], whose `Drop` runs
//! on every exit path of the invoke stage: normal return, error, deadline,
//! cancellation, and panic unwind.

use async_trait::async_trait;
use serde::Deserialize;

use crate::measure::config::CallSelector;
use crate::measure::context::DialOptions;
use crate::measure::error::AttemptError;
use crate::measure::recorder::{ConnectivityState, StateTrace};

/// Successful reply of a remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallReply {
    pub result: serde_json::Value,
}

/// Establishes connections to the target.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Connect according to `options`, reporting connectivity transitions to
    /// `trace`. The returned connection is owned by the calling attempt.
    async fn dial(
        &self,
        options: &DialOptions,
        trace: &StateTrace,
    ) -> Result<Box<dyn Connection>, AttemptError>;
}

/// One attempt's exclusively owned connection.
#[async_trait]
pub trait Connection: Send {
    /// Invoke the selected remote call over this connection.
    async fn invoke(&mut self, call: &CallSelector) -> Result<CallReply, AttemptError>;

    /// Release the connection. Must be idempotent and must not block.
    fn close(&mut self);
}

/// Scoped owner of an attempt's connection.
///
/// Dropping the guard closes the connection and records `SHUTDOWN`.
pub struct ConnectionGuard {
    connection: Option<Box<dyn Connection>>,
    trace: StateTrace,
}

impl ConnectionGuard {
    pub fn new(connection: Box<dyn Connection>, trace: StateTrace) -> Self {
        Self {
            connection: Some(connection),
            trace,
        }
    }

    /// Invoke through the guarded connection.
    pub async fn invoke(&mut self, call: &CallSelector) -> Result<CallReply, AttemptError> {
        match self.connection.as_mut() {
            Some(connection) => connection.invoke(call).await,
            None => Err(AttemptError::Connection {
                message: "connection already released".to_string(),
            }),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
            self.trace.observe(ConnectivityState::Shutdown);
        }
    }
}

/// JSON-RPC 2.0 over HTTP(S).
#[derive(Debug, Default, Clone)]
pub struct HttpConnector;

impl HttpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for HttpConnector {
    fn name(&self) -> &'static str {
        "jsonrpc-http"
    }

    async fn dial(
        &self,
        options: &DialOptions,
        trace: &StateTrace,
    ) -> Result<Box<dyn Connection>, AttemptError> {
        let client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .pool_max_idle_per_host(1)
            .https_only(options.tls)
            .build()
            .map_err(|e| AttemptError::Connection {
                message: format!("failed to build client: {e}"),
            })?;
        trace.observe(ConnectivityState::Idle);

        trace.observe(ConnectivityState::Connecting);
        // Any HTTP answer proves the connection is up; it stays pooled in
        // this attempt's client for the invoke stage.
        match client.head(options.endpoint.clone()).send().await {
            Ok(_) => {
                trace.observe(ConnectivityState::Ready);
                Ok(Box::new(HttpConnection {
                    client: Some(client),
                    endpoint: options.endpoint.clone(),
                    request_id: options.pid.get(),
                }))
            }
            Err(err) => {
                trace.observe(ConnectivityState::TransientFailure);
                Err(AttemptError::classify_reqwest(&err))
            }
        }
    }
}

/// Connection established by [`HttpConnector`].
pub struct HttpConnection {
    client: Option<reqwest::Client>,
    endpoint: url::Url,
    request_id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i32,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[async_trait]
impl Connection for HttpConnection {
    async fn invoke(&mut self, call: &CallSelector) -> Result<CallReply, AttemptError> {
        let client = self.client.as_ref().ok_or_else(|| AttemptError::Connection {
            message: "connection already released".to_string(),
        })?;

        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.request_id,
            "method": call.method,
            "params": call.params,
        });

        let response = client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| AttemptError::classify_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: JsonRpcResponse =
            response.json().await.map_err(|e| AttemptError::Protocol {
                message: format!("invalid JSON-RPC response: {e}"),
            })?;

        if let Some(err) = envelope.error {
            return Err(AttemptError::JsonRpc {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }

        Ok(CallReply {
            result: envelope.result.unwrap_or(serde_json::Value::Null),
        })
    }

    fn close(&mut self) {
        // Dropping the client tears down its pooled connection.
        self.client = None;
    }
}
