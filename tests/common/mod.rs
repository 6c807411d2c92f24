//! Scripted in-memory transport for driving the dispatcher without a network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use rpc_measure::measure::client::{CallReply, Connection, Connector};
use rpc_measure::measure::config::{CallSelector, RunOptions};
use rpc_measure::measure::context::DialOptions;
use rpc_measure::measure::error::AttemptError;
use rpc_measure::measure::recorder::{ConnectivityState, StateTrace};

/// What a scripted dial or invoke does.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(AttemptError),
    Hang,
    Panic,
}

type Script = Box<dyn Fn(usize) -> Behavior + Send + Sync>;

struct Shared {
    dial_script: Script,
    invoke_script: Script,
    dials: AtomicUsize,
    invokes: AtomicUsize,
    closes: AtomicUsize,
}

/// Connector whose dial and invoke outcomes are chosen by call index.
///
/// Indices count calls across all attempts in arrival order, so which
/// attempt sees which index is up to the scheduler; totals are exact.
#[derive(Clone)]
pub struct ScriptedConnector {
    shared: Arc<Shared>,
}

impl ScriptedConnector {
    /// Every dial and invoke succeeds.
    pub fn succeeding() -> Self {
        Self::new(|_| Behavior::Succeed, |_| Behavior::Succeed)
    }

    pub fn new(
        dial: impl Fn(usize) -> Behavior + Send + Sync + 'static,
        invoke: impl Fn(usize) -> Behavior + Send + Sync + 'static,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                dial_script: Box::new(dial),
                invoke_script: Box::new(invoke),
                dials: AtomicUsize::new(0),
                invokes: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn dials(&self) -> usize {
        self.shared.dials.load(Ordering::SeqCst)
    }

    pub fn invokes(&self) -> usize {
        self.shared.invokes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }
}

async fn perform(behavior: Behavior) -> Result<(), AttemptError> {
    match behavior {
        Behavior::Succeed => Ok(()),
        Behavior::Fail(err) => Err(err),
        Behavior::Hang => std::future::pending().await,
        Behavior::Panic => panic!("scripted panic"),
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn dial(
        &self,
        _options: &DialOptions,
        trace: &StateTrace,
    ) -> Result<Box<dyn Connection>, AttemptError> {
        let index = self.shared.dials.fetch_add(1, Ordering::SeqCst);
        trace.observe(ConnectivityState::Connecting);
        match perform((self.shared.dial_script)(index)).await {
            Ok(()) => {
                trace.observe(ConnectivityState::Ready);
                Ok(Box::new(ScriptedConnection {
                    shared: self.shared.clone(),
                    closed: false,
                }))
            }
            Err(err) => {
                trace.observe(ConnectivityState::TransientFailure);
                Err(err)
            }
        }
    }
}

struct ScriptedConnection {
    shared: Arc<Shared>,
    closed: bool,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn invoke(&mut self, call: &CallSelector) -> Result<CallReply, AttemptError> {
        let index = self.shared.invokes.fetch_add(1, Ordering::SeqCst);
        perform((self.shared.invoke_script)(index)).await?;
        Ok(CallReply {
            result: serde_json::json!({ "echo": call.method }),
        })
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Options for `trials` attempts with a `timeout_ms` budget each.
pub fn options(trials: u32, timeout_ms: u64) -> RunOptions {
    RunOptions {
        target: "127.0.0.1:50051".to_string(),
        trials,
        timeout_ms,
        call: CallSelector::new("SayHello"),
        ..RunOptions::default()
    }
}
