//! rpc-measure: concurrent RPC latency and connectivity measurement.
//!
//! Fans out a fixed number of independent call attempts against one target,
//! records per-stage outcomes, connectivity transitions and errors for each
//! attempt, and renders the aggregated report once every attempt has
//! finished.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rpc_measure::measure::client::HttpConnector;
//! use rpc_measure::measure::config::{CallSelector, RunOptions};
//! use rpc_measure::measure::dispatcher::Dispatcher;
//! use rpc_measure::measure::summary::render_summary;
//!
//! # async fn demo() -> Result<(), rpc_measure::measure::error::MeasureError> {
//! let options = RunOptions {
//!     target: "localhost:50051".to_string(),
//!     trials: 10,
//!     call: CallSelector::new("SayHello"),
//!     ..RunOptions::default()
//! };
//! let dispatcher = Dispatcher::new(options, Arc::new(HttpConnector::new()));
//! let report = dispatcher.run().await?;
//! println!("{}", render_summary(&report, dispatcher.options()));
//! # Ok(())
//! # }
//! ```

pub mod measure;
