//! Concurrent RPC measurement engine.
//!
//! A run fans out a fixed number of attempts against one target. Each attempt
//! derives its own [`context::AttemptContext`], dials, invokes one call, and
//! records every stage outcome and connectivity transition into a shared
//! [`recorder::OutcomeRecorder`]. After the join barrier the frozen
//! [`recorder::Report`] is rendered by [`summary::render_summary`] and
//! optionally written as JSON by [`report::write_report`].

pub mod client;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod recorder;
pub mod report;
pub mod summary;
