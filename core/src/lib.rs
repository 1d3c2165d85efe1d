//! Core of the `up` ingestion probe
//!
//! Periodically writes a sample (or a log batch) to a remote write endpoint,
//! reads it back through the query API, runs optional custom queries, and
//! judges the observed success ratios against a threshold.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod instr;
pub mod logging;
pub mod logs;
pub mod probe;
pub mod query;
pub mod remote_write;
pub mod report;
pub mod run_group;
pub mod runner;
pub mod scheduler;
pub mod server;
pub mod signals;
pub mod transport;

#[cfg(test)]
mod test_support;

// Re-export schema types for convenience
pub use schema::*;

pub use config::{Options, RawOptions};
pub use error::{CoreError, Result};
pub use report::{Threshold, VerdictError};
pub use runner::{run, Outcome};
