//! Probes: one unit of verification work per scheduler tick
//!
//! Each probe records its own outcome in its category counters. The scheduler
//! bounds and sequences invocations, and tells the probe about every
//! invocation that ended without reaching its own bookkeeping.

use crate::scheduler::TickContext;
use async_trait::async_trait;

mod custom;
mod read;
mod write;

pub use custom::CustomQueryProbe;
pub use read::{sample_lag, verify_sample_latency, ReadBackend, ReadError, ReadProbe};
pub use write::WriteProbe;

/// Component name of the write probe
pub const WRITER: &str = "writer";
/// Component name of the read-back probe
pub const READER: &str = "reader";
/// Component name of the custom-query probe
pub const QUERY_READER: &str = "query-reader";

/// A periodically invoked verification task
#[async_trait]
pub trait Probe: Send + Sync {
    /// Category used for logging and outcome counting
    fn component(&self) -> &'static str;

    /// Perform one invocation and record its outcome
    ///
    /// The scheduler drops the returned future when `tick.deadline` passes.
    async fn run_once(&self, tick: &TickContext);

    /// Record an invocation that was cut at its deadline or panicked
    fn abandoned(&self, tick: &TickContext);
}
