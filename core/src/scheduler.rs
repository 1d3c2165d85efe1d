//! Periodic task scheduler
//!
//! A [`PeriodicTask`] turns a [`Probe`] into a bounded, repeating execution:
//! one invocation per period, each on its own tokio task with its own
//! deadline, never overlapping with the previous one. The shared
//! [`RunContext`] only stops the ticking; an in-flight invocation is allowed
//! to finish up to its own deadline before the category verdict is computed.
//! An invocation cut at its deadline, or one that panicked, is handed back to
//! its probe as [`Probe::abandoned`] so it still counts as a failure.

use crate::probe::Probe;
use crate::report::{self, TallySource, Threshold, VerdictError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, sleep_until, timeout_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle shared by every probe loop: a cancellation token plus an
/// optional absolute deadline
#[derive(Debug, Clone)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    /// Context that ends after `duration`, or only when cancelled if `None`
    pub fn new(duration: Option<Duration>) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: duration.map(|d| Instant::now() + d),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Sleep for `delay`, returning `false` if the context ended first
    pub async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.done() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Bounds of a single invocation
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    /// 1-based invocation number
    pub seq: u64,
    /// Hard deadline; the invocation is dropped when it passes
    pub deadline: Instant,
}

impl TickContext {
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// A probe bound to its period, counters and threshold
pub struct PeriodicTask {
    probe: Arc<dyn Probe>,
    period: Duration,
    tally: Arc<dyn TallySource>,
    threshold: Threshold,
}

impl PeriodicTask {
    pub fn new(
        probe: Arc<dyn Probe>,
        period: Duration,
        tally: Arc<dyn TallySource>,
        threshold: Threshold,
    ) -> Self {
        Self {
            probe,
            period,
            tally,
            threshold,
        }
    }

    pub fn component(&self) -> &'static str {
        self.probe.component()
    }

    /// Schedule until `ctx` ends, then report the category verdict
    pub async fn run(self, ctx: RunContext) -> Result<(), VerdictError> {
        let invocations = self.schedule(&ctx).await;
        debug!(component = self.component(), invocations, "scheduling stopped");
        report::report(self.component(), self.tally.tally(), self.threshold)
    }

    /// Tick every period until `ctx` ends; returns the number of invocations
    ///
    /// The first tick fires one period after start.
    pub async fn schedule(&self, ctx: &RunContext) -> u64 {
        let component = self.component();
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: Option<(JoinHandle<()>, TickContext)> = None;
        let mut seq = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = ctx.done() => break,
                _ = ticker.tick() => {
                    if let Some((handle, tick)) = in_flight.take() {
                        reap(self.probe.as_ref(), handle, &tick).await;
                    }

                    seq += 1;
                    let tick = TickContext {
                        seq,
                        deadline: Instant::now() + self.period,
                    };
                    let probe = self.probe.clone();
                    let handle = tokio::spawn(async move {
                        if timeout_at(tick.deadline, probe.run_once(&tick)).await.is_err() {
                            warn!(component = probe.component(), seq = tick.seq, "invocation hit its deadline");
                            probe.abandoned(&tick);
                        }
                    });
                    in_flight = Some((handle, tick));
                }
            }
        }

        info!(component, "stopping, waiting for in-flight request");
        if let Some((mut handle, tick)) = in_flight {
            match timeout_at(tick.deadline, &mut handle).await {
                Ok(joined) => settle(self.probe.as_ref(), joined, &tick),
                Err(_) => reap(self.probe.as_ref(), handle, &tick).await,
            }
        }

        seq
    }
}

/// Abort the previous invocation if still present and account for it
async fn reap(probe: &dyn Probe, handle: JoinHandle<()>, tick: &TickContext) {
    handle.abort();
    settle(probe, handle.await, tick);
}

/// An invocation that finished by itself has recorded its outcome, either
/// from its result or from its own deadline; anything else has not
fn settle(probe: &dyn Probe, joined: Result<(), JoinError>, tick: &TickContext) {
    let Err(err) = joined else {
        return;
    };
    if err.is_panic() {
        error!(component = probe.component(), seq = tick.seq, err = %err, "invocation panicked");
    } else {
        warn!(component = probe.component(), seq = tick.seq, "invocation aborted at its deadline");
    }
    probe.abandoned(tick);
}
