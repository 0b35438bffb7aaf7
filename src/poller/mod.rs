//! Quote polling module
//!
//! One task per active pair samples both venues on a fixed interval and
//! hands the combined snapshot to the sink. A runner owns discovery and
//! the shutdown signal.

mod pair;
mod runner;

pub use pair::{PairPoller, PollerExit};
pub use runner::{LinkRunner, ShutdownHandle};

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::time::Duration;
use tokio::sync::watch;

/// Poll loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Time between snapshots of one pair
    pub interval: Duration,
    /// First retry delay after a failed tick
    pub retry_delay: Duration,
    /// Bound on each upstream fetch
    pub fetch_timeout: Duration,
    /// Time between discovery passes
    pub discovery_interval: Duration,
    /// Bound on listing events in one discovery pass
    pub discovery_timeout: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            retry_delay: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(15),
            discovery_interval: Duration::from_secs(86_400),
            discovery_timeout: Duration::from_secs(300),
        }
    }
}

impl Schedule {
    /// Delay before the next tick after `failures` consecutive failures
    ///
    /// Doubles from `retry_delay` and never exceeds `interval`.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.interval;
        }
        let factor = 1u32 << (failures - 1).min(16);
        self.retry_delay.saturating_mul(factor).min(self.interval)
    }
}

/// Timestamp for the next snapshot of a pair
///
/// Truncated to microseconds (the storage resolution) and bumped past the
/// previous one so a pair's timestamps strictly increase.
pub fn next_timestamp(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let step = TimeDelta::microseconds(1);
    let now = now.duration_trunc(step).unwrap_or(now);
    match last {
        Some(prev) if now <= prev => prev + step,
        _ => now,
    }
}

/// Resolves once shutdown is signalled or the sender is gone
pub(crate) async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
