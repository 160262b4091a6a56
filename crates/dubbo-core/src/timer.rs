//! A coarse deadline timer standing in for a hashed-wheel timer.
//!
//! Rather than arm one OS timer per in-flight call, the pending-call
//! registry ticks on this interval and sweeps for expired deadlines in
//! one pass - the same shape as the reactor's `cleanup_interval` loop,
//! generalized into its own tick so other components (the heartbeat
//! watcher) can share the cadence without duplicating the `tokio::time`
//! boilerplate.

use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Default sweep granularity. Deadlines fire up to this long after they
/// technically expire - coarse, not exact, by design.
pub const TICK: Duration = Duration::from_millis(30);

/// Build a ticker with the sweep's standard `Skip` behavior: a slow
/// consumer never gets a burst of queued ticks, it just catches up.
pub fn ticker(period: Duration) -> Interval {
    let mut int = interval(period);
    int.set_missed_tick_behavior(MissedTickBehavior::Skip);
    int
}
