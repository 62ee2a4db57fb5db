//! Throttled progress reporting for long-running repairs.

use crate::protocol::Console;
use std::time::{Duration, Instant};

/// Minimum spacing between two `PROGRESS=` lines.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Source of monotonic time.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Rate-limits a high-frequency progress stream. Updates that arrive inside
/// the throttle window are dropped, not queued; the next emitted line carries
/// whatever fraction is current at that moment.
#[derive(Debug)]
pub struct ProgressReporter<C: Clock = MonotonicClock> {
    clock: C,
    enabled: bool,
    interval: Duration,
    last_emit: Instant,
}

impl ProgressReporter<MonotonicClock> {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self::with_clock(enabled, MonotonicClock)
    }
}

impl<C: Clock> ProgressReporter<C> {
    /// The throttle window starts at construction, so the first line comes no
    /// earlier than one interval into the operation.
    pub fn with_clock(enabled: bool, clock: C) -> Self {
        let last_emit = clock.now();
        Self { clock, enabled, interval: PROGRESS_INTERVAL, last_emit }
    }

    #[cfg(test)]
    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    /// Handle one engine callback. Always asks the engine to continue.
    pub fn on_progress(&mut self, fraction: f64, _increment: f64, console: &mut Console<'_>) -> bool {
        if !self.enabled {
            return true;
        }
        let now = self.clock.now();
        if now.duration_since(self.last_emit) < self.interval {
            return true;
        }
        self.last_emit = now;
        console.progress(fraction);
        true
    }
}
