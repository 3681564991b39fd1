//! Fixed-rate tick pacing.
//!
//! The control loop runs at `tick_interval_ms`.  Deadlines are absolute so
//! short ticks do not accumulate drift.  A tick that blocks past its
//! deadline (a scan window, a settle pause) is counted as an overrun and
//! the schedule re-anchors on the current time instead of bursting to
//! catch up.
//!
//! ```text
//!   deadline ─┬──── period ────┬──── period ────┬─────────── ...
//!             │ tick │  sleep  │ tick (blocks past deadline) │ re-anchor
//! ```

use core::fmt;

use crate::app::ports::TimePort;

/// O(1) pacing statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Ticks paced so far.
    pub cycle_count: u64,
    /// Ticks that started after their deadline.
    pub overruns: u64,
    /// Worst lateness against a deadline (milliseconds).
    pub max_late_ms: u64,
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycles={} overruns={} max_late={}ms",
            self.cycle_count, self.overruns, self.max_late_ms
        )
    }
}

/// Absolute-deadline pacer for the control loop.
pub struct TickScheduler {
    period_ms: u64,
    next_deadline_ms: Option<u64>,
    stats: CycleStats,
}

impl TickScheduler {
    pub fn new(period_ms: u32) -> Self {
        Self {
            period_ms: u64::from(period_ms.max(1)),
            next_deadline_ms: None,
            stats: CycleStats::default(),
        }
    }

    /// Sleep until the next deadline.  The first call returns immediately.
    pub fn wait_next(&mut self, clock: &mut impl TimePort) {
        let now = clock.now_ms();
        self.stats.cycle_count += 1;

        let Some(deadline) = self.next_deadline_ms else {
            self.next_deadline_ms = Some(now + self.period_ms);
            return;
        };

        if now < deadline {
            // Deadline is at most one period away, the cast cannot truncate.
            clock.delay_ms((deadline - now) as u32);
            self.next_deadline_ms = Some(deadline + self.period_ms);
        } else {
            let late = now - deadline;
            if late > 0 {
                self.stats.overruns += 1;
                self.stats.max_late_ms = self.stats.max_late_ms.max(late);
                log::debug!("SCHED: tick overran by {late} ms");
            }
            self.next_deadline_ms = Some(now + self.period_ms);
        }
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }
}
