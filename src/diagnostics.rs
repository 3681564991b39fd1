//! Session counters.
//!
//! [`SessionStats`] is folded from the event stream the service publishes,
//! so it counts exactly what the operator saw in the log.  The summary
//! line is logged each time a session returns to `Idle`.

use core::fmt;

use crate::app::events::AppEvent;
use crate::error::FaultReason;
use crate::fsm::StateId;

/// Counters accumulated since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Kanban cards read and decoded.
    pub cards_read: u32,
    /// Card reads that failed in the transport.
    pub read_failures: u32,
    /// Sessions that reached `Enabled`.
    pub verified: u32,
    /// Sessions that reached `BypassEnabled`.
    pub bypassed: u32,
    pub invalid_kanban: u32,
    pub sensor_timeouts: u32,
    pub scan_timeouts: u32,
    pub mismatches: u32,
}

impl SessionStats {
    /// Fold one published event into the counters.
    pub fn record(&mut self, event: &AppEvent) {
        match event {
            AppEvent::CardRead { .. } => self.cards_read += 1,
            AppEvent::CardReadFailed(_) => self.read_failures += 1,
            AppEvent::StateChanged { to, .. } => match to {
                StateId::Enabled => self.verified += 1,
                StateId::BypassEnabled => self.bypassed += 1,
                _ => {}
            },
            AppEvent::FaultEntered(reason) => match reason {
                FaultReason::InvalidKanban => self.invalid_kanban += 1,
                FaultReason::SensorTimeout => self.sensor_timeouts += 1,
                FaultReason::ScanTimeout(_) => self.scan_timeouts += 1,
                FaultReason::VerificationMismatch { .. } => self.mismatches += 1,
            },
            _ => {}
        }
    }

    /// Total sessions that ended in `Fault`.
    pub fn faults(&self) -> u32 {
        self.invalid_kanban + self.sensor_timeouts + self.scan_timeouts + self.mismatches
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cards={} read_fail={} verified={} bypass={} faults={} \
             (kanban={} sensor={} scan={} mismatch={})",
            self.cards_read,
            self.read_failures,
            self.verified,
            self.bypassed,
            self.faults(),
            self.invalid_kanban,
            self.sensor_timeouts,
            self.scan_timeouts,
            self.mismatches,
        )
    }
}
