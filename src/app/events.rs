//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them; the firmware logs them to the console.

use crate::error::{FaultReason, TransportError};
use crate::fsm::StateId;
use crate::kanban::{CardIdentity, ThreadCode, ThreadSpec};
use crate::scan::{ScanChannelId, ScanResult};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The application service has started (carries initial state).
    Started(StateId),

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// A kanban card was read and decoded.
    CardRead { card: CardIdentity, spec: ThreadSpec },

    /// The card transport failed; the session restarts after a backoff.
    CardReadFailed(TransportError),

    /// A scan channel finished.  An empty payload means it timed out.
    ScanCompleted {
        channel: ScanChannelId,
        payload: ScanResult,
    },

    /// Expected-versus-scanned comparison for both threads.
    Verified(VerifyReport),

    /// The session entered `Fault`.
    FaultEntered(FaultReason),

    /// Periodic bobbin sensor snapshot.
    SensorSnapshot(SensorSnapshot),
}

/// Both comparisons performed in `Verifying`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub expected1: ThreadCode,
    pub scanned1: ScanResult,
    pub expected2: ThreadCode,
    pub scanned2: ScanResult,
}

impl VerifyReport {
    pub fn thread1_ok(&self) -> bool {
        self.expected1.as_str() == self.scanned1.as_str()
    }

    pub fn thread2_ok(&self) -> bool {
        self.expected2.as_str() == self.scanned2.as_str()
    }

    pub fn passed(&self) -> bool {
        self.thread1_ok() && self.thread2_ok()
    }
}

/// Bobbin sensor levels at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSnapshot {
    pub bobbin1: bool,
    pub bobbin2: bool,
    pub ms_in_state: u64,
}
