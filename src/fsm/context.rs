//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the session record: the kanban spec and card identity
//! of the current session, the two scan results, the inputs gathered from
//! the hardware ports this tick, the output commands the handlers request,
//! and a per-state scratch area.  It is owned by
//! [`AppService`](crate::app::service::AppService) and only ever mutated
//! from inside one tick.

use crate::app::events::AppEvent;
use crate::config::SystemConfig;
use crate::error::{FaultReason, TransportError};
use crate::kanban::{CardIdentity, ThreadSpec};
use crate::scan::{ScanChannelId, ScanResult};

/// Events a single tick may queue for the sink.
pub const OUTBOX_CAP: usize = 4;

// ---------------------------------------------------------------------------
// Lamp vector
// ---------------------------------------------------------------------------

/// The four status lamps: one ready and one alarm lamp per thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LampState {
    pub ready1: bool,
    pub ready2: bool,
    pub alarm1: bool,
    pub alarm2: bool,
}

impl LampState {
    pub const OFF: Self = Self::new(false, false, false, false);
    pub const READY: Self = Self::new(true, true, false, false);
    pub const ALARM: Self = Self::new(false, false, true, true);

    pub const fn new(ready1: bool, ready2: bool, alarm1: bool, alarm2: bool) -> Self {
        Self {
            ready1,
            ready2,
            alarm1,
            alarm2,
        }
    }

    /// Ready lamp N follows bobbin N, alarm lamp N its absence.
    pub const fn from_bobbins(bobbin1: bool, bobbin2: bool) -> Self {
        Self::new(bobbin1, bobbin2, !bobbin1, !bobbin2)
    }

    /// Lit phase of the fault blink.  A scan timeout shows which channel
    /// failed; every other fault lights both alarm lamps.
    pub fn for_fault(reason: Option<FaultReason>) -> Self {
        match reason {
            Some(FaultReason::ScanTimeout(ScanChannelId::One)) => {
                Self::new(false, false, true, false)
            }
            Some(FaultReason::ScanTimeout(ScanChannelId::Two)) => {
                Self::new(true, false, false, true)
            }
            _ => Self::ALARM,
        }
    }
}

// ---------------------------------------------------------------------------
// Port inputs (written by the service before each FSM tick)
// ---------------------------------------------------------------------------

/// Readings gathered from the ports relevant to the current state.
///
/// Rebuilt from scratch every tick; a field a state did not ask for keeps
/// its default value.
#[derive(Debug, Clone, Default)]
pub struct PortInputs {
    pub card_present: bool,
    /// UID of the card answering in the field, for the enabled states.
    pub card_in_field: Option<CardIdentity>,
    pub card_read: Option<Result<(CardIdentity, ThreadSpec), TransportError>>,
    pub bobbin1: bool,
    pub bobbin2: bool,
    pub scan: Option<ScanResult>,
}

// ---------------------------------------------------------------------------
// Output commands (written by state handlers; applied by the service)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputCommands {
    /// Lamp vector to render this tick.
    pub lamps: LampState,
    /// Requested relay level.  Only honoured in the enabled states.
    pub relay: bool,
    /// Bounded pause to take after the outputs are applied (0 = none).
    /// One-shot: the service consumes it.
    pub settle_delay_ms: u32,
}

impl OutputCommands {
    /// Relay off, lamps dark.
    pub fn all_off() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Per-state scratch
// ---------------------------------------------------------------------------

/// Flags that live for exactly one visit to one state.
///
/// The FSM engine resets this on every transition, so a flag set during
/// one visit can never be observed by the next state or by a later
/// re-entry into the same state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateScratch {
    /// The card reader was reinitialised during this visit.
    pub reader_reset: bool,
    /// The card read was attempted during this visit.
    pub read_attempted: bool,
    /// The scan channel was triggered during this visit.
    pub scan_started: bool,
    /// Since when both bobbins have read present without interruption.
    pub both_present_since_ms: Option<u64>,
    /// Timestamp of the last sensor snapshot logged during this visit.
    pub last_snapshot_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext {
    // -- Timing --
    /// Monotonic time of the current tick (milliseconds).
    pub now_ms: u64,
    /// Monotonic time at which the current state was entered.
    pub state_entered_ms: u64,

    // -- Session --
    /// Thread pair declared on the current kanban card.
    pub spec: ThreadSpec,
    /// UID of the card the session was started with.
    pub card: CardIdentity,
    /// Scan payloads, indexed by [`ScanChannelId::index`].
    pub scans: [ScanResult; 2],
    /// Why the session is in `Fault`, if it is.
    pub fault: Option<FaultReason>,

    // -- Per-state --
    pub scratch: StateScratch,

    // -- I/O --
    /// Readings gathered this tick.
    pub inputs: PortInputs,
    /// Outputs requested by the handlers.
    pub commands: OutputCommands,
    /// Events queued by the handlers for the sink.
    pub outbox: heapless::Vec<AppEvent, OUTBOX_CAP>,

    // -- Configuration --
    pub config: SystemConfig,
}

impl FsmContext {
    /// Create a new context with the given configuration.
    pub fn new(config: SystemConfig) -> Self {
        Self {
            now_ms: 0,
            state_entered_ms: 0,
            spec: ThreadSpec::default(),
            card: CardIdentity::default(),
            scans: [ScanResult::new(), ScanResult::new()],
            fault: None,
            scratch: StateScratch::default(),
            inputs: PortInputs::default(),
            commands: OutputCommands::all_off(),
            outbox: heapless::Vec::new(),
            config,
        }
    }

    /// Milliseconds elapsed since the current state was entered.
    pub fn ms_in_state(&self) -> u64 {
        self.now_ms.saturating_sub(self.state_entered_ms)
    }

    /// Discard everything learned during the session.
    pub fn reset_session(&mut self) {
        self.spec.clear();
        self.card.clear();
        for scan in &mut self.scans {
            scan.clear();
        }
        self.fault = None;
    }

    /// Scan payload of one channel.
    pub fn scan(&self, channel: ScanChannelId) -> &ScanResult {
        &self.scans[channel.index()]
    }

    /// Queue an event for the sink.  Overflow drops the event; the outbox
    /// is drained every tick and no handler queues more than two.
    pub fn emit(&mut self, event: AppEvent) {
        if self.outbox.push(event).is_err() {
            log::warn!("FSM: event outbox full, dropping event");
        }
    }
}
