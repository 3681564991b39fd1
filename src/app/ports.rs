//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (card reader, scan channels, bobbin sensors, lamps and
//! relay, clock, event sinks) implement these traits.  The
//! [`AppService`](super::service::AppService) consumes them via generics,
//! so the domain core never touches hardware directly.
//!
//! ## Blocking
//!
//! [`IdentityPort::read_identity_spec`] and [`ScanPort::read_payload`] block
//! for a bounded time (one card transaction, one scan window).  Everything
//! else returns immediately.

use crate::error::TransportError;
use crate::fsm::context::LampState;
use crate::kanban::{CardIdentity, ThreadSpec};
use crate::scan::{ScanChannelId, ScanResult};
use crate::sensors::BobbinId;

// ───────────────────────────────────────────────────────────────
// Identity port (kanban card transport)
// ───────────────────────────────────────────────────────────────

/// Contactless card access used for kanban reads.
pub trait IdentityPort {
    /// Reinitialise the transport so presence detection works again after
    /// a card was halted.
    fn reset_reader(&mut self);

    /// Whether a card is currently in the field.
    fn is_card_present(&mut self) -> bool;

    /// Select whatever card is in the field and return its UID, or `None`
    /// when no card answers.  The card is halted again before returning.
    fn card_in_field(&mut self) -> Option<CardIdentity>;

    /// Select the card, authenticate and read both thread sectors.
    ///
    /// A bypass card returns after the first sector; thread 2 is never read.
    /// The card is halted before returning, success or not.
    fn read_identity_spec(&mut self) -> Result<(CardIdentity, ThreadSpec), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Scan port (two label scanners)
// ───────────────────────────────────────────────────────────────

/// Two independent label scanners.
pub trait ScanPort {
    /// Ask the channel for one reading.  Input received before the trigger
    /// is discarded.
    fn trigger(&mut self, channel: ScanChannelId);

    /// Wait for the channel's response.  The window is measured from the
    /// start of the last `trigger`.  Returns an empty result on timeout.
    fn read_payload(&mut self, channel: ScanChannelId, timeout_ms: u32) -> ScanResult;
}

// ───────────────────────────────────────────────────────────────
// Presence port (bobbin sensors)
// ───────────────────────────────────────────────────────────────

/// Digital presence sensors, polarity already applied.
pub trait PresencePort {
    /// `true` when a bobbin is loaded.
    fn read(&mut self, bobbin: BobbinId) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Indicator port (lamps and machine relay)
// ───────────────────────────────────────────────────────────────

/// Write-side port: lamps and the machine-enable relay.
pub trait IndicatorPort {
    /// Drive all four lamps.
    fn set_lamps(&mut self, lamps: LampState);

    /// Close (`true`) or open the machine relay.
    fn set_relay(&mut self, enabled: bool);
}

// ───────────────────────────────────────────────────────────────
// Time port
// ───────────────────────────────────────────────────────────────

/// Monotonic clock plus a blocking delay.
pub trait TimePort {
    /// Milliseconds since an arbitrary fixed epoch.
    fn now_ms(&self) -> u64;

    /// Block for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Aggregate
// ───────────────────────────────────────────────────────────────

/// Every driven port the service needs from the machine.
pub trait MachinePorts: IdentityPort + ScanPort + PresencePort + IndicatorPort + TimePort {}

impl<T> MachinePorts for T where T: IdentityPort + ScanPort + PresencePort + IndicatorPort + TimePort {}
