//! Unified error types for the ThreadGate firmware.
//!
//! Every variant is `Copy` so errors can be latched into the FSM context
//! and passed through the event sink without allocation.  None of them is
//! fatal: each one maps onto a state transition (retry from `Idle`, or
//! `Fault` until the operator clears the bobbins).

use core::fmt;

use crate::scan::ScanChannelId;

// ---------------------------------------------------------------------------
// Identity transport errors
// ---------------------------------------------------------------------------

/// Failure reported by the card identity transport.
///
/// The state machine treats every variant the same way (back off, return to
/// `Idle`), but the variants stay distinct for field diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No card answered the select sequence.
    NotPresent,
    /// Key-A authentication against the given sector was rejected.
    AuthFailed(u8),
    /// The authenticated block read failed or returned a short frame.
    ReadFailed(u8),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPresent => write!(f, "no card present"),
            Self::AuthFailed(sector) => write!(f, "authentication failed for sector {sector}"),
            Self::ReadFailed(sector) => write!(f, "read failed for sector {sector}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fault reasons
// ---------------------------------------------------------------------------

/// Why the machine entered `Fault`.  Latched in the context while the
/// state is active and reported through the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultReason {
    /// The card read succeeded but a thread field decoded empty.
    InvalidKanban,
    /// A scan channel produced no payload inside its window.
    ScanTimeout(ScanChannelId),
    /// Both payloads were read but at least one differs from the kanban.
    VerificationMismatch { thread1_ok: bool, thread2_ok: bool },
    /// Both bobbins were not loaded within the waiting window.
    SensorTimeout,
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKanban => write!(f, "invalid kanban data"),
            Self::ScanTimeout(ch) => write!(f, "scan timeout on {ch}"),
            Self::VerificationMismatch {
                thread1_ok,
                thread2_ok,
            } => write!(
                f,
                "verification mismatch (thread1={}, thread2={})",
                if *thread1_ok { "ok" } else { "MISMATCH" },
                if *thread2_ok { "ok" } else { "MISMATCH" },
            ),
            Self::SensorTimeout => write!(f, "bobbins not loaded in time"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from loading or validating [`SystemConfig`](crate::config::SystemConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The profile text was not valid JSON for the config schema.
    Malformed,
    /// A field failed range validation.
    /// The `&'static str` names the field and the violated bound.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "config profile malformed"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Provisioning errors
// ---------------------------------------------------------------------------

/// Errors from encoding a thread code into a card sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// The code does not fit in one 16-byte sector.
    TooLong(usize),
    /// The code contains a byte outside printable ASCII.
    NonPrintable(u8),
    /// The code is empty after trimming.
    Empty,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong(len) => write!(f, "thread code is {len} bytes, max 16"),
            Self::NonPrintable(b) => write!(f, "non-printable byte 0x{b:02X} in thread code"),
            Self::Empty => write!(f, "thread code is empty"),
        }
    }
}
