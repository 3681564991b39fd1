//! Kanban card data model and sector codec.
//!
//! A kanban card carries two thread codes, one per 16-byte sector:
//!
//! ```text
//!   sector 4 ── thread 1  (or the bypass keyword)
//!   sector 5 ── thread 2  (never read for bypass cards)
//! ```
//!
//! Codes are printable ASCII, zero- or space-padded to the sector size.

use core::fmt;

use crate::error::EncodeError;

/// Usable bytes per sector.
pub const SECTOR_SIZE: usize = 16;
/// Sector holding thread 1 (or the bypass keyword).
pub const THREAD1_SECTOR: u8 = 4;
/// Sector holding thread 2.
pub const THREAD2_SECTOR: u8 = 5;
/// Reserved thread-1 value that disables verification.
pub const BYPASS_KEYWORD: &str = "bypass";
/// Factory key-A shared by every sector of a kanban card.
pub const DEFAULT_KEY_A: [u8; 6] = [0xFF; 6];
/// Longest card UID (triple-size).
pub const MAX_UID_LEN: usize = 10;

/// A thread code as decoded from one sector.
pub type ThreadCode = heapless::String<SECTOR_SIZE>;

// ---------------------------------------------------------------------------
// ThreadSpec
// ---------------------------------------------------------------------------

/// The thread pair declared on a kanban card.
///
/// `is_bypass == true` voids both thread fields.  Otherwise a spec produced
/// by a successful read carries the decoded text verbatim; emptiness is
/// checked by the state machine, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadSpec {
    pub thread1: ThreadCode,
    pub thread2: ThreadCode,
    pub is_bypass: bool,
}

impl ThreadSpec {
    /// A regular two-thread spec.  Codes longer than a sector are truncated.
    pub fn new(thread1: &str, thread2: &str) -> Self {
        Self {
            thread1: truncated(thread1),
            thread2: truncated(thread2),
            is_bypass: false,
        }
    }

    /// A maintenance bypass spec.
    pub fn bypass() -> Self {
        Self {
            thread1: truncated(BYPASS_KEYWORD),
            thread2: ThreadCode::new(),
            is_bypass: true,
        }
    }

    /// True when both thread fields carry a code.
    pub fn is_complete(&self) -> bool {
        !self.thread1.is_empty() && !self.thread2.is_empty()
    }

    /// Reset to the empty spec `{"", "", false}`.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn truncated(s: &str) -> ThreadCode {
    let mut out = ThreadCode::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// CardIdentity
// ---------------------------------------------------------------------------

/// Opaque UID of the card currently understood to be present.
///
/// Used to tell "same card" from "different or no card"; never used for
/// authorization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardIdentity(heapless::Vec<u8, MAX_UID_LEN>);

impl CardIdentity {
    /// Build from raw UID bytes; bytes beyond the longest UID are dropped.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(MAX_UID_LEN);
        let mut v = heapless::Vec::new();
        // Length is bounded above, the extend cannot overflow.
        let _ = v.extend_from_slice(&bytes[..len]);
        Self(v)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Display for CardIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<none>");
        }
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sector codec
// ---------------------------------------------------------------------------

/// Decode a raw sector into a thread code.
///
/// Stops at the first zero byte, keeps only printable ASCII (32–126) and
/// trims surrounding whitespace.  Trailing padding therefore never reaches
/// the comparison in `Verifying`.
pub fn decode_sector(raw: &[u8]) -> ThreadCode {
    let mut text = heapless::String::<SECTOR_SIZE>::new();
    for &b in raw.iter().take(SECTOR_SIZE) {
        if b == 0 {
            break;
        }
        if (32..=126).contains(&b) {
            let _ = text.push(b as char);
        }
    }
    let trimmed = text.trim();
    let mut out = ThreadCode::new();
    let _ = out.push_str(trimmed);
    out
}

/// Encode a thread code into a zero-padded sector for card provisioning.
pub fn encode_sector(code: &str) -> Result<[u8; SECTOR_SIZE], EncodeError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(EncodeError::Empty);
    }
    if code.len() > SECTOR_SIZE {
        return Err(EncodeError::TooLong(code.len()));
    }
    let mut block = [0u8; SECTOR_SIZE];
    for (slot, &b) in block.iter_mut().zip(code.as_bytes()) {
        if !(32..=126).contains(&b) {
            return Err(EncodeError::NonPrintable(b));
        }
        *slot = b;
    }
    Ok(block)
}

/// Case-insensitive match against [`BYPASS_KEYWORD`].
pub fn is_bypass_keyword(thread1: &str) -> bool {
    thread1.eq_ignore_ascii_case(BYPASS_KEYWORD)
}
