//! Scan-channel response framing.
//!
//! A scanner answers a trigger with a fixed-length protocol header followed
//! by the ASCII label payload and a CR/LF terminator:
//!
//! ```text
//!   ┌──────────── 7 bytes ───────────┐┌─── payload ───┐┌────┐
//!   │ 02 00 00 01 00 33 31 (ignored) ││ R E D - 4 0   ││ CR │ LF ...
//!   └────────────────────────────────┘└───────────────┘└────┘
//! ```
//!
//! [`FrameAccumulator`] is the pure byte-level half of the channel: it has
//! no notion of time.  The quiet-period and timeout rules live in
//! [`ScanChannel`](crate::drivers::scanner::ScanChannel).

use core::fmt;

/// Longest payload kept from one frame; extra bytes are dropped.
pub const MAX_PAYLOAD: usize = 64;

/// Payload read from one scan channel.  Empty means "nothing obtained".
pub type ScanResult = heapless::String<MAX_PAYLOAD>;

/// Identifies one of the two independent scan channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanChannelId {
    One,
    Two,
}

impl ScanChannelId {
    pub const fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
        }
    }
}

impl fmt::Display for ScanChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => write!(f, "channel 1"),
            Self::Two => write!(f, "channel 2"),
        }
    }
}

/// What happened to one byte pushed into the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteClass {
    Header,
    Payload,
    Terminator,
    Ignored,
}

/// Byte-level frame parser for one scan response.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    header_len: usize,
    header_left: usize,
    payload: ScanResult,
    terminated: bool,
}

impl FrameAccumulator {
    pub fn new(header_len: usize) -> Self {
        Self {
            header_len,
            header_left: header_len,
            payload: ScanResult::new(),
            terminated: false,
        }
    }

    /// Prepare for a new frame.
    pub fn reset(&mut self) {
        self.header_left = self.header_len;
        self.payload.clear();
        self.terminated = false;
    }

    /// Feed one received byte.
    ///
    /// Header bytes are skipped whatever their value.  A CR or LF only ends
    /// the frame once at least one payload byte has been collected; bytes
    /// after the terminator are discarded.
    pub fn push(&mut self, byte: u8) -> ByteClass {
        if self.header_left > 0 {
            self.header_left -= 1;
            return ByteClass::Header;
        }
        if self.terminated {
            return ByteClass::Ignored;
        }
        match byte {
            b'\r' | b'\n' if !self.payload.is_empty() => {
                self.terminated = true;
                ByteClass::Terminator
            }
            32..=126 => {
                let _ = self.payload.push(byte as char);
                ByteClass::Payload
            }
            _ => ByteClass::Ignored,
        }
    }

    /// True once a terminator followed a non-empty payload.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// The collected payload, trimmed.
    pub fn payload(&self) -> ScanResult {
        let mut out = ScanResult::new();
        let _ = out.push_str(self.payload.trim());
        out
    }
}
