//! Serial label scanner channel.
//!
//! Each channel is a UART plus an optional trigger line.  A reading is
//! requested either with a timed HIGH pulse on the trigger line or by
//! writing a 9-byte command frame to the UART.  The response is parsed by
//! [`FrameAccumulator`]; this driver adds the timing rules:
//!
//! - the response window is measured from the start of the trigger,
//! - after the CR/LF terminator the line must stay quiet for
//!   `quiet_ms` before the payload is accepted,
//! - nothing inside the window yields an empty result.

use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::app::ports::TimePort;
use crate::config::{SystemConfig, TriggerMode};
use crate::scan::{FrameAccumulator, ScanChannelId, ScanResult};

/// Command frame that starts a single scan in command mode.
pub const TRIGGER_FRAME: [u8; 9] = [0x7E, 0x00, 0x08, 0x01, 0x00, 0x02, 0x01, 0xAB, 0xCD];

/// Receive poll granularity while waiting for a response.
const POLL_INTERVAL_MS: u32 = 10;

/// Byte-level serial link of one scanner.
pub trait ScanSerial {
    /// Next received byte, or `None` if the receive buffer is empty.
    fn read_byte(&mut self) -> Option<u8>;

    /// Transmit `bytes`.
    fn write_all(&mut self, bytes: &[u8]);

    /// Drop everything received so far.
    fn clear_input(&mut self) {
        while self.read_byte().is_some() {}
    }
}

/// Per-channel timing and framing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub trigger: TriggerMode,
    pub pulse_ms: u32,
    pub quiet_ms: u32,
    pub header_len: usize,
}

impl ScanSettings {
    pub fn from_config(config: &SystemConfig, channel: ScanChannelId) -> Self {
        Self {
            trigger: match channel {
                ScanChannelId::One => config.scan1_trigger,
                ScanChannelId::Two => config.scan2_trigger,
            },
            pulse_ms: config.trigger_pulse_ms,
            quiet_ms: config.scan_quiet_ms,
            header_len: usize::from(config.scan_header_len),
        }
    }
}

pub struct ScanChannel<S, P, C> {
    id: ScanChannelId,
    serial: S,
    trigger_pin: Option<P>,
    clock: C,
    settings: ScanSettings,
    frame: FrameAccumulator,
    triggered_at_ms: Option<u64>,
}

impl<S, P, C> ScanChannel<S, P, C>
where
    S: ScanSerial,
    P: OutputPin,
    C: TimePort,
{
    pub fn new(
        id: ScanChannelId,
        serial: S,
        trigger_pin: Option<P>,
        clock: C,
        settings: ScanSettings,
    ) -> Self {
        let mut channel = Self {
            id,
            serial,
            trigger_pin,
            clock,
            settings,
            frame: FrameAccumulator::new(settings.header_len),
            triggered_at_ms: None,
        };
        channel.release_trigger();
        channel
    }

    /// Flush stale input and request one reading.
    pub fn trigger(&mut self) {
        self.serial.clear_input();
        self.frame.reset();
        self.triggered_at_ms = Some(self.clock.now_ms());

        match self.settings.trigger {
            TriggerMode::Pulse => {
                let Some(pin) = self.trigger_pin.as_mut() else {
                    warn!("SCAN: {} has no trigger line", self.id);
                    return;
                };
                if let Err(e) = pin.set_high() {
                    warn!("SCAN: {} trigger failed: {e:?}", self.id);
                    return;
                }
                self.clock.delay_ms(self.settings.pulse_ms);
                self.release_trigger();
            }
            TriggerMode::CommandFrame => self.serial.write_all(&TRIGGER_FRAME),
        }
        debug!("SCAN: {} triggered", self.id);
    }

    /// Block until a complete frame has been received and the line has
    /// gone quiet, or until `timeout_ms` after the trigger started.
    pub fn read_payload(&mut self, timeout_ms: u32) -> ScanResult {
        let start = match self.triggered_at_ms.take() {
            Some(t) => t,
            None => self.clock.now_ms(),
        };
        let deadline = start + u64::from(timeout_ms);
        let quiet = u64::from(self.settings.quiet_ms);
        let mut last_rx_ms: Option<u64> = None;

        loop {
            let now = self.clock.now_ms();
            let mut received = false;
            while let Some(byte) = self.serial.read_byte() {
                self.frame.push(byte);
                received = true;
            }
            if received {
                last_rx_ms = Some(now);
            }

            if self.frame.is_terminated() {
                let silent_for = now.saturating_sub(last_rx_ms.unwrap_or(now));
                if silent_for >= quiet || now >= deadline {
                    let payload = self.frame.payload();
                    debug!("SCAN: {} read '{}'", self.id, payload);
                    return payload;
                }
            } else if now >= deadline {
                warn!("SCAN: {} timed out after {} ms", self.id, timeout_ms);
                return ScanResult::new();
            }

            // Deadline is at most one scan window away.
            let remaining = (deadline - now) as u32;
            self.clock.delay_ms(POLL_INTERVAL_MS.min(remaining.max(1)));
        }
    }

    fn release_trigger(&mut self) {
        if let Some(pin) = self.trigger_pin.as_mut() {
            if let Err(e) = pin.set_low() {
                warn!("SCAN: {} trigger release failed: {e:?}", self.id);
            }
        }
    }
}
