//! Status lamps and the machine-enable relay.
//!
//! Both drivers cache the last level written and only touch the pins on a
//! change, so the service can re-apply its outputs every tick.  A failed
//! write leaves the cache unset and is retried on the next tick.
//!
//! The relay cache starts empty: the first `set` always drives the pin,
//! which is how boot forces the relay open.

use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use crate::fsm::context::LampState;

fn drive<O: OutputPin>(pin: &mut O, on: bool) -> bool {
    let res = if on { pin.set_high() } else { pin.set_low() };
    match res {
        Ok(()) => true,
        Err(e) => {
            warn!("GPIO write failed: {e:?}");
            false
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Lamps
// ───────────────────────────────────────────────────────────────

/// Four active-high lamp outputs.
pub struct LampBank<O> {
    ready1: O,
    ready2: O,
    alarm1: O,
    alarm2: O,
    current: Option<LampState>,
}

impl<O: OutputPin> LampBank<O> {
    pub fn new(ready1: O, ready2: O, alarm1: O, alarm2: O) -> Self {
        Self {
            ready1,
            ready2,
            alarm1,
            alarm2,
            current: None,
        }
    }

    pub fn set(&mut self, lamps: LampState) {
        if self.current == Some(lamps) {
            return;
        }
        let ok = drive(&mut self.ready1, lamps.ready1)
            & drive(&mut self.ready2, lamps.ready2)
            & drive(&mut self.alarm1, lamps.alarm1)
            & drive(&mut self.alarm2, lamps.alarm2);
        self.current = ok.then_some(lamps);
        debug!("LAMPS: {lamps:?}");
    }
}

// ───────────────────────────────────────────────────────────────
// Relay
// ───────────────────────────────────────────────────────────────

/// Active-high relay that gates the sewing machine.
pub struct RelayDriver<O> {
    pin: O,
    closed: Option<bool>,
}

impl<O: OutputPin> RelayDriver<O> {
    pub fn new(pin: O) -> Self {
        Self { pin, closed: None }
    }

    pub fn set(&mut self, closed: bool) {
        if self.closed == Some(closed) {
            return;
        }
        if drive(&mut self.pin, closed) {
            self.closed = Some(closed);
            info!("RELAY: machine {}", if closed { "ENABLED" } else { "disabled" });
        } else {
            self.closed = None;
        }
    }

    /// Last level successfully written, `false` before the first write.
    pub fn is_closed(&self) -> bool {
        self.closed.unwrap_or(false)
    }
}
