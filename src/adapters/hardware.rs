//! Hardware adapter: bridges real peripherals to domain port traits.
//!
//! Owns the card reader, both scan channels, both bobbin sensors, the lamp
//! bank and the relay, exposing them through the port traits.  This is the
//! only module in the system that touches actual hardware.  It is generic
//! over the `embedded-hal` pin/bus types so host tests can drive it with
//! fakes.

use embedded_hal::digital::{InputPin, OutputPin};

use crate::app::ports::{IdentityPort, IndicatorPort, PresencePort, ScanPort, TimePort};
use crate::drivers::card_reader::{CardReader, KanbanReader};
use crate::drivers::indicators::{LampBank, RelayDriver};
use crate::drivers::scanner::{ScanChannel, ScanSerial};
use crate::error::TransportError;
use crate::fsm::context::LampState;
use crate::kanban::{CardIdentity, ThreadSpec};
use crate::scan::{ScanChannelId, ScanResult};
use crate::sensors::BobbinId;
use crate::sensors::bobbin::BobbinSensor;

/// Concrete adapter that combines all hardware behind port traits.
///
/// | Param | Role                                   |
/// |-------|----------------------------------------|
/// | `R`   | contactless reader chip                |
/// | `S`   | scanner serial link                    |
/// | `P`   | scanner trigger line                   |
/// | `I`   | bobbin sensor input                    |
/// | `O`   | lamp and relay output                  |
/// | `C`   | clock                                  |
pub struct HardwareAdapter<R, S, P, I, O, C> {
    card: KanbanReader<R>,
    scanners: [ScanChannel<S, P, C>; 2],
    bobbins: [BobbinSensor<I>; 2],
    lamps: LampBank<O>,
    relay: RelayDriver<O>,
    clock: C,
}

impl<R, S, P, I, O, C> HardwareAdapter<R, S, P, I, O, C>
where
    R: CardReader,
    S: ScanSerial,
    P: OutputPin,
    I: InputPin,
    O: OutputPin,
    C: TimePort,
{
    /// Takes ownership of every driver and forces the relay open and the
    /// lamps dark before anything else runs.
    pub fn new(
        card: KanbanReader<R>,
        scanners: [ScanChannel<S, P, C>; 2],
        bobbins: [BobbinSensor<I>; 2],
        lamps: LampBank<O>,
        relay: RelayDriver<O>,
        clock: C,
    ) -> Self {
        let mut hw = Self {
            card,
            scanners,
            bobbins,
            lamps,
            relay,
            clock,
        };
        hw.relay.set(false);
        hw.lamps.set(LampState::OFF);
        hw
    }

    pub fn relay_closed(&self) -> bool {
        self.relay.is_closed()
    }
}

// ── IdentityPort ──────────────────────────────────────────────

impl<R: CardReader, S, P, I, O, C> IdentityPort for HardwareAdapter<R, S, P, I, O, C> {
    fn reset_reader(&mut self) {
        self.card.reset();
    }

    fn is_card_present(&mut self) -> bool {
        self.card.is_card_present()
    }

    fn card_in_field(&mut self) -> Option<CardIdentity> {
        self.card.card_in_field()
    }

    fn read_identity_spec(&mut self) -> Result<(CardIdentity, ThreadSpec), TransportError> {
        self.card.read_identity_spec()
    }
}

// ── ScanPort ──────────────────────────────────────────────────

impl<R, S, P, I, O, C> ScanPort for HardwareAdapter<R, S, P, I, O, C>
where
    S: ScanSerial,
    P: OutputPin,
    C: TimePort,
{
    fn trigger(&mut self, channel: ScanChannelId) {
        self.scanners[channel.index()].trigger();
    }

    fn read_payload(&mut self, channel: ScanChannelId, timeout_ms: u32) -> ScanResult {
        self.scanners[channel.index()].read_payload(timeout_ms)
    }
}

// ── PresencePort ──────────────────────────────────────────────

impl<R, S, P, I: InputPin, O, C> PresencePort for HardwareAdapter<R, S, P, I, O, C> {
    fn read(&mut self, bobbin: BobbinId) -> bool {
        let idx = match bobbin {
            BobbinId::One => 0,
            BobbinId::Two => 1,
        };
        self.bobbins[idx].read()
    }
}

// ── IndicatorPort ─────────────────────────────────────────────

impl<R, S, P, I, O: OutputPin, C> IndicatorPort for HardwareAdapter<R, S, P, I, O, C> {
    fn set_lamps(&mut self, lamps: LampState) {
        self.lamps.set(lamps);
    }

    fn set_relay(&mut self, enabled: bool) {
        self.relay.set(enabled);
    }
}

// ── TimePort ──────────────────────────────────────────────────

impl<R, S, P, I, O, C: TimePort> TimePort for HardwareAdapter<R, S, P, I, O, C> {
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.delay_ms(ms);
    }
}
