//! Full-stack sessions through the real drivers.
//!
//! `AppService` runs against a `HardwareAdapter` built from the production
//! drivers (`KanbanReader`, `ScanChannel`, `BobbinSensor`, `LampBank`,
//! `RelayDriver`) with only the lowest seams faked: GPIO pins, the card
//! chip and the scanner UARTs.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use threadgate::adapters::hardware::HardwareAdapter;
use threadgate::app::ports::TimePort;
use threadgate::app::service::AppService;
use threadgate::config::{SystemConfig, TriggerMode};
use threadgate::drivers::card_reader::{CardReader, KanbanReader};
use threadgate::drivers::indicators::{LampBank, RelayDriver};
use threadgate::drivers::scanner::{ScanChannel, ScanSerial, ScanSettings, TRIGGER_FRAME};
use threadgate::fsm::StateId;
use threadgate::kanban::{encode_sector, CardIdentity, THREAD1_SECTOR, THREAD2_SECTOR};
use threadgate::scan::ScanChannelId;
use threadgate::sensors::bobbin::BobbinSensor;
use threadgate::sensors::BobbinId;

use crate::mock_hw::RecordingSink;

// ── Fakes ─────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct SimClock(Rc<Cell<u64>>);

impl TimePort for SimClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.set(self.0.get() + u64::from(ms));
    }
}

#[derive(Clone, Default)]
struct Pin {
    level: Rc<Cell<bool>>,
    rises: Rc<Cell<u32>>,
}

impl Pin {
    fn high(&self) -> bool {
        self.level.get()
    }
}

impl ErrorType for Pin {
    type Error = Infallible;
}

impl OutputPin for Pin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.level.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        if !self.level.get() {
            self.rises.set(self.rises.get() + 1);
        }
        self.level.set(true);
        Ok(())
    }
}

impl InputPin for Pin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.level.get())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.level.get())
    }
}

/// Card chip with blocks keyed by address.
#[derive(Clone, Default)]
struct Card {
    present: Rc<Cell<bool>>,
    uid: Rc<Cell<[u8; 4]>>,
    blocks: Rc<RefCell<HashMap<u8, [u8; 16]>>>,
    halts: Rc<Cell<u32>>,
}

impl Card {
    fn write(&self, block: u8, code: &str) {
        let raw = encode_sector(code).unwrap();
        self.blocks.borrow_mut().insert(block, raw);
    }
}

impl CardReader for Card {
    type Error = &'static str;

    fn reinit(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn wake(&mut self) -> Result<bool, Self::Error> {
        Ok(self.present.get())
    }

    fn select(&mut self) -> Result<CardIdentity, Self::Error> {
        if self.present.get() {
            Ok(CardIdentity::from_bytes(&self.uid.get()))
        } else {
            Err("timeout")
        }
    }

    fn authenticate(&mut self, _: u8, key: &[u8; 6], _: &CardIdentity) -> Result<(), Self::Error> {
        if *key == [0xFF; 6] {
            Ok(())
        } else {
            Err("auth")
        }
    }

    fn read_block(&mut self, block: u8) -> Result<[u8; 16], Self::Error> {
        self.blocks.borrow().get(&block).copied().ok_or("read")
    }

    fn halt(&mut self) {
        self.halts.set(self.halts.get() + 1);
    }
}

/// Scanner UART that answers each trigger with a queued frame.
#[derive(Clone, Default)]
struct Scanner {
    answers: Rc<RefCell<VecDeque<Vec<u8>>>>,
    rx: Rc<RefCell<VecDeque<u8>>>,
    written: Rc<RefCell<Vec<u8>>>,
}

impl Scanner {
    fn answer(&self, payload: &str) {
        let mut frame = vec![0x02, 0x00, 0x00, 0x01, 0x00, 0x33, 0x31];
        frame.extend_from_slice(payload.as_bytes());
        frame.extend_from_slice(b"\r\n");
        self.answers.borrow_mut().push_back(frame);
    }
}

impl ScanSerial for Scanner {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.borrow_mut().pop_front()
    }

    fn write_all(&mut self, bytes: &[u8]) {
        self.written.borrow_mut().extend_from_slice(bytes);
    }

    fn clear_input(&mut self) {
        let mut rx = self.rx.borrow_mut();
        rx.clear();
        // The scanner answers the trigger that follows this flush.
        if let Some(frame) = self.answers.borrow_mut().pop_front() {
            rx.extend(frame);
        }
    }
}

// ── Bench ─────────────────────────────────────────────────────

type Adapter = HardwareAdapter<Card, Scanner, Pin, Pin, Pin, SimClock>;

struct Bench {
    app: AppService,
    hw: Adapter,
    sink: RecordingSink,
    clock: SimClock,
    card: Card,
    scanners: [Scanner; 2],
    triggers: [Pin; 2],
    bobbins: [Pin; 2],
    lamps: [Pin; 4],
    relay: Pin,
}

impl Bench {
    fn new(config: SystemConfig) -> Self {
        let clock = SimClock::default();
        let card = Card::default();
        card.uid.set([0x04, 0x11, 0x22, 0x33]);
        let scanners: [Scanner; 2] = Default::default();
        let triggers: [Pin; 2] = Default::default();
        let bobbins: [Pin; 2] = Default::default();
        let lamps: [Pin; 4] = Default::default();
        let relay = Pin::default();

        // Active-low sensors: a high line means the spindle is empty.
        for b in &bobbins {
            b.level.set(true);
        }

        let channels = [ScanChannelId::One, ScanChannelId::Two].map(|id| {
            ScanChannel::new(
                id,
                scanners[id.index()].clone(),
                Some(triggers[id.index()].clone()),
                clock.clone(),
                ScanSettings::from_config(&config, id),
            )
        });

        let mut hw = HardwareAdapter::new(
            KanbanReader::new(card.clone()).with_key(config.card_key),
            channels,
            [
                BobbinSensor::new(BobbinId::One, bobbins[0].clone(), config.bobbin1_polarity),
                BobbinSensor::new(BobbinId::Two, bobbins[1].clone(), config.bobbin2_polarity),
            ],
            LampBank::new(
                lamps[0].clone(),
                lamps[1].clone(),
                lamps[2].clone(),
                lamps[3].clone(),
            ),
            RelayDriver::new(relay.clone()),
            clock.clone(),
        );

        let mut app = AppService::new(config);
        let mut sink = RecordingSink::new();
        app.start(&mut hw, &mut sink);

        Self {
            app,
            hw,
            sink,
            clock,
            card,
            scanners,
            triggers,
            bobbins,
            lamps,
            relay,
        }
    }

    fn present(&self, thread1: &str, thread2: &str) {
        self.card.write(THREAD1_SECTOR, thread1);
        self.card.write(THREAD2_SECTOR, thread2);
        self.card.present.set(true);
    }

    fn load_bobbins(&self) {
        for b in &self.bobbins {
            b.level.set(false);
        }
    }

    fn unload_bobbin(&self, id: BobbinId) {
        let i = match id {
            BobbinId::One => 0,
            BobbinId::Two => 1,
        };
        self.bobbins[i].level.set(true);
    }

    fn step(&mut self) {
        let mut clock = self.clock.clone();
        clock.delay_ms(self.app.config().tick_interval_ms);
        self.app.tick(&mut self.hw, &mut self.sink);
        assert!(!self.relay.high() || self.app.state().permits_relay());
    }

    fn run_until(&mut self, target: StateId, max_ticks: usize) -> bool {
        for _ in 0..max_ticks {
            if self.app.state() == target {
                return true;
            }
            self.step();
        }
        self.app.state() == target
    }

    fn lamp_levels(&self) -> [bool; 4] {
        [
            self.lamps[0].high(),
            self.lamps[1].high(),
            self.lamps[2].high(),
            self.lamps[3].high(),
        ]
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[test]
fn verified_session_closes_relay_pin() {
    let mut bench = Bench::new(SystemConfig::default());
    bench.present("PA6-RED", "PA6-BLU");
    bench.load_bobbins();
    bench.scanners[0].answer("PA6-RED");
    bench.scanners[1].answer("PA6-BLU");

    assert!(bench.run_until(StateId::Enabled, 50));
    assert!(bench.relay.high());
    assert!(bench.hw.relay_closed());
    assert_eq!(bench.lamp_levels(), [true, true, false, false]);

    // Each pulse-mode channel raised its trigger line exactly once.
    assert_eq!(bench.triggers[0].rises.get(), 1);
    assert_eq!(bench.triggers[1].rises.get(), 1);
    assert!(!bench.triggers[0].high());
    assert!(bench.scanners[0].written.borrow().is_empty());

    // The card was halted after the read.
    assert!(bench.card.halts.get() >= 1);

    bench.unload_bobbin(BobbinId::Two);
    bench.step();
    assert_eq!(bench.app.state(), StateId::Idle);
    assert!(!bench.relay.high());
    assert_eq!(bench.lamp_levels(), [false; 4]);
}

#[test]
fn padded_sector_still_matches_scanned_label() {
    let mut bench = Bench::new(SystemConfig::default());
    bench.present("  PA6-RED", "PA6-BLU  ");
    bench.load_bobbins();
    bench.scanners[0].answer("PA6-RED");
    bench.scanners[1].answer("PA6-BLU");

    assert!(bench.run_until(StateId::Enabled, 50));
}

#[test]
fn command_frame_mode_writes_trigger_frame() {
    let config = SystemConfig {
        scan1_trigger: TriggerMode::CommandFrame,
        scan2_trigger: TriggerMode::CommandFrame,
        ..SystemConfig::default()
    };
    let mut bench = Bench::new(config);
    bench.present("PA6-RED", "PA6-BLU");
    bench.load_bobbins();
    bench.scanners[0].answer("PA6-RED");
    bench.scanners[1].answer("PA6-BLU");

    assert!(bench.run_until(StateId::Enabled, 50));
    assert_eq!(bench.scanners[0].written.borrow().as_slice(), &TRIGGER_FRAME);
    assert_eq!(bench.scanners[1].written.borrow().as_slice(), &TRIGGER_FRAME);
    assert_eq!(bench.triggers[0].rises.get(), 0);
}

#[test]
fn bypass_card_skips_second_sector_and_scanners() {
    let mut bench = Bench::new(SystemConfig::default());
    bench.card.write(THREAD1_SECTOR, "ByPass");
    bench.card.present.set(true);

    assert!(bench.run_until(StateId::BypassEnabled, 10));
    assert!(bench.relay.high());
    assert_eq!(bench.triggers[0].rises.get(), 0);
    assert_eq!(bench.triggers[1].rises.get(), 0);

    bench.card.present.set(false);
    bench.step();
    assert_eq!(bench.app.state(), StateId::Idle);
    assert!(!bench.relay.high());
}

#[test]
fn swapping_the_bypass_card_opens_relay() {
    let mut bench = Bench::new(SystemConfig::default());
    bench.card.write(THREAD1_SECTOR, "BYPASS");
    bench.card.present.set(true);

    assert!(bench.run_until(StateId::BypassEnabled, 10));
    bench.step();
    assert_eq!(bench.app.state(), StateId::BypassEnabled);
    assert!(bench.relay.high());

    bench.card.uid.set([0x04, 0x99, 0x88, 0x77]);
    bench.step();
    assert_eq!(bench.app.state(), StateId::Idle);
    assert!(!bench.relay.high());
}

#[test]
fn unreadable_second_sector_returns_to_idle() {
    let mut bench = Bench::new(SystemConfig::default());
    bench.card.write(THREAD1_SECTOR, "PA6-RED");
    bench.card.present.set(true);

    bench.step();
    bench.step();
    assert_eq!(bench.app.state(), StateId::Idle);
    assert_eq!(bench.app.stats().read_failures, 1);
    assert!(!bench.relay.high());
}

#[test]
fn silent_scanner_times_out_into_fault() {
    let mut bench = Bench::new(SystemConfig::default());
    bench.present("PA6-RED", "PA6-BLU");
    bench.load_bobbins();

    assert!(bench.run_until(StateId::ScanningChannel1, 20));
    let before = bench.clock.now_ms();
    bench.step();

    assert_eq!(bench.app.state(), StateId::Fault);
    let waited = bench.clock.now_ms() - before;
    assert!((5000..5200).contains(&waited), "waited {waited} ms");
    assert_eq!(bench.lamp_levels(), [false, false, true, false]);
    assert!(!bench.relay.high());
}
