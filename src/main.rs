//! ThreadGate Firmware — Main Entry Point
//!
//! Hexagonal architecture with a fixed-rate control loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter                          LogEventSink         │
//! │  (Identity+Scan+Presence+Indicator+Time)  (EventSink)          │
//! │   ├─ KanbanReader<Mfrc522>    (SPI)                            │
//! │   ├─ ScanChannel x2           (UART + trigger GPIO)            │
//! │   ├─ BobbinSensor x2          (GPIO in)                        │
//! │   └─ LampBank, RelayDriver    (GPIO out)                       │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  FSM · SessionStats                                    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  TickScheduler (fixed rate) · Watchdog                         │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyIOPin, AnyInputPin, AnyOutputPin, Input, Output, PinDriver, Pull};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::spi::config::Config as SpiConfig;
use esp_idf_hal::spi::{SpiDeviceDriver, SpiDriver, SpiDriverConfig};
use esp_idf_hal::uart::config::Config as UartConfig;
use esp_idf_hal::uart::UartDriver;
use esp_idf_hal::units::Hertz;
use log::{info, warn};

use threadgate::adapters::hardware::HardwareAdapter;
use threadgate::adapters::log_sink::LogEventSink;
use threadgate::adapters::serial::UartSerial;
use threadgate::adapters::time::SystemClock;
use threadgate::app::service::AppService;
use threadgate::config::SystemConfig;
use threadgate::drivers::card_reader::KanbanReader;
use threadgate::drivers::indicators::{LampBank, RelayDriver};
use threadgate::drivers::mfrc522::Mfrc522;
use threadgate::drivers::scanner::{ScanChannel, ScanSettings};
use threadgate::drivers::watchdog::Watchdog;
use threadgate::pins;
use threadgate::scan::ScanChannelId;
use threadgate::scheduler::TickScheduler;
use threadgate::sensors::bobbin::BobbinSensor;
use threadgate::sensors::BobbinId;

/// Optional site profile baked in at build time (JSON overlay on defaults).
const SITE_PROFILE: Option<&str> = option_env!("THREADGATE_PROFILE");

/// Ticks between loop-timing log lines (one minute at the default rate).
const LOOP_STATS_EVERY: u64 = 600;

type OutPin = PinDriver<'static, AnyOutputPin, Output>;
type InPin = PinDriver<'static, AnyInputPin, Input>;

fn output(gpio: i32) -> Result<OutPin> {
    // SAFETY: every GPIO number comes from `pins` and is claimed once.
    let pin = unsafe { AnyOutputPin::new(gpio) };
    Ok(PinDriver::output(pin)?)
}

fn input(gpio: i32) -> Result<InPin> {
    // SAFETY: as above.
    let pin = unsafe { AnyInputPin::new(gpio) };
    let mut driver = PinDriver::input(pin)?;
    driver.set_pull(Pull::Up)?;
    Ok(driver)
}

fn io(gpio: i32) -> AnyIOPin {
    // SAFETY: as above.
    unsafe { AnyIOPin::new(gpio) }
}

fn load_config() -> SystemConfig {
    match SITE_PROFILE {
        Some(profile) => match SystemConfig::from_json(profile) {
            Ok(cfg) => {
                info!("Config: site profile applied");
                cfg
            }
            Err(e) => {
                warn!("Config: site profile rejected ({e}), using defaults");
                SystemConfig::default()
            }
        },
        None => SystemConfig::default(),
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  ThreadGate v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = load_config();
    let peripherals = Peripherals::take()?;

    // ── 2. Relay and lamps first, so the machine stays disabled ──
    let relay = RelayDriver::new(output(pins::RELAY_GPIO)?);
    let lamps = LampBank::new(
        output(pins::READY1_LED_GPIO)?,
        output(pins::READY2_LED_GPIO)?,
        output(pins::ALARM1_LED_GPIO)?,
        output(pins::ALARM2_LED_GPIO)?,
    );

    // ── 3. Card reader (MFRC522 on SPI) ───────────────────────
    let mut rfid_rst = output(pins::RFID_RST_GPIO)?;
    rfid_rst.set_high()?;

    let spi = SpiDriver::new(
        peripherals.spi3,
        io(pins::RFID_SCK_GPIO),
        io(pins::RFID_MOSI_GPIO),
        Some(io(pins::RFID_MISO_GPIO)),
        &SpiDriverConfig::new(),
    )?;
    let spi = SpiDeviceDriver::new(
        spi,
        Some(io(pins::RFID_SS_GPIO)),
        &SpiConfig::new().baudrate(Hertz(pins::RFID_SPI_HZ)),
    )?;

    let mut mfrc522 = Mfrc522::new(spi, FreeRtos);
    if let Err(e) = mfrc522.init() {
        warn!("MFRC522: init failed ({e:?}), card reads will fail");
    }
    mfrc522.probe();
    let card = KanbanReader::new(mfrc522).with_key(config.card_key);

    // ── 4. Label scanners (UART1 / UART2) ─────────────────────
    let clock = SystemClock::new();
    let uart_config = UartConfig::new().baudrate(Hertz(pins::SCAN_BAUD));

    let uart1 = UartDriver::new(
        peripherals.uart1,
        io(pins::SCAN1_TX_GPIO),
        io(pins::SCAN1_RX_GPIO),
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )?;
    let uart2 = UartDriver::new(
        peripherals.uart2,
        io(pins::SCAN2_TX_GPIO),
        io(pins::SCAN2_RX_GPIO),
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )?;

    let scanners = [
        ScanChannel::new(
            ScanChannelId::One,
            UartSerial::new(uart1),
            Some(output(pins::SCAN1_TRIGGER_GPIO)?),
            clock,
            ScanSettings::from_config(&config, ScanChannelId::One),
        ),
        ScanChannel::new(
            ScanChannelId::Two,
            UartSerial::new(uart2),
            Some(output(pins::SCAN2_TRIGGER_GPIO)?),
            clock,
            ScanSettings::from_config(&config, ScanChannelId::Two),
        ),
    ];

    // ── 5. Bobbin sensors ─────────────────────────────────────
    let bobbins = [
        BobbinSensor::new(
            BobbinId::One,
            input(pins::BOBBIN1_GPIO)?,
            config.bobbin1_polarity,
        ),
        BobbinSensor::new(
            BobbinId::Two,
            input(pins::BOBBIN2_GPIO)?,
            config.bobbin2_polarity,
        ),
    ];

    let mut hw = HardwareAdapter::new(card, scanners, bobbins, lamps, relay, clock);
    let mut log_sink = LogEventSink::new();

    // ── 6. App service + loop pacing ──────────────────────────
    let watchdog = Watchdog::new(&config);
    let mut scheduler = TickScheduler::new(config.tick_interval_ms);
    let mut pacing_clock = clock;
    let mut app = AppService::new(config);
    app.start(&mut hw, &mut log_sink);

    info!("System ready. Entering control loop.");

    // ── 7. Control loop ───────────────────────────────────────
    loop {
        scheduler.wait_next(&mut pacing_clock);
        app.tick(&mut hw, &mut log_sink);
        watchdog.feed();

        if app.tick_count() % LOOP_STATS_EVERY == 0 {
            info!("LOOP  | {}", scheduler.stats());
        }
    }
}
