//! GPIO / peripheral pin assignments for the ThreadGate controller board
//! (ESP32-WROOM-32).
//!
//! Single source of truth: `main` builds every driver from these numbers
//! rather than hard-coding pins.  Change a pin here and it propagates
//! everywhere.

// ---------------------------------------------------------------------------
// MFRC522 card reader (VSPI)
// ---------------------------------------------------------------------------

pub const RFID_SCK_GPIO: i32 = 18;
pub const RFID_MISO_GPIO: i32 = 19;
pub const RFID_MOSI_GPIO: i32 = 23;
/// Chip select, active LOW.
pub const RFID_SS_GPIO: i32 = 5;
/// Reader reset line; held HIGH while running.
pub const RFID_RST_GPIO: i32 = 22;
/// SPI clock for the reader.
pub const RFID_SPI_HZ: u32 = 4_000_000;

// ---------------------------------------------------------------------------
// Label scanner, thread 1 (UART1)
// ---------------------------------------------------------------------------

pub const SCAN1_RX_GPIO: i32 = 4;
pub const SCAN1_TX_GPIO: i32 = 2;
/// Trigger line: HIGH pulse starts a scan in pulse mode.
pub const SCAN1_TRIGGER_GPIO: i32 = 12;

// ---------------------------------------------------------------------------
// Label scanner, thread 2 (UART2)
// ---------------------------------------------------------------------------

pub const SCAN2_RX_GPIO: i32 = 16;
pub const SCAN2_TX_GPIO: i32 = 17;
pub const SCAN2_TRIGGER_GPIO: i32 = 13;

/// Both scanners run 9600 8N1.
pub const SCAN_BAUD: u32 = 9600;

// ---------------------------------------------------------------------------
// Bobbin presence sensors (general-purpose I/O, internal pull-ups)
// ---------------------------------------------------------------------------

pub const BOBBIN1_GPIO: i32 = 32;
pub const BOBBIN2_GPIO: i32 = 33;

// ---------------------------------------------------------------------------
// Status lamps (active HIGH)
// ---------------------------------------------------------------------------

pub const READY1_LED_GPIO: i32 = 25;
pub const READY2_LED_GPIO: i32 = 26;
pub const ALARM1_LED_GPIO: i32 = 27;
pub const ALARM2_LED_GPIO: i32 = 14;

// ---------------------------------------------------------------------------
// Machine enable relay (active HIGH)
// ---------------------------------------------------------------------------

pub const RELAY_GPIO: i32 = 21;
