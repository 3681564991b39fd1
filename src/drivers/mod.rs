//! Peripheral drivers: card reader, scanners, lamps, relay, watchdog.

pub mod card_reader;
pub mod indicators;
pub mod mfrc522;
pub mod scanner;
pub mod watchdog;
