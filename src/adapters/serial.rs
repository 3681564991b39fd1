//! ESP-IDF UART link for the label scanners.

use esp_idf_hal::delay::NON_BLOCK;
use esp_idf_hal::uart::UartDriver;
use log::warn;

use crate::drivers::scanner::ScanSerial;

/// Scanner UART (9600 8N1).
pub struct UartSerial<'d> {
    uart: UartDriver<'d>,
}

impl<'d> UartSerial<'d> {
    pub fn new(uart: UartDriver<'d>) -> Self {
        Self { uart }
    }
}

impl ScanSerial for UartSerial<'_> {
    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.uart.read(&mut byte, NON_BLOCK) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }

    fn write_all(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        while !rest.is_empty() {
            match self.uart.write(rest) {
                Ok(0) => break,
                Ok(n) => rest = &rest[n..],
                Err(e) => {
                    warn!("UART: write failed: {e}");
                    return;
                }
            }
        }
    }

    fn clear_input(&mut self) {
        if let Err(e) = self.uart.clear_rx() {
            warn!("UART: rx flush failed: {e}");
        }
    }
}
