//! NXP MFRC522 contactless reader over SPI.
//!
//! Implements just enough of ISO 14443-3 and MIFARE Classic to serve
//! [`CardReader`]: wake-up, cascaded anticollision/select, key-A
//! authentication, block read and halt.
//!
//! ## SPI framing
//!
//! ```text
//!   address byte:  [ R/W | A5 A4 A3 A2 A1 A0 | 0 ]
//!   read  = 0x80 | (reg << 1)
//!   write =        (reg << 1)
//! ```
//!
//! ## Timeouts
//!
//! The chip timer is set for ~25 ms (TPrescaler 0xA9 → 40 kHz, reload
//! 1000) with TAuto, so every transceive ends with either RxIRq or
//! TimerIRq.  The poll loop is a backstop in case the chip stops answering.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{Operation, SpiDevice};
use log::{info, warn};

use super::card_reader::CardReader;
use crate::kanban::{CardIdentity, MAX_UID_LEN, SECTOR_SIZE};

mod reg {
    pub const COMMAND: u8 = 0x01;
    pub const COM_IRQ: u8 = 0x04;
    pub const DIV_IRQ: u8 = 0x05;
    pub const ERROR: u8 = 0x06;
    pub const STATUS2: u8 = 0x08;
    pub const FIFO_DATA: u8 = 0x09;
    pub const FIFO_LEVEL: u8 = 0x0A;
    pub const CONTROL: u8 = 0x0C;
    pub const BIT_FRAMING: u8 = 0x0D;
    pub const COLL: u8 = 0x0E;
    pub const MODE: u8 = 0x11;
    pub const TX_CONTROL: u8 = 0x14;
    pub const TX_ASK: u8 = 0x15;
    pub const CRC_RESULT_H: u8 = 0x21;
    pub const CRC_RESULT_L: u8 = 0x22;
    pub const T_MODE: u8 = 0x2A;
    pub const T_PRESCALER: u8 = 0x2B;
    pub const T_RELOAD_H: u8 = 0x2C;
    pub const T_RELOAD_L: u8 = 0x2D;
    pub const VERSION: u8 = 0x37;
}

mod cmd {
    pub const IDLE: u8 = 0x00;
    pub const CALC_CRC: u8 = 0x03;
    pub const TRANSCEIVE: u8 = 0x0C;
    pub const MF_AUTHENT: u8 = 0x0E;
    pub const SOFT_RESET: u8 = 0x0F;
}

mod picc {
    pub const WUPA: u8 = 0x52;
    pub const SEL_CL1: u8 = 0x93;
    pub const SEL_CL2: u8 = 0x95;
    pub const SEL_CL3: u8 = 0x97;
    pub const CASCADE_TAG: u8 = 0x88;
    pub const AUTH_KEY_A: u8 = 0x60;
    pub const READ: u8 = 0x30;
    pub const HLTA: u8 = 0x50;
}

/// Register polls before a command is declared hung.
const POLL_LIMIT: u32 = 5000;

/// Known VersionReg values (v1.0, v2.0, clones).
const KNOWN_VERSIONS: [u8; 4] = [0x91, 0x92, 0x88, 0x12];

/// SPI address byte for reading `reg`.
pub const fn read_address(reg: u8) -> u8 {
    0x80 | ((reg << 1) & 0x7E)
}

/// SPI address byte for writing `reg`.
pub const fn write_address(reg: u8) -> u8 {
    (reg << 1) & 0x7E
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mfrc522Error<E> {
    /// SPI bus error.
    Spi(E),
    /// No answer within the chip timer window.
    Timeout,
    /// Parity, framing or buffer overflow reported by ErrorReg.
    Protocol,
    /// Bit collision during anticollision.
    Collision,
    /// CRC or BCC check failed.
    Integrity,
    /// Response length differs from what the command defines.
    UnexpectedLength(usize),
    /// MFAuthent finished without Crypto1 becoming active.
    AuthRejected,
    /// The card answered with a NAK.
    Nak,
}

pub struct Mfrc522<SPI, D> {
    spi: SPI,
    delay: D,
}

impl<SPI, D> Mfrc522<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    pub fn new(spi: SPI, delay: D) -> Self {
        Self { spi, delay }
    }

    /// Soft-reset the chip and program timer, modulation and CRC preset.
    pub fn init(&mut self) -> Result<(), Mfrc522Error<SPI::Error>> {
        self.write(reg::COMMAND, cmd::SOFT_RESET)?;
        self.delay.delay_ms(50);
        self.write(reg::T_MODE, 0x80)?;
        self.write(reg::T_PRESCALER, 0xA9)?;
        self.write(reg::T_RELOAD_H, 0x03)?;
        self.write(reg::T_RELOAD_L, 0xE8)?;
        self.write(reg::TX_ASK, 0x40)?;
        self.write(reg::MODE, 0x3D)?;
        self.antenna_on()
    }

    /// Raw VersionReg value.
    pub fn version(&mut self) -> Result<u8, Mfrc522Error<SPI::Error>> {
        self.read(reg::VERSION)
    }

    /// Read VersionReg and log it.  `0x00`/`0xFF` means the chip is not on
    /// the bus; the controller keeps running and every card poll will fail.
    pub fn probe(&mut self) -> Option<u8> {
        match self.version() {
            Ok(v @ (0x00 | 0xFF)) => {
                warn!("MFRC522: no reader detected (version 0x{v:02X}), check wiring");
                None
            }
            Ok(v) => {
                if KNOWN_VERSIONS.contains(&v) {
                    info!("MFRC522: firmware version 0x{v:02X}");
                } else {
                    warn!("MFRC522: unknown version 0x{v:02X}");
                }
                Some(v)
            }
            Err(e) => {
                warn!("MFRC522: version read failed: {e:?}");
                None
            }
        }
    }

    // ── Register access ───────────────────────────────────────

    fn read(&mut self, reg: u8) -> Result<u8, Mfrc522Error<SPI::Error>> {
        let mut buf = [read_address(reg), 0];
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(Mfrc522Error::Spi)?;
        Ok(buf[1])
    }

    fn write(&mut self, reg: u8, value: u8) -> Result<(), Mfrc522Error<SPI::Error>> {
        self.spi
            .write(&[write_address(reg), value])
            .map_err(Mfrc522Error::Spi)
    }

    fn write_fifo(&mut self, data: &[u8]) -> Result<(), Mfrc522Error<SPI::Error>> {
        let addr = [write_address(reg::FIFO_DATA)];
        self.spi
            .transaction(&mut [Operation::Write(&addr), Operation::Write(data)])
            .map_err(Mfrc522Error::Spi)
    }

    fn set_bits(&mut self, reg: u8, mask: u8) -> Result<(), Mfrc522Error<SPI::Error>> {
        let v = self.read(reg)?;
        self.write(reg, v | mask)
    }

    fn clear_bits(&mut self, reg: u8, mask: u8) -> Result<(), Mfrc522Error<SPI::Error>> {
        let v = self.read(reg)?;
        self.write(reg, v & !mask)
    }

    fn antenna_on(&mut self) -> Result<(), Mfrc522Error<SPI::Error>> {
        let v = self.read(reg::TX_CONTROL)?;
        if v & 0x03 != 0x03 {
            self.write(reg::TX_CONTROL, v | 0x03)?;
        }
        Ok(())
    }

    // ── Chip commands ─────────────────────────────────────────

    fn calc_crc(&mut self, data: &[u8]) -> Result<[u8; 2], Mfrc522Error<SPI::Error>> {
        self.write(reg::COMMAND, cmd::IDLE)?;
        self.write(reg::DIV_IRQ, 0x04)?;
        self.write(reg::FIFO_LEVEL, 0x80)?;
        self.write_fifo(data)?;
        self.write(reg::COMMAND, cmd::CALC_CRC)?;
        for _ in 0..POLL_LIMIT {
            if self.read(reg::DIV_IRQ)? & 0x04 != 0 {
                self.write(reg::COMMAND, cmd::IDLE)?;
                return Ok([self.read(reg::CRC_RESULT_L)?, self.read(reg::CRC_RESULT_H)?]);
            }
        }
        Err(Mfrc522Error::Timeout)
    }

    /// Run `command` with `tx` in the FIFO; copy the response into `rx`.
    /// Returns the number of bytes received and the valid bits of the last.
    fn communicate(
        &mut self,
        command: u8,
        wait_irq: u8,
        tx: &[u8],
        tx_last_bits: u8,
        rx: &mut [u8],
    ) -> Result<(usize, u8), Mfrc522Error<SPI::Error>> {
        self.write(reg::COMMAND, cmd::IDLE)?;
        self.write(reg::COM_IRQ, 0x7F)?;
        self.write(reg::FIFO_LEVEL, 0x80)?;
        self.write_fifo(tx)?;
        self.write(reg::BIT_FRAMING, tx_last_bits & 0x07)?;
        self.write(reg::COMMAND, command)?;
        if command == cmd::TRANSCEIVE {
            self.set_bits(reg::BIT_FRAMING, 0x80)?;
        }

        let mut completed = false;
        for _ in 0..POLL_LIMIT {
            let irq = self.read(reg::COM_IRQ)?;
            if irq & wait_irq != 0 {
                completed = true;
                break;
            }
            if irq & 0x01 != 0 {
                return Err(Mfrc522Error::Timeout);
            }
        }
        if !completed {
            return Err(Mfrc522Error::Timeout);
        }
        if command == cmd::TRANSCEIVE {
            self.clear_bits(reg::BIT_FRAMING, 0x80)?;
        }

        let err = self.read(reg::ERROR)?;
        if err & 0x13 != 0 {
            return Err(Mfrc522Error::Protocol);
        }
        if err & 0x08 != 0 {
            return Err(Mfrc522Error::Collision);
        }

        let len = usize::from(self.read(reg::FIFO_LEVEL)?);
        if len > rx.len() {
            return Err(Mfrc522Error::UnexpectedLength(len));
        }
        for slot in rx.iter_mut().take(len) {
            *slot = self.read(reg::FIFO_DATA)?;
        }
        let valid_bits = self.read(reg::CONTROL)? & 0x07;
        Ok((len, valid_bits))
    }

    fn transceive(
        &mut self,
        tx: &[u8],
        tx_last_bits: u8,
        rx: &mut [u8],
    ) -> Result<(usize, u8), Mfrc522Error<SPI::Error>> {
        self.communicate(cmd::TRANSCEIVE, 0x30, tx, tx_last_bits, rx)
    }

    /// Transceive a frame with CRC appended; check the CRC of the answer.
    fn transceive_crc(
        &mut self,
        frame: &[u8],
        rx: &mut [u8],
    ) -> Result<usize, Mfrc522Error<SPI::Error>> {
        let mut tx = [0u8; 18];
        let n = frame.len();
        tx[..n].copy_from_slice(frame);
        let crc = self.calc_crc(frame)?;
        tx[n..n + 2].copy_from_slice(&crc);

        let (len, valid_bits) = self.transceive(&tx[..n + 2], 0, rx)?;
        if len == 1 && valid_bits == 4 {
            return Err(Mfrc522Error::Nak);
        }
        if len < 3 {
            return Err(Mfrc522Error::UnexpectedLength(len));
        }
        let expected = self.calc_crc(&rx[..len - 2])?;
        if rx[len - 2..len] != expected {
            return Err(Mfrc522Error::Integrity);
        }
        Ok(len - 2)
    }

    fn stop_crypto(&mut self) -> Result<(), Mfrc522Error<SPI::Error>> {
        self.clear_bits(reg::STATUS2, 0x08)
    }
}

impl<SPI, D> CardReader for Mfrc522<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    type Error = Mfrc522Error<SPI::Error>;

    fn reinit(&mut self) -> Result<(), Self::Error> {
        self.init()
    }

    fn wake(&mut self) -> Result<bool, Self::Error> {
        self.clear_bits(reg::COLL, 0x80)?;
        let mut atqa = [0u8; 2];
        match self.transceive(&[picc::WUPA], 7, &mut atqa) {
            Ok((2, 0)) => Ok(true),
            Ok(_) | Err(Mfrc522Error::Timeout) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn select(&mut self) -> Result<CardIdentity, Self::Error> {
        let mut uid: heapless::Vec<u8, MAX_UID_LEN> = heapless::Vec::new();
        for level in [picc::SEL_CL1, picc::SEL_CL2, picc::SEL_CL3] {
            self.clear_bits(reg::COLL, 0x80)?;

            // Anticollision: 4 UID bytes + BCC
            let mut part = [0u8; 5];
            let (len, _) = self.transceive(&[level, 0x20], 0, &mut part)?;
            if len != 5 {
                return Err(Mfrc522Error::UnexpectedLength(len));
            }
            if part[0] ^ part[1] ^ part[2] ^ part[3] != part[4] {
                return Err(Mfrc522Error::Integrity);
            }

            // Select: answers with SAK + CRC
            let frame = [level, 0x70, part[0], part[1], part[2], part[3], part[4]];
            let mut sak = [0u8; 3];
            let len = self.transceive_crc(&frame, &mut sak)?;
            if len != 1 {
                return Err(Mfrc522Error::UnexpectedLength(len));
            }

            let bytes = if part[0] == picc::CASCADE_TAG {
                &part[1..4]
            } else {
                &part[0..4]
            };
            if uid.extend_from_slice(bytes).is_err() {
                return Err(Mfrc522Error::UnexpectedLength(uid.len() + bytes.len()));
            }

            // SAK bit 2 set: UID not complete, continue with next level
            if sak[0] & 0x04 == 0 {
                return Ok(CardIdentity::from_bytes(&uid));
            }
        }
        Err(Mfrc522Error::Protocol)
    }

    fn authenticate(
        &mut self,
        block: u8,
        key: &[u8; 6],
        uid: &CardIdentity,
    ) -> Result<(), Self::Error> {
        let id = uid.as_bytes();
        if id.len() < 4 {
            return Err(Mfrc522Error::UnexpectedLength(id.len()));
        }
        let mut frame = [0u8; 12];
        frame[0] = picc::AUTH_KEY_A;
        frame[1] = block;
        frame[2..8].copy_from_slice(key);
        // Last four UID bytes, which is the whole UID for single-size cards.
        frame[8..12].copy_from_slice(&id[id.len() - 4..]);

        self.communicate(cmd::MF_AUTHENT, 0x10, &frame, 0, &mut [])?;
        if self.read(reg::STATUS2)? & 0x08 == 0 {
            return Err(Mfrc522Error::AuthRejected);
        }
        Ok(())
    }

    fn read_block(&mut self, block: u8) -> Result<[u8; SECTOR_SIZE], Self::Error> {
        let mut rx = [0u8; SECTOR_SIZE + 2];
        let len = self.transceive_crc(&[picc::READ, block], &mut rx)?;
        if len != SECTOR_SIZE {
            return Err(Mfrc522Error::UnexpectedLength(len));
        }
        let mut out = [0u8; SECTOR_SIZE];
        out.copy_from_slice(&rx[..SECTOR_SIZE]);
        Ok(out)
    }

    fn halt(&mut self) {
        let frame = [picc::HLTA, 0x00];
        let halted = self.calc_crc(&frame).and_then(|crc| {
            // A halted card does not answer; a timeout is the success case.
            match self.transceive(&[frame[0], frame[1], crc[0], crc[1]], 0, &mut []) {
                Ok(_) | Err(Mfrc522Error::Timeout) => Ok(()),
                Err(e) => Err(e),
            }
        });
        if let Err(e) = halted.and_then(|()| self.stop_crypto()) {
            warn!("MFRC522: halt failed: {e:?}");
        }
    }
}
