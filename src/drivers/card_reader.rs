//! Kanban read sequence on top of a contactless reader.
//!
//! [`CardReader`] is the chip-level seam (select, authenticate, read a
//! block, halt).  [`KanbanReader`] turns it into the identity transport the
//! application needs:
//!
//! ```text
//!   select ─▶ auth(4) ─▶ read(4) ─▶ bypass? ──yes──▶ halt ─▶ Ok(bypass)
//!                                      │
//!                                      no
//!                                      ▼
//!                         auth(5) ─▶ read(5) ─▶ halt ─▶ Ok(spec)
//! ```
//!
//! The card is halted and the crypto session closed on every exit path.

use core::fmt::Debug;

use log::{debug, warn};

use crate::error::TransportError;
use crate::kanban::{
    self, CardIdentity, DEFAULT_KEY_A, SECTOR_SIZE, THREAD1_SECTOR, THREAD2_SECTOR, ThreadSpec,
};

/// Low-level contactless reader operations.
pub trait CardReader {
    type Error: Debug;

    /// Reset and reconfigure the reader; cycles the RF field.
    fn reinit(&mut self) -> Result<(), Self::Error>;

    /// Wake any card in the field, halted ones included.  `Ok(true)` if a
    /// card answered.
    fn wake(&mut self) -> Result<bool, Self::Error>;

    /// Run anticollision and select one card.
    fn select(&mut self) -> Result<CardIdentity, Self::Error>;

    /// Key-A authentication of `block` against the selected card.
    fn authenticate(
        &mut self,
        block: u8,
        key: &[u8; 6],
        uid: &CardIdentity,
    ) -> Result<(), Self::Error>;

    /// Read one 16-byte block of an authenticated sector.
    fn read_block(&mut self, block: u8) -> Result<[u8; SECTOR_SIZE], Self::Error>;

    /// Halt the card and drop the crypto session.  Best effort.
    fn halt(&mut self);
}

/// Identity transport that reads thread codes from kanban cards.
pub struct KanbanReader<R> {
    reader: R,
    key: [u8; 6],
}

impl<R: CardReader> KanbanReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            key: DEFAULT_KEY_A,
        }
    }

    /// Use a site-specific key instead of the factory key.
    pub fn with_key(mut self, key: [u8; 6]) -> Self {
        self.key = key;
        self
    }

    pub fn reset(&mut self) {
        if let Err(e) = self.reader.reinit() {
            warn!("CARD: reader reinit failed: {e:?}");
        }
    }

    pub fn is_card_present(&mut self) -> bool {
        // A card answering the previous poll is left READY and may miss one
        // wake-up, so a second attempt is made before reporting absence.
        self.poll() || self.poll()
    }

    /// UID of the card in the field, if one answers.  Used to confirm the
    /// session card is still the one presented.
    pub fn card_in_field(&mut self) -> Option<CardIdentity> {
        let uid = self.identify().or_else(|| self.identify());
        self.reader.halt();
        uid
    }

    pub fn read_identity_spec(&mut self) -> Result<(CardIdentity, ThreadSpec), TransportError> {
        let result = self.read_sectors();
        self.reader.halt();
        result
    }

    fn identify(&mut self) -> Option<CardIdentity> {
        if !self.poll() {
            return None;
        }
        self.reader
            .select()
            .map_err(|e| debug!("CARD: select failed: {e:?}"))
            .ok()
    }

    fn poll(&mut self) -> bool {
        match self.reader.wake() {
            Ok(present) => present,
            Err(e) => {
                debug!("CARD: presence poll error: {e:?}");
                false
            }
        }
    }

    fn read_sectors(&mut self) -> Result<(CardIdentity, ThreadSpec), TransportError> {
        let uid = self.reader.select().map_err(|e| {
            debug!("CARD: select failed: {e:?}");
            TransportError::NotPresent
        })?;
        debug!("CARD: selected {uid}");

        let thread1 = self.read_sector(THREAD1_SECTOR, &uid)?;
        if kanban::is_bypass_keyword(&thread1) {
            return Ok((uid, ThreadSpec::bypass()));
        }
        let thread2 = self.read_sector(THREAD2_SECTOR, &uid)?;
        Ok((uid, ThreadSpec::new(&thread1, &thread2)))
    }

    fn read_sector(
        &mut self,
        sector: u8,
        uid: &CardIdentity,
    ) -> Result<kanban::ThreadCode, TransportError> {
        self.reader
            .authenticate(sector, &self.key, uid)
            .map_err(|e| {
                debug!("CARD: auth sector {sector} failed: {e:?}");
                TransportError::AuthFailed(sector)
            })?;
        let raw = self.reader.read_block(sector).map_err(|e| {
            debug!("CARD: read sector {sector} failed: {e:?}");
            TransportError::ReadFailed(sector)
        })?;
        Ok(kanban::decode_sector(&raw))
    }
}
