//! Inductive/optical bobbin presence sensor.
//!
//! One digital input per bobbin holder.  The line level that means
//! "present" depends on the sensor type, so each sensor carries its own
//! [`SensorPolarity`].  Typical NPN proximity switches pull the line LOW
//! on detection (the pin runs with a pull-up).
//!
//! A failed pin read reports "absent": in `Enabled` that drops the relay,
//! in `AwaitingBobbins` it keeps the session from progressing.

use embedded_hal::digital::InputPin;
use log::warn;

use super::BobbinId;
use crate::config::SensorPolarity;

pub struct BobbinSensor<I> {
    id: BobbinId,
    pin: I,
    polarity: SensorPolarity,
}

impl<I: InputPin> BobbinSensor<I> {
    pub fn new(id: BobbinId, pin: I, polarity: SensorPolarity) -> Self {
        Self {
            id,
            pin,
            polarity,
        }
    }

    /// Sample the input and apply polarity.
    pub fn read(&mut self) -> bool {
        let level_high = match self.pin.is_high() {
            Ok(high) => high,
            Err(e) => {
                warn!("BOBBIN: {} read failed: {e:?}", self.id);
                return false;
            }
        };
        match self.polarity {
            SensorPolarity::ActiveLow => !level_high,
            SensorPolarity::ActiveHigh => level_high,
        }
    }
}
