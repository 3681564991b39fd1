//! Sensor subsystem: the bobbin presence inputs.

pub mod bobbin;

use core::fmt;

/// Identifies one of the two bobbin holders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BobbinId {
    One,
    Two,
}

impl fmt::Display for BobbinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => write!(f, "bobbin 1"),
            Self::Two => write!(f, "bobbin 2"),
        }
    }
}
