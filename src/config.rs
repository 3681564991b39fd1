//! System configuration parameters
//!
//! All tunable parameters for the ThreadGate controller.  The defaults
//! describe the reference deployment; a site profile (JSON) can override
//! any subset of fields.  Values are validated, never clamped.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::kanban::DEFAULT_KEY_A;

/// Electrical level that means "bobbin present" on a proximity input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorPolarity {
    /// NPN open-collector sensors pull the line LOW on detection.
    ActiveLow,
    /// PNP sensors drive the line HIGH on detection.
    ActiveHigh,
}

/// How a scan channel is told to take a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Timed HIGH pulse on the channel's trigger line.
    Pulse,
    /// 9-byte serial command frame on the channel's UART.
    CommandFrame,
}

/// What losing the card means once the machine is `Enabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardRemovalPolicy {
    /// Card presence is not polled in `Enabled`; only bobbin removal resets.
    Ignore,
    /// Card removal in `Enabled` resets the session like bobbin removal.
    ResetSession,
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Timing ---
    /// Control loop period (milliseconds)
    pub tick_interval_ms: u32,
    /// Interval between sensor debug snapshots in the log (milliseconds)
    pub debug_snapshot_interval_ms: u32,

    // --- Card ---
    /// Pause after a failed card read before re-arming detection (milliseconds)
    pub read_fail_backoff_ms: u32,
    /// Whether card removal resets an enabled session
    pub card_removal_policy: CardRemovalPolicy,
    /// Key-A of both thread sectors; sites that re-key their cards set it here
    pub card_key: [u8; 6],

    // --- Bobbins ---
    /// Maximum wait for both bobbins after the card was read (milliseconds)
    pub bobbin_timeout_ms: u32,
    /// Both bobbins must read present continuously for this long (milliseconds)
    pub bobbin_debounce_ms: u32,
    /// Active level of bobbin sensor 1
    pub bobbin1_polarity: SensorPolarity,
    /// Active level of bobbin sensor 2
    pub bobbin2_polarity: SensorPolarity,

    // --- Scan channels ---
    /// Window for a scan response, measured from the trigger (milliseconds)
    pub scan_timeout_ms: u32,
    /// Silence after CR/LF that confirms the end of a frame (milliseconds)
    pub scan_quiet_ms: u32,
    /// Protocol header bytes discarded at the start of each response
    pub scan_header_len: u8,
    /// Width of the trigger pulse in pulse mode (milliseconds)
    pub trigger_pulse_ms: u32,
    /// Trigger mechanism for channel 1
    pub scan1_trigger: TriggerMode,
    /// Trigger mechanism for channel 2
    pub scan2_trigger: TriggerMode,

    // --- Fault ---
    /// Alarm lamp on/off half-period (milliseconds); 500 gives 1 Hz
    pub fault_blink_half_period_ms: u32,
    /// Pause after both bobbins are removed before returning to Idle (milliseconds)
    pub fault_reset_delay_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Timing
            tick_interval_ms: 100,            // 10 Hz
            debug_snapshot_interval_ms: 2000, // every 2 s

            // Card
            read_fail_backoff_ms: 500,
            card_removal_policy: CardRemovalPolicy::Ignore,
            card_key: DEFAULT_KEY_A,

            // Bobbins
            bobbin_timeout_ms: 30_000,
            bobbin_debounce_ms: 500,
            bobbin1_polarity: SensorPolarity::ActiveLow,
            bobbin2_polarity: SensorPolarity::ActiveLow,

            // Scan channels
            scan_timeout_ms: 5000,
            scan_quiet_ms: 50,
            scan_header_len: 7,
            trigger_pulse_ms: 100,
            scan1_trigger: TriggerMode::Pulse,
            scan2_trigger: TriggerMode::Pulse,

            // Fault
            fault_blink_half_period_ms: 500, // 1 Hz blink
            fault_reset_delay_ms: 1000,
        }
    }
}

impl SystemConfig {
    /// Parse a site profile.  Fields missing from the profile keep their
    /// default values; the merged result is validated.
    pub fn from_json(profile: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(profile).map_err(|_| ConfigError::Malformed)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break the timing model.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 || self.tick_interval_ms > 1000 {
            return Err(ConfigError::ValidationFailed(
                "tick_interval_ms must be 1..=1000",
            ));
        }
        if self.scan_timeout_ms == 0 || self.scan_timeout_ms > 30_000 {
            return Err(ConfigError::ValidationFailed(
                "scan_timeout_ms must be 1..=30000",
            ));
        }
        if self.scan_quiet_ms >= self.scan_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "scan_quiet_ms must be below scan_timeout_ms",
            ));
        }
        if self.trigger_pulse_ms >= self.scan_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "trigger_pulse_ms must be below scan_timeout_ms",
            ));
        }
        if self.bobbin_debounce_ms >= self.bobbin_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "bobbin_debounce_ms must be below bobbin_timeout_ms",
            ));
        }
        if self.fault_blink_half_period_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "fault_blink_half_period_ms must be non-zero",
            ));
        }
        if self.read_fail_backoff_ms > 10_000 || self.fault_reset_delay_ms > 10_000 {
            return Err(ConfigError::ValidationFailed(
                "settle delays must not exceed 10000 ms",
            ));
        }
        Ok(())
    }
}
