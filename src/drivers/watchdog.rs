//! Task Watchdog Timer (TWDT) driver.
//!
//! Wraps the ESP-IDF TWDT API to reset the controller if the control loop
//! stalls.  The timeout must cover the longest blocking tick, a full scan
//! window plus the settle pause, so it is derived from the configuration.
//!
//! The main loop must call `feed()` on every control tick iteration.

#[cfg(target_os = "espidf")]
use esp_idf_sys::*;

use log::info;

use crate::config::SystemConfig;

/// Margin added on top of the longest blocking tick.
const MARGIN_MS: u32 = 5000;

pub struct Watchdog {
    timeout_ms: u32,
    #[cfg(target_os = "espidf")]
    subscribed: bool,
}

impl Watchdog {
    /// Longest time one control tick may legitimately block.
    pub fn timeout_for(config: &SystemConfig) -> u32 {
        let blocking = config
            .scan_timeout_ms
            .max(config.read_fail_backoff_ms)
            .max(config.fault_reset_delay_ms)
            + config.tick_interval_ms;
        blocking + MARGIN_MS
    }

    /// Initialise and subscribe the current task to the TWDT.
    pub fn new(config: &SystemConfig) -> Self {
        let timeout_ms = Self::timeout_for(config);

        #[cfg(target_os = "espidf")]
        {
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::warn!("TWDT reconfigure returned {ret} (may already be configured)");
                }

                let ret = esp_task_wdt_add(core::ptr::null_mut());
                let subscribed = ret == ESP_OK;
                if subscribed {
                    info!("Watchdog: subscribed ({timeout_ms} ms timeout, panic on trigger)");
                } else {
                    log::warn!("Watchdog: failed to subscribe ({ret})");
                }

                Self {
                    timeout_ms,
                    subscribed,
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("Watchdog(sim): no-op, {timeout_ms} ms");
            Self { timeout_ms }
        }
    }

    /// Feed the watchdog.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }
}
