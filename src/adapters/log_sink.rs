//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! Every line starts with a fixed tag so the console output can be
//! filtered with `grep`.

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

fn verdict(ok: bool) -> &'static str {
    if ok { "OK" } else { "MISMATCH" }
}

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={}", state);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from, to);
            }
            AppEvent::CardRead { card, spec } => {
                if spec.is_bypass {
                    info!("CARD  | uid={} | BYPASS", card);
                } else {
                    info!(
                        "CARD  | uid={} | thread1='{}' thread2='{}'",
                        card, spec.thread1, spec.thread2
                    );
                }
            }
            AppEvent::CardReadFailed(err) => {
                warn!("CARD  | read failed: {}", err);
            }
            AppEvent::ScanCompleted { channel, payload } => {
                if payload.is_empty() {
                    warn!("SCAN  | {} | no response", channel);
                } else {
                    info!("SCAN  | {} | '{}'", channel, payload);
                }
            }
            AppEvent::Verified(report) => {
                info!(
                    "VERIFY| thread1 expected='{}' scanned='{}' {} | \
                     thread2 expected='{}' scanned='{}' {}",
                    report.expected1,
                    report.scanned1,
                    verdict(report.thread1_ok()),
                    report.expected2,
                    report.scanned2,
                    verdict(report.thread2_ok()),
                );
            }
            AppEvent::FaultEntered(reason) => {
                warn!("FAULT | {}", reason);
            }
            AppEvent::SensorSnapshot(s) => {
                debug!(
                    "SENSOR| bobbin1={} bobbin2={} | {} ms in state",
                    if s.bobbin1 { "PRESENT" } else { "absent" },
                    if s.bobbin2 { "PRESENT" } else { "absent" },
                    s.ms_in_state,
                );
            }
        }
    }
}
