//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements                  | Connects to                  |
//! |-------------|-----------------------------|------------------------------|
//! | `hardware`  | IdentityPort, ScanPort,     | MFRC522, scanners, GPIO      |
//! |             | PresencePort, IndicatorPort,|                              |
//! |             | TimePort                    |                              |
//! | `log_sink`  | EventSink                   | Serial log output            |
//! | `serial`    | ScanSerial                  | ESP-IDF UART driver          |
//! | `time`      | TimePort                    | ESP32 system timer / std     |

pub mod hardware;
pub mod log_sink;
#[cfg(target_os = "espidf")]
pub mod serial;
pub mod time;
