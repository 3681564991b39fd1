//! ThreadGate firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fsm;
pub mod kanban;
pub mod pins;
pub mod scan;
pub mod scheduler;

// Hardware-facing modules are generic over embedded-hal traits, so they
// build on the host too; ESP-IDF glue inside them is cfg-gated.
pub mod adapters;
pub mod drivers;
pub mod sensors;
