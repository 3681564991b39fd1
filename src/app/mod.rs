//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the orchestration for the ThreadGate controller:
//! per-tick input gathering, the session FSM and output application.
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping this layer fully testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
