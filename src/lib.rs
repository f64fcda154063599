//! HaloTerm firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module; every other target
//! gets a simulation backend.

#![deny(unused_must_use)]

pub mod audio;
pub mod bus;
pub mod config;
pub mod diagnostics;
pub mod imu;
pub mod provisioning;
pub mod telemetry;
pub mod transport;
pub mod ui;

mod error;

pub mod adapters;
pub mod drivers;

pub use error::{BusError, CodecError, Error, Result, SensorError, TransportError, UiError};
