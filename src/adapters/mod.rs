//! Platform adapters (outer ring).
//!
//! Every module here wraps an external collaborator — panel, codec, Wi-Fi
//! stack, NVS flash, eFuse, timers, heap regions — behind the narrow
//! interface the core consumes. Real backends are guarded by
//! `#[cfg(target_os = "espidf")]`; all other targets get simulation
//! backends so the whole firmware is testable on the host.

pub mod accel;
pub mod codec;
pub mod device_id;
pub mod display;
pub mod mem;
pub mod nvs;
pub mod temp;
pub mod time;
pub mod wifi;
