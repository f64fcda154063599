//! Low-level execution helpers shared by the subsystem tasks.

pub mod task_pin;
