//! Integration test driver for `tests/integration/`.
//!
//! Each `mod` below exercises the firmware wired together the way the
//! boot orchestrator wires it, against the simulation adapters. All tests
//! run on the host with no hardware required.

mod end_to_end_tests;
mod rig;
