//! Shake detection from the accelerometer.
//!
//! A 10 Hz polling task computes the acceleration magnitude and publishes
//! a `motion` uplink when it crosses the shake threshold, with a
//! 10-sample cooldown so one physical shake produces one event.

use core::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use crate::adapters::accel::AccelPort;
use crate::bus::Bus;
use crate::drivers::task_pin::{spawn_pinned, Core, TaskOptions};

/// Poll period (10 Hz).
pub const POLL_PERIOD_MS: u64 = 100;
/// Samples to skip after a trigger (~1 s at 10 Hz).
pub const COOLDOWN_SAMPLES: u8 = 10;
/// 1.5 g in m/s².
pub const DEFAULT_THRESHOLD_MPS2: f32 = 14.7;

/// Pure threshold-plus-cooldown detector.
pub struct ShakeDetector {
    threshold: f32,
    cooldown_left: u8,
}

impl ShakeDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            cooldown_left: 0,
        }
    }

    /// Feed one sample; returns the magnitude when a shake fires. After a
    /// trigger the next [`COOLDOWN_SAMPLES`] samples are swallowed.
    pub fn feed(&mut self, accel: [f32; 3]) -> Option<f32> {
        if self.cooldown_left > 0 {
            self.cooldown_left -= 1;
            return None;
        }

        let magnitude =
            (accel[0] * accel[0] + accel[1] * accel[1] + accel[2] * accel[2]).sqrt();

        if magnitude > self.threshold {
            self.cooldown_left = COOLDOWN_SAMPLES;
            return Some(magnitude);
        }
        None
    }
}

/// Start the polling task. Sensor init failure logs and ends the task —
/// the terminal keeps working without motion events.
pub fn start(bus: Arc<Bus>, mut accel: Box<dyn AccelPort>, threshold: f32) {
    spawn_pinned(
        TaskOptions {
            core: Core::App,
            priority: 5,
            stack_kb: 4,
            stack_in_psram: false,
        },
        "imu_poll\0",
        move || {
            if let Err(e) = accel.init() {
                error!("IMU: init failed ({}), task exiting", e);
                return;
            }
            info!("IMU: polling for shake events");

            let mut detector = ShakeDetector::new(threshold);
            let mut payload = heapless::String::<64>::new();

            loop {
                match accel.read() {
                    Ok(Some(sample)) => {
                        if let Some(magnitude) = detector.feed(sample) {
                            info!("IMU: shake detected, magnitude {:.2} m/s²", magnitude);
                            payload.clear();
                            let _ = write!(
                                payload,
                                "{{\"type\": \"shake\", \"magnitude\": {:.2}}}",
                                magnitude
                            );
                            bus.publish_up("motion", &payload);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("IMU: read error: {}", e);
                    }
                }
                std::thread::sleep(Duration::from_millis(POLL_PERIOD_MS));
            }
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const REST: [f32; 3] = [0.0, 0.0, 9.8];
    const SHAKE: [f32; 3] = [16.0, 0.0, 0.0];

    #[test]
    fn rest_gravity_does_not_trigger() {
        let mut d = ShakeDetector::new(DEFAULT_THRESHOLD_MPS2);
        for _ in 0..50 {
            assert!(d.feed(REST).is_none());
        }
    }

    #[test]
    fn shake_triggers_with_magnitude() {
        let mut d = ShakeDetector::new(DEFAULT_THRESHOLD_MPS2);
        let m = d.feed(SHAKE).unwrap();
        assert!((m - 16.0).abs() < 0.01);
    }

    #[test]
    fn cooldown_suppresses_repeat_triggers() {
        let mut d = ShakeDetector::new(DEFAULT_THRESHOLD_MPS2);
        assert!(d.feed(SHAKE).is_some());
        for _ in 0..COOLDOWN_SAMPLES {
            assert!(d.feed(SHAKE).is_none());
        }
        // Cooldown expired; the next above-threshold sample fires again.
        assert!(d.feed(SHAKE).is_some());
    }

    #[test]
    fn magnitude_mixes_all_axes() {
        let mut d = ShakeDetector::new(14.7);
        // 9^2+9^2+9^2 = 243 -> ~15.6 m/s²
        assert!(d.feed([9.0, 9.0, 9.0]).is_some());
    }
}
