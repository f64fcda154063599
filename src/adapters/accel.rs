//! 6-axis IMU adapter (accelerometer half).
//!
//! The sensor itself is initialised by its vendor driver on the shared I2C
//! bus; the firmware only consumes calibrated accelerometer samples in
//! m/s². The simulation backend takes injected samples so shake detection
//! is testable end-to-end on the host.

use crate::error::SensorError;

/// Accelerometer port: init once, then poll.
pub trait AccelPort: Send {
    fn init(&mut self) -> Result<(), SensorError>;
    /// One sample in m/s², or `None` when no fresh data is ready.
    fn read(&mut self) -> Result<Option<[f32; 3]>, SensorError>;
}

// ── ESP-IDF backend ───────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use super::*;

    // Vendor IMU driver glue (C side, shared I2C bus from the BSP).
    extern "C" {
        fn bsp_imu_init() -> i32;
        fn bsp_imu_data_ready(ready: *mut bool) -> i32;
        fn bsp_imu_read_accel_mps2(out: *mut f32) -> i32;
    }

    pub struct EspAccel;

    impl EspAccel {
        pub fn new() -> Self {
            Self
        }
    }

    impl AccelPort for EspAccel {
        fn init(&mut self) -> Result<(), SensorError> {
            // SAFETY: one-shot driver init from the IMU task before polling.
            if unsafe { bsp_imu_init() } != 0 {
                return Err(SensorError::InitFailed);
            }
            Ok(())
        }

        fn read(&mut self) -> Result<Option<[f32; 3]>, SensorError> {
            let mut ready = false;
            // SAFETY: out-params are valid for the duration of each call.
            unsafe {
                if bsp_imu_data_ready(&mut ready) != 0 {
                    return Err(SensorError::ReadFailed);
                }
                if !ready {
                    return Ok(None);
                }
                let mut accel = [0f32; 3];
                if bsp_imu_read_accel_mps2(accel.as_mut_ptr()) != 0 {
                    return Err(SensorError::ReadFailed);
                }
                Ok(Some(accel))
            }
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::EspAccel;

// ── Simulation backend ────────────────────────────────────────

/// Sample queue the test injects into.
#[cfg(not(target_os = "espidf"))]
pub type SampleQueue = std::sync::Arc<std::sync::Mutex<std::collections::VecDeque<[f32; 3]>>>;

#[cfg(not(target_os = "espidf"))]
pub struct SimAccel {
    queue: SampleQueue,
}

#[cfg(not(target_os = "espidf"))]
impl SimAccel {
    pub fn new() -> Self {
        Self {
            queue: std::sync::Arc::new(std::sync::Mutex::new(std::collections::VecDeque::new())),
        }
    }

    /// Handle for injecting samples from a test.
    pub fn feed_handle(&self) -> SampleQueue {
        self.queue.clone()
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for SimAccel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl AccelPort for SimAccel {
    fn init(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn read(&mut self) -> Result<Option<[f32; 3]>, SensorError> {
        Ok(self.queue.lock().unwrap().pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_accel_replays_injected_samples() {
        let mut accel = SimAccel::new();
        accel.init().unwrap();
        accel.feed_handle().lock().unwrap().push_back([0.0, 0.0, 9.8]);
        assert_eq!(accel.read().unwrap(), Some([0.0, 0.0, 9.8]));
        assert_eq!(accel.read().unwrap(), None);
    }
}
