//! On-die temperature sensor adapter.
//!
//! Consumed only by telemetry. Install failure is absorbed: the heartbeat
//! reports -1.0 °C, matching the "sensor unavailable" convention.

#[cfg(target_os = "espidf")]
use log::warn;

pub struct TempSensor {
    #[cfg(target_os = "espidf")]
    handle: Option<esp_idf_svc::sys::temperature_sensor_handle_t>,
}

impl TempSensor {
    pub fn install() -> Self {
        #[cfg(target_os = "espidf")]
        {
            use esp_idf_svc::sys::*;
            let cfg = temperature_sensor_config_t {
                range_min: 20,
                range_max: 100,
                ..Default::default()
            };
            let mut handle: temperature_sensor_handle_t = core::ptr::null_mut();
            // SAFETY: one-shot install from the telemetry start path.
            let ret = unsafe { temperature_sensor_install(&cfg, &mut handle) };
            if ret != ESP_OK {
                warn!("TempSensor: install failed ({})", ret);
                return Self { handle: None };
            }
            unsafe { temperature_sensor_enable(handle) };
            Self {
                handle: Some(handle),
            }
        }

        #[cfg(not(target_os = "espidf"))]
        Self {}
    }

    /// Chip temperature in °C, or -1.0 when the sensor is unavailable.
    pub fn celsius(&self) -> f32 {
        #[cfg(target_os = "espidf")]
        {
            use esp_idf_svc::sys::*;
            let Some(handle) = self.handle else {
                return -1.0;
            };
            let mut value: f32 = 0.0;
            // SAFETY: handle is valid for the lifetime of self.
            if unsafe { temperature_sensor_get_celsius(handle, &mut value) } == ESP_OK {
                value
            } else {
                -1.0
            }
        }

        #[cfg(not(target_os = "espidf"))]
        38.5
    }
}
