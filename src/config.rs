//! System configuration parameters
//!
//! All tunable parameters for the HaloTerm terminal.
//! Values can be overridden via NVS (non-volatile storage); the WebSocket
//! endpoint itself is normally provisioned through the captive portal and
//! stored under the credential namespace.

use serde::{Deserialize, Serialize};

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Display ---
    /// Screen width in pixels (circular AMOLED).
    pub screen_w: i32,
    /// Screen height in pixels.
    pub screen_h: i32,
    /// Safe margin inset on all sides of the round panel (pixels).
    pub safe_padding: i32,
    /// Inactivity period before the backlight is cut (milliseconds).
    pub screen_sleep_timeout_ms: u32,
    /// Screen-sleep poll period (milliseconds).
    pub screen_sleep_poll_ms: u32,
    /// Animation/UI tick period (milliseconds).
    pub ui_tick_ms: u32,

    // --- Transport ---
    /// Fallback WebSocket endpoint when none is provisioned.
    pub default_ws_url: heapless::String<96>,
    /// Auto-reconnect delay after a disconnect (milliseconds).
    pub reconnect_delay_ms: u32,

    // --- Audio ---
    /// PCM sample rate (Hz) for both capture and playback.
    pub sample_rate_hz: u32,
    /// Speaker output volume (0-100).
    pub speaker_volume: u8,
    /// Microphone analog gain (dB).
    pub mic_gain_db: f32,

    // --- Telemetry ---
    /// Heartbeat report interval (seconds).
    pub telemetry_interval_secs: u32,

    // --- IMU ---
    /// Shake detection threshold (m/s²). 1.5 g ≈ 14.7 m/s².
    pub shake_threshold_mps2: f32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut url = heapless::String::new();
        let _ = url.push_str("ws://192.168.4.2:8080");
        Self {
            // Display
            screen_w: 466,
            screen_h: 466,
            safe_padding: 40,
            screen_sleep_timeout_ms: 30_000,
            screen_sleep_poll_ms: 500,
            ui_tick_ms: 33, // ~30 fps

            // Transport
            default_ws_url: url,
            reconnect_delay_ms: 5_000,

            // Audio
            sample_rate_hz: 22_050,
            speaker_volume: 70,
            mic_gain_db: 24.0,

            // Telemetry
            telemetry_interval_secs: 30,

            // IMU
            shake_threshold_mps2: 14.7,
        }
    }
}
