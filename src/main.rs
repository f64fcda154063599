//! HaloTerm firmware — main entry point.
//!
//! The start-up order is a design contract, not a convenience: the Wi-Fi
//! driver permanently fragments fast SRAM when it activates, so every
//! subsystem that needs a contiguous DMA-capable allocation (display SPI,
//! I2S codec buffers, PCM capture) must claim it first.
//!
//! ```text
//! display ─▶ layout engine ─▶ provisioning? ─▶ bus ─▶ audio
//!    ─▶ subscriptions ─▶ Wi-Fi ─▶ transport · IMU · telemetry
//!    ─▶ UI tick + screen-sleep loop (this thread)
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{info, warn};

use haloterm::adapters::accel;
use haloterm::adapters::codec;
use haloterm::adapters::display::Display;
use haloterm::adapters::nvs::NvsAdapter;
use haloterm::adapters::time::MonotonicClock;
use haloterm::adapters::wifi::WifiStation;
use haloterm::audio::Audio;
use haloterm::bus::Bus;
use haloterm::transport::Transport;
use haloterm::ui::{SharedUi, UiEngine, UiLock};
use haloterm::{diagnostics, imu, provisioning, telemetry};

/// First screen, shown until the server pushes a layout.
const LOADING_SCREEN: &str = r##"{
    "type": "container", "flex": "column", "justify": "center",
    "align_items": "center", "gap": 12,
    "children": [
        {"type": "label", "text": "HaloTerm", "font_size": 24, "text_color": "#FFFFFF"},
        {"type": "label", "text": "Connecting...", "font_size": 16,
         "text_color": "#AAAAAA", "anim": {"type": "breathe"}}
    ]
}"##;

fn main() -> Result<()> {
    // ── 1. Platform bootstrap ─────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
    }
    #[cfg(not(target_os = "espidf"))]
    env_logger::init();

    info!("HaloTerm v{} booting", env!("CARGO_PKG_VERSION"));
    diagnostics::install_panic_handler();

    // ── 2. Display first: the SPI DMA descriptors and the frame
    // slice must come out of pristine fast SRAM. ───────────────
    let display = Arc::new(Display::start().map_err(|e| anyhow!("display: {e}"))?);

    // ── 2b. NVS + config (flash driver; no fast-SRAM appetite) ─
    let mut nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {e}"))?;
    let config = nvs.load_config();

    // ── 3. Layout engine + loading screen ─────────────────────
    let ui: SharedUi = Arc::new(UiLock::new(UiEngine::new(
        config.screen_w,
        config.screen_h,
        config.safe_padding,
    )));
    {
        let guard = ui.lock();
        guard.borrow_mut().render(LOADING_SCREEN);
    }
    display.trig_activity();

    // ── 4. Provisioning branch ────────────────────────────────
    // On hardware an unprovisioned device parks in the captive portal
    // and restarts; the host simulation stores test credentials and
    // falls through.
    provisioning::ensure_provisioned(&ui, &mut nvs);

    // ── 5. Message bus (before any subscriber, before routing) ─
    let bus = Bus::new();

    // ── 6. Audio: I2S DMA while fast SRAM is still contiguous ─
    #[cfg(target_os = "espidf")]
    let (speaker, mic) = {
        let speaker = codec::EspSpeaker::open(config.sample_rate_hz, config.speaker_volume)
            .map_err(|e| anyhow!("speaker: {e}"))?;
        let mic = codec::EspMic::open(config.sample_rate_hz, config.mic_gain_db)
            .map_err(|e| anyhow!("microphone: {e}"))?;
        (
            Box::new(speaker) as Box<dyn codec::SpeakerPort>,
            Box::new(mic) as Box<dyn codec::MicPort>,
        )
    };
    #[cfg(not(target_os = "espidf"))]
    let (speaker, mic) = {
        let speaker = codec::SimSpeaker::open(config.sample_rate_hz, config.speaker_volume)
            .map_err(|e| anyhow!("speaker: {e}"))?;
        let mic = codec::SimMic::open(config.sample_rate_hz, config.mic_gain_db)
            .map_err(|e| anyhow!("microphone: {e}"))?;
        (
            Box::new(speaker) as Box<dyn codec::SpeakerPort>,
            Box::new(mic) as Box<dyn codec::MicPort>,
        )
    };
    let audio = Audio::start(bus.clone(), speaker, mic);

    // ── 7. Downlink + local subscriptions ─────────────────────
    {
        let ui = ui.clone();
        let display = display.clone();
        bus.subscribe("ui/layout", move |payload: &str| {
            display.trig_activity();
            let guard = ui.lock();
            guard.borrow_mut().render(payload);
        });
    }
    {
        let ui = ui.clone();
        let display = display.clone();
        bus.subscribe("ui/update", move |payload: &str| {
            display.trig_activity();
            let guard = ui.lock();
            guard.borrow_mut().update(payload);
        });
    }
    {
        let audio = audio.clone();
        bus.subscribe("audio/cmd/record_start", move |_| audio.record_start());
    }
    {
        let audio = audio.clone();
        bus.subscribe("audio/cmd/record_stop", move |_| audio.record_stop());
    }

    // ── 8. Wi-Fi STA: from here on, large contiguous fast-SRAM
    // allocations are expected to fail. ───────────────────────
    let wifi = Arc::new(Mutex::new(WifiStation::new()));
    {
        let ssid = nvs.credential("ssid").unwrap_or_default();
        let password = nvs.credential("password").unwrap_or_default();
        if let Err(e) = wifi.lock().unwrap().connect(&ssid, &password) {
            warn!("WiFi connect failed ({e}); transport will keep retrying");
        }
    }

    // ── 9. Transport, IMU, telemetry ──────────────────────────
    let transport = Transport::new(config.reconnect_delay_ms);
    let ws_url = nvs
        .credential("ws_url")
        .unwrap_or_else(|| config.default_ws_url.clone());
    {
        let bus = bus.clone();
        transport.start(&ws_url, move |text: &str| bus.route_down(text));
    }
    {
        let transport = transport.clone();
        bus.set_uplink(move |text: &str| transport.send(text));
    }

    #[cfg(target_os = "espidf")]
    let accel_port = Box::new(accel::EspAccel::new());
    #[cfg(not(target_os = "espidf"))]
    let accel_port = Box::new(accel::SimAccel::new());
    imu::start(bus.clone(), accel_port, config.shake_threshold_mps2);

    telemetry::start(bus.clone(), wifi.clone(), config.telemetry_interval_secs);

    info!("System ready. Entering UI loop.");

    // ── 10. UI tick + screen sleep (this thread is the UI task) ─
    let clock = MonotonicClock::new();
    let mut sleep_poll_accum: u32 = 0;
    let mut screen_sleeping = false;

    loop {
        std::thread::sleep(Duration::from_millis(config.ui_tick_ms as u64));
        let now = clock.uptime_ms();

        {
            let guard = ui.lock();
            guard.borrow_mut().tick(now, audio.is_recording());
        }

        // The simulation transport needs its reconnect timer driven.
        #[cfg(not(target_os = "espidf"))]
        transport.sim_tick(now);

        sleep_poll_accum += config.ui_tick_ms;
        if sleep_poll_accum >= config.screen_sleep_poll_ms {
            sleep_poll_accum = 0;
            let inactive = display.inactive_ms();
            if inactive > config.screen_sleep_timeout_ms as u64 {
                if !screen_sleeping {
                    info!("Screen inactive for {}ms, sleeping", inactive);
                    display.set_brightness(0);
                    screen_sleeping = true;
                }
            } else if screen_sleeping {
                info!("Activity detected, waking screen");
                display.set_brightness(100);
                screen_sleeping = false;
            }
        }
    }
}
