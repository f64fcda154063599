//! The wired-up firmware under test.
//!
//! Mirrors the boot orchestrator: bus, transport (simulation link),
//! layout engine behind the UI lock, audio with simulation codec, IMU
//! with an injectable accelerometer. No display, no Wi-Fi — those are
//! external collaborators with no behaviour the core depends on.

use std::sync::{Arc, Mutex, MutexGuard};

use haloterm::adapters::accel::{SampleQueue, SimAccel};
use haloterm::adapters::codec::{SimMic, SimSpeaker};
use haloterm::audio::Audio;
use haloterm::bus::Bus;
use haloterm::imu;
use haloterm::transport::Transport;
use haloterm::ui::{SharedUi, UiEngine, UiLock};

pub struct Rig {
    pub bus: Arc<Bus>,
    pub ui: SharedUi,
    pub transport: Arc<Transport>,
    pub audio: Arc<Audio>,
    pub speaker_sink: Arc<Mutex<Vec<u8>>>,
    pub accel_feed: SampleQueue,
}

/// Tests share process-global state (the simulation heap counters and
/// real task threads); serialise them.
pub fn serial() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Rig {
    pub fn boot() -> Self {
        let bus = Bus::new();

        let ui: SharedUi = Arc::new(UiLock::new(UiEngine::new(466, 466, 40)));

        let speaker = SimSpeaker::open(22_050, 70).unwrap();
        let speaker_sink = speaker.sink();
        let mic = SimMic::open(22_050, 24.0).unwrap();
        let audio = Audio::start(bus.clone(), Box::new(speaker), Box::new(mic));

        {
            let ui = ui.clone();
            bus.subscribe("ui/layout", move |payload: &str| {
                let guard = ui.lock();
                guard.borrow_mut().render(payload);
            });
        }
        {
            let ui = ui.clone();
            bus.subscribe("ui/update", move |payload: &str| {
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

        let accel = SimAccel::new();
        let accel_feed = accel.feed_handle();
        imu::start(bus.clone(), Box::new(accel), 14.7);

        let transport = Transport::new(5_000);
        {
            let bus = bus.clone();
            transport.start("ws://test-server", move |text: &str| bus.route_down(text));
        }
        {
            let transport = transport.clone();
            bus.set_uplink(move |text: &str| transport.send(text));
        }

        Self {
            bus,
            ui,
            transport,
            audio,
            speaker_sink,
            accel_feed,
        }
    }

    /// Bring the simulated link up.
    pub fn connect(&self) {
        self.transport.sim_connect();
    }

    /// Deliver a complete downlink frame the way the server would.
    pub fn server_push(&self, topic: &str, payload: &serde_json::Value) {
        let frame = serde_json::json!({ "topic": topic, "payload": payload }).to_string();
        let bytes = frame.as_bytes();
        self.transport.sim_feed_chunk(0x01, bytes, 0, bytes.len());
    }

    /// Drain uplink frames, parsed into (topic, payload) pairs.
    pub fn take_uplink(&self) -> Vec<(String, serde_json::Value)> {
        self.transport
            .sim_take_sent()
            .into_iter()
            .filter_map(|text| {
                let v: serde_json::Value = serde_json::from_str(&text).ok()?;
                let topic = v.get("topic")?.as_str()?.to_owned();
                Some((topic, v.get("payload").cloned().unwrap_or(serde_json::Value::Null)))
            })
            .collect()
    }
}
