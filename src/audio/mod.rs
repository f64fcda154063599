//! Audio full-duplex pipeline.
//!
//! Downlink: `audio/play` payloads are Base64 raw PCM; the decode buffer is
//! short-lived but must sit in DMA-capable fast SRAM because it is handed
//! straight to I2S. Uplink: a pinned capture task reads 1024-byte PCM
//! chunks, Base64-encodes them and publishes
//! `{"state":"stream","data":...}` on `audio/record`.
//!
//! Allocation locality is the whole point of this module's layout:
//! - PCM capture buffer — fast SRAM, DMA-capable, allocated once;
//! - Base64/JSON scratch — default heap (PSRAM permitted);
//! - the capture task's own stack — PSRAM, preserving fast SRAM.

use core::fmt::Write as _;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use log::{error, info};

use crate::adapters::codec::{MicPort, SpeakerPort};
use crate::adapters::mem::{Region, RegionBuf};
use crate::bus::Bus;
use crate::drivers::task_pin::{spawn_pinned, Core, TaskOptions};

/// PCM chunk size read from the microphone per cycle.
pub const PCM_CHUNK_SIZE: usize = 1024;
/// Base64 scratch capacity (4/3 of the chunk plus slack).
const BASE64_BUF_CAPACITY: usize = 1500;
/// JSON assembly scratch capacity.
const JSON_BUF_CAPACITY: usize = 2048;
/// Idle poll period while not recording.
const IDLE_SLEEP_MS: u64 = 50;
/// Backoff after a codec read error.
const ERROR_SLEEP_MS: u64 = 10;

pub struct Audio {
    recording: AtomicBool,
    bus: Arc<Bus>,
    speaker: Mutex<Box<dyn SpeakerPort>>,
}

impl Audio {
    /// Wire the playback half: open state, `audio/play` subscription.
    /// [`Audio::start`] additionally spawns the capture task.
    pub fn new(bus: Arc<Bus>, speaker: Box<dyn SpeakerPort>) -> Arc<Self> {
        let audio = Arc::new(Self {
            recording: AtomicBool::new(false),
            bus: bus.clone(),
            speaker: Mutex::new(speaker),
        });

        let for_play = audio.clone();
        bus.subscribe("audio/play", move |payload: &str| {
            for_play.play(payload);
        });

        audio
    }

    /// Full pipeline: playback wiring plus the pinned capture task. Runs
    /// during boot while fast SRAM is still contiguous.
    pub fn start(bus: Arc<Bus>, speaker: Box<dyn SpeakerPort>, mic: Box<dyn MicPort>) -> Arc<Self> {
        info!("Audio: initialising full-duplex pipeline");
        let audio = Self::new(bus, speaker);

        let for_task = audio.clone();
        spawn_pinned(
            TaskOptions {
                core: Core::App,
                priority: 2,
                stack_kb: 4,
                stack_in_psram: true,
            },
            "audio_record\0",
            move || capture_task(for_task, mic),
        );

        audio
    }

    /// Decode a Base64 PCM payload and hand it to the speaker. The decode
    /// buffer must be DMA-capable; allocation failure drops the payload.
    fn play(&self, base64_data: &str) {
        if base64_data.is_empty() {
            return;
        }

        let Some(mut pcm) = RegionBuf::alloc(Region::FastSramDma, base64_data.len()) else {
            error!("Audio: no fast SRAM for decode buffer ({})", base64_data.len());
            return;
        };

        let len = match BASE64_STANDARD.decode_slice(base64_data, pcm.as_mut_slice()) {
            Ok(len) => len,
            Err(_) => {
                error!("Audio: base64 decode failed");
                return;
            }
        };

        if len > 0 {
            if let Err(e) = self.speaker.lock().unwrap().write(&pcm.as_slice()[..len]) {
                error!("Audio: speaker write failed: {}", e);
            }
        }
    }

    /// Begin capture: flips the flag and announces the stream start.
    pub fn record_start(&self) {
        if !self.recording.load(Ordering::SeqCst) {
            info!("Audio: recording started");
            self.bus
                .publish_up("audio/record", "{\"state\": \"start\"}");
            self.recording.store(true, Ordering::SeqCst);
        }
    }

    /// Stop capture: flips the flag and announces the stream end.
    pub fn record_stop(&self) {
        if self.recording.load(Ordering::SeqCst) {
            self.recording.store(false, Ordering::SeqCst);
            self.bus.publish_up("audio/record", "{\"state\": \"stop\"}");
            info!("Audio: recording stopped");
        }
    }

    /// Single-word read used by the particle throttle.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

/// The pinned capture loop. Buffers are allocated once and never freed.
fn capture_task(audio: Arc<Audio>, mut mic: Box<dyn MicPort>) {
    info!("Audio: capture task started");

    let Some(mut pcm) = RegionBuf::alloc(Region::FastSramDma, PCM_CHUNK_SIZE) else {
        error!("Audio: failed to allocate PCM capture buffer, task exiting");
        return;
    };
    let mut base64_buf = String::with_capacity(BASE64_BUF_CAPACITY);
    let mut json_buf = String::with_capacity(JSON_BUF_CAPACITY);

    loop {
        if !audio.is_recording() {
            std::thread::sleep(Duration::from_millis(IDLE_SLEEP_MS));
            continue;
        }

        match mic.read(pcm.as_mut_slice()) {
            Ok(len) if len > 0 => {
                base64_buf.clear();
                BASE64_STANDARD.encode_string(&pcm.as_slice()[..len], &mut base64_buf);

                json_buf.clear();
                let _ = write!(
                    json_buf,
                    "{{\"state\": \"stream\", \"data\": \"{}\"}}",
                    base64_buf
                );
                audio.bus.publish_up("audio/record", &json_buf);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Audio: I2S read error: {}", e);
                std::thread::sleep(Duration::from_millis(ERROR_SLEEP_MS));
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────
