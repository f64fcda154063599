//! Audio codec device adapter.
//!
//! The I2S bus, the DAC (speaker) and the ADC (stereo microphone array)
//! are initialised by the board-support package; this adapter wraps the
//! resulting codec-device handles behind the two ports the audio pipeline
//! consumes. Reads and writes block on I2S DMA completion.

use crate::error::CodecError;

#[cfg(not(target_os = "espidf"))]
use log::info;

// ── Ports ─────────────────────────────────────────────────────

/// Playback port: raw 16-bit PCM in, sound out.
pub trait SpeakerPort: Send {
    fn write(&mut self, pcm: &[u8]) -> Result<(), CodecError>;
}

/// Capture port: fills `buf` with raw 16-bit PCM, returns bytes read.
pub trait MicPort: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CodecError>;
}

// ── ESP-IDF backend ───────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use super::*;
    use core::ffi::c_void;
    use log::error;

    // esp_codec_dev component + BSP glue (C side).
    extern "C" {
        fn bsp_audio_codec_speaker_init() -> *mut c_void;
        fn bsp_audio_codec_microphone_init() -> *mut c_void;
        fn esp_codec_dev_open(handle: *mut c_void, fs: *const SampleInfo) -> i32;
        fn esp_codec_dev_write(handle: *mut c_void, data: *mut c_void, len: i32) -> i32;
        fn esp_codec_dev_read(handle: *mut c_void, data: *mut c_void, len: i32) -> i32;
        fn esp_codec_dev_set_out_vol(handle: *mut c_void, volume: i32) -> i32;
        fn esp_codec_dev_set_in_gain(handle: *mut c_void, db: f32) -> i32;
    }

    #[repr(C)]
    pub struct SampleInfo {
        pub sample_rate: u32,
        pub channel: u8,
        pub channel_mask: u16,
        pub bits_per_sample: u8,
    }

    pub struct EspSpeaker {
        handle: *mut c_void,
    }

    // SAFETY: the codec-dev handle is internally synchronised by the
    // esp_codec_dev component; we move it into exactly one task.
    unsafe impl Send for EspSpeaker {}

    impl EspSpeaker {
        /// Open the speaker path: mono, 16-bit, fixed output volume.
        pub fn open(sample_rate: u32, volume: u8) -> Result<Self, CodecError> {
            // SAFETY: BSP init is a one-shot call from the boot path.
            let handle = unsafe { bsp_audio_codec_speaker_init() };
            if handle.is_null() {
                error!("Codec: speaker init failed");
                return Err(CodecError::OpenFailed);
            }
            let fs = SampleInfo {
                sample_rate,
                channel: 1,
                channel_mask: 0,
                bits_per_sample: 16,
            };
            unsafe {
                esp_codec_dev_set_out_vol(handle, volume as i32);
                if esp_codec_dev_open(handle, &fs) != 0 {
                    return Err(CodecError::OpenFailed);
                }
            }
            Ok(Self { handle })
        }
    }

    impl SpeakerPort for EspSpeaker {
        fn write(&mut self, pcm: &[u8]) -> Result<(), CodecError> {
            // SAFETY: buffer is valid for the duration of the blocking write.
            let ret = unsafe {
                esp_codec_dev_write(self.handle, pcm.as_ptr() as *mut c_void, pcm.len() as i32)
            };
            if ret == 0 {
                Ok(())
            } else {
                Err(CodecError::WriteFailed)
            }
        }
    }

    pub struct EspMic {
        handle: *mut c_void,
    }

    // SAFETY: as for EspSpeaker.
    unsafe impl Send for EspMic {}

    impl EspMic {
        /// Open the microphone path: stereo read mode, 16-bit, fixed gain.
        pub fn open(sample_rate: u32, gain_db: f32) -> Result<Self, CodecError> {
            // SAFETY: BSP init is a one-shot call from the boot path.
            let handle = unsafe { bsp_audio_codec_microphone_init() };
            if handle.is_null() {
                error!("Codec: microphone init failed");
                return Err(CodecError::OpenFailed);
            }
            let fs = SampleInfo {
                sample_rate,
                channel: 2,
                channel_mask: 0,
                bits_per_sample: 16,
            };
            unsafe {
                esp_codec_dev_set_in_gain(handle, gain_db);
                if esp_codec_dev_open(handle, &fs) != 0 {
                    return Err(CodecError::OpenFailed);
                }
            }
            Ok(Self { handle })
        }
    }

    impl MicPort for EspMic {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, CodecError> {
            // SAFETY: buffer is valid for the duration of the blocking read.
            let ret = unsafe {
                esp_codec_dev_read(self.handle, buf.as_mut_ptr() as *mut c_void, buf.len() as i32)
            };
            if ret == 0 {
                Ok(buf.len())
            } else {
                Err(CodecError::ReadFailed)
            }
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::{EspMic, EspSpeaker};

// ── Simulation backend ────────────────────────────────────────

/// Captures everything written, for test assertions.
#[cfg(not(target_os = "espidf"))]
pub struct SimSpeaker {
    written: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[cfg(not(target_os = "espidf"))]
impl SimSpeaker {
    pub fn open(sample_rate: u32, volume: u8) -> Result<Self, CodecError> {
        info!("Codec(sim): speaker ready ({} Hz, vol {})", sample_rate, volume);
        Ok(Self {
            written: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        })
    }

    /// Handle for inspecting written PCM from a test.
    pub fn sink(&self) -> std::sync::Arc<std::sync::Mutex<Vec<u8>>> {
        self.written.clone()
    }
}

#[cfg(not(target_os = "espidf"))]
impl SpeakerPort for SimSpeaker {
    fn write(&mut self, pcm: &[u8]) -> Result<(), CodecError> {
        self.written.lock().unwrap().extend_from_slice(pcm);
        Ok(())
    }
}

/// Produces a deterministic 16-bit ramp so capture tests can verify
/// content end-to-end.
#[cfg(not(target_os = "espidf"))]
pub struct SimMic {
    counter: u16,
}

#[cfg(not(target_os = "espidf"))]
impl SimMic {
    pub fn open(sample_rate: u32, gain_db: f32) -> Result<Self, CodecError> {
        info!("Codec(sim): mic ready ({} Hz, gain {} dB)", sample_rate, gain_db);
        Ok(Self { counter: 0 })
    }
}

#[cfg(not(target_os = "espidf"))]
impl MicPort for SimMic {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CodecError> {
        // A real codec read blocks until DMA fills the chunk; emulate the
        // pacing so capture loops do not spin.
        std::thread::sleep(std::time::Duration::from_millis(10));
        for chunk in buf.chunks_exact_mut(2) {
            chunk.copy_from_slice(&self.counter.to_le_bytes());
            self.counter = self.counter.wrapping_add(1);
        }
        Ok(buf.len())
    }
}
