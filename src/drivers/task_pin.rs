//! Core-pinned task spawning for the ESP32-S3 dual-core.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::spawn` creates a
//! FreeRTOS task pinned to a specific CPU core with explicit priority,
//! stack size and stack placement. On non-ESP targets, falls back to a
//! plain named thread.
//!
//! The config→spawn pair must not be interleaved with other thread
//! creation on the same thread: `esp_pthread_set_cfg()` applies to the
//! *next* `pthread_create()` from the calling thread.

/// CPU core identifiers for the ESP32-S3 Xtensa LX7 dual-core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU) — UI timer/handler lives here.
    Pro = 0,
    /// Core 1 (APP_CPU) — transport receive, audio capture, telemetry.
    App = 1,
}

/// Options for a pinned task.
#[derive(Debug, Clone, Copy)]
pub struct TaskOptions {
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
    /// Place the task stack in PSRAM, preserving fast SRAM for DMA.
    pub stack_in_psram: bool,
}

/// Spawn a thread pinned to a core with explicit priority and stack.
///
/// The `name` parameter must be a null-terminated string (e.g. `"audio\0"`).
#[cfg(target_os = "espidf")]
pub fn spawn_pinned(
    opts: TaskOptions,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> std::thread::JoinHandle<()> {
    unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = opts.core as i32;
        cfg.prio = opts.priority as i32;
        cfg.stack_size = (opts.stack_kb * 1024) as i32;
        cfg.thread_name = name.as_ptr() as *const _;
        if opts.stack_in_psram {
            cfg.stack_alloc_caps =
                esp_idf_sys::MALLOC_CAP_SPIRAM | esp_idf_sys::MALLOC_CAP_8BIT;
        }
        let ret = esp_idf_sys::esp_pthread_set_cfg(&cfg);
        assert!(
            ret == esp_idf_sys::ESP_OK as i32,
            "esp_pthread_set_cfg failed: {ret}"
        );
    }

    let display_name = name.trim_end_matches('\0');
    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB{})",
        display_name,
        opts.core,
        opts.priority,
        opts.stack_kb,
        if opts.stack_in_psram { ", PSRAM" } else { "" }
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .spawn(f)
        .expect("spawn_pinned: thread creation failed")
}

/// Simulation fallback — ignores core affinity, priority and placement.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_pinned(
    opts: TaskOptions,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> std::thread::JoinHandle<()> {
    let display_name = name.trim_end_matches('\0');
    log::debug!(
        "Spawning '{}' (sim, no core pinning, stack={}KB)",
        display_name,
        opts.stack_kb
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size(opts.stack_kb * 1024)
        .spawn(f)
        .expect("spawn_pinned(sim): thread creation failed")
}
