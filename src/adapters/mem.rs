//! Heap-region allocation adapter.
//!
//! The ESP32-S3 has two very different heaps: on-die fast SRAM (the only
//! memory DMA engines can reach) and off-die PSRAM (plentiful but slow).
//! Every bulk allocation in the firmware goes through [`RegionBuf`] so the
//! placement decision is explicit at the call site.
//!
//! - **`target_os = "espidf"`** — `heap_caps_malloc` with the matching
//!   capability flags.
//! - **all other targets** — plain `Vec` backing plus live-allocation
//!   counters, so host tests can prove that every owned buffer is released
//!   exactly once.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicUsize, Ordering};

/// Memory placement class for a bulk allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// On-die SRAM, DMA-capable. Scarce; reserved for I2S/SPI-adjacent
    /// buffers acquired before the Wi-Fi stack fragments the heap.
    FastSramDma,
    /// Default heap. With PSRAM enabled, malloc prefers PSRAM for large
    /// blocks, which is exactly what the encode/scratch buffers want.
    Default,
    /// Explicit PSRAM placement for bulk pixel data.
    Psram,
}

// ── Simulation accounting ─────────────────────────────────────
//
// Host tests assert that after a sequence of renders the live counters
// return to their baseline: that is the zero-leak invariant for image
// pixels, particle canvases and transport buffers.

#[cfg(not(target_os = "espidf"))]
static LIVE_BLOCKS: AtomicUsize = AtomicUsize::new(0);
#[cfg(not(target_os = "espidf"))]
static LIVE_BYTES: AtomicUsize = AtomicUsize::new(0);
#[cfg(not(target_os = "espidf"))]
static FAIL_ABOVE: AtomicUsize = AtomicUsize::new(usize::MAX);

/// Number of live [`RegionBuf`] allocations (simulation only).
#[cfg(not(target_os = "espidf"))]
pub fn live_blocks() -> usize {
    LIVE_BLOCKS.load(Ordering::SeqCst)
}

/// Total live [`RegionBuf`] bytes (simulation only).
#[cfg(not(target_os = "espidf"))]
pub fn live_bytes() -> usize {
    LIVE_BYTES.load(Ordering::SeqCst)
}

/// Make allocations of more than `limit` bytes fail (simulation only).
/// Used to exercise the degrade-gracefully paths. `usize::MAX` disables.
#[cfg(not(target_os = "espidf"))]
pub fn set_alloc_fail_above(limit: usize) {
    FAIL_ABOVE.store(limit, Ordering::SeqCst);
}

/// Serialises tests that assert on the live counters. Any test that
/// allocates a [`RegionBuf`] must hold this guard, otherwise parallel test
/// threads perturb each other's before/after deltas.
#[cfg(not(target_os = "espidf"))]
pub fn counters_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ── RegionBuf ─────────────────────────────────────────────────

/// An owned, region-placed byte buffer. Freed exactly once on drop.
pub struct RegionBuf {
    #[cfg(target_os = "espidf")]
    ptr: core::ptr::NonNull<u8>,
    #[cfg(not(target_os = "espidf"))]
    data: Vec<u8>,
    len: usize,
    region: Region,
}

// SAFETY: the buffer is uniquely owned; the raw pointer is only ever
// touched through &self / &mut self.
#[cfg(target_os = "espidf")]
unsafe impl Send for RegionBuf {}

impl RegionBuf {
    /// Allocate `len` zeroed bytes in `region`. Returns `None` when the
    /// region is exhausted — callers degrade per the error-handling policy.
    pub fn alloc(region: Region, len: usize) -> Option<Self> {
        if len == 0 {
            return None;
        }

        #[cfg(target_os = "espidf")]
        {
            use esp_idf_svc::sys::*;
            let caps = match region {
                Region::FastSramDma => MALLOC_CAP_INTERNAL | MALLOC_CAP_DMA | MALLOC_CAP_8BIT,
                Region::Default => MALLOC_CAP_DEFAULT | MALLOC_CAP_8BIT,
                Region::Psram => MALLOC_CAP_SPIRAM | MALLOC_CAP_8BIT,
            };
            // SAFETY: heap_caps_malloc returns either NULL or a block of at
            // least `len` bytes; ownership transfers to this RegionBuf.
            let raw = unsafe { heap_caps_malloc(len, caps) } as *mut u8;
            let ptr = core::ptr::NonNull::new(raw)?;
            unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, len) };
            Some(Self { ptr, len, region })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            if len > FAIL_ABOVE.load(Ordering::SeqCst) {
                return None;
            }
            LIVE_BLOCKS.fetch_add(1, Ordering::SeqCst);
            LIVE_BYTES.fetch_add(len, Ordering::SeqCst);
            Some(Self {
                data: vec![0u8; len],
                len,
                region,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn as_slice(&self) -> &[u8] {
        #[cfg(target_os = "espidf")]
        // SAFETY: ptr points to a live allocation of exactly `len` bytes.
        unsafe {
            core::slice::from_raw_parts(self.ptr.as_ptr(), self.len)
        }
        #[cfg(not(target_os = "espidf"))]
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        #[cfg(target_os = "espidf")]
        // SAFETY: as above; &mut self guarantees exclusivity.
        unsafe {
            core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len)
        }
        #[cfg(not(target_os = "espidf"))]
        &mut self.data
    }
}

impl Drop for RegionBuf {
    fn drop(&mut self) {
        #[cfg(target_os = "espidf")]
        // SAFETY: ptr came from heap_caps_malloc and is freed exactly once.
        unsafe {
            esp_idf_svc::sys::heap_caps_free(self.ptr.as_ptr() as *mut _)
        }

        #[cfg(not(target_os = "espidf"))]
        {
            LIVE_BLOCKS.fetch_sub(1, Ordering::SeqCst);
            LIVE_BYTES.fetch_sub(self.len, Ordering::SeqCst);
        }
    }
}

impl core::fmt::Debug for RegionBuf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegionBuf")
            .field("len", &self.len)
            .field("region", &self.region)
            .finish()
    }
}

// ── Heap statistics (telemetry) ───────────────────────────────

/// Free bytes in on-die internal SRAM.
#[cfg(target_os = "espidf")]
pub fn free_heap_internal() -> u32 {
    use esp_idf_svc::sys::*;
    unsafe { heap_caps_get_free_size(MALLOC_CAP_INTERNAL) as u32 }
}

/// Free bytes across all heaps (internal + PSRAM).
#[cfg(target_os = "espidf")]
pub fn free_heap_total() -> u32 {
    unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
}

/// Simulation: synthetic figures net of tracked live allocations, so the
/// telemetry path exercises the same arithmetic as on hardware.
#[cfg(not(target_os = "espidf"))]
pub fn free_heap_internal() -> u32 {
    const SIM_INTERNAL: usize = 220 * 1024;
    SIM_INTERNAL.saturating_sub(live_bytes()) as u32
}

#[cfg(not(target_os = "espidf"))]
pub fn free_heap_total() -> u32 {
    const SIM_TOTAL: usize = 8 * 1024 * 1024;
    SIM_TOTAL.saturating_sub(live_bytes()) as u32
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_drop_balance() {
        let _g = counters_lock();
        let before = live_blocks();
        {
            let buf = RegionBuf::alloc(Region::Psram, 128).unwrap();
            assert_eq!(buf.len(), 128);
            assert_eq!(live_blocks(), before + 1);
        }
        assert_eq!(live_blocks(), before);
    }

    #[test]
    fn zero_len_alloc_fails() {
        assert!(RegionBuf::alloc(Region::Default, 0).is_none());
    }

    #[test]
    fn buffer_is_zeroed() {
        let _g = counters_lock();
        let buf = RegionBuf::alloc(Region::FastSramDma, 64).unwrap();
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn writes_are_visible() {
        let _g = counters_lock();
        let mut buf = RegionBuf::alloc(Region::Default, 16).unwrap();
        buf.as_mut_slice()[3] = 0xAB;
        assert_eq!(buf.as_slice()[3], 0xAB);
    }
}
