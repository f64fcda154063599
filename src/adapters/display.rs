//! Display panel adapter.
//!
//! Panel initialisation, the SPI DMA framebuffer slice and the touch
//! controller all live in the board-support package; this adapter is the
//! narrow interface the firmware consumes: one-shot start, backlight
//! control for screen sleep, and the user-activity clock that drives the
//! sleep timeout.

use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use log::info;

use super::time::MonotonicClock;

#[cfg(target_os = "espidf")]
extern "C" {
    // Provided by the board-support component (C side).
    fn bsp_display_start() -> i32;
    fn bsp_display_brightness_set(percent: i32) -> i32;
}

pub struct Display {
    clock: MonotonicClock,
    last_activity_ms: AtomicU64,
    brightness: AtomicU8,
}

impl Display {
    /// Initialise the panel. Must run first in the boot order: the SPI DMA
    /// descriptors and the framebuffer slice are carved out of fast SRAM
    /// while the heap is still pristine.
    pub fn start() -> Result<Self, &'static str> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: one-shot BSP call from the main task.
            let ret = unsafe { bsp_display_start() };
            if ret != 0 {
                return Err("panel init failed");
            }
        }

        info!("Display: panel started");
        let clock = MonotonicClock::new();
        let now = clock.uptime_ms();
        Ok(Self {
            clock,
            last_activity_ms: AtomicU64::new(now),
            brightness: AtomicU8::new(100),
        })
    }

    /// Set backlight brightness (0–100).
    pub fn set_brightness(&self, percent: u8) {
        let percent = percent.min(100);
        #[cfg(target_os = "espidf")]
        // SAFETY: BSP brightness call is safe from any task.
        unsafe {
            bsp_display_brightness_set(percent as i32);
        }
        self.brightness.store(percent, Ordering::Relaxed);
    }

    pub fn brightness(&self) -> u8 {
        self.brightness.load(Ordering::Relaxed)
    }

    /// Record user activity (touch, fresh layout from the server).
    pub fn trig_activity(&self) {
        self.last_activity_ms
            .store(self.clock.uptime_ms(), Ordering::Relaxed);
    }

    /// Milliseconds since the last recorded activity.
    pub fn inactive_ms(&self) -> u64 {
        self.clock
            .uptime_ms()
            .saturating_sub(self.last_activity_ms.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_full_brightness() {
        let d = Display::start().unwrap();
        assert_eq!(d.brightness(), 100);
    }

    #[test]
    fn brightness_clamps_to_100() {
        let d = Display::start().unwrap();
        d.set_brightness(250);
        assert_eq!(d.brightness(), 100);
    }

    #[test]
    fn activity_resets_inactivity() {
        let d = Display::start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(d.inactive_ms() >= 15);
        d.trig_activity();
        assert!(d.inactive_ms() < 15);
    }
}
