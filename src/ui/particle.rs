//! Canvas-backed particle system.
//!
//! Each particle widget owns an RGB565 canvas allocated from PSRAM,
//! clamped to 200×200 px (≤80 KiB) per instance. A ~30 fps timer animates
//! up to 30 particles emitted from the canvas centre with random velocity,
//! constant downward gravity and linear alpha decay.
//!
//! While audio capture is running the tick returns without drawing: the
//! PSRAM bandwidth the blit would eat causes audible I2S underruns.

use log::warn;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::adapters::mem::{Region, RegionBuf};

use super::style::Color;

/// Hard cap on canvas extent per instance.
pub const MAX_CANVAS_EXTENT: i32 = 200;
/// Particle budget per instance.
pub const MAX_PARTICLES: usize = 30;
/// Timer period (~30 fps).
pub const TICK_PERIOD_MS: u32 = 33;
/// Downward acceleration in px/tick².
const GRAVITY: f32 = 0.06;

struct Particle {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    alpha: f32,
    decay: f32,
}

pub struct ParticleSystem {
    canvas_w: i32,
    canvas_h: i32,
    canvas: Option<RegionBuf>,
    particles: Vec<Particle>,
    rng: SmallRng,
    color: Color,
    last_tick_ms: u64,
    frames: u64,
}

impl ParticleSystem {
    /// Create a system with a `w×h` canvas (clamped to the cap). On PSRAM
    /// exhaustion the widget still exists, it just never draws.
    pub fn new(w: i32, h: i32, color: Color, seed: u64) -> Self {
        let canvas_w = w.clamp(1, MAX_CANVAS_EXTENT);
        let canvas_h = h.clamp(1, MAX_CANVAS_EXTENT);
        if canvas_w != w || canvas_h != h {
            warn!(
                "Particle: canvas {}x{} clamped to {}x{}",
                w, h, canvas_w, canvas_h
            );
        }

        let canvas = RegionBuf::alloc(Region::Psram, (canvas_w * canvas_h * 2) as usize);
        if canvas.is_none() {
            warn!("Particle: canvas alloc failed, running without pixels");
        }

        Self {
            canvas_w,
            canvas_h,
            canvas,
            particles: Vec::with_capacity(MAX_PARTICLES),
            rng: SmallRng::seed_from_u64(seed),
            color,
            last_tick_ms: 0,
            frames: 0,
        }
    }

    pub fn canvas_size(&self) -> (i32, i32) {
        (self.canvas_w, self.canvas_h)
    }

    pub fn has_canvas(&self) -> bool {
        self.canvas.is_some()
    }

    /// Frames drawn since creation (throttle observability).
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Advance the system. `throttled` short-circuits before any canvas
    /// write; the period gate keeps the effective rate at ~30 fps no
    /// matter how often the UI tick runs.
    pub fn tick(&mut self, now_ms: u64, throttled: bool) {
        if throttled {
            return;
        }
        if now_ms.saturating_sub(self.last_tick_ms) < TICK_PERIOD_MS as u64 {
            return;
        }
        self.last_tick_ms = now_ms;

        self.step();
        self.draw();
        self.frames += 1;
    }

    fn step(&mut self) {
        // Refill the pool from the centre.
        while self.particles.len() < MAX_PARTICLES {
            let angle = self.rng.gen_range(0.0..core::f32::consts::TAU);
            let speed = self.rng.gen_range(0.5..2.5_f32);
            let decay = self.rng.gen_range(0.01..0.04_f32);
            self.particles.push(Particle {
                x: self.canvas_w as f32 / 2.0,
                y: self.canvas_h as f32 / 2.0,
                vx: angle.cos() * speed,
                vy: angle.sin() * speed,
                alpha: 1.0,
                decay,
            });
        }

        let (w, h) = (self.canvas_w as f32, self.canvas_h as f32);
        for p in &mut self.particles {
            p.vy += GRAVITY;
            p.x += p.vx;
            p.y += p.vy;
            p.alpha -= p.decay;
            if p.x < 0.0 || p.x >= w || p.y < 0.0 || p.y >= h {
                p.alpha = 0.0;
            }
        }
        self.particles.retain(|p| p.alpha > 0.0);
    }

    fn draw(&mut self) {
        let Some(canvas) = self.canvas.as_mut() else {
            return;
        };
        let buf = canvas.as_mut_slice();
        buf.fill(0);

        for p in &self.particles {
            let px = p.x as i32;
            let py = p.y as i32;
            let shade = self.color.scale((p.alpha * 255.0) as u8).to_rgb565();
            // 2x2 block per particle.
            for dy in 0..2 {
                for dx in 0..2 {
                    let x = px + dx;
                    let y = py + dy;
                    if x >= 0 && x < self.canvas_w && y >= 0 && y < self.canvas_h {
                        let idx = ((y * self.canvas_w + x) * 2) as usize;
                        buf[idx..idx + 2].copy_from_slice(&shade.to_le_bytes());
                    }
                }
            }
        }
    }
}
