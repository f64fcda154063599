//! Declarative widget animations.
//!
//! A node carries zero or more [`AnimState`]s; the UI tick advances them
//! and applies their effect to the node's animatable properties (opacity,
//! translation, rotation, background colour, bar/slider value).
//!
//! Repeat semantics: `repeat < 0` loops forever; positive values count
//! cycles. `repeat == 0` is also "forever" for `breathe` and
//! `color_pulse` — a long-documented quirk of the wire protocol that
//! servers rely on — and a no-op for every other type.

use log::warn;
use serde_json::{Map, Value};

use super::style::Color;

// ── Defaults ──────────────────────────────────────────────────

const DEFAULT_BLINK_MS: u32 = 500;
const DEFAULT_BREATHE_MS: u32 = 1_000;
const DEFAULT_SPIN_MS: u32 = 1_000;
const DEFAULT_SLIDE_MS: u32 = 300;
const DEFAULT_SHAKE_MS: u32 = 300;
const DEFAULT_PULSE_MS: u32 = 1_000;
const DEFAULT_BREATHE_MIN: u8 = 80;
const DEFAULT_BREATHE_MAX: u8 = 255;
const DEFAULT_SHAKE_AMP: i32 = 8;

/// Root fade-in after a full render.
pub const FADE_IN_MS: u32 = 200;
/// Animated bar/slider value transitions.
pub const VALUE_TWEEN_MS: u32 = 200;

// ── Types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Infinite,
    Count(u32),
}

/// Colour endpoints for `color_pulse`; boxed so the node only pays for it
/// when the animation is attached, released with the node.
#[derive(Debug, Clone)]
pub struct ColorPulseState {
    pub color_a: Color,
    pub color_b: Color,
}

#[derive(Debug, Clone)]
pub enum AnimKind {
    /// Opacity 0→255 once (render transition).
    FadeIn,
    /// Opacity 255↔0.
    Blink,
    /// Opacity min↔max.
    Breathe { min_opa: u8, max_opa: u8 },
    /// Image rotation, one revolution per cycle. Globally capped.
    Spin { ccw: bool },
    /// Translate from off-screen to rest.
    SlideIn { dx: i32, dy: i32 },
    /// Horizontal wiggle, two oscillations per playthrough.
    Shake { amp: i32 },
    /// Background mixes between two colours.
    ColorPulse(Box<ColorPulseState>),
    /// Bar/slider value transition (from `update`).
    ValueTween { from: i32, to: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Easing {
    Linear,
    EaseInOut,
    EaseOut,
}

#[derive(Debug, Clone)]
pub struct AnimState {
    pub kind: AnimKind,
    pub duration_ms: u32,
    pub repeat: Repeat,
    elapsed_ms: u32,
    forward: bool,
}

/// Outcome of parsing an `anim` descriptor.
pub enum ParsedAnim {
    /// A timed animation to attach to the node.
    Timed(AnimState),
    /// `marquee` just flips the label's long mode.
    Marquee,
}

impl AnimState {
    pub fn new(kind: AnimKind, duration_ms: u32, repeat: Repeat) -> Self {
        Self {
            kind,
            duration_ms: duration_ms.max(1),
            repeat,
            elapsed_ms: 0,
            forward: true,
        }
    }

    pub fn fade_in() -> Self {
        Self::new(AnimKind::FadeIn, FADE_IN_MS, Repeat::Count(1))
    }

    pub fn value_tween(from: i32, to: i32) -> Self {
        Self::new(
            AnimKind::ValueTween { from, to },
            VALUE_TWEEN_MS,
            Repeat::Count(1),
        )
    }

    fn symmetric(&self) -> bool {
        matches!(
            self.kind,
            AnimKind::Blink | AnimKind::Breathe { .. } | AnimKind::ColorPulse(_)
        )
    }

    fn easing(&self) -> Easing {
        match self.kind {
            AnimKind::FadeIn | AnimKind::SlideIn { .. } => Easing::EaseOut,
            AnimKind::Blink
            | AnimKind::Breathe { .. }
            | AnimKind::Shake { .. }
            | AnimKind::ColorPulse(_) => Easing::EaseInOut,
            AnimKind::Spin { .. } | AnimKind::ValueTween { .. } => Easing::Linear,
        }
    }

    /// Advance by `dt_ms`. Returns `true` when the animation has finished
    /// and should be detached.
    pub fn advance(&mut self, dt_ms: u32) -> bool {
        self.elapsed_ms = self.elapsed_ms.saturating_add(dt_ms);

        while self.elapsed_ms >= self.duration_ms {
            self.elapsed_ms -= self.duration_ms;

            let cycle_done = if self.symmetric() {
                // A cycle is the forward leg plus the return leg.
                self.forward = !self.forward;
                self.forward
            } else {
                true
            };

            if cycle_done {
                match &mut self.repeat {
                    Repeat::Infinite => {}
                    Repeat::Count(n) => {
                        *n = n.saturating_sub(1);
                        if *n == 0 {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Eased position of the active leg, folded for the return leg.
    pub fn phase(&self) -> f32 {
        let t = (self.elapsed_ms as f32 / self.duration_ms as f32).clamp(0.0, 1.0);
        let eased = match self.easing() {
            Easing::Linear => t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => t * t * (3.0 - 2.0 * t),
        };
        if self.forward {
            eased
        } else {
            1.0 - eased
        }
    }
}

/// Horizontal shake offset: two full oscillations over the playthrough,
/// returning to rest at the end.
pub fn shake_offset(amp: i32, eased_t: f32) -> i32 {
    (amp as f32 * (eased_t * 2.0 * core::f32::consts::TAU).sin()) as i32
}

// ── Descriptor parsing ────────────────────────────────────────

/// Parse an `anim` descriptor. Returns `None` (with a log) for unknown
/// types or a dead-on-arrival repeat of zero.
pub fn parse(desc: &Map<String, Value>, screen: (i32, i32)) -> Option<ParsedAnim> {
    let Some(kind_str) = desc.get("type").and_then(Value::as_str) else {
        warn!("Anim: descriptor missing 'type'");
        return None;
    };

    if kind_str == "marquee" {
        return Some(ParsedAnim::Marquee);
    }

    let (kind, default_ms, default_repeat) = match kind_str {
        "blink" => (AnimKind::Blink, DEFAULT_BLINK_MS, Repeat::Infinite),
        "breathe" => {
            let min_opa = u8_field(desc, "min_opa").unwrap_or(DEFAULT_BREATHE_MIN);
            let max_opa = u8_field(desc, "max_opa").unwrap_or(DEFAULT_BREATHE_MAX);
            (
                AnimKind::Breathe { min_opa, max_opa },
                DEFAULT_BREATHE_MS,
                Repeat::Infinite,
            )
        }
        "spin" => {
            let ccw = desc.get("direction").and_then(Value::as_str) == Some("ccw");
            (AnimKind::Spin { ccw }, DEFAULT_SPIN_MS, Repeat::Infinite)
        }
        "slide_in" => {
            let (dx, dy) = match desc.get("from").and_then(Value::as_str).unwrap_or("left") {
                "right" => (screen.0, 0),
                "top" => (0, -screen.1),
                "bottom" => (0, screen.1),
                _ => (-screen.0, 0),
            };
            (
                AnimKind::SlideIn { dx, dy },
                DEFAULT_SLIDE_MS,
                Repeat::Count(1),
            )
        }
        "shake" => {
            let amp = desc
                .get("amp")
                .and_then(Value::as_i64)
                .map(|a| a as i32)
                .unwrap_or(DEFAULT_SHAKE_AMP);
            (AnimKind::Shake { amp }, DEFAULT_SHAKE_MS, Repeat::Count(1))
        }
        "color_pulse" => {
            let color_a = desc
                .get("color_a")
                .and_then(Value::as_str)
                .map(Color::from_hex)
                .unwrap_or(Color::BLACK);
            let color_b = desc
                .get("color_b")
                .and_then(Value::as_str)
                .map(Color::from_hex)
                .unwrap_or(Color::WHITE);
            (
                AnimKind::ColorPulse(Box::new(ColorPulseState { color_a, color_b })),
                DEFAULT_PULSE_MS,
                Repeat::Infinite,
            )
        }
        other => {
            warn!("Anim: unknown type '{}', skipping", other);
            return None;
        }
    };

    let duration_ms = desc
        .get("duration")
        .and_then(Value::as_i64)
        .map(|d| d.max(1) as u32)
        .unwrap_or(default_ms);

    let quirky_zero_is_infinite =
        matches!(kind, AnimKind::Breathe { .. } | AnimKind::ColorPulse(_));

    let repeat = match desc.get("repeat").and_then(Value::as_i64) {
        None => default_repeat,
        Some(n) if n < 0 => Repeat::Infinite,
        Some(0) if quirky_zero_is_infinite => {
            warn!("Anim: repeat=0 treated as infinite for '{}' (deprecated)", kind_str);
            Repeat::Infinite
        }
        Some(0) => {
            warn!("Anim: repeat=0 on '{}' plays nothing, skipping", kind_str);
            return None;
        }
        Some(n) => Repeat::Count(n as u32),
    };

    Some(ParsedAnim::Timed(AnimState::new(kind, duration_ms, repeat)))
}

fn u8_field(desc: &Map<String, Value>, key: &str) -> Option<u8> {
    desc.get(key).and_then(Value::as_i64).map(|n| n.clamp(0, 255) as u8)
}

// ── Tests ─────────────────────────────────────────────────────
