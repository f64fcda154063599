//! The common style set.
//!
//! Every widget recognises the same optional style keys; parsing is
//! tolerant per the error-handling policy — an unknown enum string logs a
//! warning and leaves the attribute unset, a wrong type is ignored.

use log::warn;
use serde_json::{Map, Value};

// ── Colour ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 0xFF,
        g: 0xFF,
        b: 0xFF,
    };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    /// Parse `#RRGGBB`. Anything else yields white, like the reference
    /// renderer's fallback.
    pub fn from_hex(s: &str) -> Color {
        let bytes = s.as_bytes();
        if bytes.len() < 7 || bytes[0] != b'#' || !s.is_ascii() {
            return Color::WHITE;
        }
        let parse2 = |i: usize| u8::from_str_radix(&s[i..i + 2], 16);
        match (parse2(1), parse2(3), parse2(5)) {
            (Ok(r), Ok(g), Ok(b)) => Color { r, g, b },
            _ => Color::WHITE,
        }
    }

    /// Pack into RGB565 (the panel's native format).
    pub fn to_rgb565(self) -> u16 {
        (((self.r as u16) >> 3) << 11) | (((self.g as u16) >> 2) << 5) | ((self.b as u16) >> 3)
    }

    /// Mix `a` toward `b` by `t` (0 = all `a`, 255 = all `b`).
    pub fn mix(a: Color, b: Color, t: u8) -> Color {
        let lerp = |x: u8, y: u8| -> u8 {
            ((x as u16 * (255 - t as u16) + y as u16 * t as u16) / 255) as u8
        };
        Color {
            r: lerp(a.r, b.r),
            g: lerp(a.g, b.g),
            b: lerp(a.b, b.b),
        }
    }

    /// Scale brightness by `alpha` (0..=255).
    pub fn scale(self, alpha: u8) -> Color {
        let s = |x: u8| ((x as u16 * alpha as u16) / 255) as u8;
        Color {
            r: s(self.r),
            g: s(self.g),
            b: s(self.b),
        }
    }
}

// ── Size ──────────────────────────────────────────────────────

/// A size attribute: pixels, percent of parent, or shrink-to-fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Px(i32),
    Pct(i32),
    Content,
}

impl Size {
    /// Parse a size value: number → pixels; `"NN%"` → percent; `"full"` →
    /// 100 %; `"content"` → shrink-to-fit; other numeric strings → pixels.
    pub fn parse(v: &Value) -> Size {
        match v {
            Value::Number(n) => Size::Px(n.as_i64().unwrap_or(0) as i32),
            Value::String(s) => {
                if s == "full" {
                    return Size::Pct(100);
                }
                if s == "content" {
                    return Size::Content;
                }
                if let Some(stripped) = s.strip_suffix('%') {
                    return Size::Pct(stripped.trim().parse().unwrap_or(0));
                }
                Size::Px(s.trim().parse().unwrap_or(0))
            }
            _ => Size::Content,
        }
    }

    /// Resolve against the parent's content extent. `Content` resolves to
    /// `None` — the caller measures children instead.
    pub fn resolve(self, parent_extent: i32) -> Option<i32> {
        match self {
            Size::Px(px) => Some(px),
            Size::Pct(pct) => Some(parent_extent * pct / 100),
            Size::Content => None,
        }
    }
}

// ── Enumerated attributes ─────────────────────────────────────

/// Absolute anchor within the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Center,
    TopMid,
    TopLeft,
    TopRight,
    BottomMid,
    BottomLeft,
    BottomRight,
    LeftMid,
    RightMid,
}

impl Anchor {
    pub fn parse(s: &str) -> Option<Anchor> {
        Some(match s {
            "center" => Anchor::Center,
            "top_mid" => Anchor::TopMid,
            "top_left" => Anchor::TopLeft,
            "top_right" => Anchor::TopRight,
            "bottom_mid" => Anchor::BottomMid,
            "bottom_left" => Anchor::BottomLeft,
            "bottom_right" => Anchor::BottomRight,
            "left_mid" => Anchor::LeftMid,
            "right_mid" => Anchor::RightMid,
            _ => return None,
        })
    }
}

/// Flex flow direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexFlow {
    Row,
    Column,
    RowWrap,
    ColumnWrap,
}

impl FlexFlow {
    pub fn parse(s: &str) -> FlexFlow {
        match s {
            "row" => FlexFlow::Row,
            "column" => FlexFlow::Column,
            "row_wrap" => FlexFlow::RowWrap,
            "column_wrap" => FlexFlow::ColumnWrap,
            other => {
                warn!("Style: unknown flex flow '{}', using column", other);
                FlexFlow::Column
            }
        }
    }

    pub fn is_row(self) -> bool {
        matches!(self, FlexFlow::Row | FlexFlow::RowWrap)
    }

    pub fn wraps(self) -> bool {
        matches!(self, FlexFlow::RowWrap | FlexFlow::ColumnWrap)
    }
}

/// Flex main/cross-axis alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlexAlign {
    #[default]
    Start,
    End,
    Center,
    SpaceEvenly,
    SpaceAround,
    SpaceBetween,
}

impl FlexAlign {
    pub fn parse(s: &str) -> FlexAlign {
        match s {
            "start" => FlexAlign::Start,
            "end" => FlexAlign::End,
            "center" => FlexAlign::Center,
            "space_evenly" => FlexAlign::SpaceEvenly,
            "space_around" => FlexAlign::SpaceAround,
            "space_between" => FlexAlign::SpaceBetween,
            other => {
                warn!("Style: unknown flex align '{}', using start", other);
                FlexAlign::Start
            }
        }
    }
}

/// Long-text handling for labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LongMode {
    #[default]
    Wrap,
    Scroll,
    Dot,
    Marquee,
}

impl LongMode {
    pub fn parse(s: &str) -> Option<LongMode> {
        Some(match s {
            "wrap" => LongMode::Wrap,
            "scroll" => LongMode::Scroll,
            "dot" => LongMode::Dot,
            "marquee" => LongMode::Marquee,
            _ => return None,
        })
    }
}

// ── Font presets ──────────────────────────────────────────────

const FONT_PRESETS: [i32; 5] = [14, 16, 20, 24, 26];

/// Map a requested size to the nearest preset ≤ the request (floor at 14).
pub fn font_preset(requested: i32) -> i32 {
    let mut chosen = FONT_PRESETS[0];
    for &preset in &FONT_PRESETS {
        if requested >= preset {
            chosen = preset;
        }
    }
    chosen
}

// ── The style record ──────────────────────────────────────────

/// Parsed common style attributes. All optional; a default instance means
/// "inherit the widget's defaults".
#[derive(Debug, Clone, Default)]
pub struct Style {
    pub w: Option<Size>,
    pub h: Option<Size>,
    pub align: Option<(Anchor, i32, i32)>,
    pub bg_color: Option<Color>,
    pub bg_opa: Option<u8>,
    pub pad: Option<i32>,
    pub radius: Option<i32>,
    pub gap: Option<i32>,
    pub border_w: Option<i32>,
    pub border_color: Option<Color>,
    pub text_color: Option<Color>,
    /// Already mapped onto a preset.
    pub font_size: Option<i32>,
    pub shadow_w: Option<i32>,
    pub shadow_color: Option<Color>,
    pub opa: Option<u8>,
    pub hidden: bool,
}

impl Style {
    /// Extract the common style set from a node object.
    pub fn parse(node: &Map<String, Value>) -> Style {
        let mut style = Style::default();

        if let Some(v) = node.get("w") {
            style.w = Some(Size::parse(v));
        }
        if let Some(v) = node.get("h") {
            style.h = Some(Size::parse(v));
        }

        if let Some(s) = node.get("align").and_then(Value::as_str) {
            match Anchor::parse(s) {
                Some(anchor) => {
                    let x = node.get("x").and_then(Value::as_i64).unwrap_or(0) as i32;
                    let y = node.get("y").and_then(Value::as_i64).unwrap_or(0) as i32;
                    style.align = Some((anchor, x, y));
                }
                None => warn!("Style: unknown align '{}', skipping", s),
            }
        }

        if let Some(s) = node.get("bg_color").and_then(Value::as_str) {
            style.bg_color = Some(Color::from_hex(s));
        }
        if let Some(n) = node.get("bg_opa").and_then(Value::as_i64) {
            style.bg_opa = Some(n.clamp(0, 255) as u8);
        }
        if let Some(n) = node.get("pad").and_then(Value::as_i64) {
            style.pad = Some(n as i32);
        }
        if let Some(n) = node.get("radius").and_then(Value::as_i64) {
            style.radius = Some(n as i32);
        }
        if let Some(n) = node.get("gap").and_then(Value::as_i64) {
            style.gap = Some(n as i32);
        }
        if let Some(n) = node.get("border_w").and_then(Value::as_i64) {
            style.border_w = Some(n as i32);
        }
        if let Some(s) = node.get("border_color").and_then(Value::as_str) {
            style.border_color = Some(Color::from_hex(s));
        }
        if let Some(s) = node.get("text_color").and_then(Value::as_str) {
            style.text_color = Some(Color::from_hex(s));
        }
        if let Some(n) = node.get("font_size").and_then(Value::as_i64) {
            style.font_size = Some(font_preset(n as i32));
        }
        if let Some(n) = node.get("shadow_w").and_then(Value::as_i64) {
            style.shadow_w = Some(n as i32);
        }
        if let Some(s) = node.get("shadow_color").and_then(Value::as_str) {
            style.shadow_color = Some(Color::from_hex(s));
        }
        if let Some(n) = node.get("opa").and_then(Value::as_i64) {
            style.opa = Some(n.clamp(0, 255) as u8);
        }
        if let Some(b) = node.get("hidden").and_then(Value::as_bool) {
            style.hidden = b;
        }

        style
    }
}

// ── Tests ─────────────────────────────────────────────────────
