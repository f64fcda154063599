//! The SDUI layout engine.
//!
//! Materialises server-sent JSON UI trees into the retained scene graph,
//! applies incremental updates addressed by widget ID, binds action URIs,
//! and drives animations from the UI tick.
//!
//! All public methods must be called under the UI lock; the engine itself
//! carries no interior synchronisation.

use log::{error, info, warn};
use serde_json::{Map, Value};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;

use crate::adapters::mem::{Region, RegionBuf};
use crate::bus::Bus;

use super::actions::{self, InputEvent};
use super::anim::{self, AnimKind, AnimState, ParsedAnim};
use super::layout;
use super::node::{Node, NodeId, SceneTree, Widget};
use super::particle::ParticleSystem;
use super::registry::IdRegistry;
use super::style::{Color, FlexAlign, FlexFlow, LongMode, Style};

/// Concurrent image-rotation budget, process-wide.
pub const MAX_SPIN_ANIMS: u8 = 2;

pub struct UiEngine {
    tree: SceneTree,
    root: NodeId,
    registry: IdRegistry,
    spin_count: u8,
    screen_w: i32,
    screen_h: i32,
    safe_padding: i32,
    last_tick_ms: u64,
    ticked_once: bool,
    particle_seed: u64,
}

impl UiEngine {
    /// Establish the root view: inset by the safe margin on all sides,
    /// centred, flex column with centre alignment, scrolling off,
    /// transparent background. Registry and spin budget start clean.
    pub fn new(screen_w: i32, screen_h: i32, safe_padding: i32) -> Self {
        let mut tree = SceneTree::new();
        let root = tree.insert(Node::new(root_widget(), Style::default()));

        let mut engine = Self {
            tree,
            root,
            registry: IdRegistry::new(),
            spin_count: 0,
            screen_w,
            screen_h,
            safe_padding,
            last_tick_ms: 0,
            ticked_once: false,
            particle_seed: 0x5eed,
        };
        engine.relayout();

        info!(
            "UiEngine: root view {}x{} (safe padding: {})",
            screen_w - 2 * safe_padding,
            screen_h - 2 * safe_padding,
            safe_padding
        );
        engine
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.tree.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.tree.get_mut(id)
    }

    /// Live widget count, root included.
    pub fn node_count(&self) -> usize {
        self.tree.len()
    }

    pub fn registry_len(&self) -> usize {
        self.registry.len()
    }

    pub fn spin_count(&self) -> u8 {
        self.spin_count
    }

    /// O(N) scan of the ID registry.
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.registry.lookup(id)
    }

    // ── Full render ───────────────────────────────────────────

    /// Re-materialise the whole UI tree from a layout payload. On parse
    /// failure nothing is mutated. Completion starts the root fade-in.
    pub fn render(&mut self, json_text: &str) {
        let parsed: Value = match serde_json::from_str(json_text) {
            Ok(v) => v,
            Err(_) => {
                error!("UiEngine: failed to parse layout JSON");
                return;
            }
        };

        info!("UiEngine: rendering layout ({} bytes)", json_text.len());

        // Fade the stage to black and clear it. Child deletion releases
        // every owned buffer; the registry and spin budget restart clean.
        if let Some(root) = self.tree.get_mut(self.root) {
            root.opacity = 0;
            root.anims.clear();
        }
        self.tree.clear_children(self.root);
        self.registry.clear();
        self.spin_count = 0;

        // Re-apply root defaults before the new subtree lands.
        if let Some(root) = self.tree.get_mut(self.root) {
            root.widget = root_widget();
            root.style = Style::default();
            root.bg_color = None;
            root.hidden = false;
            root.translate = (0, 0);
        }

        match &parsed {
            Value::Array(items) => {
                for item in items {
                    self.build_node(item, self.root);
                }
            }
            Value::Object(map) => {
                if let Some(children) = map.get("children").and_then(Value::as_array) {
                    self.apply_root_styles(map);
                    for child in children {
                        self.build_node(child, self.root);
                    }
                } else {
                    self.build_node(&parsed, self.root);
                }
            }
            _ => {
                warn!("UiEngine: layout root is neither object nor array");
            }
        }

        self.relayout();

        if let Some(root) = self.tree.get_mut(self.root) {
            root.anims.push(AnimState::fade_in());
        }

        info!(
            "UiEngine: layout render complete, registered {} IDs",
            self.registry.len()
        );
    }

    /// Common styles and flex settings from a root-level object apply to
    /// the root view itself.
    fn apply_root_styles(&mut self, map: &Map<String, Value>) {
        let style = Style::parse(map);
        let flow = map
            .get("flex")
            .and_then(Value::as_str)
            .map(FlexFlow::parse);

        let Some(root) = self.tree.get_mut(self.root) else {
            return;
        };
        root.bg_color = style.bg_color.or(root.bg_color);
        root.hidden = style.hidden;
        if let Some(opa) = style.opa {
            root.opacity = opa;
        }
        root.style = style;
        if let Some(flow) = flow {
            if let Widget::Container { flow: f, .. } = &mut root.widget {
                *f = Some(flow);
            }
        }
    }

    // ── Node construction ─────────────────────────────────────

    fn build_node(&mut self, value: &Value, parent: NodeId) {
        let Some(map) = value.as_object() else {
            warn!("UiEngine: node is not an object, skipping");
            return;
        };

        let Some(type_str) = map.get("type").and_then(Value::as_str) else {
            warn!("UiEngine: node missing 'type' field, skipping");
            return;
        };

        let widget = match type_str {
            "container" => self.create_container(map),
            "label" => create_label(map),
            "button" => Widget::Button,
            "image" => self.create_image(map),
            "bar" => create_bar(map),
            "slider" => create_slider(map),
            "particle" => self.create_particle(map),
            other => {
                warn!("UiEngine: unknown widget type: {}", other);
                return;
            }
        };

        let style = Style::parse(map);
        let node = Node::new(widget, style);
        let id = self.tree.insert(node);
        self.tree.add_child(parent, id);

        if let Some(id_str) = map.get("id").and_then(Value::as_str) {
            self.registry.register(id_str, id);
        }

        if let Some(bindings) = actions::parse_bindings(map) {
            if let Some(node) = self.tree.get_mut(id) {
                node.actions = Some(bindings);
            }
        }

        // Buttons get their inline label before any explicit children so
        // the "first child" update convention holds.
        if matches!(self.tree.get(id).map(|n| &n.widget), Some(Widget::Button)) {
            self.attach_button_label(id, map);
        }

        if let Some(desc) = map.get("anim").and_then(Value::as_object) {
            self.start_anim_on(id, desc);
        }

        if let Some(children) = map.get("children").and_then(Value::as_array) {
            for child in children {
                self.build_node(child, id);
            }
        }
    }

    fn create_container(&self, map: &Map<String, Value>) -> Widget {
        let flow = map
            .get("flex")
            .and_then(Value::as_str)
            .map(FlexFlow::parse);
        let justify = map
            .get("justify")
            .and_then(Value::as_str)
            .map(FlexAlign::parse)
            .unwrap_or_default();
        let align_items = map
            .get("align_items")
            .and_then(Value::as_str)
            .map(FlexAlign::parse)
            .unwrap_or_default();
        let scrollable = map
            .get("scrollable")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Widget::Container {
            flow,
            justify,
            align_items,
            scrollable,
        }
    }

    /// Decode Base64 RGB565 pixels into a PSRAM buffer. Every failure
    /// degrades to a pixel-less widget.
    fn create_image(&self, map: &Map<String, Value>) -> Widget {
        let img_w = map.get("img_w").and_then(Value::as_i64).unwrap_or(0) as i32;
        let img_h = map.get("img_h").and_then(Value::as_i64).unwrap_or(0) as i32;

        let pixels = (|| -> Option<RegionBuf> {
            let src = map.get("src").and_then(Value::as_str)?;
            if img_w <= 0 || img_h <= 0 {
                warn!("UiEngine: image missing img_w/img_h");
                return None;
            }
            let decoded = match BASE64_STANDARD.decode(src) {
                Ok(d) => d,
                Err(_) => {
                    warn!("UiEngine: image src base64 decode failed");
                    return None;
                }
            };
            let expected = (img_w * img_h * 2) as usize;
            if decoded.len() != expected {
                warn!(
                    "UiEngine: image pixel size mismatch ({} != {})",
                    decoded.len(),
                    expected
                );
                return None;
            }
            let mut buf = match RegionBuf::alloc(Region::Psram, expected) {
                Some(b) => b,
                None => {
                    warn!("UiEngine: image buffer alloc failed ({} bytes)", expected);
                    return None;
                }
            };
            buf.as_mut_slice().copy_from_slice(&decoded);
            Some(buf)
        })();

        Widget::Image {
            img_w,
            img_h,
            pixels,
        }
    }

    fn create_particle(&mut self, map: &Map<String, Value>) -> Widget {
        let w = map.get("canvas_w").and_then(Value::as_i64).unwrap_or(200) as i32;
        let h = map.get("canvas_h").and_then(Value::as_i64).unwrap_or(200) as i32;
        let color = map
            .get("color")
            .and_then(Value::as_str)
            .map(Color::from_hex)
            .unwrap_or(Color::WHITE);
        self.particle_seed = self.particle_seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        Widget::Particle(ParticleSystem::new(w, h, color, self.particle_seed))
    }

    fn attach_button_label(&mut self, button: NodeId, map: &Map<String, Value>) {
        let Some(text) = map.get("text").and_then(Value::as_str) else {
            return;
        };
        let parent_style = self.tree.get(button).map(|n| n.style.clone()).unwrap_or_default();
        let label_style = Style {
            text_color: parent_style.text_color,
            font_size: parent_style.font_size,
            ..Default::default()
        };
        let label = Node::new(
            Widget::Label {
                text: text.to_owned(),
                long_mode: LongMode::default(),
            },
            label_style,
        );
        let label_id = self.tree.insert(label);
        self.tree.add_child(button, label_id);
    }

    // ── Animations ────────────────────────────────────────────

    /// Attach a parsed `anim` descriptor to a node, enforcing the
    /// image-only rule and the global spin budget.
    pub fn start_anim_on(&mut self, id: NodeId, desc: &Map<String, Value>) {
        let parsed = anim::parse(desc, (self.screen_w, self.screen_h));
        match parsed {
            None => {}
            Some(ParsedAnim::Marquee) => {
                match self.tree.get_mut(id).map(|n| &mut n.widget) {
                    Some(Widget::Label { long_mode, .. }) => *long_mode = LongMode::Marquee,
                    _ => warn!("UiEngine: marquee on non-label, skipping"),
                }
            }
            Some(ParsedAnim::Timed(state)) => {
                if matches!(state.kind, AnimKind::Spin { .. }) {
                    let is_image = matches!(
                        self.tree.get(id).map(|n| &n.widget),
                        Some(Widget::Image { .. })
                    );
                    if !is_image {
                        warn!("UiEngine: spin requested on non-image node, rejected");
                        return;
                    }
                    if self.spin_count >= MAX_SPIN_ANIMS {
                        warn!("UiEngine: spin denied, {} already running", self.spin_count);
                        return;
                    }
                    self.spin_count += 1;
                }
                if let Some(node) = self.tree.get_mut(id) {
                    node.anims.push(state);
                }
            }
        }
    }

    // ── Incremental update ────────────────────────────────────

    /// Apply an incremental mutation addressed by `id`. Missing or
    /// unresolvable IDs make the whole call a logged no-op.
    pub fn update(&mut self, json_text: &str) {
        let parsed: Value = match serde_json::from_str(json_text) {
            Ok(v) => v,
            Err(_) => {
                warn!("UiEngine: failed to parse update JSON");
                return;
            }
        };
        let Some(map) = parsed.as_object() else {
            warn!("UiEngine: update payload is not an object");
            return;
        };
        let Some(id_str) = map.get("id").and_then(Value::as_str) else {
            warn!("UiEngine: update JSON missing 'id' field");
            return;
        };
        let Some(target) = self.registry.lookup(id_str) else {
            warn!("UiEngine: widget not found for update: {}", id_str);
            return;
        };

        if let Some(text) = map.get("text").and_then(Value::as_str) {
            self.set_text(target, text);
        }

        if let Some(hidden) = map.get("hidden").and_then(Value::as_bool) {
            if let Some(node) = self.tree.get_mut(target) {
                node.hidden = hidden;
            }
        }

        if let Some(color) = map.get("bg_color").and_then(Value::as_str) {
            if let Some(node) = self.tree.get_mut(target) {
                node.bg_color = Some(Color::from_hex(color));
                node.style.bg_opa = Some(255);
            }
        }

        if let Some(value) = map.get("value").and_then(Value::as_i64) {
            self.tween_value(target, value as i32);
        }

        if let Some(color) = map.get("indic_color").and_then(Value::as_str) {
            if let Some(node) = self.tree.get_mut(target) {
                if let Widget::Bar { indic_color, .. } = &mut node.widget {
                    *indic_color = Some(Color::from_hex(color));
                }
            }
        }

        if let Some(opa) = map.get("opa").and_then(Value::as_i64) {
            if let Some(node) = self.tree.get_mut(target) {
                node.opacity = opa.clamp(0, 255) as u8;
                node.style.opa = Some(node.opacity);
            }
        }

        if let Some(desc) = map.get("anim").and_then(Value::as_object) {
            self.start_anim_on(target, desc);
        }

        self.relayout();
        info!("UiEngine: updated widget: {}", id_str);
    }

    /// Button convention: text targets the widget if it is a label, else
    /// its first child.
    fn set_text(&mut self, target: NodeId, text: &str) {
        let direct = matches!(
            self.tree.get(target).map(|n| &n.widget),
            Some(Widget::Label { .. })
        );
        let label_id = if direct {
            Some(target)
        } else {
            self.tree
                .get(target)
                .and_then(|n| n.children.first().copied())
        };
        let Some(label_id) = label_id else {
            warn!("UiEngine: no label to receive text update");
            return;
        };
        if let Some(node) = self.tree.get_mut(label_id) {
            if let Widget::Label { text: t, .. } = &mut node.widget {
                *t = text.to_owned();
            }
        }
    }

    /// Bar/slider values move with an animated transition.
    fn tween_value(&mut self, target: NodeId, to: i32) {
        let Some(node) = self.tree.get_mut(target) else {
            return;
        };
        match &node.widget {
            Widget::Bar { value, min, max, .. } | Widget::Slider { value, min, max, .. } => {
                let clamped = to.clamp(*min, *max);
                if *value != clamped {
                    let tween = AnimState::value_tween(*value, clamped);
                    node.anims.push(tween);
                }
            }
            _ => warn!("UiEngine: 'value' update on non-bar/slider, skipping"),
        }
    }

    // ── Input dispatch ────────────────────────────────────────

    /// Feed a pointer event into a widget. Runs under the UI lock (the
    /// recursive lock makes nested bus callbacks safe).
    pub fn on_input(&mut self, target: NodeId, event: InputEvent, bus: &Bus) {
        let widget_id: String = self
            .registry
            .id_of(target)
            .unwrap_or("unknown")
            .to_owned();

        // Slider on_change fires on release with the current value.
        if matches!(event, InputEvent::Release | InputEvent::PressLost) {
            let change = self.tree.get(target).and_then(|n| match &n.widget {
                Widget::Slider {
                    value,
                    on_change: Some(uri),
                    ..
                } => Some((uri.clone(), *value)),
                _ => None,
            });
            if let Some((uri, value)) = change {
                let payload = format!("{{\"id\": \"{}\", \"value\": {}}}", widget_id, value);
                actions::dispatch_with_payload(bus, &uri, &payload);
            }
        }

        let uri = self
            .tree
            .get(target)
            .and_then(|n| n.actions.as_ref())
            .and_then(|a| a.uri_for(event))
            .map(str::to_owned);

        if let Some(uri) = uri {
            actions::dispatch(bus, &uri, &widget_id);
        }
    }

    /// Convenience for drivers and tests: set a slider's live value (as
    /// the touch drag handler does before release fires).
    pub fn set_slider_value(&mut self, target: NodeId, value: i32) {
        if let Some(node) = self.tree.get_mut(target) {
            if let Widget::Slider {
                value: v, min, max, ..
            } = &mut node.widget
            {
                *v = value.clamp(*min, *max);
            }
        }
    }

    // ── Tick ──────────────────────────────────────────────────

    /// Advance every animation and particle system. `recording` throttles
    /// particle drawing while audio capture holds the PSRAM bus.
    pub fn tick(&mut self, now_ms: u64, recording: bool) {
        let dt = if self.ticked_once {
            now_ms.saturating_sub(self.last_tick_ms) as u32
        } else {
            0
        };
        self.last_tick_ms = now_ms;
        self.ticked_once = true;

        let ids: Vec<NodeId> = self.tree.ids().collect();
        let mut spins_finished = 0u8;

        for id in ids {
            let Some(node) = self.tree.get_mut(id) else {
                continue;
            };

            let mut finished = Vec::new();
            for (idx, anim) in node.anims.iter_mut().enumerate() {
                let done = anim.advance(dt);
                let phase = if done { 1.0 } else { anim.phase() };
                apply_anim(
                    &anim.kind,
                    if done { end_phase(&anim.kind) } else { phase },
                    &mut node.widget,
                    &mut node.opacity,
                    &mut node.translate,
                    &mut node.rotation_ddeg,
                    &mut node.bg_color,
                );
                if done {
                    finished.push(idx);
                }
            }
            for idx in finished.into_iter().rev() {
                let anim = node.anims.remove(idx);
                if matches!(anim.kind, AnimKind::Spin { .. }) {
                    spins_finished += 1;
                }
            }

            if let Widget::Particle(ps) = &mut node.widget {
                ps.tick(now_ms, recording);
            }
        }

        self.spin_count = self.spin_count.saturating_sub(spins_finished);
    }

    // ── Deletion outside render ───────────────────────────────

    /// Remove a node and its subtree (parent-destroys-child path). Owned
    /// buffers are freed, dying spins release their slots, and the
    /// registry forgets the removed IDs.
    pub fn remove_node(&mut self, id: NodeId) {
        if id == self.root {
            warn!("UiEngine: refusing to remove the root view");
            return;
        }
        let stats = self.tree.remove_subtree(id);
        self.spin_count = self.spin_count.saturating_sub(stats.spins_released as u8);
        self.registry.purge(&stats.removed);
        self.relayout();
    }

    fn relayout(&mut self) {
        let w = self.screen_w - 2 * self.safe_padding;
        let h = self.screen_h - 2 * self.safe_padding;
        layout::compute(&mut self.tree, self.root, self.safe_padding, self.safe_padding, w, h);
    }
}

fn root_widget() -> Widget {
    Widget::Container {
        flow: Some(FlexFlow::Column),
        justify: FlexAlign::Center,
        align_items: FlexAlign::Center,
        scrollable: false,
    }
}

fn create_label(map: &Map<String, Value>) -> Widget {
    let text = map
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_owned();
    let long_mode = map
        .get("long_mode")
        .and_then(Value::as_str)
        .and_then(LongMode::parse)
        .unwrap_or_default();
    Widget::Label { text, long_mode }
}

fn create_bar(map: &Map<String, Value>) -> Widget {
    let min = map.get("min").and_then(Value::as_i64).unwrap_or(0) as i32;
    let max = map.get("max").and_then(Value::as_i64).unwrap_or(100) as i32;
    let value = map
        .get("value")
        .and_then(Value::as_i64)
        .unwrap_or(min as i64) as i32;
    let indic_color = map
        .get("indic_color")
        .and_then(Value::as_str)
        .map(Color::from_hex);
    Widget::Bar {
        min,
        max,
        value: value.clamp(min, max),
        indic_color,
    }
}

fn create_slider(map: &Map<String, Value>) -> Widget {
    let min = map.get("min").and_then(Value::as_i64).unwrap_or(0) as i32;
    let max = map.get("max").and_then(Value::as_i64).unwrap_or(100) as i32;
    let value = map
        .get("value")
        .and_then(Value::as_i64)
        .unwrap_or(min as i64) as i32;
    let on_change = map.get("on_change").and_then(Value::as_str).and_then(|s| {
        let mut uri = heapless::String::new();
        uri.push_str(super::registry::clip_str(s, 63)).ok()?;
        Some(uri)
    });
    Widget::Slider {
        min,
        max,
        value: value.clamp(min, max),
        on_change,
    }
}

/// Final resting phase for a finishing animation.
fn end_phase(kind: &AnimKind) -> f32 {
    match kind {
        // Symmetric animations end back at their starting leg.
        AnimKind::Blink | AnimKind::Breathe { .. } | AnimKind::ColorPulse(_) => 0.0,
        _ => 1.0,
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_anim(
    kind: &AnimKind,
    phase: f32,
    widget: &mut Widget,
    opacity: &mut u8,
    translate: &mut (i32, i32),
    rotation_ddeg: &mut i32,
    bg_color: &mut Option<Color>,
) {
    match kind {
        AnimKind::FadeIn => {
            *opacity = (phase * 255.0) as u8;
        }
        AnimKind::Blink => {
            *opacity = ((1.0 - phase) * 255.0) as u8;
        }
        AnimKind::Breathe { min_opa, max_opa } => {
            let span = (*max_opa as f32 - *min_opa as f32).max(0.0);
            // Starts at max, dips toward min and back.
            *opacity = (*max_opa as f32 - phase * span) as u8;
        }
        AnimKind::Spin { ccw } => {
            let angle = (phase * 3600.0) as i32;
            *rotation_ddeg = if *ccw { -angle } else { angle };
        }
        AnimKind::SlideIn { dx, dy } => {
            translate.0 = (*dx as f32 * (1.0 - phase)) as i32;
            translate.1 = (*dy as f32 * (1.0 - phase)) as i32;
        }
        AnimKind::Shake { amp } => {
            translate.0 = anim::shake_offset(*amp, phase);
        }
        AnimKind::ColorPulse(state) => {
            *bg_color = Some(Color::mix(
                state.color_a,
                state.color_b,
                (phase * 255.0) as u8,
            ));
        }
        AnimKind::ValueTween { from, to } => {
            let v = *from + ((*to - *from) as f32 * phase) as i32;
            match widget {
                Widget::Bar { value, .. } | Widget::Slider { value, .. } => *value = v,
                _ => {}
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mem;
    use std::sync::{Arc, Mutex};

    fn engine() -> UiEngine {
        UiEngine::new(466, 466, 40)
    }

    fn label_text(e: &UiEngine, node: NodeId) -> String {
        match &e.node(node).unwrap().widget {
            Widget::Label { text, .. } => text.clone(),
            _ => panic!("not a label"),
        }
    }

    fn rgb565_b64(w: i32, h: i32) -> String {
        BASE64_STANDARD.encode(vec![0xA5u8; (w * h * 2) as usize])
    }

    #[test]
    fn init_establishes_empty_root() {
        let e = engine();
        assert_eq!(e.node_count(), 1);
        assert_eq!(e.registry_len(), 0);
        assert_eq!(e.spin_count(), 0);
        let root = e.node(e.root()).unwrap();
        assert_eq!(root.rect.w, 386);
        assert_eq!(root.rect.h, 386);
    }

    #[test]
    fn render_builds_tree_and_registry() {
        let mut e = engine();
        e.render(
            r#"{"type":"container","flex":"column","children":[
                {"type":"label","id":"count","text":"0"},
                {"type":"button","id":"btn","text":"Go"}
            ]}"#,
        );
        assert_eq!(e.registry_len(), 2);
        let count = e.find_by_id("count").unwrap();
        assert_eq!(label_text(&e, count), "0");
        // Button carries its inline label as first child.
        let btn = e.find_by_id("btn").unwrap();
        let first = e.node(btn).unwrap().children[0];
        assert_eq!(label_text(&e, first), "Go");
    }

    #[test]
    fn render_array_root_builds_each_element() {
        let mut e = engine();
        e.render(r#"[{"type":"label","id":"a","text":"1"},{"type":"label","id":"b","text":"2"}]"#);
        assert!(e.find_by_id("a").is_some());
        assert!(e.find_by_id("b").is_some());
        assert_eq!(e.node(e.root()).unwrap().children.len(), 2);
    }

    #[test]
    fn render_parse_failure_mutates_nothing() {
        let mut e = engine();
        e.render(r#"{"type":"label","id":"keep","text":"x"}"#);
        let count_before = e.node_count();
        e.render("{broken json");
        assert_eq!(e.node_count(), count_before);
        assert!(e.find_by_id("keep").is_some());
    }

    #[test]
    fn rerender_rebuilds_registry_without_stale_entries() {
        let mut e = engine();
        e.render(r#"[{"type":"label","id":"old","text":"x"}]"#);
        assert!(e.find_by_id("old").is_some());
        e.render(r#"[{"type":"label","id":"new","text":"y"}]"#);
        assert!(e.find_by_id("old").is_none());
        assert!(e.find_by_id("new").is_some());
        assert_eq!(e.registry_len(), 1);
    }

    #[test]
    fn rerenders_release_every_owned_buffer() {
        let _g = mem::counters_lock();
        let baseline = mem::live_blocks();
        let mut e = engine();
        let layout = format!(
            r#"[{{"type":"image","id":"i","img_w":4,"img_h":4,"src":"{}"}},
                {{"type":"particle","canvas_w":50,"canvas_h":50}}]"#,
            rgb565_b64(4, 4)
        );
        for _ in 0..5 {
            e.render(&layout);
        }
        e.render("[]");
        assert_eq!(mem::live_blocks(), baseline);
    }

    #[test]
    fn unknown_widget_type_skips_node_but_not_siblings() {
        let mut e = engine();
        e.render(
            r#"[{"type":"hologram","id":"no"},{"type":"label","id":"yes","text":"ok"}]"#,
        );
        assert!(e.find_by_id("no").is_none());
        assert!(e.find_by_id("yes").is_some());
    }

    #[test]
    fn node_missing_type_is_skipped() {
        let mut e = engine();
        e.render(r#"[{"id":"ghost","text":"boo"}]"#);
        assert!(e.find_by_id("ghost").is_none());
        assert_eq!(e.node_count(), 1);
    }

    #[test]
    fn image_decodes_pixels_into_psram() {
        let _g = mem::counters_lock();
        let mut e = engine();
        e.render(&format!(
            r#"[{{"type":"image","id":"i","img_w":2,"img_h":2,"src":"{}"}}]"#,
            rgb565_b64(2, 2)
        ));
        let img = e.find_by_id("i").unwrap();
        match &e.node(img).unwrap().widget {
            Widget::Image { pixels, .. } => {
                let buf = pixels.as_ref().unwrap();
                assert_eq!(buf.len(), 8);
                assert!(buf.as_slice().iter().all(|&b| b == 0xA5));
            }
            _ => panic!(),
        }
    }

    #[test]
    fn bad_base64_degrades_to_blank_image() {
        let mut e = engine();
        e.render(r#"[{"type":"image","id":"i","img_w":2,"img_h":2,"src":"!!notb64!!"}]"#);
        let img = e.find_by_id("i").unwrap();
        match &e.node(img).unwrap().widget {
            Widget::Image { pixels, .. } => assert!(pixels.is_none()),
            _ => panic!(),
        }
    }

    #[test]
    fn image_alloc_failure_still_creates_widget() {
        let _g = mem::counters_lock();
        mem::set_alloc_fail_above(8);
        let mut e = engine();
        e.render(&format!(
            r#"[{{"type":"image","id":"i","img_w":8,"img_h":8,"src":"{}"}}]"#,
            rgb565_b64(8, 8)
        ));
        let img = e.find_by_id("i").unwrap();
        match &e.node(img).unwrap().widget {
            Widget::Image { pixels, .. } => assert!(pixels.is_none()),
            _ => panic!(),
        }
        mem::set_alloc_fail_above(usize::MAX);
    }

    #[test]
    fn spin_budget_is_two_until_a_spinner_dies() {
        let _g = mem::counters_lock();
        let mut e = engine();
        let img = |id: &str| {
            format!(
                r#"{{"type":"image","id":"{}","img_w":2,"img_h":2,"src":"{}","anim":{{"type":"spin"}}}}"#,
                id,
                rgb565_b64(2, 2)
            )
        };
        e.render(&format!("[{},{},{}]", img("s1"), img("s2"), img("s3")));
        assert_eq!(e.spin_count(), 2);

        // Deleting one spinning image frees a slot.
        let s1 = e.find_by_id("s1").unwrap();
        e.remove_node(s1);
        assert_eq!(e.spin_count(), 1);

        e.update(r#"{"id":"s3","anim":{"type":"spin"}}"#);
        assert_eq!(e.spin_count(), 2);
    }

    #[test]
    fn spin_on_label_is_rejected() {
        let mut e = engine();
        e.render(r#"[{"type":"label","id":"l","text":"x","anim":{"type":"spin"}}]"#);
        assert_eq!(e.spin_count(), 0);
    }

    #[test]
    fn render_resets_spin_budget() {
        let _g = mem::counters_lock();
        let mut e = engine();
        e.render(&format!(
            r#"[{{"type":"image","id":"i","img_w":2,"img_h":2,"src":"{}","anim":{{"type":"spin"}}}}]"#,
            rgb565_b64(2, 2)
        ));
        assert_eq!(e.spin_count(), 1);
        e.render("[]");
        assert_eq!(e.spin_count(), 0);
    }

    #[test]
    fn update_sets_label_text() {
        let mut e = engine();
        e.render(r#"[{"type":"label","id":"count","text":"0"}]"#);
        e.update(r#"{"id":"count","text":"1"}"#);
        let node = e.find_by_id("count").unwrap();
        assert_eq!(label_text(&e, node), "1");
    }

    #[test]
    fn update_routes_text_to_button_child() {
        let mut e = engine();
        e.render(r#"[{"type":"button","id":"b","text":"Start"}]"#);
        e.update(r#"{"id":"b","text":"Stop"}"#);
        let btn = e.find_by_id("b").unwrap();
        let first = e.node(btn).unwrap().children[0];
        assert_eq!(label_text(&e, first), "Stop");
    }

    #[test]
    fn update_with_unknown_id_is_noop() {
        let mut e = engine();
        e.render(r#"[{"type":"label","id":"a","text":"x"}]"#);
        e.update(r#"{"id":"phantom","text":"y"}"#);
        let node = e.find_by_id("a").unwrap();
        assert_eq!(label_text(&e, node), "x");
    }

    #[test]
    fn update_without_id_is_noop() {
        let mut e = engine();
        e.render(r#"[{"type":"label","id":"a","text":"x"}]"#);
        e.update(r#"{"text":"y"}"#);
        assert_eq!(label_text(&e, e.find_by_id("a").unwrap()), "x");
    }

    #[test]
    fn update_toggles_hidden_and_opacity() {
        let mut e = engine();
        e.render(r#"[{"type":"label","id":"a","text":"x"}]"#);
        e.update(r#"{"id":"a","hidden":true,"opa":128}"#);
        let node = e.node(e.find_by_id("a").unwrap()).unwrap();
        assert!(node.hidden);
        assert_eq!(node.opacity, 128);
    }

    #[test]
    fn update_bg_color_forces_opaque() {
        let mut e = engine();
        e.render(r#"[{"type":"label","id":"a","text":"x"}]"#);
        e.update(r##"{"id":"a","bg_color":"#FF0000"}"##);
        let node = e.node(e.find_by_id("a").unwrap()).unwrap();
        assert_eq!(node.bg_color, Some(Color { r: 255, g: 0, b: 0 }));
        assert_eq!(node.style.bg_opa, Some(255));
    }

    #[test]
    fn update_value_tweens_bar() {
        let mut e = engine();
        e.render(r#"[{"type":"bar","id":"b","min":0,"max":100,"value":10}]"#);
        e.tick(0, false);
        e.update(r#"{"id":"b","value":60}"#);
        e.tick(anim::VALUE_TWEEN_MS as u64 / 2, false);
        let mid = match &e.node(e.find_by_id("b").unwrap()).unwrap().widget {
            Widget::Bar { value, .. } => *value,
            _ => panic!(),
        };
        assert!(mid > 10 && mid < 60, "mid-tween value was {mid}");
        e.tick(anim::VALUE_TWEEN_MS as u64 * 2, false);
        match &e.node(e.find_by_id("b").unwrap()).unwrap().widget {
            Widget::Bar { value, .. } => assert_eq!(*value, 60),
            _ => panic!(),
        }
    }

    #[test]
    fn render_fades_root_back_in() {
        let mut e = engine();
        e.tick(0, false);
        e.render(r#"[{"type":"label","text":"hi"}]"#);
        assert_eq!(e.node(e.root()).unwrap().opacity, 0);
        e.tick(100, false);
        let mid = e.node(e.root()).unwrap().opacity;
        assert!(mid > 0 && mid < 255, "mid-fade opacity was {mid}");
        e.tick(300, false);
        assert_eq!(e.node(e.root()).unwrap().opacity, 255);
        assert!(e.node(e.root()).unwrap().anims.is_empty());
    }

    #[test]
    fn marquee_anim_sets_label_long_mode() {
        let mut e = engine();
        e.render(r#"[{"type":"label","id":"l","text":"long text","anim":{"type":"marquee"}}]"#);
        match &e.node(e.find_by_id("l").unwrap()).unwrap().widget {
            Widget::Label { long_mode, .. } => assert_eq!(*long_mode, LongMode::Marquee),
            _ => panic!(),
        }
    }

    #[test]
    fn click_reports_widget_id_upward() {
        let mut e = engine();
        let bus = Bus::new();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sent2 = sent.clone();
        bus.set_uplink(move |t: &str| sent2.lock().unwrap().push(t.to_owned()));

        e.render(r#"[{"type":"button","id":"btn","text":"Go","on_click":""}]"#);
        let btn = e.find_by_id("btn").unwrap();
        e.on_input(btn, InputEvent::Click, &bus);

        let v: Value = serde_json::from_str(&sent.lock().unwrap()[0]).unwrap();
        assert_eq!(v["topic"], "ui/click");
        assert_eq!(v["payload"]["id"], "btn");
    }

    #[test]
    fn press_and_release_route_local_uris() {
        let mut e = engine();
        let bus = Bus::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        for topic in ["audio/cmd/record_start", "audio/cmd/record_stop"] {
            let events = events.clone();
            bus.subscribe(topic, move |_| events.lock().unwrap().push(topic));
        }

        e.render(
            r#"[{"type":"button","id":"talk","text":"Hold",
                 "on_press":"local://audio/cmd/record_start",
                 "on_release":"local://audio/cmd/record_stop"}]"#,
        );
        let talk = e.find_by_id("talk").unwrap();
        e.on_input(talk, InputEvent::Press, &bus);
        e.on_input(talk, InputEvent::PressLost, &bus);

        assert_eq!(
            *events.lock().unwrap(),
            vec!["audio/cmd/record_start", "audio/cmd/record_stop"]
        );
    }

    #[test]
    fn slider_release_reports_value() {
        let mut e = engine();
        let bus = Bus::new();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sent2 = sent.clone();
        bus.set_uplink(move |t: &str| sent2.lock().unwrap().push(t.to_owned()));

        e.render(
            r#"[{"type":"slider","id":"vol","min":0,"max":100,"value":30,
                 "on_change":"server://settings/volume"}]"#,
        );
        let vol = e.find_by_id("vol").unwrap();
        e.set_slider_value(vol, 75);
        e.on_input(vol, InputEvent::Release, &bus);

        let v: Value = serde_json::from_str(&sent.lock().unwrap()[0]).unwrap();
        assert_eq!(v["topic"], "settings/volume");
        assert_eq!(v["payload"]["id"], "vol");
        assert_eq!(v["payload"]["value"], 75);
    }

    #[test]
    fn particle_canvas_clamps_and_throttles() {
        let _g = mem::counters_lock();
        let mut e = engine();
        e.render(r#"[{"type":"particle","id":"p","canvas_w":400,"canvas_h":120}]"#);
        let p = e.find_by_id("p").unwrap();
        let frames = |e: &UiEngine| match &e.node(p).unwrap().widget {
            Widget::Particle(ps) => {
                assert_eq!(ps.canvas_size(), (200, 120));
                ps.frames()
            }
            _ => panic!(),
        };

        e.tick(0, false);
        e.tick(40, true); // recording: throttled
        e.tick(80, true);
        assert_eq!(frames(&e), 0);
        e.tick(120, false);
        assert_eq!(frames(&e), 1);
    }

    #[test]
    fn registry_overflow_leaves_excess_unaddressable() {
        let mut e = engine();
        let mut items = Vec::new();
        for i in 0..70 {
            items.push(format!(r#"{{"type":"label","id":"n{}","text":"x"}}"#, i));
        }
        e.render(&format!("[{}]", items.join(",")));
        assert_eq!(e.registry_len(), 64);
        assert!(e.find_by_id("n63").is_some());
        assert!(e.find_by_id("n64").is_none());
    }

    #[test]
    fn breathe_holds_opacity_between_bounds() {
        let mut e = engine();
        e.render(r#"[{"type":"label","id":"l","text":"x","anim":{"type":"breathe"}}]"#);
        let l = e.find_by_id("l").unwrap();
        e.tick(0, false);
        for t in 1..40u64 {
            e.tick(t * 100, false);
            let opa = e.node(l).unwrap().opacity;
            assert!((80..=255).contains(&opa), "opacity {opa} out of bounds");
        }
    }
}
