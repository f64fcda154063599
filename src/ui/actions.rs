//! Action-URI event binding and dispatch.
//!
//! Interactive nodes carry scheme-prefixed URIs naming where their events
//! route: `local://<topic>` fans out on the device bus, `server://<topic>`
//! publishes upward, and anything else (including the empty default)
//! reports a click on the canonical `ui/click` topic.
//!
//! Dispatch happens from within the UI handler, which already holds the
//! UI lock; the bus publish itself never re-enters the scene graph.

use log::info;
use serde_json::{Map, Value};

use crate::bus::Bus;

/// URI slot per event code.
pub type ActionUri = heapless::String<64>;

/// Pointer events an interactive widget reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Click,
    Press,
    Release,
    /// The pointer slid off the widget while pressed; treated as release.
    PressLost,
}

/// Owned per-node action bindings, freed with the node.
#[derive(Debug, Default)]
pub struct ActionBindings {
    pub on_click: Option<ActionUri>,
    pub on_press: Option<ActionUri>,
    pub on_release: Option<ActionUri>,
}

impl ActionBindings {
    /// URI for an event, mapping press-lost onto release.
    pub fn uri_for(&self, event: InputEvent) -> Option<&str> {
        match event {
            InputEvent::Click => self.on_click.as_deref(),
            InputEvent::Press => self.on_press.as_deref(),
            InputEvent::Release | InputEvent::PressLost => self.on_release.as_deref(),
        }
    }
}

/// Extract bindings from a node object; `None` when no handler key is
/// present (no allocation for passive widgets).
pub fn parse_bindings(node: &Map<String, Value>) -> Option<Box<ActionBindings>> {
    let grab = |key: &str| -> Option<ActionUri> {
        let s = node.get(key)?.as_str()?;
        let mut uri = ActionUri::new();
        uri.push_str(super::registry::clip_str(s, 63)).ok()?;
        Some(uri)
    };

    let bindings = ActionBindings {
        on_click: grab("on_click"),
        on_press: grab("on_press"),
        on_release: grab("on_release"),
    };

    if bindings.on_click.is_none() && bindings.on_press.is_none() && bindings.on_release.is_none() {
        return None;
    }
    Some(Box::new(bindings))
}

/// Route an action URI with the standard `{"id": ...}` payload.
pub fn dispatch(bus: &Bus, uri: &str, widget_id: &str) {
    let payload = format!("{{\"id\": \"{}\"}}", widget_id);
    dispatch_with_payload(bus, uri, &payload);
}

/// Route an action URI with a caller-built payload (sliders report
/// `{"id": ..., "value": N}` through the same scheme rules).
pub fn dispatch_with_payload(bus: &Bus, uri: &str, payload: &str) {
    info!("Action dispatch: uri={}", uri);

    if let Some(topic) = uri.strip_prefix("local://") {
        bus.publish_local(topic, payload);
    } else if let Some(topic) = uri.strip_prefix("server://") {
        bus.publish_up(topic, payload);
    } else {
        // Default: report a click upward, legacy-protocol compatible.
        bus.publish_up("ui/click", payload);
    }
}
