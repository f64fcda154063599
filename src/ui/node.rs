//! The retained scene graph.
//!
//! A strict tree of widget instances held in a slot arena. Nodes own their
//! user data — action bindings, decoded image pixels, particle state,
//! colour-pulse endpoints — and release it exactly once when the node is
//! deleted, whether the deletion comes from a full render clearing the
//! tree or from a parent being destroyed.

use crate::adapters::mem::RegionBuf;

use super::actions::ActionBindings;
use super::anim::{AnimKind, AnimState};
use super::particle::ParticleSystem;
use super::style::{Color, FlexAlign, FlexFlow, LongMode, Style};

/// Index into the scene arena. Valid only while the node is alive; the ID
/// registry is rebuilt on every render so no stale handle escapes a
/// layout swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(pub usize);

/// Resolved screen-space rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// The atomic widget kinds.
pub enum Widget {
    Container {
        flow: Option<FlexFlow>,
        justify: FlexAlign,
        align_items: FlexAlign,
        scrollable: bool,
    },
    Label {
        text: String,
        long_mode: LongMode,
    },
    /// Interactive element; its inline text lives in a child label.
    Button,
    Image {
        img_w: i32,
        img_h: i32,
        /// Decoded RGB565 pixels in PSRAM; `None` after an allocation
        /// failure (the widget still exists, just blank).
        pixels: Option<RegionBuf>,
    },
    Bar {
        min: i32,
        max: i32,
        value: i32,
        indic_color: Option<Color>,
    },
    Slider {
        min: i32,
        max: i32,
        value: i32,
        on_change: Option<heapless::String<64>>,
    },
    Particle(ParticleSystem),
}

impl Widget {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Widget::Container { .. } => "container",
            Widget::Label { .. } => "label",
            Widget::Button => "button",
            Widget::Image { .. } => "image",
            Widget::Bar { .. } => "bar",
            Widget::Slider { .. } => "slider",
            Widget::Particle(_) => "particle",
        }
    }
}

pub struct Node {
    pub widget: Widget,
    pub style: Style,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Owned action bindings, freed with the node.
    pub actions: Option<Box<ActionBindings>>,
    pub anims: Vec<AnimState>,
    pub hidden: bool,
    /// Effective opacity (animatable).
    pub opacity: u8,
    /// Animation-driven translation offset.
    pub translate: (i32, i32),
    /// Rotation in tenths of a degree (images only; pivot is the centre).
    pub rotation_ddeg: i32,
    /// Current background colour (animatable via color_pulse).
    pub bg_color: Option<Color>,
    pub rect: Rect,
}

impl Node {
    pub fn new(widget: Widget, style: Style) -> Self {
        let hidden = style.hidden;
        let opacity = style.opa.unwrap_or(255);
        let bg_color = style.bg_color;
        Self {
            widget,
            style,
            parent: None,
            children: Vec::new(),
            actions: None,
            anims: Vec::new(),
            hidden,
            opacity,
            translate: (0, 0),
            rotation_ddeg: 0,
            bg_color,
            rect: Rect::default(),
        }
    }
}

/// Counters reported by a subtree removal so the engine can run its
/// deletion hooks (spin-slot release, registry purge).
#[derive(Debug, Default)]
pub struct RemovalStats {
    /// Active spin animations that died with their nodes.
    pub spins_released: u32,
    /// Every removed node, for registry purging.
    pub removed: Vec<NodeId>,
}

/// Slot arena holding the widget tree.
pub struct SceneTree {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
}

impl SceneTree {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                NodeId(idx)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Attach `child` under `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.get_mut(parent) {
            node.children.push(child);
        }
    }

    /// Remove a node and its whole subtree. Owned buffers are released by
    /// drop; the stats let the caller run the remaining deletion hooks.
    pub fn remove_subtree(&mut self, id: NodeId) -> RemovalStats {
        let mut stats = RemovalStats::default();

        // Detach from the parent's child list first.
        if let Some(parent) = self.get(id).and_then(|n| n.parent) {
            if let Some(p) = self.get_mut(parent) {
                p.children.retain(|&c| c != id);
            }
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.slots.get_mut(current.0).and_then(Option::take) else {
                continue;
            };
            stack.extend(node.children.iter().copied());
            stats.spins_released += node
                .anims
                .iter()
                .filter(|a| matches!(a.kind, AnimKind::Spin { .. }))
                .count() as u32;
            stats.removed.push(current);
            self.free.push(current.0);
            // `node` drops here: pixels, canvas, actions, anim state.
        }

        stats
    }

    /// Remove every child of `id`, keeping the node itself.
    pub fn clear_children(&mut self, id: NodeId) -> RemovalStats {
        let children: Vec<NodeId> = self
            .get(id)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        let mut stats = RemovalStats::default();
        for child in children {
            let s = self.remove_subtree(child);
            stats.spins_released += s.spins_released;
            stats.removed.extend(s.removed);
        }
        stats
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over live node ids.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| NodeId(i))
    }
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}
