//! Size resolution and flex placement.
//!
//! A deliberately small flexbox: enough to honour the style contract —
//! pixel/percent/full/content sizes, row/column flows with optional wrap,
//! the six justify/align values, and the nine absolute anchors. Sizes are
//! resolved bottom-up, positions top-down. Animation translation offsets
//! are composited at draw time and never enter these rectangles.

use super::node::{NodeId, SceneTree, Widget};
use super::style::{Anchor, FlexAlign, FlexFlow, Size};

/// Fallback sizes for widgets with no intrinsic content.
const BAR_DEFAULT_W: i32 = 200;
const BAR_DEFAULT_H: i32 = 16;
const BUTTON_PAD_X: i32 = 12;
const BUTTON_PAD_Y: i32 = 8;
const LABEL_LINE_EXTRA: i32 = 4;
const DEFAULT_FONT_PX: i32 = 14;

/// Resolve every rectangle under (and including) `root`, which is pinned
/// to the given frame.
pub fn compute(tree: &mut SceneTree, root: NodeId, x: i32, y: i32, w: i32, h: i32) {
    measure(tree, root, w, h);
    if let Some(node) = tree.get_mut(root) {
        node.rect.x = x;
        node.rect.y = y;
        node.rect.w = w;
        node.rect.h = h;
    }
    arrange(tree, root);
}

// ── Pass 1: sizes ─────────────────────────────────────────────

/// Resolve `id`'s width/height against the available extent, recursing
/// into children first where content-fitting demands it.
fn measure(tree: &mut SceneTree, id: NodeId, avail_w: i32, avail_h: i32) {
    let (style_w, style_h, pad, gap, is_row) = {
        let Some(node) = tree.get(id) else { return };
        let pad = node.style.pad.unwrap_or(0);
        let gap = node.style.gap.unwrap_or(0);
        let is_row = flow_of(&node.widget).map(FlexFlow::is_row).unwrap_or(false);
        (
            node.style.w.unwrap_or(Size::Content),
            node.style.h.unwrap_or(Size::Content),
            pad,
            gap,
            is_row,
        )
    };

    let resolved_w = style_w.resolve(avail_w);
    let resolved_h = style_h.resolve(avail_h);

    // Children resolve percentages against this node's content box; when
    // this node is content-sized they fall back to the extent we were
    // handed.
    let inner_w = resolved_w.unwrap_or(avail_w) - 2 * pad;
    let inner_h = resolved_h.unwrap_or(avail_h) - 2 * pad;

    let children: Vec<NodeId> = tree.get(id).map(|n| n.children.clone()).unwrap_or_default();
    for &child in &children {
        measure(tree, child, inner_w, inner_h);
    }

    let (w, h) = {
        let content = content_extent(tree, &children, gap, is_row, pad);
        let Some(node) = tree.get(id) else { return };
        let font = node.style.font_size.unwrap_or(DEFAULT_FONT_PX);
        (
            resolved_w.unwrap_or_else(|| intrinsic_w(&node.widget, content.0, font)),
            resolved_h.unwrap_or_else(|| intrinsic_h(&node.widget, content.1, font)),
        )
    };

    if let Some(node) = tree.get_mut(id) {
        node.rect.w = w.max(0);
        node.rect.h = h.max(0);
    }
}

/// Sum of flex children along the main axis, max along the cross axis,
/// padding included.
fn content_extent(
    tree: &SceneTree,
    children: &[NodeId],
    gap: i32,
    is_row: bool,
    pad: i32,
) -> (i32, i32) {
    let mut main = 0;
    let mut cross = 0;
    let mut counted = 0;
    for &child in children {
        let Some(c) = tree.get(child) else { continue };
        if c.style.align.is_some() {
            continue; // anchored children don't participate in flow
        }
        let (cm, cc) = if is_row {
            (c.rect.w, c.rect.h)
        } else {
            (c.rect.h, c.rect.w)
        };
        main += cm;
        cross = cross.max(cc);
        counted += 1;
    }
    if counted > 1 {
        main += gap * (counted - 1);
    }
    let (w, h) = if is_row { (main, cross) } else { (cross, main) };
    (w + 2 * pad, h + 2 * pad)
}

fn flow_of(widget: &Widget) -> Option<FlexFlow> {
    match widget {
        Widget::Container { flow, .. } => *flow,
        _ => None,
    }
}

fn intrinsic_w(widget: &Widget, content_w: i32, font_px: i32) -> i32 {
    match widget {
        Widget::Label { text, .. } => label_width(text, font_px),
        Widget::Image { img_w, .. } => *img_w,
        Widget::Bar { .. } | Widget::Slider { .. } => BAR_DEFAULT_W,
        Widget::Particle(ps) => ps.canvas_size().0,
        Widget::Button => content_w + 2 * BUTTON_PAD_X,
        Widget::Container { .. } => content_w,
    }
}

fn intrinsic_h(widget: &Widget, content_h: i32, font_px: i32) -> i32 {
    match widget {
        Widget::Label { .. } => font_px + LABEL_LINE_EXTRA,
        Widget::Image { img_h, .. } => *img_h,
        Widget::Bar { .. } | Widget::Slider { .. } => BAR_DEFAULT_H,
        Widget::Particle(ps) => ps.canvas_size().1,
        Widget::Button => content_h + 2 * BUTTON_PAD_Y,
        Widget::Container { .. } => content_h,
    }
}

/// Single-line width estimate: glyph advance ≈ 3/5 of the font height.
fn label_width(text: &str, font_px: i32) -> i32 {
    text.chars().count() as i32 * font_px * 3 / 5
}

// ── Pass 2: positions ─────────────────────────────────────────

fn arrange(tree: &mut SceneTree, id: NodeId) {
    let Some(node) = tree.get(id) else { return };
    let rect = node.rect;
    let pad = node.style.pad.unwrap_or(0);
    let gap = node.style.gap.unwrap_or(0);
    let children = node.children.clone();

    let (flow, justify, align_items) = match &node.widget {
        Widget::Container {
            flow,
            justify,
            align_items,
            ..
        } => (*flow, *justify, *align_items),
        // A button centres its inline label.
        Widget::Button => (None, FlexAlign::Center, FlexAlign::Center),
        _ => (None, FlexAlign::Start, FlexAlign::Start),
    };

    // Split anchored children out of the flow.
    let mut flowing = Vec::new();
    for &child in &children {
        let Some(c) = tree.get(child) else { continue };
        match c.style.align {
            Some((anchor, dx, dy)) => {
                let (cw, ch) = (c.rect.w, c.rect.h);
                let (ax, ay) = anchor_position(anchor, rect.w, rect.h, cw, ch);
                if let Some(c) = tree.get_mut(child) {
                    c.rect.x = rect.x + ax + dx;
                    c.rect.y = rect.y + ay + dy;
                }
            }
            None => flowing.push(child),
        }
    }

    match flow {
        Some(f) => place_flex(tree, &flowing, rect, pad, gap, f, justify, align_items),
        None => place_stack(tree, &flowing, rect, pad, justify, align_items),
    }

    for child in children {
        arrange(tree, child);
    }
}

/// Non-flex fallback: centre or start-stack children inside the parent.
fn place_stack(
    tree: &mut SceneTree,
    children: &[NodeId],
    rect: super::node::Rect,
    pad: i32,
    justify: FlexAlign,
    align_items: FlexAlign,
) {
    for &child in children {
        let Some(c) = tree.get(child) else { continue };
        let (cw, ch) = (c.rect.w, c.rect.h);
        let x = rect.x
            + match justify {
                FlexAlign::Center => (rect.w - cw) / 2,
                FlexAlign::End => rect.w - pad - cw,
                _ => pad,
            };
        let y = rect.y
            + match align_items {
                FlexAlign::Center => (rect.h - ch) / 2,
                FlexAlign::End => rect.h - pad - ch,
                _ => pad,
            };
        if let Some(c) = tree.get_mut(child) {
            c.rect.x = x;
            c.rect.y = y;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn place_flex(
    tree: &mut SceneTree,
    children: &[NodeId],
    rect: super::node::Rect,
    pad: i32,
    gap: i32,
    flow: FlexFlow,
    justify: FlexAlign,
    align_items: FlexAlign,
) {
    let is_row = flow.is_row();
    let avail_main = if is_row { rect.w } else { rect.h } - 2 * pad;

    // Break children into lines (a single line unless wrapping).
    let mut lines: Vec<Vec<NodeId>> = Vec::new();
    let mut line: Vec<NodeId> = Vec::new();
    let mut line_main = 0;
    for &child in children {
        let Some(c) = tree.get(child) else { continue };
        let cm = if is_row { c.rect.w } else { c.rect.h };
        let needed = if line.is_empty() { cm } else { cm + gap };
        if flow.wraps() && !line.is_empty() && line_main + needed > avail_main {
            lines.push(core::mem::take(&mut line));
            line_main = cm;
        } else {
            line_main += needed;
        }
        line.push(child);
    }
    if !line.is_empty() {
        lines.push(line);
    }

    let mut cross_cursor = pad;
    for line in lines {
        let mut total_main = 0;
        let mut line_cross = 0;
        for &child in &line {
            let Some(c) = tree.get(child) else { continue };
            total_main += if is_row { c.rect.w } else { c.rect.h };
            line_cross = line_cross.max(if is_row { c.rect.h } else { c.rect.w });
        }
        let n = line.len() as i32;
        if n > 1 {
            total_main += gap * (n - 1);
        }

        let free = (avail_main - total_main).max(0);
        let (mut main_cursor, spacing) = match justify {
            FlexAlign::Start => (pad, gap),
            FlexAlign::End => (pad + free, gap),
            FlexAlign::Center => (pad + free / 2, gap),
            FlexAlign::SpaceBetween if n > 1 => (pad, gap + free / (n - 1)),
            FlexAlign::SpaceBetween => (pad, gap),
            FlexAlign::SpaceAround => (pad + free / (2 * n).max(1), gap + free / n.max(1)),
            FlexAlign::SpaceEvenly => (pad + free / (n + 1), gap + free / (n + 1)),
        };

        for &child in &line {
            let Some(c) = tree.get(child) else { continue };
            let (cm, cc) = if is_row {
                (c.rect.w, c.rect.h)
            } else {
                (c.rect.h, c.rect.w)
            };
            let avail_cross = if is_row { rect.h } else { rect.w } - 2 * pad;
            let cross_in_line = match align_items {
                FlexAlign::Center => (avail_cross - cc) / 2,
                FlexAlign::End => avail_cross - cc,
                _ => cross_cursor - pad,
            };
            let cross = if flow.wraps() {
                cross_cursor + if align_items == FlexAlign::Center { (line_cross - cc) / 2 } else { 0 }
            } else {
                pad + cross_in_line.max(0)
            };

            let (x, y) = if is_row {
                (rect.x + main_cursor, rect.y + cross)
            } else {
                (rect.x + cross, rect.y + main_cursor)
            };
            if let Some(c) = tree.get_mut(child) {
                c.rect.x = x;
                c.rect.y = y;
            }
            main_cursor += cm + spacing;
        }

        cross_cursor += line_cross + gap;
    }
}

/// Offset of a child within its parent for an absolute anchor.
fn anchor_position(anchor: Anchor, pw: i32, ph: i32, cw: i32, ch: i32) -> (i32, i32) {
    let cx = (pw - cw) / 2;
    let cy = (ph - ch) / 2;
    match anchor {
        Anchor::Center => (cx, cy),
        Anchor::TopMid => (cx, 0),
        Anchor::TopLeft => (0, 0),
        Anchor::TopRight => (pw - cw, 0),
        Anchor::BottomMid => (cx, ph - ch),
        Anchor::BottomLeft => (0, ph - ch),
        Anchor::BottomRight => (pw - cw, ph - ch),
        Anchor::LeftMid => (0, cy),
        Anchor::RightMid => (pw - cw, cy),
    }
}

// ── Tests ─────────────────────────────────────────────────────
