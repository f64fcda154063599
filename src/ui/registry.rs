//! The ID registry.
//!
//! Maps widget ID strings to scene-graph nodes for `find_by_id` and
//! incremental updates. Bounded; overflow is logged and the excess IDs are
//! simply not addressable. The registry is cleared and rebuilt on every
//! full render, so no stale entry survives a layout swap.

use log::warn;

use super::node::NodeId;

pub const MAX_ID_ENTRIES: usize = 64;

/// Widget IDs are short strings (≤31 bytes).
pub type IdString = heapless::String<32>;

/// Truncate to at most `max` bytes without splitting a UTF-8 sequence.
pub(crate) fn clip_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

struct IdEntry {
    id: IdString,
    node: NodeId,
}

#[derive(Default)]
pub struct IdRegistry {
    entries: heapless::Vec<IdEntry, MAX_ID_ENTRIES>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
        }
    }

    /// Register `id` → `node`. Overflow drops the entry with a warning.
    pub fn register(&mut self, id: &str, node: NodeId) {
        let mut stored = IdString::new();
        if stored.push_str(clip_str(id, 31)).is_err() {
            warn!("IdRegistry: id not storable: {}", id);
            return;
        }
        if self
            .entries
            .push(IdEntry { id: stored, node })
            .is_err()
        {
            warn!("IdRegistry: table full, cannot register: {}", id);
        }
    }

    /// O(N) lookup; first registration wins on duplicates.
    pub fn lookup(&self, id: &str) -> Option<NodeId> {
        self.entries
            .iter()
            .find(|e| e.id.as_str() == id)
            .map(|e| e.node)
    }

    /// Reverse lookup used at action-dispatch time.
    pub fn id_of(&self, node: NodeId) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.node == node)
            .map(|e| e.id.as_str())
    }

    /// Drop entries whose node was deleted outside a full render.
    pub fn purge(&mut self, removed: &[NodeId]) {
        self.entries.retain(|e| !removed.contains(&e.node));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut reg = IdRegistry::new();
        reg.register("btn", NodeId(7));
        assert_eq!(reg.lookup("btn"), Some(NodeId(7)));
        assert_eq!(reg.lookup("other"), None);
    }

    #[test]
    fn reverse_lookup() {
        let mut reg = IdRegistry::new();
        reg.register("lab", NodeId(3));
        assert_eq!(reg.id_of(NodeId(3)), Some("lab"));
        assert_eq!(reg.id_of(NodeId(4)), None);
    }

    #[test]
    fn overflow_is_dropped() {
        let mut reg = IdRegistry::new();
        for i in 0..MAX_ID_ENTRIES + 5 {
            reg.register(&format!("id{i}"), NodeId(i));
        }
        assert_eq!(reg.len(), MAX_ID_ENTRIES);
        assert!(reg.lookup("id70").is_none());
    }

    #[test]
    fn clear_empties_table() {
        let mut reg = IdRegistry::new();
        reg.register("a", NodeId(1));
        reg.clear();
        assert!(reg.is_empty());
    }

    #[test]
    fn purge_removes_deleted_nodes() {
        let mut reg = IdRegistry::new();
        reg.register("a", NodeId(1));
        reg.register("b", NodeId(2));
        reg.purge(&[NodeId(1)]);
        assert!(reg.lookup("a").is_none());
        assert_eq!(reg.lookup("b"), Some(NodeId(2)));
    }

    #[test]
    fn long_ids_are_truncated_to_31_bytes() {
        let mut reg = IdRegistry::new();
        let long = "x".repeat(40);
        reg.register(&long, NodeId(1));
        assert_eq!(reg.lookup(&"x".repeat(31)), Some(NodeId(1)));
    }
}
