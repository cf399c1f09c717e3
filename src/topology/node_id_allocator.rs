// ===========================================================================
// Node ID Allocator for junction nodes
// ===========================================================================
use crate::topology::types::NodeId;

/// Dispenses fresh node IDs above every ID already in use, so junction nodes
/// never collide with provider-assigned identifiers.
pub struct NodeIdAllocator {
    next_id: i64,
}

impl NodeIdAllocator {
    pub fn new(start: i64) -> Self {
        Self { next_id: start }
    }

    /// Start right after the largest existing ID (or at 1 for an empty table).
    pub fn after<'a>(existing: impl IntoIterator<Item = &'a NodeId>) -> Self {
        let max = existing.into_iter().map(|id| id.0).max().unwrap_or(0);
        Self::new(max.max(0) + 1)
    }

    pub fn next(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Get the current next_id value (for statistics)
    pub fn current(&self) -> i64 {
        self.next_id
    }
}
