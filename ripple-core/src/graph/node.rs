//! Graph Nodes
//!
//! Every observable and every observer in the graph carries a [`NodeId`].
//! Identity comparisons (is this the dependency that changed? is this observer
//! already registered?) go through the id, never through pointer equality.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a node in the observable graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Name used in logs and error reports when the caller gave none.
pub(crate) fn default_debug_name(kind: &str, id: NodeId) -> String {
    format!("{kind}{id:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
        assert!(id1 < id2);
    }

    #[test]
    fn default_names_include_the_id() {
        let id = NodeId::new();
        assert_eq!(default_debug_name("derived", id), format!("derived#{}", id.raw()));
    }
}
