//! Node ID — a lightweight, ordered, copyable node identifier.

/// A unique identifier for a simulated process.
///
/// IDs are dense: a simulation of `n` nodes uses `N0..N(n-1)`, and the
/// controller stores nodes in a `Vec` indexed by [`NodeId::index`]. The
/// derived `Ord` is the global tie-break order every node agrees on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct NodeId(u64);

impl NodeId {
    #[inline]
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Position of this node in the controller's node table.
    ///
    /// IDs that do not fit in `usize` map to `usize::MAX`, which is never
    /// a valid position, so they cannot alias a real node.
    #[inline]
    pub fn index(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }

    /// All IDs of an `n`-node simulation, in order.
    pub fn range(n: usize) -> impl Iterator<Item = NodeId> {
        (0..n as u64).map(NodeId)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}
