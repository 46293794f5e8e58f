//! Protocol messages and the request priority order.

use crate::error::{SimError, SimResult};
use crate::node::NodeId;
use crate::time::VirtualTime;

/// The two Ricart–Agrawala message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "SCREAMING_SNAKE_CASE")
)]
pub enum MessageKind {
    Request,
    Reply,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Request => write!(f, "REQUEST"),
            MessageKind::Reply => write!(f, "REPLY"),
        }
    }
}

// ── RequestStamp ──────────────────────────────────────────────────────

/// Priority of a critical-section request.
///
/// Ordered by `(timestamp, node)` ascending: the smaller stamp wins.
/// Field order matters here, the derived `Ord` compares `timestamp`
/// first and falls back to `node` on ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestStamp {
    pub timestamp: u64,
    pub node: NodeId,
}

impl RequestStamp {
    pub fn new(timestamp: u64, node: NodeId) -> Self {
        RequestStamp { timestamp, node }
    }

    /// `true` if this request must be served before `other`.
    #[inline]
    pub fn precedes(&self, other: &RequestStamp) -> bool {
        self < other
    }
}

impl std::fmt::Display for RequestStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.timestamp, self.node)
    }
}

// ── Message ───────────────────────────────────────────────────────────

/// An immutable REQUEST or REPLY between two distinct nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    kind: MessageKind,
    from: NodeId,
    to: NodeId,
    timestamp: u64,
    sent_at: VirtualTime,
}

impl Message {
    /// Build a message. Fails if `from == to`.
    pub fn new(
        kind: MessageKind,
        from: NodeId,
        to: NodeId,
        timestamp: u64,
        sent_at: VirtualTime,
    ) -> SimResult<Self> {
        if from == to {
            return Err(SimError::InvalidMessage { from, to });
        }
        Ok(Message {
            kind,
            from,
            to,
            timestamp,
            sent_at,
        })
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn to(&self) -> NodeId {
        self.to
    }

    /// Sender's Lamport clock value at send time.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn sent_at(&self) -> VirtualTime {
        self.sent_at
    }

    /// The sender's request priority carried by this message.
    pub fn stamp(&self) -> RequestStamp {
        RequestStamp::new(self.timestamp, self.from)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}→{} ts={}",
            self.kind, self.from, self.to, self.timestamp
        )
    }
}
