//! Scheduler events.
//!
//! An `Event` is an immutable record sitting on the scheduler's priority
//! queue until its tick comes up. The payload is either a message in
//! flight or a command the controller scheduled for a node.

use crate::message::Message;
use crate::node::NodeId;
use crate::time::VirtualTime;
use std::cmp::Ordering;

// ── Event ID ──────────────────────────────────────────────────────────

/// Enqueue sequence number.
///
/// Strictly increasing in scheduling order; breaks ties between events
/// that fire in the same tick. It is simulation plumbing and plays no
/// part in the mutual-exclusion priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

/// Hands out strictly increasing [`EventId`]s.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Payload ───────────────────────────────────────────────────────────

/// A command the controller runs on behalf of a node at a future tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "command", content = "node", rename_all = "snake_case")
)]
pub enum LocalCommand {
    /// A scheduled request from the scenario.
    Request(NodeId),
    /// End of a configured hold period.
    Release(NodeId),
}

impl LocalCommand {
    pub fn node(&self) -> NodeId {
        match self {
            LocalCommand::Request(node) | LocalCommand::Release(node) => *node,
        }
    }
}

impl std::fmt::Display for LocalCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocalCommand::Request(node) => write!(f, "Request({})", node),
            LocalCommand::Release(node) => write!(f, "Release({})", node),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// Deliver a message to `message.to()`.
    Deliver(Message),
    /// Run a command for a node.
    Local(LocalCommand),
}

impl std::fmt::Display for EventPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventPayload::Deliver(message) => write!(f, "Deliver({})", message),
            EventPayload::Local(command) => write!(f, "Local({})", command),
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub fire_at: VirtualTime,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, fire_at: VirtualTime, payload: EventPayload) -> Self {
        Event {
            id,
            fire_at,
            payload,
        }
    }
}

/// Ordering: smallest `(fire_at, id)` first.
///
/// `BinaryHeap` is a max-heap, so the natural ordering is reversed here
/// to turn it into a min-heap.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
