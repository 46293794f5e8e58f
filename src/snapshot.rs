//! Immutable views of the engine, published after every command.
//!
//! A [`Snapshot`] is a plain value: observers hold it behind an `Arc` and
//! never see it change. It also carries the checks for the safety
//! invariants, so tests and the explorer evaluate them on exactly what an
//! observer would see.

use thiserror::Error;

use crate::event::LocalCommand;
use crate::message::MessageKind;
use crate::node::{MutexNode, MutexState, NodeId};
use crate::time::VirtualTime;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub state: MutexState,
    pub clock: u64,
    /// Timestamp of the outstanding request; `None` while released.
    pub request_timestamp: Option<u64>,
    /// Deferred requesters, in NodeId order.
    pub pending_replies: Vec<NodeId>,
    pub reply_count: usize,
}

impl From<&MutexNode> for NodeSnapshot {
    fn from(node: &MutexNode) -> Self {
        NodeSnapshot {
            id: node.id(),
            state: node.state(),
            clock: node.clock(),
            request_timestamp: node.request_stamp().map(|s| s.timestamp),
            pending_replies: node.pending_replies().iter().copied().collect(),
            reply_count: node.reply_count(),
        }
    }
}

/// A message the network has accepted but not yet delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct InFlightMessage {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: MessageKind,
    pub timestamp: u64,
    pub sent_at: VirtualTime,
    pub delivery_tick: VirtualTime,
}

/// A pending scenario request or hold timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduledCommand {
    pub at: VirtualTime,
    pub command: LocalCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    pub tick: VirtualTime,
    pub terminated: bool,
    /// One entry per node, indexed by NodeId.
    pub nodes: Vec<NodeSnapshot>,
    /// Ordered by delivery tick, then send order.
    pub in_flight: Vec<InFlightMessage>,
    pub scheduled: Vec<ScheduledCommand>,
}

impl Snapshot {
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.get(id.index())
    }

    /// Nodes currently in the critical section.
    pub fn holders(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.state == MutexState::Held)
            .map(|n| n.id)
            .collect()
    }

    pub fn nodes_in(&self, state: MutexState) -> usize {
        self.nodes.iter().filter(|n| n.state == state).count()
    }

    /// One state letter per node, e.g. `"HWR"`.
    pub fn state_letters(&self) -> String {
        self.nodes.iter().map(|n| n.state.letter()).collect()
    }

    /// Every safety invariant that does not hold in this snapshot.
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        let holders = self.holders();
        if holders.len() > 1 {
            violations.push(InvariantViolation::MultipleHolders(holders));
        }

        let bound = self.nodes.len().saturating_sub(1);
        for node in &self.nodes {
            if node.pending_replies.contains(&node.id) {
                violations.push(InvariantViolation::SelfDeferral(node.id));
            }
            if node.reply_count > bound {
                violations.push(InvariantViolation::ReplyOverflow {
                    node: node.id,
                    count: node.reply_count,
                    bound,
                });
            }
            if (node.state == MutexState::Held) != (node.reply_count == bound) {
                violations.push(InvariantViolation::QuorumMismatch {
                    node: node.id,
                    state: node.state,
                    count: node.reply_count,
                });
            }
        }
        violations
    }

    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] in-flight:{}",
            self.tick,
            self.state_letters(),
            self.in_flight.len()
        )?;
        if self.terminated {
            write!(f, " (terminated)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("mutual exclusion broken: {0:?} all hold the resource")]
    MultipleHolders(Vec<NodeId>),

    #[error("{0} defers its own request")]
    SelfDeferral(NodeId),

    #[error("{node} counts {count} replies, more than the {bound} possible")]
    ReplyOverflow {
        node: NodeId,
        count: usize,
        bound: usize,
    },

    /// `Held` must coincide with a complete reply set.
    #[error("{node} is {state} with {count} replies")]
    QuorumMismatch {
        node: NodeId,
        state: MutexState,
        count: usize,
    },
}
