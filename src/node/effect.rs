//! What a node asks the controller to do after a transition.

use crate::message::{Message, RequestStamp};

use super::id::NodeId;
use super::state::MutexState;

/// A side effect produced by [`MutexNode`](super::MutexNode).
///
/// Nodes never reach into each other; every cross-node effect is a
/// `Send` that the controller pushes through the network and scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEffect {
    /// Hand this message to the network.
    Send(Message),
    /// `Released → Wanted`; REQUESTs carrying `stamp` follow as `Send`s.
    Requested { stamp: RequestStamp },
    /// A REQUEST from `requester` was queued instead of answered.
    Deferred { requester: NodeId },
    /// `Wanted → Held`.
    Entered,
    /// `Held → Released`; deferred REPLYs went to `replied`.
    Released { replied: Vec<NodeId> },
    /// The command was a benign no-op.
    Rejected(RejectReason),
    /// A stray message was ignored.
    Inconsistency(ProtocolInconsistency),
}

/// Why a `request` or `release` command did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum RejectReason {
    AlreadyWanted,
    AlreadyHeld,
    NotHeld(MutexState),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::AlreadyWanted => write!(f, "already waiting for the resource"),
            RejectReason::AlreadyHeld => write!(f, "already holding the resource"),
            RejectReason::NotHeld(state) => write!(f, "not holding the resource ({})", state),
        }
    }
}

/// A message that does not fit the receiver's current state.
///
/// These are recovered locally by ignoring the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolInconsistency {
    /// A REPLY reached a node that has no outstanding request.
    ReplyWhileNotWanted {
        node: NodeId,
        from: NodeId,
        state: MutexState,
    },
    /// A REPLY from a peer that already replied in this cycle.
    DuplicateReply { node: NodeId, from: NodeId },
    /// A REQUEST from a peer that is already in the deferred set.
    DuplicateRequest { node: NodeId, from: NodeId },
}

impl std::fmt::Display for ProtocolInconsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolInconsistency::ReplyWhileNotWanted { node, from, state } => write!(
                f,
                "{} got REPLY from {} while {}; ignored",
                node, from, state
            ),
            ProtocolInconsistency::DuplicateReply { node, from } => {
                write!(f, "{} got duplicate REPLY from {}; ignored", node, from)
            }
            ProtocolInconsistency::DuplicateRequest { node, from } => {
                write!(f, "{} already defers {}; duplicate REQUEST ignored", node, from)
            }
        }
    }
}
