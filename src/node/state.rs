//! Mutual-exclusion state of a single node.

use std::collections::BTreeSet;

use crate::message::RequestStamp;

use super::id::NodeId;

/// Externally visible mutual-exclusion state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "SCREAMING_SNAKE_CASE")
)]
pub enum MutexState {
    /// Idle; not interested in the resource.
    #[default]
    Released,
    /// Broadcast a REQUEST and is collecting REPLYs.
    Wanted,
    /// Inside the critical section.
    Held,
}

impl MutexState {
    /// One-letter code used in compact trace output.
    pub fn letter(self) -> char {
        match self {
            MutexState::Released => 'R',
            MutexState::Wanted => 'W',
            MutexState::Held => 'H',
        }
    }
}

impl std::fmt::Display for MutexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutexState::Released => write!(f, "RELEASED"),
            MutexState::Wanted => write!(f, "WANTED"),
            MutexState::Held => write!(f, "HELD"),
        }
    }
}

/// Internal state carrying the data that only exists in some states.
///
/// The outstanding request stamp lives inside `Wanted`/`Held`, and the
/// set of peers whose REPLY is still missing lives inside `Wanted`, so
/// a `Released` node cannot carry a stale stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Phase {
    Released,
    Wanted {
        stamp: RequestStamp,
        awaiting: BTreeSet<NodeId>,
    },
    Held {
        stamp: RequestStamp,
    },
}

impl Phase {
    pub(crate) fn state(&self) -> MutexState {
        match self {
            Phase::Released => MutexState::Released,
            Phase::Wanted { .. } => MutexState::Wanted,
            Phase::Held { .. } => MutexState::Held,
        }
    }

    pub(crate) fn stamp(&self) -> Option<RequestStamp> {
        match self {
            Phase::Released => None,
            Phase::Wanted { stamp, .. } | Phase::Held { stamp } => Some(*stamp),
        }
    }
}
