//! Structured error types.
//!
//! Every fallible public API returns `Result<T, SimError>`. A failed
//! command never leaves the engine half-mutated: validation happens
//! before any state is touched.
//!
//! Two outcomes are deliberately *not* errors:
//! - a duplicate `request` or a stray `release` is a
//!   [`CommandOutcome::Rejected`](crate::simulation::CommandOutcome) value;
//! - a protocol inconsistency (e.g. a REPLY reaching a node that is not
//!   waiting for one) is recorded in the event log and the run goes on.

use thiserror::Error;

use crate::node::NodeId;

/// The top-level error type for the simulation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    // ── Configuration ─────────────────────────────────────

    /// The node set or delay policy is unusable.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// A scenario description could not be parsed.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    // ── Commands ──────────────────────────────────────────

    /// A node ID outside the configured node set.
    #[error("node {0} is not part of this simulation")]
    InvalidNode(NodeId),

    /// The simulation was terminated; only `reset`, `configure` and
    /// `snapshot` are still accepted.
    #[error("simulation has been terminated")]
    Terminated,

    // ── Engine ────────────────────────────────────────────

    /// A message addressed to its own sender.
    #[error("message from {from} to {to}: sender and receiver must differ")]
    InvalidMessage { from: NodeId, to: NodeId },

    /// Attempted to schedule an event before the current tick.
    #[error("cannot schedule event at T={requested} when current time is T={current}")]
    NonCausalEvent { requested: u64, current: u64 },
}

/// Reasons a configuration is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least 2 nodes are required, got {0}")]
    TooFewNodes(usize),

    /// A delay policy that could deliver a message in the tick it was sent.
    #[error("message delay must be at least 1 tick")]
    ZeroDelay,

    #[error("delay range is inverted: min {min} > max {max}")]
    InvertedDelayRange { min: u64, max: u64 },

    #[error("edge {a}-{b} connects a node to itself")]
    SelfEdge { a: NodeId, b: NodeId },

    #[error("edge {a}-{b} references a node outside 0..{node_count}")]
    UnknownEdgeNode { a: NodeId, b: NodeId, node_count: usize },

    #[error("{what} references {node}, outside 0..{node_count}")]
    UnknownNode {
        what: &'static str,
        node: NodeId,
        node_count: usize,
    },
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
