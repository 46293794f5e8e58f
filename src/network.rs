//! Simulated network layer.
//!
//! Every message passes through [`Network::transmit`], which picks a
//! transit delay of at least one tick and returns the absolute delivery
//! tick. Links never drop or duplicate. Randomised delays come from a
//! seeded `ChaCha8Rng`, so the same seed always yields the same delays.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use crate::error::ConfigError;
use crate::message::Message;
use crate::node::NodeId;
use crate::time::VirtualTime;

// ── Delay Policy ──────────────────────────────────────────────────────

/// How many ticks a message spends in transit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum DelayPolicy {
    /// Every message takes exactly `ticks`.
    Fixed { ticks: u64 },
    /// Uniformly random in `[min, max]`, both inclusive.
    Uniform { min: u64, max: u64 },
}

impl DelayPolicy {
    pub fn fixed(ticks: u64) -> Self {
        DelayPolicy::Fixed { ticks }
    }

    pub fn uniform(min: u64, max: u64) -> Self {
        DelayPolicy::Uniform { min, max }
    }

    /// Reject policies that could deliver in the send tick, or that
    /// have an empty range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            DelayPolicy::Fixed { ticks } if ticks == 0 => Err(ConfigError::ZeroDelay),
            DelayPolicy::Fixed { .. } => Ok(()),
            DelayPolicy::Uniform { min, max } if min > max => {
                Err(ConfigError::InvertedDelayRange { min, max })
            }
            DelayPolicy::Uniform { min, .. } if min == 0 => Err(ConfigError::ZeroDelay),
            DelayPolicy::Uniform { .. } => Ok(()),
        }
    }

    /// Draw a delay. `Fixed` never touches the RNG.
    fn sample(&self, rng: &mut ChaCha8Rng) -> u64 {
        match *self {
            DelayPolicy::Fixed { ticks } => ticks,
            DelayPolicy::Uniform { min, max } if min == max => min,
            DelayPolicy::Uniform { min, max } => rng.gen_range(min..=max),
        }
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        DelayPolicy::Fixed { ticks: 1 }
    }
}

impl std::fmt::Display for DelayPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DelayPolicy::Fixed { ticks } => write!(f, "fixed({})", ticks),
            DelayPolicy::Uniform { min, max } => write!(f, "uniform({}..={})", min, max),
        }
    }
}

// ── Network Config ────────────────────────────────────────────────────

/// Delay configuration for the whole network.
///
/// Links are undirected: an override for `(a, b)` also applies to
/// `(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Policy for every link without an override.
    pub default_policy: DelayPolicy,
    edges: BTreeMap<(NodeId, NodeId), DelayPolicy>,
    /// Seed for randomised policies.
    pub seed: u64,
}

impl NetworkConfig {
    pub fn new(default_policy: DelayPolicy, seed: u64) -> Self {
        NetworkConfig {
            default_policy,
            edges: BTreeMap::new(),
            seed,
        }
    }

    /// Every link takes exactly `ticks`.
    pub fn fixed(ticks: u64) -> Self {
        Self::new(DelayPolicy::fixed(ticks), 0)
    }

    /// Every link takes `[min, max]` ticks, drawn from `seed`.
    pub fn uniform(min: u64, max: u64, seed: u64) -> Self {
        Self::new(DelayPolicy::uniform(min, max), seed)
    }

    /// Override the policy of the link between `a` and `b`.
    pub fn with_edge(mut self, a: NodeId, b: NodeId, policy: DelayPolicy) -> Self {
        self.set_edge(a, b, policy);
        self
    }

    pub fn set_edge(&mut self, a: NodeId, b: NodeId, policy: DelayPolicy) {
        self.edges.insert(edge_key(a, b), policy);
    }

    /// Per-link overrides, keyed by `(lower, higher)` node ID.
    pub fn edges(&self) -> &BTreeMap<(NodeId, NodeId), DelayPolicy> {
        &self.edges
    }

    /// Policy in force on the link between `a` and `b`.
    pub fn policy_for(&self, a: NodeId, b: NodeId) -> DelayPolicy {
        self.edges
            .get(&edge_key(a, b))
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Check every policy and every override against an `n`-node system.
    pub fn validate(&self, node_count: usize) -> Result<(), ConfigError> {
        self.default_policy.validate()?;
        for (&(a, b), policy) in &self.edges {
            if a == b {
                return Err(ConfigError::SelfEdge { a, b });
            }
            if b.index() >= node_count {
                return Err(ConfigError::UnknownEdgeNode { a, b, node_count });
            }
            policy.validate()?;
        }
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::fixed(1)
    }
}

fn edge_key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// ── Network ───────────────────────────────────────────────────────────

/// Assigns delivery ticks to messages.
#[derive(Debug, Clone)]
pub struct Network {
    config: NetworkConfig,
    rng: ChaCha8Rng,
    transmitted: u64,
}

impl Network {
    /// Build a network, seeding the RNG from `config.seed`.
    pub fn new(config: NetworkConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Network {
            config,
            rng,
            transmitted: 0,
        }
    }

    /// Decide when `message`, sent at `now`, arrives.
    pub fn transmit(&mut self, message: &Message, now: VirtualTime) -> VirtualTime {
        let policy = self.config.policy_for(message.from(), message.to());
        // Validated configs never yield 0; clamp anyway so a delivery
        // can never land in its own send tick.
        let delay = policy.sample(&mut self.rng).max(1);
        self.transmitted += 1;
        trace!(%message, delay, %policy, "transmit");
        now.plus(delay)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Messages handed to the network since construction.
    pub fn transmitted(&self) -> u64 {
        self.transmitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    fn request(from: u64, to: u64) -> Message {
        Message::new(
            MessageKind::Request,
            NodeId::new(from),
            NodeId::new(to),
            1,
            VirtualTime::ZERO,
        )
        .unwrap()
    }

    #[test]
    fn test_fixed_delay() {
        let mut net = Network::new(NetworkConfig::fixed(2));
        for now in [0, 5, 17] {
            let at = net.transmit(&request(0, 1), VirtualTime::new(now));
            assert_eq!(at, VirtualTime::new(now + 2));
        }
        assert_eq!(net.transmitted(), 3);
    }

    #[test]
    fn test_uniform_delay_within_bounds() {
        let mut net = Network::new(NetworkConfig::uniform(5, 15, 42));
        let mut seen = Vec::new();
        for _ in 0..500 {
            let d = net.transmit(&request(0, 1), VirtualTime::ZERO).ticks();
            assert!((5..=15).contains(&d), "delay {} out of [5, 15]", d);
            seen.push(d);
        }
        seen.sort();
        seen.dedup();
        assert!(seen.len() > 5, "uniform delays show no spread: {:?}", seen);
        assert!(seen.contains(&5) && seen.contains(&15));
    }

    #[test]
    fn test_same_seed_same_delays() {
        fn delays(seed: u64) -> Vec<u64> {
            let mut net = Network::new(NetworkConfig::uniform(1, 100, seed));
            (0..50)
                .map(|_| net.transmit(&request(1, 2), VirtualTime::ZERO).ticks())
                .collect()
        }
        assert_eq!(delays(7), delays(7));
        assert_ne!(delays(7), delays(8));
    }

    #[test]
    fn test_edge_override_is_undirected() {
        let config = NetworkConfig::fixed(3).with_edge(
            NodeId::new(2),
            NodeId::new(0),
            DelayPolicy::fixed(9),
        );
        let mut net = Network::new(config);
        assert_eq!(net.transmit(&request(0, 2), VirtualTime::ZERO).ticks(), 9);
        assert_eq!(net.transmit(&request(2, 0), VirtualTime::ZERO).ticks(), 9);
        assert_eq!(net.transmit(&request(0, 1), VirtualTime::ZERO).ticks(), 3);
    }

    #[test]
    fn test_degenerate_uniform_range_is_fixed() {
        let mut net = Network::new(NetworkConfig::uniform(4, 4, 1));
        assert_eq!(net.transmit(&request(0, 1), VirtualTime::new(1)).ticks(), 5);
    }

    #[test]
    fn test_policy_validation() {
        assert_eq!(DelayPolicy::fixed(0).validate(), Err(ConfigError::ZeroDelay));
        assert_eq!(DelayPolicy::uniform(0, 3).validate(), Err(ConfigError::ZeroDelay));
        assert_eq!(
            DelayPolicy::uniform(5, 2).validate(),
            Err(ConfigError::InvertedDelayRange { min: 5, max: 2 })
        );
        assert!(DelayPolicy::fixed(1).validate().is_ok());
        assert!(DelayPolicy::uniform(1, 1).validate().is_ok());
    }

    #[test]
    fn test_config_validation_checks_edges() {
        let n = NodeId::new;
        let bad_node = NetworkConfig::fixed(1).with_edge(n(0), n(5), DelayPolicy::fixed(2));
        assert!(matches!(
            bad_node.validate(3),
            Err(ConfigError::UnknownEdgeNode { .. })
        ));

        let self_edge = NetworkConfig::fixed(1).with_edge(n(1), n(1), DelayPolicy::fixed(2));
        assert!(matches!(self_edge.validate(3), Err(ConfigError::SelfEdge { .. })));

        let bad_policy = NetworkConfig::fixed(1).with_edge(n(0), n(1), DelayPolicy::fixed(0));
        assert_eq!(bad_policy.validate(3), Err(ConfigError::ZeroDelay));
    }
}
