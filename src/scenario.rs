//! Static description of a simulation run.
//!
//! A [`Scenario`] is everything needed to rebuild the engine from scratch:
//! the node count, the delay policies, the RNG seed, per-node hold
//! durations and the requests to inject at fixed ticks. `reset` replays
//! the stored scenario, and scenarios move in and out of the engine as
//! JSON.

use std::collections::BTreeMap;

use crate::error::{ConfigError, SimResult};
use crate::network::{DelayPolicy, NetworkConfig};
use crate::node::NodeId;
use crate::time::VirtualTime;

/// Delay override for the undirected link between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeDelay {
    pub between: [NodeId; 2],
    pub policy: DelayPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Scenario {
    pub node_count: usize,
    #[cfg_attr(feature = "serialize", serde(default))]
    pub seed: u64,
    /// Policy for every link without an override.
    #[cfg_attr(feature = "serialize", serde(default))]
    pub delay: DelayPolicy,
    #[cfg_attr(feature = "serialize", serde(default))]
    pub edge_delays: Vec<EdgeDelay>,
    /// Ticks a node stays `Held` before releasing on its own. Nodes
    /// without an entry hold until an explicit `release`.
    #[cfg_attr(feature = "serialize", serde(default))]
    pub hold_durations: BTreeMap<NodeId, u64>,
    /// Ticks at which each node issues a `request`.
    #[cfg_attr(feature = "serialize", serde(default))]
    pub scheduled_requests: BTreeMap<NodeId, Vec<u64>>,
}

impl Scenario {
    /// `node_count` nodes, one policy everywhere, nothing scheduled.
    pub fn new(node_count: usize, delay: DelayPolicy) -> Self {
        Scenario {
            node_count,
            seed: 0,
            delay,
            edge_delays: Vec::new(),
            hold_durations: BTreeMap::new(),
            scheduled_requests: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count < 2 {
            return Err(ConfigError::TooFewNodes(self.node_count));
        }
        self.network_config().validate(self.node_count)?;
        self.check_node("hold duration", self.hold_durations.keys())?;
        self.check_node("scheduled request", self.scheduled_requests.keys())?;
        Ok(())
    }

    fn check_node<'a>(
        &self,
        what: &'static str,
        mut nodes: impl Iterator<Item = &'a NodeId>,
    ) -> Result<(), ConfigError> {
        match nodes.find(|n| n.index() >= self.node_count) {
            Some(&node) => Err(ConfigError::UnknownNode {
                what,
                node,
                node_count: self.node_count,
            }),
            None => Ok(()),
        }
    }

    pub fn network_config(&self) -> NetworkConfig {
        self.edge_delays.iter().fold(
            NetworkConfig::new(self.delay, self.seed),
            |config, edge| config.with_edge(edge.between[0], edge.between[1], edge.policy),
        )
    }

    pub fn hold_duration(&self, node: NodeId) -> Option<u64> {
        self.hold_durations.get(&node).copied()
    }

    /// Scheduled requests as `(tick, node)`, sorted and deduplicated.
    pub fn request_plan(&self) -> Vec<(VirtualTime, NodeId)> {
        let mut plan: Vec<(VirtualTime, NodeId)> = self
            .scheduled_requests
            .iter()
            .flat_map(|(&node, ticks)| ticks.iter().map(move |&t| (VirtualTime::new(t), node)))
            .collect();
        plan.sort();
        plan.dedup();
        plan
    }

    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> SimResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::SimError::InvalidScenario(e.to_string()))
    }

    /// Parse and validate a scenario.
    #[cfg(feature = "serialize")]
    pub fn from_json(json: &str) -> SimResult<Scenario> {
        let scenario: Scenario = serde_json::from_str(json)
            .map_err(|e| crate::error::SimError::InvalidScenario(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario::new(3, DelayPolicy::default())
    }
}

/// Check a scenario and hand it back, for call sites that only have `?`.
pub(crate) fn validated(scenario: Scenario) -> SimResult<Scenario> {
    scenario.validate()?;
    Ok(scenario)
}
