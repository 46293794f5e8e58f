//! Fluent builders for simulations and explorations.
//!
//! Both builders are thin layers over [`Scenario`] and [`Explorer`]:
//! everything they produce can also be written out by hand.

use crate::error::SimResult;
use crate::explorer::{Choice, ExplorationResult, Explorer, NamedProperty, Property};
use crate::network::DelayPolicy;
use crate::node::NodeId;
use crate::scenario::{EdgeDelay, Scenario};
use crate::simulation::Simulation;
use crate::snapshot::Snapshot;
use crate::time::VirtualTime;

// ── SimulationBuilder ─────────────────────────────────────────────────

/// Fluent builder for a [`Simulation`].
///
/// # Example
/// ```rust
/// use ricart_sim::dsl::SimulationBuilder;
///
/// let sim = SimulationBuilder::new()
///     .nodes(4)
///     .uniform_delay(1, 3)
///     .seed(42)
///     .hold_for(0, 2)
///     .request_at(0, 0)
///     .request_at(2, 1)
///     .build()
///     .unwrap();
/// assert_eq!(sim.node_count(), 4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimulationBuilder {
    scenario: Scenario,
}

impl SimulationBuilder {
    /// Three nodes, fixed delay of one tick, seed 0.
    pub fn new() -> Self {
        SimulationBuilder {
            scenario: Scenario::default(),
        }
    }

    /// Start from an existing scenario.
    pub fn from_scenario(scenario: Scenario) -> Self {
        SimulationBuilder { scenario }
    }

    pub fn nodes(mut self, count: usize) -> Self {
        self.scenario.node_count = count;
        self
    }

    pub fn fixed_delay(mut self, ticks: u64) -> Self {
        self.scenario.delay = DelayPolicy::fixed(ticks);
        self
    }

    pub fn uniform_delay(mut self, min: u64, max: u64) -> Self {
        self.scenario.delay = DelayPolicy::uniform(min, max);
        self
    }

    /// Override the link between `a` and `b` (both directions).
    pub fn edge_delay(mut self, a: u64, b: u64, policy: DelayPolicy) -> Self {
        self.scenario.edge_delays.push(EdgeDelay {
            between: [NodeId::new(a), NodeId::new(b)],
            policy,
        });
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.scenario.seed = seed;
        self
    }

    /// `node` releases `ticks` after each entry.
    pub fn hold_for(mut self, node: u64, ticks: u64) -> Self {
        self.scenario.hold_durations.insert(NodeId::new(node), ticks);
        self
    }

    /// Every node releases `ticks` after each entry.
    pub fn hold_all_for(mut self, ticks: u64) -> Self {
        for node in NodeId::range(self.scenario.node_count) {
            self.scenario.hold_durations.insert(node, ticks);
        }
        self
    }

    /// `node` requests at tick `at`.
    pub fn request_at(mut self, node: u64, at: u64) -> Self {
        self.scenario
            .scheduled_requests
            .entry(NodeId::new(node))
            .or_default()
            .push(at);
        self
    }

    /// The scenario built so far, unvalidated.
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn build(self) -> SimResult<Simulation> {
        Simulation::new(self.scenario)
    }

    /// Build, advance `ticks`, and return the simulation.
    pub fn run_for(self, ticks: u64) -> SimResult<Simulation> {
        let mut sim = self.build()?;
        sim.advance(ticks)?;
        Ok(sim)
    }
}

// ── ScenarioBuilder ───────────────────────────────────────────────────

/// Fluent wrapper over [`Explorer`].
///
/// # Example
/// ```rust
/// use ricart_sim::dsl::{ScenarioBuilder, SimulationBuilder};
///
/// let base = SimulationBuilder::new()
///     .uniform_delay(1, 3)
///     .hold_all_for(2)
///     .request_at(0, 0)
///     .scenario()
///     .clone();
///
/// let result = ScenarioBuilder::new(base)
///     .maybe_request(1, 0)
///     .request_one_of(2, &[0, 1, 4])
///     .seeds(0..3)
///     .horizon(60)
///     .safety()
///     .explore()
///     .unwrap();
/// assert!(result.is_safe());
/// ```
pub struct ScenarioBuilder {
    base: Scenario,
    choices: Vec<Choice>,
    properties: Vec<Box<dyn Property>>,
    seeds: Option<std::ops::Range<u64>>,
    horizon: Option<u64>,
    max_branches: Option<usize>,
    liveness: bool,
}

impl ScenarioBuilder {
    pub fn new(base: Scenario) -> Self {
        ScenarioBuilder {
            base,
            choices: Vec::new(),
            properties: Vec::new(),
            seeds: None,
            horizon: None,
            max_branches: None,
            liveness: true,
        }
    }

    // ── Choices ───────────────────────────────────────────────

    /// Branch on whether `node` requests at `at`.
    pub fn maybe_request(mut self, node: u64, at: u64) -> Self {
        self.choices.push(Choice::binary(
            &format!("N{} requests at T={}", node, at),
            VirtualTime::new(at),
            NodeId::new(node),
        ));
        self
    }

    /// Branch over the tick at which `node` requests.
    pub fn request_one_of(mut self, node: u64, ticks: &[u64]) -> Self {
        self.choices.push(Choice::request_times(
            &format!("N{} request time", node),
            NodeId::new(node),
            ticks,
        ));
        self
    }

    pub fn choice(mut self, choice: Choice) -> Self {
        self.choices.push(choice);
        self
    }

    // ── Properties ────────────────────────────────────────────

    /// Check a closure-based property on every snapshot.
    pub fn assert<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Snapshot) -> Result<(), String> + 'static,
    {
        self.properties.push(Box::new(NamedProperty::new(name, f)));
        self
    }

    pub fn property(mut self, prop: Box<dyn Property>) -> Self {
        self.properties.push(prop);
        self
    }

    /// Mutual exclusion, no self-deferral and the reply bound.
    pub fn safety(mut self) -> Self {
        self.properties.extend(crate::explorer::safety_properties());
        self
    }

    pub fn without_liveness(mut self) -> Self {
        self.liveness = false;
        self
    }

    // ── Limits ────────────────────────────────────────────────

    pub fn seeds(mut self, seeds: std::ops::Range<u64>) -> Self {
        self.seeds = Some(seeds);
        self
    }

    pub fn horizon(mut self, ticks: u64) -> Self {
        self.horizon = Some(ticks);
        self
    }

    pub fn max_branches(mut self, max: usize) -> Self {
        self.max_branches = Some(max);
        self
    }

    // ── Run ───────────────────────────────────────────────────

    pub fn into_explorer(self) -> Explorer {
        let mut explorer = Explorer::new(self.base);
        for choice in self.choices {
            explorer.add_choice(choice);
        }
        for prop in self.properties {
            explorer.add_property(prop);
        }
        if let Some(seeds) = self.seeds {
            explorer.set_seeds(seeds);
        }
        if let Some(horizon) = self.horizon {
            explorer.set_horizon(horizon);
        }
        if let Some(max) = self.max_branches {
            explorer.set_max_branches(max);
        }
        explorer.set_liveness_check(self.liveness);
        explorer
    }

    pub fn explore(self) -> SimResult<ExplorationResult> {
        self.into_explorer().explore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, SimError};
    use crate::node::MutexState;

    #[test]
    fn test_builder_sets_every_field() {
        let builder = SimulationBuilder::new()
            .nodes(4)
            .uniform_delay(2, 6)
            .edge_delay(3, 1, DelayPolicy::fixed(9))
            .seed(17)
            .hold_for(1, 5)
            .request_at(2, 4)
            .request_at(2, 0);

        let s = builder.scenario();
        assert_eq!(s.node_count, 4);
        assert_eq!(s.delay, DelayPolicy::uniform(2, 6));
        assert_eq!(s.seed, 17);
        assert_eq!(s.hold_duration(NodeId::new(1)), Some(5));
        assert_eq!(s.scheduled_requests[&NodeId::new(2)], vec![4, 0]);
        assert_eq!(
            s.network_config().policy_for(NodeId::new(1), NodeId::new(3)),
            DelayPolicy::fixed(9)
        );
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_hold_all_uses_current_node_count() {
        let builder = SimulationBuilder::new().nodes(5).hold_all_for(3);
        assert_eq!(builder.scenario().hold_durations.len(), 5);
    }

    #[test]
    fn test_build_validates() {
        assert_eq!(
            SimulationBuilder::new().nodes(1).build().err(),
            Some(SimError::Configuration(ConfigError::TooFewNodes(1)))
        );
        assert!(SimulationBuilder::new().uniform_delay(3, 1).build().is_err());
    }

    #[test]
    fn test_run_for_drives_scheduled_requests() {
        let sim = SimulationBuilder::new()
            .nodes(2)
            .request_at(1, 0)
            .run_for(3)
            .unwrap();
        let snap = sim.snapshot();
        assert_eq!(snap.node(NodeId::new(1)).unwrap().state, MutexState::Held);
    }

    #[test]
    fn test_scenario_builder_branches() {
        let base = SimulationBuilder::new()
            .hold_all_for(1)
            .request_at(0, 0)
            .scenario()
            .clone();

        let result = ScenarioBuilder::new(base)
            .maybe_request(1, 0)
            .maybe_request(2, 2)
            .request_one_of(1, &[5, 8, 11])
            .horizon(50)
            .safety()
            .explore()
            .unwrap();
        assert_eq!(result.total_branches, 12);
        assert!(result.is_safe(), "{:?}", result.violations);
    }

    #[test]
    fn test_scenario_builder_reports_custom_violation() {
        let base = SimulationBuilder::new().nodes(2).scenario().clone();
        let result = ScenarioBuilder::new(base)
            .maybe_request(0, 1)
            .without_liveness()
            .assert("nobody ever holds", |snap| {
                if snap.holders().is_empty() {
                    Ok(())
                } else {
                    Err(format!("{:?} hold", snap.holders()))
                }
            })
            .horizon(10)
            .explore()
            .unwrap();
        assert_eq!(result.violation_count(), 1);
        assert_eq!(result.violations[0].choices[0].1, 1);
    }
}
