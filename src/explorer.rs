//! Schedule and timing exploration.
//!
//! Runs a base scenario once per combination of request [`Choice`]s and
//! per RNG seed, advancing one tick at a time up to a horizon. After
//! every tick each [`Property`] is checked against the published
//! snapshot; at the horizon the explorer also checks that no request is
//! still waiting.

use std::ops::Range;

use tracing::{debug, info};

use crate::error::SimResult;
use crate::node::{MutexState, NodeId};
use crate::scenario::Scenario;
use crate::simulation::Simulation;
use crate::snapshot::{InvariantViolation, Snapshot};
use crate::time::VirtualTime;

// ── Choice ────────────────────────────────────────────────────────────

/// A decision point with several options.
///
/// Each option is a set of extra requests `(tick, node)` added to the
/// base scenario. The explorer tries the Cartesian product of all
/// choices.
#[derive(Debug, Clone)]
pub struct Choice {
    pub label: String,
    pub options: Vec<Vec<(VirtualTime, NodeId)>>,
}

impl Choice {
    /// Request or not. Creates 2 branches.
    pub fn binary(label: &str, at: VirtualTime, node: NodeId) -> Self {
        Choice {
            label: label.to_string(),
            options: vec![vec![], vec![(at, node)]],
        }
    }

    pub fn multi(label: &str, options: Vec<Vec<(VirtualTime, NodeId)>>) -> Self {
        Choice {
            label: label.to_string(),
            options,
        }
    }

    /// One branch per candidate tick for the same node's request.
    pub fn request_times(label: &str, node: NodeId, ticks: &[u64]) -> Self {
        Choice {
            label: label.to_string(),
            options: ticks
                .iter()
                .map(|&t| vec![(VirtualTime::new(t), node)])
                .collect(),
        }
    }
}

// ── Property ──────────────────────────────────────────────────────────

/// A condition every published snapshot must satisfy.
pub trait Property {
    fn name(&self) -> &str;

    /// `Err(message)` when violated.
    fn check(&self, snapshot: &Snapshot) -> Result<(), String>;
}

/// Closure-backed property.
pub struct NamedProperty {
    name: String,
    check_fn: Box<dyn Fn(&Snapshot) -> Result<(), String>>,
}

impl NamedProperty {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&Snapshot) -> Result<(), String> + 'static,
    {
        NamedProperty {
            name: name.to_string(),
            check_fn: Box::new(f),
        }
    }
}

impl Property for NamedProperty {
    fn name(&self) -> &str {
        &self.name
    }
    fn check(&self, snapshot: &Snapshot) -> Result<(), String> {
        (self.check_fn)(snapshot)
    }
}

/// Property over the snapshot invariants matched by `pick`.
fn invariant(name: &str, pick: fn(&InvariantViolation) -> bool) -> NamedProperty {
    NamedProperty::new(name, move |snapshot| {
        match snapshot.check_invariants().into_iter().find(|v| pick(v)) {
            Some(violation) => Err(violation.to_string()),
            None => Ok(()),
        }
    })
}

/// At most one node is `Held`.
pub fn mutual_exclusion() -> NamedProperty {
    invariant("mutual exclusion", |v| {
        matches!(v, InvariantViolation::MultipleHolders(_))
    })
}

/// No node defers its own request.
pub fn no_self_deferral() -> NamedProperty {
    invariant("no self-deferral", |v| {
        matches!(v, InvariantViolation::SelfDeferral(_))
    })
}

/// Reply counts stay within `n - 1`, reaching it exactly when `Held`.
pub fn reply_bound() -> NamedProperty {
    invariant("reply bound", |v| {
        matches!(
            v,
            InvariantViolation::ReplyOverflow { .. } | InvariantViolation::QuorumMismatch { .. }
        )
    })
}

/// The three safety properties.
pub fn safety_properties() -> Vec<Box<dyn Property>> {
    vec![
        Box::new(mutual_exclusion()),
        Box::new(no_self_deferral()),
        Box::new(reply_bound()),
    ]
}

// ── Violation ─────────────────────────────────────────────────────────

/// Name of the liveness check run at the horizon.
pub const LIVENESS: &str = "eventual entry";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub property: String,
    pub branch_id: usize,
    pub seed: u64,
    /// `(choice_label, option_index)` for every choice.
    pub choices: Vec<(String, usize)>,
    /// Tick of the first snapshot that failed.
    pub tick: VirtualTime,
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] branch {} seed {} at {}: {}",
            self.property, self.branch_id, self.seed, self.tick, self.message
        )
    }
}

// ── ExplorationResult ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExplorationResult {
    pub branches_explored: usize,
    /// Cartesian product size before `max_branches` applies.
    pub total_branches: usize,
    /// Simulations run: branches times seeds.
    pub runs: usize,
    pub violations: Vec<Violation>,
}

impl ExplorationResult {
    pub fn is_safe(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }
}

// ── Explorer ──────────────────────────────────────────────────────────

pub struct Explorer {
    base: Scenario,
    choices: Vec<Choice>,
    properties: Vec<Box<dyn Property>>,
    seeds: Range<u64>,
    horizon: u64,
    max_branches: usize,
    check_liveness: bool,
}

impl Explorer {
    /// Explore `base` with its own seed, a 200-tick horizon, and no
    /// properties yet.
    pub fn new(base: Scenario) -> Self {
        let seed = base.seed;
        Explorer {
            base,
            choices: Vec::new(),
            properties: Vec::new(),
            seeds: seed..seed + 1,
            horizon: 200,
            max_branches: 10_000,
            check_liveness: true,
        }
    }

    pub fn add_choice(&mut self, choice: Choice) -> &mut Self {
        self.choices.push(choice);
        self
    }

    pub fn add_property(&mut self, prop: Box<dyn Property>) -> &mut Self {
        self.properties.push(prop);
        self
    }

    /// Add a closure-based property.
    pub fn check<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Snapshot) -> Result<(), String> + 'static,
    {
        self.properties.push(Box::new(NamedProperty::new(name, f)));
        self
    }

    /// Add mutual exclusion, no self-deferral and the reply bound.
    pub fn with_safety_properties(&mut self) -> &mut Self {
        self.properties.extend(safety_properties());
        self
    }

    pub fn set_seeds(&mut self, seeds: Range<u64>) -> &mut Self {
        self.seeds = seeds;
        self
    }

    pub fn set_horizon(&mut self, ticks: u64) -> &mut Self {
        self.horizon = ticks;
        self
    }

    pub fn set_max_branches(&mut self, max: usize) -> &mut Self {
        self.max_branches = max;
        self
    }

    pub fn set_liveness_check(&mut self, enabled: bool) -> &mut Self {
        self.check_liveness = enabled;
        self
    }

    pub fn total_branches(&self) -> usize {
        self.choices.iter().map(|c| c.options.len()).product()
    }

    /// Run every branch under every seed.
    ///
    /// Fails only if a branch builds an invalid scenario, e.g. a choice
    /// naming a node outside the base scenario.
    pub fn explore(&self) -> SimResult<ExplorationResult> {
        let total = self.total_branches();
        let to_explore = total.min(self.max_branches);
        let mut violations = Vec::new();
        let mut runs = 0;

        for branch_id in 0..to_explore {
            let selections = self.decode_branch(branch_id);
            let labels: Vec<(String, usize)> = selections
                .iter()
                .enumerate()
                .map(|(i, &opt)| (self.choices[i].label.clone(), opt))
                .collect();

            for seed in self.seeds.clone() {
                let scenario = self.branch_scenario(&selections, seed);
                let found = self.run_branch(scenario)?;
                runs += 1;
                if !found.is_empty() {
                    debug!(branch_id, seed, violations = found.len(), "branch violated properties");
                }
                violations.extend(found.into_iter().map(|(property, tick, message)| Violation {
                    property,
                    branch_id,
                    seed,
                    choices: labels.clone(),
                    tick,
                    message,
                }));
            }
        }

        info!(
            branches = to_explore,
            total,
            runs,
            violations = violations.len(),
            "exploration finished"
        );
        Ok(ExplorationResult {
            branches_explored: to_explore,
            total_branches: total,
            runs,
            violations,
        })
    }

    fn branch_scenario(&self, selections: &[usize], seed: u64) -> Scenario {
        let mut scenario = self.base.clone();
        scenario.seed = seed;
        for (choice, &option) in self.choices.iter().zip(selections) {
            for &(at, node) in &choice.options[option] {
                scenario
                    .scheduled_requests
                    .entry(node)
                    .or_default()
                    .push(at.ticks());
            }
        }
        scenario
    }

    /// Violations of one run, as `(property, tick, message)`; at most one
    /// per property.
    fn run_branch(&self, scenario: Scenario) -> SimResult<Vec<(String, VirtualTime, String)>> {
        let mut sim = Simulation::new(scenario)?;
        let mut found: Vec<(String, VirtualTime, String)> = Vec::new();

        for _ in 0..self.horizon {
            sim.advance(1)?;
            let snapshot = sim.snapshot();
            for prop in &self.properties {
                if found.iter().any(|(name, _, _)| name == prop.name()) {
                    continue;
                }
                if let Err(message) = prop.check(&snapshot) {
                    found.push((prop.name().to_string(), snapshot.tick, message));
                }
            }
        }

        if self.check_liveness {
            let snapshot = sim.snapshot();
            let waiting: Vec<String> = snapshot
                .nodes
                .iter()
                .filter(|n| n.state == MutexState::Wanted)
                .map(|n| n.id.to_string())
                .collect();
            if !waiting.is_empty() {
                found.push((
                    LIVENESS.to_string(),
                    snapshot.tick,
                    format!("still waiting: {}", waiting.join(", ")),
                ));
            }
        }
        Ok(found)
    }

    /// Decode a branch ID into per-choice option indices.
    fn decode_branch(&self, mut branch_id: usize) -> Vec<usize> {
        let mut selections = Vec::with_capacity(self.choices.len());
        for choice in &self.choices {
            let n = choice.options.len();
            selections.push(branch_id % n);
            branch_id /= n;
        }
        selections
    }
}
