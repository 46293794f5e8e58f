//! Simulation controller.
//!
//! [`Simulation`] is the only entry point observers talk to. It splits
//! into two halves so the scheduler can call back into the rest of the
//! engine while it is being advanced:
//!
//! ```text
//!  Simulation
//!  ├── scheduler: Scheduler     (clock + event queue)
//!  └── engine:    Engine        (nodes, network, log; an EventHandler)
//! ```
//!
//! Every command validates before it mutates, and every successful
//! command or advance publishes a fresh [`Snapshot`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::error::{SimError, SimResult};
use crate::event::{Event, EventId, EventPayload, LocalCommand};
use crate::eventlog::{EventLog, LogKind};
use crate::message::Message;
use crate::network::{DelayPolicy, Network};
use crate::node::{MutexNode, NodeEffect, NodeId, RejectReason};
use crate::scenario::{validated, Scenario};
use crate::scheduler::{AdvanceReport, EventHandler, Scheduler};
use crate::snapshot::{InFlightMessage, NodeSnapshot, ScheduledCommand, Snapshot};
use crate::time::VirtualTime;

#[cfg(test)]
mod tests;

/// Result of a `request` or `release` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandOutcome {
    Applied,
    /// The node was not in a state that accepts the command. Nothing
    /// changed.
    Rejected(RejectReason),
}

impl CommandOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CommandOutcome::Applied)
    }
}

// ── Engine ────────────────────────────────────────────────────────────

/// Everything except the scheduler.
#[derive(Debug, Clone)]
struct Engine {
    scenario: Scenario,
    nodes: Vec<MutexNode>,
    network: Network,
    log: EventLog,
    /// Pending automatic release per holding node. An explicit release
    /// pulls its timer out of the scheduler.
    hold_timers: BTreeMap<NodeId, EventId>,
}

/// Build a fresh scheduler and engine from a validated scenario.
fn start(scenario: Scenario) -> SimResult<(Scheduler, Engine)> {
    let mut scheduler = Scheduler::new();
    for (at, node) in scenario.request_plan() {
        scheduler.schedule(at, EventPayload::Local(LocalCommand::Request(node)))?;
    }

    let mut log = EventLog::new();
    log.record(
        VirtualTime::ZERO,
        LogKind::Init {
            node_count: scenario.node_count,
            delay: scenario.delay,
            seed: scenario.seed,
        },
    );

    let engine = Engine {
        nodes: NodeId::range(scenario.node_count)
            .map(|id| MutexNode::new(id, scenario.node_count))
            .collect(),
        network: Network::new(scenario.network_config()),
        log,
        hold_timers: BTreeMap::new(),
        scenario,
    };
    Ok((scheduler, engine))
}

impl Engine {
    fn node_mut(&mut self, id: NodeId) -> SimResult<&mut MutexNode> {
        self.nodes
            .get_mut(id.index())
            .ok_or(SimError::InvalidNode(id))
    }

    fn command(
        &mut self,
        scheduler: &mut Scheduler,
        command: LocalCommand,
    ) -> SimResult<CommandOutcome> {
        let now = scheduler.now();
        let id = command.node();
        let node = self.node_mut(id)?;
        let effects = match command {
            LocalCommand::Request(_) => node.request(now)?,
            LocalCommand::Release(_) => node.release(now)?,
        };
        let outcome = self.apply(scheduler, id, effects)?;
        if outcome.is_applied() && matches!(command, LocalCommand::Release(_)) {
            if let Some(timer) = self.hold_timers.remove(&id) {
                if scheduler.cancel(timer) {
                    trace!(node = %id, %timer, "hold timer cancelled");
                }
            }
        }
        Ok(outcome)
    }

    fn deliver(&mut self, scheduler: &mut Scheduler, message: Message) -> SimResult<()> {
        let now = scheduler.now();
        debug!(%message, tick = now.ticks(), "deliver");
        self.log.record(
            now,
            LogKind::MessageDelivered {
                kind: message.kind(),
                from: message.from(),
                to: message.to(),
                timestamp: message.timestamp(),
            },
        );
        let to = message.to();
        let effects = self.node_mut(to)?.on_message(&message, now)?;
        self.apply(scheduler, to, effects)?;
        Ok(())
    }

    /// Carry out a node's effects: transmit its messages and record its
    /// transitions.
    fn apply(
        &mut self,
        scheduler: &mut Scheduler,
        node: NodeId,
        effects: Vec<NodeEffect>,
    ) -> SimResult<CommandOutcome> {
        let now = scheduler.now();
        let tick = now.ticks();
        let mut outcome = CommandOutcome::Applied;

        for effect in effects {
            let kind = match effect {
                NodeEffect::Send(message) => {
                    let due = self.network.transmit(&message, now);
                    debug!(%message, tick, due = due.ticks(), "send");
                    let entry = LogKind::MessageSent {
                        kind: message.kind(),
                        from: message.from(),
                        to: message.to(),
                        timestamp: message.timestamp(),
                        delivery_tick: due,
                    };
                    scheduler.schedule(due, EventPayload::Deliver(message))?;
                    entry
                }
                NodeEffect::Requested { stamp } => {
                    info!(%node, tick, %stamp, "request issued");
                    LogKind::RequestIssued {
                        node,
                        timestamp: stamp.timestamp,
                    }
                }
                NodeEffect::Deferred { requester } => {
                    debug!(%node, %requester, tick, "reply deferred");
                    LogKind::Deferred { node, requester }
                }
                NodeEffect::Entered => {
                    info!(%node, tick, "entered critical section");
                    if let Some(hold) = self.scenario.hold_duration(node) {
                        let timer = scheduler.schedule(
                            now.plus(hold),
                            EventPayload::Local(LocalCommand::Release(node)),
                        )?;
                        self.hold_timers.insert(node, timer);
                    }
                    LogKind::Entered { node }
                }
                NodeEffect::Released { replied } => {
                    info!(%node, tick, deferred = replied.len(), "released");
                    LogKind::Released { node, replied }
                }
                NodeEffect::Rejected(reason) => {
                    info!(%node, tick, %reason, "command rejected");
                    outcome = CommandOutcome::Rejected(reason);
                    match reason {
                        RejectReason::NotHeld(_) => LogKind::ReleaseRejected { node, reason },
                        RejectReason::AlreadyWanted | RejectReason::AlreadyHeld => {
                            LogKind::RequestRejected { node, reason }
                        }
                    }
                }
                NodeEffect::Inconsistency(detail) => {
                    warn!(tick, %detail, "protocol inconsistency");
                    LogKind::Inconsistency { detail }
                }
            };
            self.log.record(now, kind);
        }
        Ok(outcome)
    }
}

impl EventHandler for Engine {
    fn handle(&mut self, scheduler: &mut Scheduler, event: Event) -> SimResult<()> {
        match event.payload {
            EventPayload::Deliver(message) => self.deliver(scheduler, message),
            EventPayload::Local(command) => self.command(scheduler, command).map(|_| ()),
        }
    }
}

// ── Simulation ────────────────────────────────────────────────────────

/// A running Ricart–Agrawala simulation.
///
/// ```rust
/// use ricart_sim::{DelayPolicy, NodeId, Scenario, Simulation};
///
/// let mut sim = Simulation::new(Scenario::new(3, DelayPolicy::fixed(2))).unwrap();
/// sim.request(NodeId::new(0)).unwrap();
/// sim.advance(4).unwrap();
/// assert_eq!(sim.snapshot().holders(), vec![NodeId::new(0)]);
/// ```
#[derive(Debug, Clone)]
pub struct Simulation {
    scheduler: Scheduler,
    engine: Engine,
    terminated: bool,
    published: Arc<Snapshot>,
}

impl Simulation {
    pub fn new(scenario: Scenario) -> SimResult<Self> {
        let (scheduler, engine) = start(validated(scenario)?)?;
        let mut sim = Simulation {
            scheduler,
            engine,
            terminated: false,
            published: Arc::new(empty_snapshot()),
        };
        sim.publish();
        info!(nodes = sim.node_count(), "simulation ready");
        Ok(sim)
    }

    // ── Configuration ─────────────────────────────────────────

    /// Rebuild with `node_count` nodes and one delay policy everywhere.
    ///
    /// The seed carries over. Per-edge delays, hold durations and
    /// scheduled requests are dropped. On error nothing changes.
    pub fn configure(&mut self, node_count: usize, delay: DelayPolicy) -> SimResult<()> {
        let mut scenario = Scenario::new(node_count, delay);
        scenario.seed = self.engine.scenario.seed;
        self.load_scenario(scenario)
    }

    /// Replace the whole scenario and restart from tick 0.
    pub fn load_scenario(&mut self, scenario: Scenario) -> SimResult<()> {
        let (scheduler, engine) = start(validated(scenario)?)?;
        self.scheduler = scheduler;
        self.engine = engine;
        self.terminated = false;
        self.publish();
        info!(
            nodes = self.node_count(),
            delay = %self.engine.scenario.delay,
            seed = self.engine.scenario.seed,
            "configured"
        );
        Ok(())
    }

    /// Restart the current scenario from tick 0.
    ///
    /// The RNG is re-seeded and the log restarts, so a reset followed by
    /// the same commands reproduces the same run.
    pub fn reset(&mut self) -> SimResult<()> {
        let (scheduler, engine) = start(self.engine.scenario.clone())?;
        self.scheduler = scheduler;
        self.engine = engine;
        self.engine.log.record(VirtualTime::ZERO, LogKind::Reset);
        self.terminated = false;
        self.publish();
        info!("reset");
        Ok(())
    }

    /// Stop accepting `request`, `release`, `advance` and `step`.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.engine.log.record(self.now(), LogKind::Terminated);
        self.publish();
        info!(tick = self.now().ticks(), "terminated");
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn request(&mut self, node: NodeId) -> SimResult<CommandOutcome> {
        self.run_command(LocalCommand::Request(node))
    }

    pub fn release(&mut self, node: NodeId) -> SimResult<CommandOutcome> {
        self.run_command(LocalCommand::Release(node))
    }

    fn run_command(&mut self, command: LocalCommand) -> SimResult<CommandOutcome> {
        self.ensure_live()?;
        self.check_node(command.node())?;
        let outcome = self.engine.command(&mut self.scheduler, command)?;
        self.publish();
        Ok(outcome)
    }

    /// Let `ticks` of simulated time pass, delivering everything due.
    ///
    /// `advance(0)` changes nothing.
    pub fn advance(&mut self, ticks: u64) -> SimResult<AdvanceReport> {
        self.ensure_live()?;
        if ticks == 0 {
            let now = self.now();
            return Ok(AdvanceReport {
                from: now,
                to: now,
                fired: 0,
            });
        }
        self.advance_scheduler(ticks)
    }

    /// Jump to the next tick that has events and fire all of them.
    ///
    /// Returns `None` when nothing is scheduled.
    pub fn step(&mut self) -> SimResult<Option<AdvanceReport>> {
        self.ensure_live()?;
        let Some(next) = self.scheduler.next_fire_time() else {
            return Ok(None);
        };
        let ticks = next.since(self.now()).unwrap_or(0);
        self.advance_scheduler(ticks).map(Some)
    }

    fn advance_scheduler(&mut self, ticks: u64) -> SimResult<AdvanceReport> {
        let report = self.scheduler.advance_by(ticks, &mut self.engine)?;
        self.engine.log.record(
            report.to,
            LogKind::Advanced {
                from: report.from,
                to: report.to,
                fired: report.fired,
            },
        );
        self.publish();
        trace!(from = report.from.ticks(), to = report.to.ticks(), fired = report.fired, "advanced");
        Ok(report)
    }

    // ── Observation ───────────────────────────────────────────

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.published)
    }

    pub fn now(&self) -> VirtualTime {
        self.scheduler.now()
    }

    pub fn node_count(&self) -> usize {
        self.engine.nodes.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Whether any message or scheduled command is still pending.
    pub fn is_quiescent(&self) -> bool {
        self.scheduler.is_empty()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.engine.log
    }

    /// The scenario `reset` would rebuild.
    pub fn export_scenario(&self) -> &Scenario {
        &self.engine.scenario
    }

    pub fn messages_sent(&self) -> u64 {
        self.engine.network.transmitted()
    }

    // ── Internals ─────────────────────────────────────────────

    fn ensure_live(&self) -> SimResult<()> {
        if self.terminated {
            Err(SimError::Terminated)
        } else {
            Ok(())
        }
    }

    fn check_node(&self, node: NodeId) -> SimResult<()> {
        if node.index() < self.node_count() {
            Ok(())
        } else {
            Err(SimError::InvalidNode(node))
        }
    }

    fn publish(&mut self) {
        let mut in_flight = Vec::new();
        let mut scheduled = Vec::new();
        for event in self.scheduler.pending() {
            match &event.payload {
                EventPayload::Deliver(message) => in_flight.push(InFlightMessage {
                    from: message.from(),
                    to: message.to(),
                    kind: message.kind(),
                    timestamp: message.timestamp(),
                    sent_at: message.sent_at(),
                    delivery_tick: event.fire_at,
                }),
                EventPayload::Local(command) => scheduled.push(ScheduledCommand {
                    at: event.fire_at,
                    command: *command,
                }),
            }
        }

        self.published = Arc::new(Snapshot {
            tick: self.now(),
            terminated: self.terminated,
            nodes: self.engine.nodes.iter().map(NodeSnapshot::from).collect(),
            in_flight,
            scheduled,
        });
    }
}

fn empty_snapshot() -> Snapshot {
    Snapshot {
        tick: VirtualTime::ZERO,
        terminated: false,
        nodes: Vec::new(),
        in_flight: Vec::new(),
        scheduled: Vec::new(),
    }
}
