//! End-to-end tests driving `Simulation` through its public commands.

use std::sync::Arc;

use tracing_test::traced_test;

use super::*;
use crate::error::ConfigError;
use crate::eventlog::LogEntry;
use crate::message::MessageKind;
use crate::node::MutexState;
use crate::scenario::Scenario;

fn n(i: u64) -> NodeId {
    NodeId::new(i)
}

fn fixed(nodes: usize, delay: u64) -> Simulation {
    Simulation::new(Scenario::new(nodes, DelayPolicy::fixed(delay))).unwrap()
}

fn state(sim: &Simulation, id: u64) -> MutexState {
    sim.snapshot().node(n(id)).unwrap().state
}

/// A randomised scenario where every node requests a few times and
/// holds for two ticks.
fn contended(seed: u64) -> Scenario {
    let mut scenario = Scenario::new(4, DelayPolicy::uniform(1, 5));
    scenario.seed = seed;
    for node in NodeId::range(4) {
        scenario.hold_durations.insert(node, 2);
        scenario.scheduled_requests.insert(node, vec![0, 3, 10]);
    }
    scenario
}

/// Advance one tick at a time until nothing is pending, checking the
/// safety invariants on every published snapshot.
fn run_to_quiescence(sim: &mut Simulation, max_ticks: u64) -> Vec<Arc<Snapshot>> {
    let mut snapshots = vec![sim.snapshot()];
    for _ in 0..max_ticks {
        if sim.is_quiescent() {
            break;
        }
        sim.advance(1).unwrap();
        let snap = sim.snapshot();
        let violations = snap.check_invariants();
        assert!(violations.is_empty(), "{}: {:?}", snap, violations);
        snapshots.push(snap);
    }
    assert!(sim.is_quiescent(), "still busy after {} ticks", max_ticks);
    snapshots
}

fn count(log: &EventLog, pred: impl Fn(&LogKind) -> bool) -> usize {
    log.entries().iter().filter(|e| pred(&e.kind)).count()
}

// ── Reference trace ───────────────────────────────────────────────────

#[test]
fn test_three_node_reference_trace() {
    let mut sim = fixed(3, 2);

    assert_eq!(sim.request(n(0)).unwrap(), CommandOutcome::Applied);
    sim.advance(1).unwrap();
    assert_eq!(sim.request(n(1)).unwrap(), CommandOutcome::Applied);

    // T=2: N1 and N2 both see N0's request first and reply to it.
    sim.advance(1).unwrap();
    let snap = sim.snapshot();
    assert_eq!(snap.node(n(1)).unwrap().clock, 3);
    assert_eq!(snap.node(n(2)).unwrap().clock, 3);
    let replies: Vec<&InFlightMessage> = snap
        .in_flight
        .iter()
        .filter(|m| m.kind == MessageKind::Reply)
        .collect();
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|m| m.to == n(0) && m.delivery_tick == VirtualTime::new(4)));

    // T=3: N0 defers N1, whose stamp (1, N1) loses to (1, N0).
    sim.advance(1).unwrap();
    let snap = sim.snapshot();
    let a = snap.node(n(0)).unwrap();
    assert_eq!(a.state, MutexState::Wanted);
    assert_eq!(a.clock, 2);
    assert_eq!(a.pending_replies, vec![n(1)]);
    assert_eq!(snap.node(n(2)).unwrap().clock, 5);

    // T=4: both replies land and N0 enters.
    sim.advance(1).unwrap();
    let snap = sim.snapshot();
    let a = snap.node(n(0)).unwrap();
    assert_eq!(a.state, MutexState::Held);
    assert_eq!(a.reply_count, 2);
    assert_eq!(a.clock, 5);
    assert_eq!(snap.holders(), vec![n(0)]);
    assert_eq!(snap.node(n(1)).unwrap().reply_count, 0);

    // Releasing answers N1 with one tick.
    assert_eq!(sim.release(n(0)).unwrap(), CommandOutcome::Applied);
    assert_eq!(sim.snapshot().node(n(0)).unwrap().clock, 6);

    sim.advance(1).unwrap();
    assert_eq!(sim.snapshot().node(n(1)).unwrap().reply_count, 1);
    sim.advance(1).unwrap();
    assert_eq!(state(&sim, 1), MutexState::Held);
    assert!(sim.is_quiescent());
}

// ── Commands ──────────────────────────────────────────────────────────

#[test]
fn test_request_publishes_in_flight_messages() {
    let mut sim = fixed(3, 2);
    sim.request(n(0)).unwrap();

    let snap = sim.snapshot();
    assert_eq!(snap.in_flight.len(), 2);
    assert_eq!(
        snap.in_flight[0],
        InFlightMessage {
            from: n(0),
            to: n(1),
            kind: MessageKind::Request,
            timestamp: 1,
            sent_at: VirtualTime::ZERO,
            delivery_tick: VirtualTime::new(2),
        }
    );
    assert_eq!(snap.node(n(0)).unwrap().request_timestamp, Some(1));
    assert_eq!(sim.messages_sent(), 2);
}

#[test]
fn test_rejected_commands_are_outcomes() {
    let mut sim = fixed(3, 1);
    assert_eq!(
        sim.release(n(1)).unwrap(),
        CommandOutcome::Rejected(RejectReason::NotHeld(MutexState::Released))
    );

    sim.request(n(0)).unwrap();
    let before = sim.snapshot();
    assert_eq!(
        sim.request(n(0)).unwrap(),
        CommandOutcome::Rejected(RejectReason::AlreadyWanted)
    );
    assert_eq!(sim.snapshot().nodes, before.nodes);
    assert_eq!(sim.snapshot().in_flight, before.in_flight);

    let log = sim.event_log();
    assert_eq!(count(log, |k| matches!(k, LogKind::ReleaseRejected { .. })), 1);
    assert_eq!(count(log, |k| matches!(k, LogKind::RequestRejected { .. })), 1);
}

#[test]
fn test_invalid_node_changes_nothing() {
    let mut sim = fixed(3, 1);
    let log_len = sim.event_log().len();

    assert_eq!(sim.request(n(3)), Err(SimError::InvalidNode(n(3))));
    assert_eq!(sim.release(n(9)), Err(SimError::InvalidNode(n(9))));
    let huge = NodeId::new(u64::MAX);
    assert_eq!(sim.request(huge), Err(SimError::InvalidNode(huge)));
    assert_eq!(sim.event_log().len(), log_len);
}

#[test]
fn test_advance_zero_is_noop() {
    let mut sim = fixed(2, 1);
    sim.request(n(0)).unwrap();
    let snap = sim.snapshot();
    let log_len = sim.event_log().len();

    let report = sim.advance(0).unwrap();
    assert_eq!(report.fired, 0);
    assert_eq!(report.from, report.to);
    assert!(Arc::ptr_eq(&snap, &sim.snapshot()));
    assert_eq!(sim.event_log().len(), log_len);
}

#[test]
fn test_step_jumps_to_next_event_tick() {
    let mut sim = fixed(3, 2);
    sim.request(n(0)).unwrap();

    let first = sim.step().unwrap().unwrap();
    assert_eq!(first.to, VirtualTime::new(2));
    assert_eq!(first.fired, 2);

    let second = sim.step().unwrap().unwrap();
    assert_eq!(second.to, VirtualTime::new(4));
    assert_eq!(state(&sim, 0), MutexState::Held);

    assert_eq!(sim.step().unwrap(), None);
    assert_eq!(sim.now(), VirtualTime::new(4));
}

#[test]
fn test_published_snapshots_never_change() {
    let mut sim = fixed(2, 1);
    let before = sim.snapshot();
    sim.request(n(0)).unwrap();
    sim.advance(3).unwrap();

    assert_eq!(before.tick, VirtualTime::ZERO);
    assert_eq!(before.state_letters(), "RR");
    assert_eq!(sim.snapshot().state_letters(), "HR");
}

// ── Configuration, reset, termination ─────────────────────────────────

#[test]
fn test_configure_errors_leave_state_untouched() {
    let mut sim = fixed(3, 1);
    sim.request(n(0)).unwrap();
    let snap = sim.snapshot();

    assert_eq!(
        sim.configure(1, DelayPolicy::fixed(1)),
        Err(SimError::Configuration(ConfigError::TooFewNodes(1)))
    );
    assert_eq!(
        sim.configure(3, DelayPolicy::uniform(4, 2)),
        Err(SimError::Configuration(ConfigError::InvertedDelayRange { min: 4, max: 2 }))
    );
    assert_eq!(
        sim.configure(3, DelayPolicy::fixed(0)),
        Err(SimError::Configuration(ConfigError::ZeroDelay))
    );
    assert!(Arc::ptr_eq(&snap, &sim.snapshot()));
}

#[test]
fn test_configure_rebuilds_and_keeps_seed() {
    let mut scenario = Scenario::new(3, DelayPolicy::fixed(1));
    scenario.seed = 9;
    scenario.hold_durations.insert(n(2), 4);
    let mut sim = Simulation::new(scenario).unwrap();
    sim.request(n(0)).unwrap();
    sim.advance(2).unwrap();

    sim.configure(5, DelayPolicy::uniform(1, 3)).unwrap();
    let snap = sim.snapshot();
    assert_eq!(snap.tick, VirtualTime::ZERO);
    assert_eq!(snap.nodes.len(), 5);
    assert_eq!(snap.nodes_in(MutexState::Released), 5);
    assert_eq!(sim.export_scenario().seed, 9);
    assert!(sim.export_scenario().hold_durations.is_empty());
}

#[test]
fn test_reset_is_idempotent() {
    let mut sim = Simulation::new(contended(3)).unwrap();
    let fresh = sim.snapshot();
    sim.advance(7).unwrap();
    let _ = sim.request(n(0));

    sim.reset().unwrap();
    let once = sim.snapshot();
    let digest = sim.event_log().digest();
    sim.reset().unwrap();

    assert_eq!(*once, *fresh);
    assert_eq!(*sim.snapshot(), *once);
    assert_eq!(sim.event_log().digest(), digest);
}

#[test]
fn test_reset_replays_identically() {
    fn drive(sim: &mut Simulation) -> Vec<Snapshot> {
        let mut out = Vec::new();
        for tick in 0..40 {
            if tick == 5 {
                sim.request(n(1)).unwrap();
            }
            sim.advance(1).unwrap();
            out.push((*sim.snapshot()).clone());
        }
        out
    }

    let mut sim = Simulation::new(contended(11)).unwrap();
    let first = drive(&mut sim);
    sim.reset().unwrap();
    let second = drive(&mut sim);
    assert_eq!(first, second);
}

#[test]
fn test_terminated_rejects_commands() {
    let mut sim = fixed(2, 1);
    sim.terminate();
    sim.terminate();

    assert_eq!(sim.request(n(0)), Err(SimError::Terminated));
    assert_eq!(sim.release(n(0)), Err(SimError::Terminated));
    assert_eq!(sim.advance(1), Err(SimError::Terminated));
    assert_eq!(sim.step(), Err(SimError::Terminated));
    assert!(sim.snapshot().terminated);
    assert_eq!(count(sim.event_log(), |k| *k == LogKind::Terminated), 1);

    sim.reset().unwrap();
    assert!(!sim.is_terminated());
    assert_eq!(sim.request(n(0)).unwrap(), CommandOutcome::Applied);
}

#[test]
fn test_invalid_node_checked_after_termination() {
    let mut sim = fixed(2, 1);
    sim.terminate();
    assert_eq!(sim.request(n(7)), Err(SimError::Terminated));
}

// ── Scenario features ─────────────────────────────────────────────────

#[test]
fn test_hold_duration_releases_automatically() {
    let mut scenario = Scenario::new(2, DelayPolicy::fixed(1));
    scenario.hold_durations.insert(n(0), 3);
    let mut sim = Simulation::new(scenario).unwrap();

    sim.request(n(0)).unwrap();
    sim.advance(2).unwrap();
    assert_eq!(state(&sim, 0), MutexState::Held);
    assert_eq!(
        sim.snapshot().scheduled,
        vec![ScheduledCommand {
            at: VirtualTime::new(5),
            command: LocalCommand::Release(n(0)),
        }]
    );

    sim.advance(2).unwrap();
    assert_eq!(state(&sim, 0), MutexState::Held);
    sim.advance(1).unwrap();
    assert_eq!(state(&sim, 0), MutexState::Released);
}

#[test]
fn test_explicit_release_cancels_hold_timer() {
    let mut scenario = Scenario::new(2, DelayPolicy::fixed(1));
    scenario.hold_durations.insert(n(0), 10);
    let mut sim = Simulation::new(scenario).unwrap();

    sim.request(n(0)).unwrap();
    sim.advance(2).unwrap();
    sim.release(n(0)).unwrap();
    let snap = sim.snapshot();
    assert!(snap.scheduled.is_empty(), "{:?}", snap.scheduled);
    assert!(snap.in_flight.is_empty());
    assert!(sim.is_quiescent());

    sim.request(n(0)).unwrap();
    sim.advance(2).unwrap();
    assert_eq!(state(&sim, 0), MutexState::Held);
    assert_eq!(sim.snapshot().scheduled.len(), 1);

    // Only the second timer is left; it fires at T=14.
    sim.advance(8).unwrap();
    assert_eq!(state(&sim, 0), MutexState::Held);
    sim.advance(2).unwrap();
    assert_eq!(state(&sim, 0), MutexState::Released);
}

#[test]
fn test_scheduled_requests_fire_and_arbitrate() {
    let mut scenario = Scenario::new(3, DelayPolicy::fixed(1));
    scenario.scheduled_requests.insert(n(2), vec![0]);
    scenario.scheduled_requests.insert(n(1), vec![0]);
    let mut sim = Simulation::new(scenario).unwrap();
    assert_eq!(sim.snapshot().scheduled.len(), 2);

    sim.advance(2).unwrap();
    let snap = sim.snapshot();
    assert_eq!(snap.holders(), vec![n(1)]);
    let c = snap.node(n(2)).unwrap();
    assert_eq!(c.state, MutexState::Wanted);
    assert_eq!(c.reply_count, 1);
    assert_eq!(snap.node(n(1)).unwrap().pending_replies, vec![n(2)]);
    assert_eq!(
        count(sim.event_log(), |k| matches!(k, LogKind::RequestIssued { .. })),
        2
    );
}

#[test]
fn test_scheduled_request_while_busy_is_logged() {
    let mut scenario = Scenario::new(2, DelayPolicy::fixed(5));
    scenario.scheduled_requests.insert(n(0), vec![0, 1]);
    let mut sim = Simulation::new(scenario).unwrap();
    sim.advance(2).unwrap();

    let rejected: Vec<&LogEntry> = sim
        .event_log()
        .entries()
        .iter()
        .filter(|e| matches!(e.kind, LogKind::RequestRejected { .. }))
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].tick, VirtualTime::new(1));
    assert_eq!(
        rejected[0].kind,
        LogKind::RequestRejected {
            node: n(0),
            reason: RejectReason::AlreadyWanted
        }
    );
}

#[test]
fn test_load_scenario_validates_first() {
    let mut sim = fixed(3, 1);
    let mut bad = Scenario::new(3, DelayPolicy::fixed(1));
    bad.scheduled_requests.insert(n(5), vec![1]);

    assert!(matches!(
        sim.load_scenario(bad),
        Err(SimError::Configuration(ConfigError::UnknownNode { .. }))
    ));
    assert_eq!(sim.export_scenario(), &Scenario::new(3, DelayPolicy::fixed(1)));
}

// ── Properties ────────────────────────────────────────────────────────

#[test]
fn test_safety_and_liveness_under_random_delays() {
    for seed in 0..30 {
        let mut sim = Simulation::new(contended(seed)).unwrap();
        run_to_quiescence(&mut sim, 1_000);

        let log = sim.event_log();
        let issued = count(log, |k| matches!(k, LogKind::RequestIssued { .. }));
        let entered = count(log, |k| matches!(k, LogKind::Entered { .. }));
        let released = count(log, |k| matches!(k, LogKind::Released { .. }));
        assert!(issued >= 4, "seed {}: only {} requests", seed, issued);
        assert_eq!(issued, entered, "seed {}", seed);
        assert_eq!(entered, released, "seed {}", seed);
        assert_eq!(count(log, |k| matches!(k, LogKind::Inconsistency { .. })), 0);

        let snap = sim.snapshot();
        assert_eq!(snap.nodes_in(MutexState::Released), 4);
        assert!(snap.nodes.iter().all(|n| n.pending_replies.is_empty()));
    }
}

#[test]
fn test_same_seed_same_run() {
    let mut a = Simulation::new(contended(5)).unwrap();
    let mut b = Simulation::new(contended(5)).unwrap();
    let run_a = run_to_quiescence(&mut a, 1_000);
    let run_b = run_to_quiescence(&mut b, 1_000);

    assert_eq!(run_a.len(), run_b.len());
    assert!(run_a.iter().zip(&run_b).all(|(x, y)| x == y));
    assert_eq!(a.event_log().digest(), b.event_log().digest());

    let mut c = Simulation::new(contended(6)).unwrap();
    run_to_quiescence(&mut c, 1_000);
    assert_ne!(a.event_log().digest(), c.event_log().digest());
}

#[test]
fn test_exported_scenario_reproduces_run() {
    let mut original = Simulation::new(contended(21)).unwrap();
    let mut copy = Simulation::new(original.export_scenario().clone()).unwrap();
    run_to_quiescence(&mut original, 1_000);
    run_to_quiescence(&mut copy, 1_000);
    assert_eq!(original.event_log().digest(), copy.event_log().digest());
}

// ── Inconsistencies ───────────────────────────────────────────────────

#[traced_test]
#[test]
fn test_stray_reply_is_logged_and_ignored() {
    let mut sim = fixed(3, 1);
    let stray = Message::new(MessageKind::Reply, n(1), n(0), 5, VirtualTime::ZERO).unwrap();
    sim.scheduler
        .schedule(VirtualTime::new(1), EventPayload::Deliver(stray))
        .unwrap();

    sim.advance(1).unwrap();

    let snap = sim.snapshot();
    assert_eq!(snap.node(n(0)).unwrap().state, MutexState::Released);
    assert_eq!(snap.node(n(0)).unwrap().clock, 6);
    assert_eq!(
        count(sim.event_log(), |k| matches!(k, LogKind::Inconsistency { .. })),
        1
    );
    assert!(logs_contain("protocol inconsistency"));
}

#[traced_test]
#[test]
fn test_entry_is_logged() {
    let mut sim = fixed(2, 1);
    sim.request(n(1)).unwrap();
    sim.advance(2).unwrap();
    assert!(logs_contain("entered critical section"));
}
