//! `MutexNode` — the Ricart–Agrawala state machine of one process.

use std::collections::BTreeSet;

use crate::clock::LamportClock;
use crate::error::SimResult;
use crate::message::{Message, MessageKind, RequestStamp};
use crate::time::VirtualTime;

use super::effect::{NodeEffect, ProtocolInconsistency, RejectReason};
use super::id::NodeId;
use super::state::{MutexState, Phase};

/// One simulated process.
///
/// The node owns its clock, its mutex phase and its deferred-reply set.
/// Every method returns the [`NodeEffect`]s the controller must carry
/// out; the node itself has no access to the network or to its peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutexNode {
    id: NodeId,
    total_nodes: usize,
    clock: LamportClock,
    phase: Phase,
    deferred: BTreeSet<NodeId>,
}

impl MutexNode {
    /// A fresh `Released` node in a system of `total_nodes` processes.
    pub fn new(id: NodeId, total_nodes: usize) -> Self {
        MutexNode {
            id,
            total_nodes,
            clock: LamportClock::new(),
            phase: Phase::Released,
            deferred: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> MutexState {
        self.phase.state()
    }

    pub fn clock(&self) -> u64 {
        self.clock.value()
    }

    /// Stamp of the outstanding request while `Wanted` or `Held`.
    pub fn request_stamp(&self) -> Option<RequestStamp> {
        self.phase.stamp()
    }

    /// Peers owed a REPLY once this node releases.
    pub fn pending_replies(&self) -> &BTreeSet<NodeId> {
        &self.deferred
    }

    /// REPLYs collected in the current request cycle.
    pub fn reply_count(&self) -> usize {
        match &self.phase {
            Phase::Released => 0,
            Phase::Wanted { awaiting, .. } => self.quorum() - awaiting.len(),
            Phase::Held { .. } => self.quorum(),
        }
    }

    /// Number of REPLYs needed to enter: everyone but ourselves.
    pub fn quorum(&self) -> usize {
        self.total_nodes - 1
    }

    fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        NodeId::range(self.total_nodes).filter(move |p| *p != self.id)
    }

    // ── Commands ──────────────────────────────────────────────────

    /// `Released → Wanted`: tick the clock and broadcast a REQUEST.
    pub fn request(&mut self, now: VirtualTime) -> SimResult<Vec<NodeEffect>> {
        match self.phase {
            Phase::Released => {}
            Phase::Wanted { .. } => {
                return Ok(vec![NodeEffect::Rejected(RejectReason::AlreadyWanted)])
            }
            Phase::Held { .. } => {
                return Ok(vec![NodeEffect::Rejected(RejectReason::AlreadyHeld)])
            }
        }

        let stamp = RequestStamp::new(self.clock.tick_local(), self.id);
        let mut effects = vec![NodeEffect::Requested { stamp }];
        for peer in self.peers() {
            effects.push(NodeEffect::Send(Message::new(
                MessageKind::Request,
                self.id,
                peer,
                stamp.timestamp,
                now,
            )?));
        }
        self.phase = Phase::Wanted {
            stamp,
            awaiting: self.peers().collect(),
        };
        Ok(effects)
    }

    /// `Held → Released`: answer everyone we deferred.
    pub fn release(&mut self, now: VirtualTime) -> SimResult<Vec<NodeEffect>> {
        if !matches!(self.phase, Phase::Held { .. }) {
            return Ok(vec![NodeEffect::Rejected(RejectReason::NotHeld(
                self.state(),
            ))]);
        }

        let replied: Vec<NodeId> = std::mem::take(&mut self.deferred).into_iter().collect();
        let mut effects = Vec::with_capacity(replied.len() + 1);
        if !replied.is_empty() {
            // One clock tick covers the whole batch of deferred replies.
            let ts = self.clock.tick_local();
            for requester in &replied {
                effects.push(NodeEffect::Send(Message::new(
                    MessageKind::Reply,
                    self.id,
                    *requester,
                    ts,
                    now,
                )?));
            }
        }
        self.phase = Phase::Released;
        effects.insert(0, NodeEffect::Released { replied });
        Ok(effects)
    }

    // ── Message handling ──────────────────────────────────────────

    /// Deliver a message addressed to this node.
    ///
    /// The clock observes the message timestamp before any arbitration.
    pub fn on_message(&mut self, msg: &Message, now: VirtualTime) -> SimResult<Vec<NodeEffect>> {
        self.clock.observe(msg.timestamp());
        match msg.kind() {
            MessageKind::Request => self.on_request(msg.stamp(), now),
            MessageKind::Reply => Ok(self.on_reply(msg.from())),
        }
    }

    fn on_request(&mut self, theirs: RequestStamp, now: VirtualTime) -> SimResult<Vec<NodeEffect>> {
        let requester = theirs.node;
        let grant = match &self.phase {
            Phase::Released => true,
            Phase::Wanted { stamp, .. } => theirs.precedes(stamp),
            Phase::Held { .. } => false,
        };

        if grant {
            let ts = self.clock.tick_local();
            let reply = Message::new(MessageKind::Reply, self.id, requester, ts, now)?;
            return Ok(vec![NodeEffect::Send(reply)]);
        }

        if self.deferred.insert(requester) {
            Ok(vec![NodeEffect::Deferred { requester }])
        } else {
            Ok(vec![NodeEffect::Inconsistency(
                ProtocolInconsistency::DuplicateRequest {
                    node: self.id,
                    from: requester,
                },
            )])
        }
    }

    fn on_reply(&mut self, from: NodeId) -> Vec<NodeEffect> {
        let state = self.phase.state();
        let Phase::Wanted { stamp, awaiting } = &mut self.phase else {
            return vec![NodeEffect::Inconsistency(
                ProtocolInconsistency::ReplyWhileNotWanted {
                    node: self.id,
                    from,
                    state,
                },
            )];
        };

        if !awaiting.remove(&from) {
            return vec![NodeEffect::Inconsistency(
                ProtocolInconsistency::DuplicateReply { node: self.id, from },
            )];
        }

        if awaiting.is_empty() {
            let stamp = *stamp;
            self.phase = Phase::Held { stamp };
            vec![NodeEffect::Entered]
        } else {
            Vec::new()
        }
    }
}

impl std::fmt::Display for MutexNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{} C:{} R:{}/{} D:{}]",
            self.id,
            self.state().letter(),
            self.clock(),
            self.reply_count(),
            self.quorum(),
            self.deferred.len()
        )
    }
}
