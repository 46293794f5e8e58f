//! Deterministic event scheduler.
//!
//! A `BinaryHeap` with reversed `Ord` on `Event` acts as a min-heap keyed
//! by `(fire_at, id)`. The scheduler also owns the simulated clock: time
//! moves only through [`Scheduler::advance_to_next`] and
//! [`Scheduler::advance_by`].

use std::collections::BinaryHeap;

use tracing::trace;

use crate::error::{SimError, SimResult};
use crate::event::{Event, EventId, EventIdGen, EventPayload};
use crate::time::VirtualTime;

/// Receives fired events.
///
/// The handler gets the scheduler back so it can enqueue follow-up
/// events (replies, hold timeouts) from inside the current tick.
pub trait EventHandler {
    fn handle(&mut self, scheduler: &mut Scheduler, event: Event) -> SimResult<()>;
}

/// A handler backed by a closure, handy in tests.
impl<F> EventHandler for F
where
    F: FnMut(&mut Scheduler, Event) -> SimResult<()>,
{
    fn handle(&mut self, scheduler: &mut Scheduler, event: Event) -> SimResult<()> {
        (self)(scheduler, event)
    }
}

/// What one [`Scheduler::advance_by`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AdvanceReport {
    pub from: VirtualTime,
    pub to: VirtualTime,
    /// Events fired, across all ticks.
    pub fired: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Event>,
    id_gen: EventIdGen,
    now: VirtualTime,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            id_gen: EventIdGen::new(),
            now: VirtualTime::ZERO,
        }
    }

    /// The current simulated tick.
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Enqueue `payload` to fire at `at`. O(log n).
    ///
    /// Scheduling at the current tick is allowed; the event fires before
    /// time moves on.
    pub fn schedule(&mut self, at: VirtualTime, payload: EventPayload) -> SimResult<EventId> {
        if at < self.now {
            return Err(SimError::NonCausalEvent {
                requested: at.ticks(),
                current: self.now.ticks(),
            });
        }
        let id = self.id_gen.next_id();
        self.queue.push(Event::new(id, at, payload));
        Ok(id)
    }

    /// Tick of the earliest pending event.
    pub fn next_fire_time(&self) -> Option<VirtualTime> {
        self.queue.peek().map(|e| e.fire_at)
    }

    /// Pop every event sharing the earliest `fire_at`, in id order, and
    /// move the clock to that tick.
    ///
    /// Returns an empty batch when nothing is pending.
    pub fn advance_to_next(&mut self) -> Vec<Event> {
        let Some(tick) = self.next_fire_time() else {
            return Vec::new();
        };
        let mut batch = Vec::new();
        while self.queue.peek().is_some_and(|e| e.fire_at == tick) {
            if let Some(event) = self.queue.pop() {
                batch.push(event);
            }
        }
        self.now = tick;
        trace!(tick = tick.ticks(), events = batch.len(), "batch due");
        batch
    }

    /// Let `ticks` of simulated time pass, firing everything due on the
    /// way.
    ///
    /// Events the handler schedules inside the window (including at the
    /// current tick) fire in this same call. Afterwards the clock reads
    /// `now + ticks` whether or not anything fired.
    ///
    /// A handler error stops the advance where it is; the clock stays at
    /// the tick of the failing batch.
    pub fn advance_by(
        &mut self,
        ticks: u64,
        handler: &mut dyn EventHandler,
    ) -> SimResult<AdvanceReport> {
        let from = self.now;
        let target = from.plus(ticks);
        let mut fired = 0;

        while self.next_fire_time().is_some_and(|at| at <= target) {
            for event in self.advance_to_next() {
                handler.handle(self, event)?;
                fired += 1;
            }
        }
        self.now = target;

        Ok(AdvanceReport {
            from,
            to: target,
            fired,
        })
    }

    /// Drop a pending event. Returns whether it was still queued.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|e| e.id != id);
        self.queue.len() < before
    }

    /// Pending events in firing order, without removing them.
    pub fn pending(&self) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.queue.iter().collect();
        // Reverse of the heap order: earliest first.
        events.sort_by(|a, b| b.cmp(a));
        events
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
