//! Lamport logical clock.

/// A per-node Lamport clock.
///
/// Advanced by [`tick_local`](Self::tick_local) before the owning node
/// emits a message, and by [`observe`](Self::observe) whenever a message
/// is delivered to it. The value never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LamportClock {
    value: u64,
}

impl LamportClock {
    pub fn new() -> Self {
        LamportClock { value: 0 }
    }

    /// Current clock value.
    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Local event: increment and return the new value.
    pub fn tick_local(&mut self) -> u64 {
        self.value += 1;
        self.value
    }

    /// Message receipt: `max(current, received) + 1`.
    pub fn observe(&mut self, received: u64) -> u64 {
        self.value = self.value.max(received) + 1;
        self.value
    }
}
