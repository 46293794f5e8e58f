//! Simulated time.
//!
//! Ticks are plain integers with no tie to `std::time`. Time moves only
//! when the scheduler is advanced by an external command.

/// A point on the simulated timeline, measured in whole ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// Tick zero, where every run starts.
    pub const ZERO: VirtualTime = VirtualTime(0);

    #[inline]
    pub fn new(ticks: u64) -> Self {
        VirtualTime(ticks)
    }

    #[inline]
    pub fn ticks(self) -> u64 {
        self.0
    }

    /// The tick `delay` ticks after `self`.
    ///
    /// Saturates at `u64::MAX`; runs never get anywhere near it.
    #[inline]
    pub fn plus(self, delay: u64) -> VirtualTime {
        VirtualTime(self.0.saturating_add(delay))
    }

    /// Ticks elapsed from `earlier` to `self`, or `None` if `earlier` is later.
    #[inline]
    pub fn since(self, earlier: VirtualTime) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={}", self.0)
    }
}
