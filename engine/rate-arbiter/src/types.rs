use serde::{Deserialize, Serialize};
use std::fmt;

/// Clock rate in Hz
pub type Rate = u64;

/// Identity of a clock known to the [`RateProvider`](crate::RateProvider).
///
/// Clocks are identified by identity, never by name. The arbiter only accepts ids that were
/// registered with [`ClockTree::register_clock`](crate::ClockTree::register_clock).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClockId(pub u32);

impl fmt::Debug for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clk{}", self.0)
    }
}

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clk{}", self.0)
    }
}

/// Handle to a slot in the request arena.
///
/// The generation changes every time a slot is released, so a stale handle never aliases the
/// request that reused its slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle {
    pub index: u32,
    pub generation: u32,
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R({}#{})", self.index, self.generation)
    }
}
