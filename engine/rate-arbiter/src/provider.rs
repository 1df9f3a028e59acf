//! Rate provider trait and the in-memory implementation

use crate::error::ProviderError;
use crate::types::{ClockId, Rate};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// The clock framework as seen by the arbiter.
///
/// Implementations own the clock tree, its topology and the hardware. The arbiter never walks the
/// tree itself; it only asks for bounds, rounds, and applies.
pub trait RateProvider: Send + Sync {
    /// Statically configured `(min, max)` bounds of `clock`
    fn bounds(&self, clock: ClockId) -> Result<(Rate, Rate), ProviderError>;

    /// Hardware-reflected current rate of `clock`
    fn current_rate(&self, clock: ClockId) -> Result<Rate, ProviderError>;

    /// Nearest achievable rate to `target` within `[floor, ceiling]`
    fn compute_nearest(
        &self,
        clock: ClockId,
        floor: Rate,
        ceiling: Rate,
        target: Rate,
    ) -> Result<Rate, ProviderError>;

    /// Program `clock` (and propagate through the tree). May silently round.
    fn apply_rate(&self, clock: ClockId, rate: Rate) -> Result<(), ProviderError>;

    /// Whether the provider knows `clock` at all
    fn contains(&self, clock: ClockId) -> bool {
        self.bounds(clock).is_ok()
    }
}

#[derive(Debug, Clone)]
struct SimClock {
    rate: Rate,
    min: Rate,
    max: Rate,
    step: Rate,
}

impl SimClock {
    /// Smallest multiple of `step` at or above `rate`, or the largest at or below it when rounding
    /// up would overflow.
    fn round_up(&self, rate: Rate) -> Rate {
        rate.checked_next_multiple_of(self.step).unwrap_or(rate - rate % self.step)
    }

    fn round_down(&self, rate: Rate) -> Rate {
        rate - rate % self.step
    }
}

#[derive(Default)]
struct SimulatedState {
    clocks: BTreeMap<ClockId, SimClock>,
    next_id: u32,
    failing: HashSet<ClockId>,
    nearest_targets: Vec<(ClockId, Rate)>,
    applied: Vec<(ClockId, Rate)>,
}

/// In-memory clocks with step-granular rates.
///
/// Rates round up to a multiple of the clock's step and are clamped to its bounds. Cloning
/// yields another handle to the same clocks, so a test can keep one handle while the tree owns
/// the other.
#[derive(Clone, Default)]
pub struct SimulatedClocks {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedClocks {
    /// Create an empty set of clocks
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clock running at `rate`, clamped to `[min, max]`
    pub fn add_clock(&self, rate: Rate, min: Rate, max: Rate, step: Rate) -> ClockId {
        assert!(step > 0, "clock step must be > 0");
        assert!(min <= max, "clock bounds must satisfy min <= max");

        let mut state = self.state.lock();
        let id = ClockId(state.next_id);
        state.next_id += 1;
        state.clocks.insert(id, SimClock { rate: rate.clamp(min, max), min, max, step });

        tracing::debug!("Simulated clock {} added at {} Hz in [{}, {}]", id, rate, min, max);
        id
    }

    /// Change the configured bounds of a clock. The current rate is left untouched.
    pub fn set_bounds(&self, clock: ClockId, min: Rate, max: Rate) -> Result<(), ProviderError> {
        if min > max {
            return Err(ProviderError::NoAchievableRate { floor: min, ceiling: max });
        }
        let mut state = self.state.lock();
        let sim = state.clocks.get_mut(&clock).ok_or(ProviderError::UnknownClock(clock))?;
        sim.min = min;
        sim.max = max;
        Ok(())
    }

    /// Make every subsequent `apply_rate` on `clock` fail (or succeed again)
    pub fn set_failing(&self, clock: ClockId, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing.insert(clock);
        } else {
            state.failing.remove(&clock);
        }
    }

    /// Targets passed to `compute_nearest` for `clock`, oldest first
    pub fn nearest_targets(&self, clock: ClockId) -> Vec<Rate> {
        let state = self.state.lock();
        state.nearest_targets.iter().filter(|(c, _)| *c == clock).map(|(_, r)| *r).collect()
    }

    /// Rates passed to `apply_rate` for `clock`, oldest first
    pub fn applied_rates(&self, clock: ClockId) -> Vec<Rate> {
        let state = self.state.lock();
        state.applied.iter().filter(|(c, _)| *c == clock).map(|(_, r)| *r).collect()
    }

    /// Forget recorded targets and applied rates
    pub fn clear_history(&self) {
        let mut state = self.state.lock();
        state.nearest_targets.clear();
        state.applied.clear();
    }
}

impl RateProvider for SimulatedClocks {
    fn bounds(&self, clock: ClockId) -> Result<(Rate, Rate), ProviderError> {
        let state = self.state.lock();
        let sim = state.clocks.get(&clock).ok_or(ProviderError::UnknownClock(clock))?;
        Ok((sim.min, sim.max))
    }

    fn current_rate(&self, clock: ClockId) -> Result<Rate, ProviderError> {
        let state = self.state.lock();
        let sim = state.clocks.get(&clock).ok_or(ProviderError::UnknownClock(clock))?;
        Ok(sim.rate)
    }

    fn compute_nearest(
        &self,
        clock: ClockId,
        floor: Rate,
        ceiling: Rate,
        target: Rate,
    ) -> Result<Rate, ProviderError> {
        let mut state = self.state.lock();
        state.nearest_targets.push((clock, target));
        let sim = state.clocks.get(&clock).ok_or(ProviderError::UnknownClock(clock))?;

        if floor > ceiling {
            return Err(ProviderError::NoAchievableRate { floor, ceiling });
        }

        let mut rate = sim.round_up(target.clamp(floor, ceiling));
        if rate > ceiling {
            rate = sim.round_down(ceiling);
        }
        if rate < floor {
            return Err(ProviderError::NoAchievableRate { floor, ceiling });
        }
        Ok(rate)
    }

    fn apply_rate(&self, clock: ClockId, rate: Rate) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        if state.failing.contains(&clock) {
            return Err(ProviderError::Rejected { rate });
        }
        state.applied.push((clock, rate));

        let sim = state.clocks.get_mut(&clock).ok_or(ProviderError::UnknownClock(clock))?;
        let mut programmed = sim.round_up(rate.clamp(sim.min, sim.max));
        if programmed > sim.max {
            programmed = sim.round_down(sim.max);
        }
        sim.rate = programmed;
        Ok(())
    }
}
