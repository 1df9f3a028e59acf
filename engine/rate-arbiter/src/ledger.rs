//! Per-clock ledger of live rate requests

use crate::types::{Rate, RequestHandle};

/// Live requests for one clock.
///
/// Holds non-owning membership entries; the request records themselves live in the tree's
/// [`RequestArena`](crate::arena::RequestArena). Only ever touched under the tree lock.
#[derive(Debug, Default, Clone)]
pub struct RequestLedger {
    members: Vec<(RequestHandle, Rate)>,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self { members: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn insert(&mut self, handle: RequestHandle, rate: Rate) {
        debug_assert!(!self.contains(handle), "{handle:?} already in ledger");
        self.members.push((handle, rate));
    }

    /// Removes `handle` and returns its rate. Release order is free, so this does not preserve
    /// insertion order.
    pub fn remove(&mut self, handle: RequestHandle) -> Option<Rate> {
        let pos = self.members.iter().position(|(h, _)| *h == handle)?;
        Some(self.members.swap_remove(pos).1)
    }

    pub fn contains(&self, handle: RequestHandle) -> bool {
        self.members.iter().any(|(h, _)| *h == handle)
    }

    /// Highest live demand, `None` when the ledger is empty.
    pub fn max_rate(&self) -> Option<Rate> {
        self.members.iter().map(|(_, rate)| *rate).max()
    }

    /// Aggregate floor: the highest live demand, never below `min_bound`.
    pub fn floor(&self, min_bound: Rate) -> Rate {
        self.max_rate().map_or(min_bound, |rate| rate.max(min_bound))
    }
}
