//! Clock tree lock domain and the rate arbitration operations

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::arena::{RequestArena, RequestRecord};
use crate::config::ArbiterConfig;
use crate::error::{ArbiterError, ProviderError, Result};
use crate::ledger::RequestLedger;
use crate::metrics::{ArbiterMetrics, MetricsCollector};
use crate::provider::RateProvider;
use crate::types::{ClockId, Rate, RequestHandle};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(0);

/// Arbitration state the core adds to each registered clock
#[derive(Debug, Default)]
struct ClockEntry {
    ledger: RequestLedger,
    /// Rate to return to once the ledger empties. `Some` only while the ledger is non-empty.
    restore_rate: Option<Rate>,
}

struct TreeState {
    clocks: HashMap<ClockId, ClockEntry>,
    requests: RequestArena,
}

/// A consumer's live demand that a clock run at or above [`rate`](Self::rate).
///
/// Owned by whoever started it and released exactly once through
/// [`ClockTree::end_request`] or [`TreeGuard::end_request`]. Dropping it without ending it keeps
/// the floor in place for the lifetime of the tree.
#[must_use = "a rate request keeps its floor until it is passed to end_request"]
#[derive(Debug)]
pub struct RateRequest {
    tree_id: u64,
    handle: RequestHandle,
    clock: ClockId,
    rate: Rate,
}

impl RateRequest {
    /// Clock this request targets
    pub fn clock(&self) -> ClockId {
        self.clock
    }

    /// Requested floor
    pub fn rate(&self) -> Rate {
        self.rate
    }
}

/// The clock-tree-wide lock domain.
///
/// Every operation runs under one exclusive lock shared by all clocks of the tree, because a rate
/// change on one clock may propagate to its parents and children. The one-shot methods take and
/// release the lock per call; [`lock`](Self::lock) holds it across several calls.
pub struct ClockTree<P: RateProvider> {
    id: u64,
    provider: P,
    state: Mutex<TreeState>,
    config: ArbiterConfig,
    metrics: Arc<MetricsCollector>,
}

impl<P: RateProvider> ClockTree<P> {
    /// Create a new tree over `provider`
    pub fn new(provider: P, config: ArbiterConfig) -> Result<Self> {
        config.validate().map_err(ArbiterError::config)?;

        tracing::info!(
            "Creating ClockTree with {} request slots and up to {} clocks",
            config.max_requests,
            config.max_clocks
        );

        Ok(Self {
            id: NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed),
            provider,
            state: Mutex::new(TreeState {
                clocks: HashMap::new(),
                requests: RequestArena::with_capacity(config.max_requests as u32),
            }),
            metrics: Arc::new(MetricsCollector::new(config.monitoring.emit_metrics)),
            config,
        })
    }

    /// Acquire the tree lock. The lock is not reentrant: do not call the one-shot methods while
    /// holding the guard.
    pub fn lock(&self) -> TreeGuard<'_, P> {
        TreeGuard { tree: self, state: self.state.lock() }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Get current metrics
    pub fn metrics(&self) -> ArbiterMetrics {
        self.metrics.get_metrics()
    }

    /// See [`TreeGuard::register_clock`]
    pub fn register_clock(&self, clock: ClockId) -> Result<()> {
        self.lock().register_clock(clock)
    }

    /// See [`TreeGuard::unregister_clock`]
    pub fn unregister_clock(&self, clock: ClockId) -> Result<()> {
        self.lock().unregister_clock(clock)
    }

    /// See [`TreeGuard::start_request`]
    pub fn start_request(&self, clock: ClockId, rate: Rate) -> Result<RateRequest> {
        self.lock().start_request(clock, rate)
    }

    /// See [`TreeGuard::end_request`]
    pub fn end_request(&self, request: RateRequest) {
        self.lock().end_request(request)
    }

    /// See [`TreeGuard::set_rate`]
    pub fn set_rate(&self, clock: ClockId, rate: Rate) -> Result<()> {
        self.lock().set_rate(clock, rate)
    }

    /// See [`TreeGuard::round_rate`]
    pub fn round_rate(&self, clock: ClockId, rate: Rate) -> Result<Rate> {
        self.lock().round_rate(clock, rate)
    }

    /// See [`TreeGuard::effective_bounds`]
    pub fn effective_bounds(&self, clock: ClockId) -> Result<(Rate, Rate)> {
        self.lock().effective_bounds(clock)
    }

    /// See [`TreeGuard::rate`]
    pub fn rate(&self, clock: ClockId) -> Result<Rate> {
        self.lock().rate(clock)
    }

    /// See [`TreeGuard::pending_requests`]
    pub fn pending_requests(&self, clock: ClockId) -> Result<usize> {
        self.lock().pending_requests(clock)
    }

    /// See [`TreeGuard::restore_rate`]
    pub fn restore_rate(&self, clock: ClockId) -> Result<Option<Rate>> {
        self.lock().restore_rate(clock)
    }
}

impl<P: RateProvider> Drop for ClockTree<P> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.requests.is_empty() {
            tracing::warn!(
                "ClockTree dropped with {} live rate requests; their floors are abandoned",
                state.requests.len()
            );
        }
    }
}

/// Floor and ceiling every rate computation on `clock` must respect: the configured bounds with
/// the ledger's highest live demand folded into the minimum.
fn bounds_with_ledger<P: RateProvider>(
    provider: &P,
    ledger: &RequestLedger,
    clock: ClockId,
) -> std::result::Result<(Rate, Rate), ProviderError> {
    let (min, max) = provider.bounds(clock)?;
    Ok((ledger.floor(min), max))
}

/// Round `target` within the ledger-adjusted bounds (raised further to `extra_floor`) and program
/// the result. Skips the hardware write when the clock already runs at the rounded rate.
fn drive<P: RateProvider>(
    provider: &P,
    ledger: &RequestLedger,
    clock: ClockId,
    target: Rate,
    extra_floor: Rate,
) -> std::result::Result<Rate, ProviderError> {
    let (floor, ceiling) = bounds_with_ledger(provider, ledger, clock)?;
    let floor = floor.max(extra_floor);
    let rate = provider.compute_nearest(clock, floor, ceiling, target)?;
    if rate != provider.current_rate(clock)? {
        provider.apply_rate(clock, rate)?;
    }
    Ok(rate)
}

/// Exclusive access to a [`ClockTree`] for as long as the guard lives.
pub struct TreeGuard<'a, P: RateProvider> {
    tree: &'a ClockTree<P>,
    state: MutexGuard<'a, TreeState>,
}

impl<P: RateProvider> TreeGuard<'_, P> {
    fn entry(&self, clock: ClockId) -> Result<&ClockEntry> {
        self.state.clocks.get(&clock).ok_or(ArbiterError::InvalidHandle { clock })
    }

    /// Start tracking `clock`. The provider must already know it.
    pub fn register_clock(&mut self, clock: ClockId) -> Result<()> {
        if self.state.clocks.contains_key(&clock) {
            return Err(ArbiterError::ClockAlreadyRegistered { clock });
        }
        if !self.tree.provider.contains(clock) {
            return Err(ArbiterError::InvalidHandle { clock });
        }
        if self.state.clocks.len() >= self.tree.config.max_clocks {
            return Err(ArbiterError::ResourceExhausted {
                clock,
                capacity: self.tree.config.max_clocks,
            });
        }

        self.state.clocks.insert(clock, ClockEntry::default());
        self.tree.metrics.update_registered_clocks(self.state.clocks.len());
        tracing::info!("Registered clock {} with ClockTree", clock);
        Ok(())
    }

    /// Stop tracking `clock`. Refused while the clock still has live requests.
    pub fn unregister_clock(&mut self, clock: ClockId) -> Result<()> {
        let pending = self.entry(clock)?.ledger.len();
        if pending > 0 {
            return Err(ArbiterError::ClockBusy { clock, pending });
        }

        self.state.clocks.remove(&clock);
        self.tree.metrics.update_registered_clocks(self.state.clocks.len());
        tracing::info!("Unregistered clock {} from ClockTree", clock);
        Ok(())
    }

    /// Demand that `clock` run at or above `rate` until the returned request is ended.
    ///
    /// The first request on an idle clock captures its current rate as the restore point. The
    /// clock is then driven to at least the highest live floor; it is never lowered. A rate of 0
    /// is tracked but imposes no floor.
    ///
    /// Fails without changing any state if no request slot is free (`ResourceExhausted`) or if
    /// the provider cannot reach the floor (`UnderlyingSetFailed`).
    pub fn start_request(&mut self, clock: ClockId, rate: Rate) -> Result<RateRequest> {
        let provider = &self.tree.provider;
        let metrics = &self.tree.metrics;
        let TreeState { clocks, requests } = &mut *self.state;

        let entry = clocks.get_mut(&clock).ok_or(ArbiterError::InvalidHandle { clock })?;

        let Some(handle) = requests.alloc(RequestRecord { clock, rate }) else {
            metrics.record_request_failure();
            tracing::warn!("No free request slot for clock {} ({} in use)", clock, requests.len());
            return Err(ArbiterError::ResourceExhausted { clock, capacity: requests.capacity() });
        };

        let current = match provider.current_rate(clock) {
            Ok(current) => current,
            Err(e) => {
                requests.free(handle);
                metrics.record_request_failure();
                return Err(ArbiterError::query(clock, e));
            }
        };

        let was_empty = entry.ledger.is_empty();
        if was_empty {
            entry.restore_rate = Some(current);
            tracing::debug!("Clock {} restore point captured at {} Hz", clock, current);
        }

        let floor = entry.ledger.max_rate().map_or(rate, |live| live.max(rate));
        match drive(provider, &entry.ledger, clock, current.max(floor), floor) {
            Ok(applied) => {
                tracing::debug!(
                    "Clock {} request {:?} for {} Hz started, clock driven to {} Hz",
                    clock,
                    handle,
                    rate,
                    applied
                );
            }
            Err(source) => {
                if was_empty {
                    entry.restore_rate = None;
                }
                requests.free(handle);
                metrics.record_request_failure();
                tracing::warn!("Clock {} could not reach {} Hz floor: {}", clock, floor, source);
                return Err(ArbiterError::UnderlyingSetFailed { clock, rate, source });
            }
        }

        entry.ledger.insert(handle, rate);
        metrics.record_request_started();

        Ok(RateRequest { tree_id: self.tree.id, handle, clock, rate })
    }

    /// Release `request` and let its clock relax.
    ///
    /// When it was the last live request the clock returns to its restore point; otherwise it is
    /// driven to the highest remaining demand. The configured minimum is not folded into that
    /// target. Relaxation is best-effort: a provider failure is logged, not returned.
    ///
    /// # Panics
    ///
    /// If `request` belongs to another tree, or its slot was already released.
    pub fn end_request(&mut self, request: RateRequest) {
        assert_eq!(request.tree_id, self.tree.id, "rate request released on the wrong clock tree");

        let provider = &self.tree.provider;
        let metrics = &self.tree.metrics;
        let TreeState { clocks, requests } = &mut *self.state;

        let record = requests.free(request.handle);
        debug_assert_eq!(record.clock, request.clock);
        metrics.record_request_ended();

        let Some(entry) = clocks.get_mut(&record.clock) else {
            panic!("clock {} unregistered while {:?} was live", record.clock, request.handle);
        };
        let removed = entry.ledger.remove(request.handle);
        debug_assert_eq!(removed, Some(record.rate));

        let (target, restoring) = if entry.ledger.is_empty() {
            (entry.restore_rate.take(), true)
        } else {
            (entry.ledger.max_rate(), false)
        };

        let Some(target) = target else {
            tracing::warn!("Clock {} ledger emptied without a restore point", record.clock);
            return;
        };

        match drive(provider, &entry.ledger, record.clock, target, 0) {
            Ok(applied) => {
                if restoring {
                    metrics.record_restore();
                }
                tracing::debug!(
                    "Clock {} request {:?} ended, relaxed to {} Hz ({} requests remain)",
                    record.clock,
                    request.handle,
                    applied,
                    entry.ledger.len()
                );
            }
            Err(e) => {
                metrics.record_relax_failure();
                tracing::warn!(
                    "Clock {} could not relax to {} Hz after request ended: {}",
                    record.clock,
                    target,
                    e
                );
            }
        }
    }

    /// Unconditionally set `clock` to `rate`.
    ///
    /// Live request floors still win: the programmed rate is raised to the ledger floor. While
    /// requests are live, `rate` also becomes the restore point the clock falls back to once they
    /// all end, even if programming the hardware failed.
    pub fn set_rate(&mut self, clock: ClockId, rate: Rate) -> Result<()> {
        let provider = &self.tree.provider;
        let entry = self
            .state
            .clocks
            .get_mut(&clock)
            .ok_or(ArbiterError::InvalidHandle { clock })?;

        let result = drive(provider, &entry.ledger, clock, rate, 0);

        let overrides = !entry.ledger.is_empty();
        if overrides {
            entry.restore_rate = Some(rate);
            tracing::debug!(
                "Clock {} has {} live requests, restore point now {} Hz",
                clock,
                entry.ledger.len(),
                rate
            );
        }
        self.tree.metrics.record_set_rate(overrides);

        result.map(|_| ()).map_err(|source| match source {
            ProviderError::UnknownClock(_) => ArbiterError::InvalidHandle { clock },
            source => ArbiterError::UnderlyingSetFailed { clock, rate, source },
        })
    }

    /// Rate `clock` would run at if set to `rate`, never below any live request floor.
    /// Mutates nothing.
    pub fn round_rate(&self, clock: ClockId, rate: Rate) -> Result<Rate> {
        let entry = self.entry(clock)?;
        let provider = &self.tree.provider;
        let (floor, ceiling) = bounds_with_ledger(provider, &entry.ledger, clock)
            .map_err(|e| ArbiterError::query(clock, e))?;
        provider
            .compute_nearest(clock, floor, ceiling, rate)
            .map_err(|e| ArbiterError::query(clock, e))
    }

    /// `(max(min, highest live request), max)` for `clock`
    pub fn effective_bounds(&self, clock: ClockId) -> Result<(Rate, Rate)> {
        let entry = self.entry(clock)?;
        bounds_with_ledger(&self.tree.provider, &entry.ledger, clock)
            .map_err(|e| ArbiterError::query(clock, e))
    }

    /// Hardware-reflected rate of `clock`
    pub fn rate(&self, clock: ClockId) -> Result<Rate> {
        self.entry(clock)?;
        self.tree.provider.current_rate(clock).map_err(|e| ArbiterError::query(clock, e))
    }

    /// Number of live requests on `clock`
    pub fn pending_requests(&self, clock: ClockId) -> Result<usize> {
        Ok(self.entry(clock)?.ledger.len())
    }

    /// Restore point of `clock`; `None` whenever its ledger is empty
    pub fn restore_rate(&self, clock: ClockId) -> Result<Option<Rate>> {
        Ok(self.entry(clock)?.restore_rate)
    }
}
