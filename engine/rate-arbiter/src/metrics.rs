//! Metrics collection for RateArbiter

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of arbiter activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterMetrics {
    /// Requests currently live across the tree
    pub live_requests: u64,

    /// Clocks currently registered
    pub registered_clocks: u64,

    /// Requests started successfully
    pub requests_started: u64,

    /// Requests ended
    pub requests_ended: u64,

    /// Requests that failed to start (exhaustion or provider rejection)
    pub request_failures: u64,

    /// Plain set-rate calls
    pub set_rate_calls: u64,

    /// Set-rate calls that redefined a restore rate
    pub restore_overrides: u64,

    /// Restore rates applied after a ledger emptied
    pub restores_applied: u64,

    /// Best-effort relaxations the provider rejected
    pub relax_failures: u64,
}

/// Metrics collector for a clock tree
pub struct MetricsCollector {
    live_requests: AtomicU64,
    registered_clocks: AtomicU64,
    requests_started: AtomicU64,
    requests_ended: AtomicU64,
    request_failures: AtomicU64,
    set_rate_calls: AtomicU64,
    restore_overrides: AtomicU64,
    restores_applied: AtomicU64,
    relax_failures: AtomicU64,

    // Configuration
    emit: bool,
}

impl MetricsCollector {
    /// Create a new metrics collector. With `emit` set, every update is also published through
    /// the `metrics` facade.
    pub fn new(emit: bool) -> Self {
        Self {
            live_requests: AtomicU64::new(0),
            registered_clocks: AtomicU64::new(0),
            requests_started: AtomicU64::new(0),
            requests_ended: AtomicU64::new(0),
            request_failures: AtomicU64::new(0),
            set_rate_calls: AtomicU64::new(0),
            restore_overrides: AtomicU64::new(0),
            restores_applied: AtomicU64::new(0),
            relax_failures: AtomicU64::new(0),
            emit,
        }
    }

    /// Record a started request
    pub fn record_request_started(&self) {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
        let live = self.live_requests.fetch_add(1, Ordering::Relaxed) + 1;
        if self.emit {
            metrics::increment_counter!("rate_arbiter_requests_started");
            metrics::gauge!("rate_arbiter_live_requests", live as f64);
        }
    }

    /// Record an ended request
    pub fn record_request_ended(&self) {
        self.requests_ended.fetch_add(1, Ordering::Relaxed);
        let live = self.live_requests.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        if self.emit {
            metrics::increment_counter!("rate_arbiter_requests_ended");
            metrics::gauge!("rate_arbiter_live_requests", live as f64);
        }
    }

    /// Record a request that failed to start
    pub fn record_request_failure(&self) {
        self.request_failures.fetch_add(1, Ordering::Relaxed);
        if self.emit {
            metrics::increment_counter!("rate_arbiter_request_failures");
        }
    }

    /// Record a plain set-rate call
    pub fn record_set_rate(&self, overrode_restore: bool) {
        self.set_rate_calls.fetch_add(1, Ordering::Relaxed);
        if overrode_restore {
            self.restore_overrides.fetch_add(1, Ordering::Relaxed);
        }
        if self.emit {
            metrics::increment_counter!("rate_arbiter_set_rate_calls");
        }
    }

    /// Record a restore applied after the last request ended
    pub fn record_restore(&self) {
        self.restores_applied.fetch_add(1, Ordering::Relaxed);
        if self.emit {
            metrics::increment_counter!("rate_arbiter_restores_applied");
        }
    }

    /// Record a relaxation the provider rejected
    pub fn record_relax_failure(&self) {
        self.relax_failures.fetch_add(1, Ordering::Relaxed);
        if self.emit {
            metrics::increment_counter!("rate_arbiter_relax_failures");
        }
    }

    /// Update registered clock count
    pub fn update_registered_clocks(&self, count: usize) {
        self.registered_clocks.store(count as u64, Ordering::Relaxed);
        if self.emit {
            metrics::gauge!("rate_arbiter_registered_clocks", count as f64);
        }
    }

    /// Get current metrics
    pub fn get_metrics(&self) -> ArbiterMetrics {
        ArbiterMetrics {
            live_requests: self.live_requests.load(Ordering::Relaxed),
            registered_clocks: self.registered_clocks.load(Ordering::Relaxed),
            requests_started: self.requests_started.load(Ordering::Relaxed),
            requests_ended: self.requests_ended.load(Ordering::Relaxed),
            request_failures: self.request_failures.load(Ordering::Relaxed),
            set_rate_calls: self.set_rate_calls.load(Ordering::Relaxed),
            restore_overrides: self.restore_overrides.load(Ordering::Relaxed),
            restores_applied: self.restores_applied.load(Ordering::Relaxed),
            relax_failures: self.relax_failures.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters. Gauges (live requests, registered clocks) are kept.
    pub fn reset(&self) {
        self.requests_started.store(0, Ordering::Relaxed);
        self.requests_ended.store(0, Ordering::Relaxed);
        self.request_failures.store(0, Ordering::Relaxed);
        self.set_rate_calls.store(0, Ordering::Relaxed);
        self.restore_overrides.store(0, Ordering::Relaxed);
        self.restores_applied.store(0, Ordering::Relaxed);
        self.relax_failures.store(0, Ordering::Relaxed);
    }
}
