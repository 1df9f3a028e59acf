//! # RateArbiter
//!
//! Minimum-rate request arbitration for clocks that live in a shared clock tree.
//!
//! Consumers start a [`RateRequest`] to keep a clock running at or above some floor for as long
//! as they need it, and end it once they are done. The arbiter keeps the clock at the highest live
//! floor, restores the pre-request rate when the last request ends, and lets a plain
//! [`ClockTree::set_rate`] issued meanwhile redefine what the clock falls back to.
//!
//! Hardware access goes through the [`RateProvider`] trait; [`SimulatedClocks`] is an in-memory
//! provider.
//!
//! ```rust
//! use rate_arbiter::{ArbiterConfig, ClockTree, SimulatedClocks};
//!
//! let clocks = SimulatedClocks::new();
//! let cpu = clocks.add_clock(100, 0, 1_000, 1);
//!
//! let tree = ClockTree::new(clocks, ArbiterConfig::default()).unwrap();
//! tree.register_clock(cpu).unwrap();
//!
//! let boost = tree.start_request(cpu, 600).unwrap();
//! assert_eq!(tree.rate(cpu).unwrap(), 600);
//!
//! tree.end_request(boost);
//! assert_eq!(tree.rate(cpu).unwrap(), 100);
//! ```

pub mod arena;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod provider;
pub mod tree;
pub mod types;


#[cfg(test)]
mod integration_tests;

pub use config::ArbiterConfig;
pub use error::{ArbiterError, ProviderError, Result};
pub use provider::{RateProvider, SimulatedClocks};
pub use tree::{ClockTree, RateRequest, TreeGuard};
pub use types::{ClockId, Rate};

/// Current version of the RateArbiter
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of request slots shared by all clocks in a tree
pub const DEFAULT_MAX_REQUESTS: usize = 256;

/// Default number of clocks a tree may track
pub const DEFAULT_MAX_CLOCKS: usize = 64;
