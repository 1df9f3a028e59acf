//! Error types for RateArbiter

use crate::types::{ClockId, Rate};
use thiserror::Error;

/// Result type alias for arbiter operations
pub type Result<T> = std::result::Result<T, ArbiterError>;

/// Errors that can occur in the arbiter
#[derive(Error, Debug)]
pub enum ArbiterError {
    /// The clock is not registered with this tree
    #[error("Clock {clock} is not a valid handle")]
    InvalidHandle { clock: ClockId },

    /// No free request slot was available
    #[error("No request slot available for {clock} (capacity {capacity})")]
    ResourceExhausted { clock: ClockId, capacity: usize },

    /// The provider rejected a rate change
    #[error("Failed to set {clock} to {rate} Hz: {source}")]
    UnderlyingSetFailed {
        clock: ClockId,
        rate: Rate,
        #[source]
        source: ProviderError,
    },

    #[error("Clock {clock} is already registered")]
    ClockAlreadyRegistered { clock: ClockId },

    #[error("Clock {clock} still has {pending} pending requests")]
    ClockBusy { clock: ClockId, pending: usize },

    /// The provider failed a query (bounds, current rate, rounding)
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ArbiterError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap a provider query failure; an unknown clock is reported as an invalid handle
    pub fn query(clock: ClockId, err: ProviderError) -> Self {
        match err {
            ProviderError::UnknownClock(_) => Self::InvalidHandle { clock },
            other => Self::Provider(other),
        }
    }
}

/// Errors reported by a [`RateProvider`](crate::RateProvider)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Unknown clock {0}")]
    UnknownClock(ClockId),

    #[error("No achievable rate in [{floor}, {ceiling}]")]
    NoAchievableRate { floor: Rate, ceiling: Rate },

    #[error("Hardware rejected rate {rate} Hz")]
    Rejected { rate: Rate },

    #[error("Provider error: {0}")]
    Other(String),
}
