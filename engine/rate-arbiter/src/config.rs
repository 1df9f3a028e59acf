//! Configuration for RateArbiter

use crate::{DEFAULT_MAX_CLOCKS, DEFAULT_MAX_REQUESTS};
use serde::{Deserialize, Serialize};

/// Configuration for a [`ClockTree`](crate::ClockTree)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Request slots shared by every clock in the tree.
    /// Starting a request with all slots in use fails with `ResourceExhausted`.
    pub max_requests: usize,

    /// Maximum number of registered clocks
    pub max_clocks: usize,

    /// Monitoring configuration
    pub monitoring: MonitoringConfig,
}

/// Monitoring and observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Publish counters through the `metrics` facade
    pub emit_metrics: bool,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            max_clocks: DEFAULT_MAX_CLOCKS,
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self { emit_metrics: true }
    }
}

impl ArbiterConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests == 0 {
            return Err("max_requests must be greater than 0".to_string());
        }

        if self.max_requests > u32::MAX as usize {
            return Err(format!("max_requests must not exceed {}", u32::MAX));
        }

        if self.max_clocks == 0 {
            return Err("max_clocks must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: ArbiterConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ArbiterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_requests, DEFAULT_MAX_REQUESTS);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ArbiterConfig { max_requests: 0, ..Default::default() };
        assert!(config.validate().unwrap_err().contains("max_requests"));

        let config = ArbiterConfig { max_clocks: 0, ..Default::default() };
        assert!(config.validate().unwrap_err().contains("max_clocks"));
    }
}
