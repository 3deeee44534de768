//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Capacity and shrink policy shared by both pool variants.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Surfaces the pool tries not to exceed, counting idle, deferred and
    /// outstanding ones together
    pub max_total: usize,
    /// Idle surfaces kept after an idle shrink
    pub min_idle: usize,
    /// Quiet period after a return before the idle set is shrunk
    pub shrink_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: 50,
            min_idle: 0,
            shrink_timeout: Duration::from_millis(1000),
        }
    }
}

impl PoolConfig {
    /// Set the capacity ceiling.
    pub fn with_max_total(mut self, max_total: usize) -> Self {
        self.max_total = max_total;
        self
    }

    /// Set the idle floor.
    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Set the idle shrink delay.
    pub fn with_shrink_timeout(mut self, shrink_timeout: Duration) -> Self {
        self.shrink_timeout = shrink_timeout;
        self
    }

    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_total == 0 {
            return Err(Error::configuration("max_total must be greater than 0"));
        }
        if self.min_idle > self.max_total {
            return Err(Error::configuration(format!(
                "min_idle ({}) must not exceed max_total ({})",
                self.min_idle, self.max_total
            )));
        }
        if self.shrink_timeout.is_zero() {
            return Err(Error::configuration(
                "shrink_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_total, 50);
        assert_eq!(config.min_idle, 0);
        assert_eq!(config.shrink_timeout, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_max_total_rejected() {
        let err = PoolConfig::default().with_max_total(0).validate().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn min_idle_above_max_rejected() {
        let err = PoolConfig::default()
            .with_max_total(2)
            .with_min_idle(3)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("min_idle (3)"));
    }

    #[test]
    fn zero_shrink_timeout_rejected() {
        let config = PoolConfig::default().with_shrink_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
