//! Engine configuration
//!
//! Passed explicitly to [`Orchestrator::new`](crate::Orchestrator::new); the
//! engine holds no process-global state.

use crate::error::{OperationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default budget for read-side work (3 minutes)
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3 * 60);
/// Default budget for write-side work (5 minutes)
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Default pause between attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Longest accepted timeout or poll interval (30 days)
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30 * 86_400);
/// Default per-action call ceiling
pub const DEFAULT_RATE_PER_SECOND: u32 = 20;

/// Which deadline class a phase draws its budget from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetClass {
    Read,
    Write,
}

/// Deadline classes and retry interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub read: Duration,
    pub write: Duration,
    pub poll_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read: DEFAULT_READ_TIMEOUT,
            write: DEFAULT_WRITE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl TimeoutConfig {
    /// Budget of `class` scaled by `multiplier` (at least 1)
    pub fn budget(&self, class: BudgetClass, multiplier: u32) -> Duration {
        let base = match class {
            BudgetClass::Read => self.read,
            BudgetClass::Write => self.write,
        };
        base.saturating_mul(multiplier.max(1))
    }
}

/// Calls-per-second ceilings keyed by action name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub default_per_second: u32,
    #[serde(default)]
    pub per_action: HashMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_per_second: DEFAULT_RATE_PER_SECOND,
            per_action: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    pub fn limit_for(&self, action: &str) -> u32 {
        self.per_action
            .get(action)
            .copied()
            .unwrap_or(self.default_per_second)
    }
}

/// Everything the engine needs to run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub timeouts: TimeoutConfig,
    pub rate_limits: RateLimitConfig,
    /// Poll-budget multipliers for actions known to run long
    #[serde(default)]
    pub slow_operations: HashMap<String, u32>,
    /// Codes treated as transient on top of the built-in list
    #[serde(default)]
    pub extra_retryable_codes: Vec<String>,
    /// Codes treated as "not found" on top of the built-in list
    #[serde(default)]
    pub extra_not_found_codes: Vec<String>,
}

impl EngineConfig {
    pub fn multiplier_for(&self, action: &str) -> Option<u32> {
        self.slow_operations.get(action).copied()
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.timeouts;
        if t.read.is_zero() || t.write.is_zero() || t.poll_interval.is_zero() {
            return Err(OperationError::InvalidConfig(
                "timeouts and poll interval must be greater than zero".to_string(),
            ));
        }
        if t.read > MAX_TIMEOUT || t.write > MAX_TIMEOUT || t.poll_interval > MAX_TIMEOUT {
            return Err(OperationError::InvalidConfig(format!(
                "timeouts and poll interval must not exceed {MAX_TIMEOUT:?}"
            )));
        }
        if self.rate_limits.default_per_second == 0 {
            return Err(OperationError::InvalidConfig(
                "default rate limit must be greater than zero".to_string(),
            ));
        }
        if let Some((action, _)) = self.rate_limits.per_action.iter().find(|(_, r)| **r == 0) {
            return Err(OperationError::InvalidConfig(format!(
                "rate limit for {action} must be greater than zero"
            )));
        }
        if let Some((action, _)) = self.slow_operations.iter().find(|(_, m)| **m == 0) {
            return Err(OperationError::InvalidConfig(format!(
                "multiplier for {action} must be greater than zero"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.timeouts.read, Duration::from_secs(180));
        assert_eq!(config.timeouts.write, Duration::from_secs(300));
        assert_eq!(config.timeouts.poll_interval, Duration::from_secs(1));
        assert_eq!(config.rate_limits.limit_for("DescribeFlow"), 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_budget_multiplier() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(
            timeouts.budget(BudgetClass::Read, 3),
            Duration::from_secs(540)
        );
        // zero is treated as one
        assert_eq!(
            timeouts.budget(BudgetClass::Write, 0),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_validate_rejects_zero() {
        let mut config = EngineConfig::default();
        config.timeouts.poll_interval = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(OperationError::InvalidConfig(_))
        ));

        let mut config = EngineConfig::default();
        config.rate_limits.per_action.insert("DescribeFlow".into(), 0);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.slow_operations.insert("CreateCluster".into(), 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_huge_timeouts() {
        let mut config = EngineConfig::default();
        config.timeouts.read = Duration::from_secs(u64::MAX);
        assert!(matches!(
            config.validate(),
            Err(OperationError::InvalidConfig(_))
        ));

        let mut config = EngineConfig::default();
        config.timeouts.write = MAX_TIMEOUT;
        assert!(config.validate().is_ok());
        config.timeouts.write = MAX_TIMEOUT + Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_per_action_overrides() {
        let mut config = EngineConfig::default();
        config.rate_limits.per_action.insert("DescribeFlow".into(), 5);
        config.slow_operations.insert("CreateCluster".into(), 3);

        assert_eq!(config.rate_limits.limit_for("DescribeFlow"), 5);
        assert_eq!(config.rate_limits.limit_for("CreateCluster"), 20);
        assert_eq!(config.multiplier_for("CreateCluster"), Some(3));
        assert_eq!(config.multiplier_for("DescribeFlow"), None);
    }
}
