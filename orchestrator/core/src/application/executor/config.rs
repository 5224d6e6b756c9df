// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds and retry policy for one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Node dispatches allowed across all branches
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Wall-clock limit for the whole execution
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Extra attempts after a transient agent failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay before a retry; doubles on every further attempt
    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,
}

fn default_max_steps() -> usize {
    100
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(100)
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            timeout: None,
            max_retries: default_max_retries(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = retry_backoff;
        self
    }

    /// Delay before attempt `attempt` (1-based; the first attempt has none)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.retry_backoff.saturating_mul(2_u32.pow(exponent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_defaults_and_humantime() {
        let config: ExecutorConfig = serde_yaml::from_str("max_steps: 12\ntimeout: 30s\n").unwrap();
        assert_eq!(config.max_steps, 12);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_backoff, Duration::from_millis(100));
    }

    #[test]
    fn test_backoff_doubles() {
        let config = ExecutorConfig::default().with_retries(3, Duration::from_millis(10));
        assert_eq!(config.backoff_for(1), Duration::ZERO);
        assert_eq!(config.backoff_for(2), Duration::from_millis(10));
        assert_eq!(config.backoff_for(3), Duration::from_millis(20));
        assert_eq!(config.backoff_for(4), Duration::from_millis(40));
    }
}
