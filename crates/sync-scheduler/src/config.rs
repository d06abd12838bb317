//! Runner configuration.

use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Configuration for the task runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum number of task chains running at once.
    /// Defaults to 4.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl RunnerConfig {
    /// Set the concurrency limit.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_concurrency == 0 {
            return Err(SchedulerError::Config(
                "max_concurrency must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = RunnerConfig::default().with_max_concurrency(0);
        assert!(matches!(config.validate(), Err(SchedulerError::Config(_))));
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: RunnerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_concurrency, 4);
    }
}
