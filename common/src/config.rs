//! Per-run settings, built by the CLI (or tests) and validated by the
//! run controller before any scheduling starts.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::EngineError;

/// Token-bucket parameters for one module.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Sustained executions per second.
    pub rate: f64,
    /// Executions that may start back-to-back before pacing kicks in.
    pub burst: u32,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Upper bound on concurrently running work units.
    pub concurrency: usize,

    /// Default retry budget per work unit.
    ///
    /// Per-module overrides and descriptor defaults take precedence,
    /// see [`RunConfig::retry_budget`].
    pub max_retries: u32,

    /// Delay before the first retry; doubles on every further attempt.
    pub backoff_base: Duration,

    /// Ceiling for the backoff growth.
    pub backoff_cap: Duration,

    /// Maximum host count a single range input may expand to.
    pub range_ceiling: u64,

    /// Drop the network and broadcast addresses when expanding prefixes
    /// shorter than /31.
    pub strip_network_edges: bool,

    /// Per-module token bucket settings, keyed by module id. Modules
    /// without an entry run unpaced.
    pub rate_limits: HashMap<String, RateLimit>,

    /// Per-module retry budget overrides, keyed by module id.
    pub retry_overrides: HashMap<String, u32>,

    /// Output suppression level (0 = full, 2 = summary only).
    pub quiet: u8,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 64,
            max_retries: 2,
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(10),
            range_ceiling: 4096,
            strip_network_edges: false,
            rate_limits: HashMap::new(),
            retry_overrides: HashMap::new(),
            quiet: 0,
        }
    }
}

impl RunConfig {
    /// Rejects settings the scheduler cannot honor. Called by the run
    /// controller before any unit is created.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.concurrency == 0 {
            return Err(EngineError::Config("concurrency must be at least 1".into()));
        }
        if self.range_ceiling == 0 {
            return Err(EngineError::Config("range ceiling must be at least 1".into()));
        }
        for (id, limit) in &self.rate_limits {
            if !limit.rate.is_finite() || limit.rate <= 0.0 {
                return Err(EngineError::Config(format!(
                    "rate for module '{id}' must be a positive number"
                )));
            }
            if limit.burst == 0 {
                return Err(EngineError::Config(format!(
                    "burst for module '{id}' must be at least 1"
                )));
            }
        }
        Ok(())
    }

    /// Retry budget for one module: run override, then the descriptor's
    /// own default, then the global default.
    pub fn retry_budget(&self, module_id: &str, descriptor_default: Option<u32>) -> u32 {
        self.retry_overrides
            .get(module_id)
            .copied()
            .or(descriptor_default)
            .unwrap_or(self.max_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = RunConfig {
            concurrency: 0,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_rate_limits_are_rejected() {
        let mut config = RunConfig::default();
        config
            .rate_limits
            .insert("probe".into(), RateLimit { rate: 0.0, burst: 3 });
        assert!(config.validate().is_err());

        config
            .rate_limits
            .insert("probe".into(), RateLimit { rate: 2.0, burst: 0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_budget_resolution_order() {
        let mut config = RunConfig {
            max_retries: 2,
            ..RunConfig::default()
        };
        config.retry_overrides.insert("slow".into(), 5);

        assert_eq!(config.retry_budget("slow", Some(1)), 5);
        assert_eq!(config.retry_budget("other", Some(1)), 1);
        assert_eq!(config.retry_budget("other", None), 2);
    }
}
