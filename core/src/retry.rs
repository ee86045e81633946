//! Retry policy and terminal-failure classification.
//!
//! Backoff is a bounded state machine over the unit's attempt count, not
//! call-stack depth: the scheduler re-enqueues a failed unit after the
//! delay this module computes.

use std::time::Duration;

use sondr_common::config::RunConfig;
use sondr_common::error::ModuleError;
use sondr_common::module::ModuleDescriptor;
use sondr_common::record::FailureKind;

/// Exponential backoff with jitter.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl BackoffPolicy {
    pub fn from_config(cfg: &RunConfig) -> Self {
        Self {
            base: cfg.backoff_base,
            cap: cfg.backoff_cap,
        }
    }

    /// Delay before re-running a unit that has failed `attempt + 1`
    /// times. Jitter keeps the delay in [half, full] of the capped
    /// exponential step.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        let capped = exp.min(self.cap);
        capped.mul_f64(rand::random_range(0.5..=1.0))
    }
}

/// Decides what happens to a failed unit: another attempt after backoff,
/// or a terminal classification on the target's record.
pub struct RetryCoordinator {
    policy: BackoffPolicy,
    default_budget: u32,
    overrides: std::collections::HashMap<String, u32>,
}

impl RetryCoordinator {
    pub fn new(cfg: &RunConfig) -> Self {
        Self {
            policy: BackoffPolicy::from_config(cfg),
            default_budget: cfg.max_retries,
            overrides: cfg.retry_overrides.clone(),
        }
    }

    /// Retry budget for one module: run override, descriptor default,
    /// then the global default.
    pub fn budget(&self, descriptor: &ModuleDescriptor) -> u32 {
        self.overrides
            .get(&descriptor.id)
            .copied()
            .or(descriptor.max_retries)
            .unwrap_or(self.default_budget)
    }

    /// A failed attempt retries only while the error is retryable and
    /// budget remains. `attempt` counts failures so far, zero-based.
    pub fn should_retry(
        &self,
        err: &ModuleError,
        descriptor: &ModuleDescriptor,
        attempt: u32,
    ) -> bool {
        err.is_retryable() && attempt < self.budget(descriptor)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.policy.delay(attempt)
    }

    /// Terminal classification for the record.
    pub fn classify(err: &ModuleError) -> FailureKind {
        match err {
            ModuleError::Timeout(_) | ModuleError::Transient(_) => FailureKind::Transient,
            ModuleError::Fatal(_) => FailureKind::Fatal,
            ModuleError::Cancelled => FailureKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(max_retries: u32) -> RetryCoordinator {
        RetryCoordinator::new(&RunConfig {
            max_retries,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(2),
            ..RunConfig::default()
        })
    }

    #[test]
    fn delay_grows_and_stays_within_bounds() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(2),
        };

        for attempt in 0..8 {
            let step = Duration::from_millis(100 * (1 << attempt.min(16)));
            let capped = step.min(Duration::from_secs(2));
            let delay = policy.delay(attempt);
            assert!(delay <= capped, "attempt {attempt}: {delay:?} > {capped:?}");
            assert!(
                delay >= capped.mul_f64(0.5),
                "attempt {attempt}: {delay:?} below jitter floor"
            );
        }
    }

    #[test]
    fn retry_gating() {
        let coordinator = coordinator(2);
        let descriptor = ModuleDescriptor::new("probe");
        let transient = ModuleError::Transient("reset".into());
        let fatal = ModuleError::Fatal("bad".into());

        assert!(coordinator.should_retry(&transient, &descriptor, 0));
        assert!(coordinator.should_retry(&transient, &descriptor, 1));
        assert!(!coordinator.should_retry(&transient, &descriptor, 2));
        assert!(!coordinator.should_retry(&fatal, &descriptor, 0));
    }

    #[test]
    fn budget_resolution() {
        let mut cfg = RunConfig {
            max_retries: 2,
            ..RunConfig::default()
        };
        cfg.retry_overrides.insert("slow".into(), 7);
        let coordinator = RetryCoordinator::new(&cfg);

        assert_eq!(coordinator.budget(&ModuleDescriptor::new("slow")), 7);
        assert_eq!(
            coordinator.budget(&ModuleDescriptor::new("probe").max_retries(4)),
            4
        );
        assert_eq!(coordinator.budget(&ModuleDescriptor::new("probe")), 2);
    }

    #[test]
    fn classification() {
        assert_eq!(
            RetryCoordinator::classify(&ModuleError::Timeout(Duration::from_secs(1))),
            FailureKind::Transient
        );
        assert_eq!(
            RetryCoordinator::classify(&ModuleError::Fatal("nope".into())),
            FailureKind::Fatal
        );
        assert_eq!(
            RetryCoordinator::classify(&ModuleError::Cancelled),
            FailureKind::Cancelled
        );
    }
}
