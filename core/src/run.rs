//! # Run Controller
//!
//! Wires expansion, registry, scheduler and aggregation into one run:
//! validates the configuration, expands the raw inputs, launches the
//! scheduler as a task and hands back a handle with cancel/await/
//! progress. Setup errors surface here, before any unit exists.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use sondr_common::config::RunConfig;
use sondr_common::network::target::{self, Expansion};
use sondr_common::report::{RunProgress, RunReport};
use sondr_common::{info, warn};

use crate::registry::ModuleRegistry;
use crate::scheduler::{CancelToken, Scheduler};

/// Handle to a running reconnaissance sweep.
pub struct RunHandle {
    cancel: CancelToken,
    progress: watch::Receiver<RunProgress>,
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    /// Requests cooperative cancellation. Pending units settle as
    /// cancelled; running units stop at their next boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A clone of the run's cancel token, for signal handlers and key
    /// listeners.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Live progress; updated after every settled unit.
    pub fn progress(&self) -> watch::Receiver<RunProgress> {
        self.progress.clone()
    }

    /// True once every target record has settled.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Suspends until every target record is finalized or cancelled,
    /// then yields the report. A run always reports, even when every
    /// unit failed.
    pub async fn wait(self) -> anyhow::Result<RunReport> {
        Ok(self.join.await?)
    }
}

/// Starts a run over `raw_inputs` with the modules in `registry`.
///
/// Fails fast on configuration problems; invalid target inputs do not
/// fail the run, they are recorded as report warnings.
pub fn start(
    registry: Arc<ModuleRegistry>,
    raw_inputs: Vec<String>,
    config: RunConfig,
) -> anyhow::Result<RunHandle> {
    config.validate()?;

    let Expansion { targets, warnings } = target::expand(&raw_inputs, &config);
    for warning in &warnings {
        warn!("skipping input: {warning}");
    }
    info!(
        "expanded {} inputs into {} targets",
        raw_inputs.len(),
        targets.len()
    );

    let cancel = CancelToken::new();
    let (progress_tx, progress_rx) = watch::channel(RunProgress::default());
    let scheduler = Scheduler::new(registry, &config, cancel.clone(), progress_tx);

    let join = tokio::spawn(async move {
        let started = Instant::now();
        let (records, stats) = scheduler.execute(targets).await;
        RunReport {
            records,
            warnings,
            stats,
            elapsed: started.elapsed(),
        }
    });

    Ok(RunHandle {
        cancel,
        progress: progress_rx,
        join,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{StubModule, fields};
    use sondr_common::error::TargetError;
    use sondr_common::module::{FieldValue, caps};

    fn registry_with_probe() -> Arc<ModuleRegistry> {
        let mut registry = ModuleRegistry::new();
        registry
            .register(Arc::new(
                StubModule::new("probe", |_, _| Ok(fields("seen", FieldValue::Count(1))))
                    .with_requires(caps::ADDR),
            ))
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn invalid_config_fails_before_scheduling() {
        let config = RunConfig {
            concurrency: 0,
            ..RunConfig::default()
        };
        let result = start(registry_with_probe(), vec!["192.0.2.1".into()], config);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_inputs_become_report_warnings() {
        let handle = start(
            registry_with_probe(),
            vec!["192.0.2.1".into(), "no!good".into()],
            RunConfig::default(),
        )
        .unwrap();
        let report = handle.wait().await.unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.stats.succeeded, 1);
        assert!(matches!(
            report.warnings.as_slice(),
            [TargetError::Invalid { input, .. }] if input == "no!good"
        ));
    }

    #[tokio::test]
    async fn empty_input_yields_empty_report() {
        let handle = start(registry_with_probe(), Vec::new(), RunConfig::default()).unwrap();
        let report = handle.wait().await.unwrap();

        assert!(report.records.is_empty());
        assert_eq!(report.stats, Default::default());
    }

    #[tokio::test]
    async fn progress_reaches_completion() {
        let handle = start(
            registry_with_probe(),
            vec!["192.0.2.0/30".into()],
            RunConfig::default(),
        )
        .unwrap();
        let progress = handle.progress();
        let report = handle.wait().await.unwrap();

        let last = *progress.borrow();
        assert_eq!(last.settled, 4);
        assert_eq!(last.targets_done, 4);
        assert_eq!(report.stats.units, 4);
    }
}
