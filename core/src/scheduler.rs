//! # Scheduler — the concurrency core
//!
//! Fans (target, module) work units out onto a bounded pool of tokio
//! tasks. A single dispatcher task owns all scheduling state and drains
//! completion events from an mpsc channel; unit executions run as
//! spawned tasks gated by a global semaphore (the worker pool bound),
//! a per-module weight semaphore, and an optional per-module token
//! bucket.
//!
//! Dependency resolution is capability driven: whenever a module result
//! merges, the dispatcher re-checks which modules became applicable for
//! that target and enqueues them. A module dependency DAG emerges
//! without any explicit graph structure.
//!
//! Cancellation is cooperative. Units waiting for permits settle as
//! `Cancelled` immediately; running executions race the cancel token
//! and their late results are discarded whole.

pub mod rate;
pub mod unit;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, Semaphore, mpsc, watch};
use tracing::debug;

use sondr_common::config::RunConfig;
use sondr_common::error::ModuleError;
use sondr_common::module::{ModuleOutput, ModuleResult, TargetView};
use sondr_common::network::target::Target;
use sondr_common::record::{RecordOutcome, TargetRecord, TerminalFailure};
use sondr_common::report::{RunProgress, RunStats};

use crate::aggregate::Aggregator;
use crate::registry::ModuleRegistry;
use crate::retry::RetryCoordinator;
use crate::scheduler::rate::TokenBucket;
use crate::scheduler::unit::{UnitState, WorkUnit};

/// Run-level cancellation signal. Workers observe it at unit boundaries
/// and before blocking I/O; it never interrupts in-flight I/O directly.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::Relaxed);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Relaxed)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

enum UnitEvent {
    /// A unit execution finished, one way or the other.
    Settled {
        unit: WorkUnit,
        outcome: Result<ModuleOutput, ModuleError>,
    },
    /// A retry's backoff delay elapsed; the unit wants requeueing.
    BackoffElapsed { unit: WorkUnit },
}

/// Shared handles a unit execution task needs.
struct UnitContext {
    aggregator: Arc<Aggregator>,
    cancel: CancelToken,
    global: Arc<Semaphore>,
    slots: Arc<Semaphore>,
    limiter: Option<Arc<TokenBucket>>,
    tx: mpsc::UnboundedSender<UnitEvent>,
}

pub struct Scheduler {
    registry: Arc<ModuleRegistry>,
    aggregator: Arc<Aggregator>,
    retry: RetryCoordinator,
    cancel: CancelToken,
    global_slots: Arc<Semaphore>,
    module_slots: HashMap<String, Arc<Semaphore>>,
    limiters: HashMap<String, Arc<TokenBucket>>,
    tx: mpsc::UnboundedSender<UnitEvent>,
    rx: mpsc::UnboundedReceiver<UnitEvent>,
    progress: watch::Sender<RunProgress>,
    /// (target identity, module id) pairs that already have a unit.
    scheduled: HashSet<(String, String)>,
    finalized: HashSet<String>,
    targets: HashMap<String, Arc<Target>>,
    records: Vec<TargetRecord>,
    /// Outstanding events: executing units plus backoff sleepers.
    in_flight: usize,
    stats: RunStats,
}

impl Scheduler {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        cfg: &RunConfig,
        cancel: CancelToken,
        progress: watch::Sender<RunProgress>,
    ) -> Self {
        let mut module_slots = HashMap::new();
        let mut limiters = HashMap::new();
        for module in registry.iter() {
            let descriptor = module.descriptor();
            let permits = match descriptor.weight {
                0 => cfg.concurrency,
                weight => weight,
            };
            module_slots.insert(descriptor.id.clone(), Arc::new(Semaphore::new(permits)));
            if let Some(limit) = cfg.rate_limits.get(&descriptor.id) {
                limiters.insert(descriptor.id.clone(), Arc::new(TokenBucket::new(*limit)));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            registry,
            aggregator: Arc::new(Aggregator::new()),
            retry: RetryCoordinator::new(cfg),
            cancel,
            global_slots: Arc::new(Semaphore::new(cfg.concurrency)),
            module_slots,
            limiters,
            tx,
            rx,
            progress,
            scheduled: HashSet::new(),
            finalized: HashSet::new(),
            targets: HashMap::new(),
            records: Vec::new(),
            in_flight: 0,
            stats: RunStats::default(),
        }
    }

    /// Drives every target to a finalized record. Returns the records in
    /// finalization order together with the run counters.
    pub async fn execute(mut self, targets: Vec<Target>) -> (Vec<TargetRecord>, RunStats) {
        for target in targets {
            let target = Arc::new(target);
            self.aggregator.admit(&target);
            self.targets.insert(target.identity.clone(), target);
        }

        let seeded: Vec<Arc<Target>> = self.targets.values().cloned().collect();
        for target in &seeded {
            self.schedule_ready(target);
        }
        // Targets no module applies to finalize right away.
        for target in &seeded {
            self.try_finalize(&target.identity);
        }
        self.publish_progress();

        while self.in_flight > 0 {
            let Some(event) = self.rx.recv().await else { break };
            match event {
                UnitEvent::Settled { unit, outcome } => self.on_settled(unit, outcome),
                UnitEvent::BackoffElapsed { unit } => self.on_backoff_elapsed(unit),
            }
            self.publish_progress();
        }

        (self.records, self.stats)
    }

    /// Enqueues every applicable module for `target` that has no unit
    /// yet. Re-invoked each time the target gains capabilities.
    fn schedule_ready(&mut self, target: &Arc<Target>) {
        if self.cancel.is_cancelled() {
            return;
        }
        let caps = self.aggregator.capabilities(target);
        let ready: Vec<_> = self.registry.applicable(&caps).cloned().collect();
        for module in ready {
            let key = (target.identity.clone(), module.descriptor().id.clone());
            if self.scheduled.contains(&key) {
                continue;
            }
            self.scheduled.insert(key);
            self.stats.units += 1;
            self.aggregator.unit_opened(target);
            self.dispatch(WorkUnit::new(target.clone(), module));
        }
    }

    fn dispatch(&mut self, unit: WorkUnit) {
        self.in_flight += 1;
        let ctx = UnitContext {
            aggregator: self.aggregator.clone(),
            cancel: self.cancel.clone(),
            global: self.global_slots.clone(),
            slots: self
                .module_slots
                .get(unit.module_id())
                .cloned()
                .unwrap_or_else(|| Arc::new(Semaphore::new(Semaphore::MAX_PERMITS))),
            limiter: self.limiters.get(unit.module_id()).cloned(),
            tx: self.tx.clone(),
        };
        tokio::spawn(run_unit(unit, ctx));
    }

    fn on_settled(&mut self, mut unit: WorkUnit, outcome: Result<ModuleOutput, ModuleError>) {
        self.in_flight -= 1;
        let identity = unit.target.identity.clone();

        // Late results arriving after cancellation are discarded whole;
        // the unit contract is all-or-nothing.
        let outcome = if self.cancel.is_cancelled() {
            Err(ModuleError::Cancelled)
        } else {
            outcome
        };

        match outcome {
            Ok(fields) => {
                unit.advance(UnitState::Succeeded);
                self.stats.succeeded += 1;
                let result = ModuleResult::new(unit.module_id(), fields);
                self.aggregator.merge(&unit.target, result);
                let target = unit.target.clone();
                self.schedule_ready(&target);
                self.aggregator.unit_settled(&unit.target);
                self.try_finalize(&identity);
            }
            Err(err) if matches!(err, ModuleError::Cancelled) => {
                unit.advance(UnitState::Cancelled);
                self.stats.cancelled += 1;
                self.aggregator.record_failure(
                    &unit.target,
                    TerminalFailure {
                        module: unit.module_id().to_string(),
                        kind: RetryCoordinator::classify(&err),
                        message: err.to_string(),
                        attempts: unit.attempt,
                    },
                );
                self.aggregator.unit_settled(&unit.target);
                self.try_finalize(&identity);
            }
            Err(err) if self.retry.should_retry(&err, unit.module.descriptor(), unit.attempt) => {
                let delay = self.retry.delay(unit.attempt);
                debug!(
                    "unit {}/{} failed ({err}), retry in {delay:?}",
                    identity,
                    unit.module_id()
                );
                unit.advance(UnitState::Failed);
                unit.advance(UnitState::Pending);
                unit.attempt += 1;
                self.stats.retries += 1;
                self.in_flight += 1;
                let cancel = self.cancel.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                    let _ = tx.send(UnitEvent::BackoffElapsed { unit });
                });
            }
            Err(err) => {
                unit.advance(UnitState::Failed);
                self.stats.failed += 1;
                self.aggregator.record_failure(
                    &unit.target,
                    TerminalFailure {
                        module: unit.module_id().to_string(),
                        kind: RetryCoordinator::classify(&err),
                        message: err.to_string(),
                        attempts: unit.attempt + 1,
                    },
                );
                self.aggregator.unit_settled(&unit.target);
                self.try_finalize(&identity);
            }
        }
    }

    fn on_backoff_elapsed(&mut self, mut unit: WorkUnit) {
        self.in_flight -= 1;
        if self.cancel.is_cancelled() {
            let identity = unit.target.identity.clone();
            unit.advance(UnitState::Cancelled);
            self.stats.cancelled += 1;
            self.aggregator.record_failure(
                &unit.target,
                TerminalFailure {
                    module: unit.module_id().to_string(),
                    kind: RetryCoordinator::classify(&ModuleError::Cancelled),
                    message: ModuleError::Cancelled.to_string(),
                    attempts: unit.attempt,
                },
            );
            self.aggregator.unit_settled(&unit.target);
            self.try_finalize(&identity);
            return;
        }
        self.dispatch(unit);
    }

    /// Seals the target's record once no unit for it remains open.
    fn try_finalize(&mut self, identity: &str) {
        if self.finalized.contains(identity) {
            return;
        }
        let Some(target) = self.targets.get(identity).cloned() else {
            return;
        };
        if self.aggregator.open_units(&target) > 0 {
            return;
        }
        let outcome = if self.cancel.is_cancelled() {
            RecordOutcome::Cancelled
        } else {
            RecordOutcome::Completed
        };
        match self.aggregator.finalize(&target, outcome) {
            Ok(record) => {
                self.finalized.insert(identity.to_string());
                self.records.push(record);
            }
            Err(err) => debug!("finalize {identity} refused: {err}"),
        }
    }

    fn publish_progress(&self) {
        let _ = self.progress.send(RunProgress {
            settled: self.stats.succeeded + self.stats.failed + self.stats.cancelled,
            total: self.stats.units,
            targets_done: self.records.len(),
            targets_total: self.targets.len(),
        });
    }
}

/// One unit execution: wait for permits and pacing, then race the
/// module against its deadline and the cancel token.
async fn run_unit(mut unit: WorkUnit, ctx: UnitContext) {
    let module = unit.module.clone();
    let descriptor = module.descriptor();

    // Module slot and pacing come first; the global permit is taken
    // last so a capped or throttled module never sits on pool capacity
    // it cannot use yet.
    let acquire = async {
        let slot = ctx.slots.clone().acquire_owned().await.ok()?;
        if let Some(limiter) = &ctx.limiter {
            limiter.acquire().await;
        }
        let global = ctx.global.clone().acquire_owned().await.ok()?;
        Some((slot, global))
    };
    let permits = tokio::select! {
        _ = ctx.cancel.cancelled() => None,
        permits = acquire => permits,
    };
    let Some(_permits) = permits else {
        let _ = ctx.tx.send(UnitEvent::Settled {
            unit,
            outcome: Err(ModuleError::Cancelled),
        });
        return;
    };
    if ctx.cancel.is_cancelled() {
        let _ = ctx.tx.send(UnitEvent::Settled {
            unit,
            outcome: Err(ModuleError::Cancelled),
        });
        return;
    }

    unit.advance(UnitState::Running);
    let view = TargetView::new(
        (*unit.target).clone(),
        ctx.aggregator.snapshot(&unit.target),
    );
    let outcome = tokio::select! {
        _ = ctx.cancel.cancelled() => Err(ModuleError::Cancelled),
        result = tokio::time::timeout(descriptor.timeout, module.execute(&view)) => {
            match result {
                Ok(inner) => inner,
                Err(_elapsed) => Err(ModuleError::Timeout(descriptor.timeout)),
            }
        }
    };
    let _ = ctx.tx.send(UnitEvent::Settled { unit, outcome });
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
