//! # Result Aggregator
//!
//! Builds one canonical record per target out of heterogeneous module
//! outputs. Each record sits behind its own mutex, so merges for
//! different targets never contend; the scheduler serializes nothing
//! here beyond the per-record lock.
//!
//! Conflict policy: a field holds one contribution per module. Values
//! from different modules are retained side by side; a module that
//! re-emits a field within the same run (a retried unit's later
//! success, or a duplicate delivery) replaces its own prior value, which
//! keeps merging idempotent.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use sondr_common::error::EngineError;
use sondr_common::module::{FieldValue, ModuleResult};
use sondr_common::network::target::Target;
use sondr_common::record::{
    FieldContribution, Provenance, RecordOutcome, TargetRecord, TerminalFailure,
};

struct RecordState {
    target: Target,
    fields: BTreeMap<String, Vec<FieldContribution>>,
    contributions: Vec<Provenance>,
    failures: Vec<TerminalFailure>,
    /// Units scheduled for this target that have not settled yet.
    open_units: usize,
    finalized: bool,
}

impl RecordState {
    fn new(target: Target) -> Self {
        Self {
            target,
            fields: BTreeMap::new(),
            contributions: Vec::new(),
            failures: Vec::new(),
            open_units: 0,
            finalized: false,
        }
    }
}

#[derive(Default)]
pub struct Aggregator {
    records: Mutex<HashMap<String, Arc<Mutex<RecordState>>>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a target before any of its units exist.
    pub fn admit(&self, target: &Target) {
        let mut records = self.records.lock().unwrap();
        records
            .entry(target.identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(RecordState::new(target.clone()))));
    }

    fn entry(&self, target: &Target) -> Arc<Mutex<RecordState>> {
        let mut records = self.records.lock().unwrap();
        records
            .entry(target.identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(RecordState::new(target.clone()))))
            .clone()
    }

    /// A unit for `target` entered the schedule.
    pub fn unit_opened(&self, target: &Target) {
        let entry = self.entry(target);
        let mut state = entry.lock().unwrap();
        state.open_units += 1;
    }

    /// A unit for `target` reached a terminal state.
    pub fn unit_settled(&self, target: &Target) {
        let entry = self.entry(target);
        let mut state = entry.lock().unwrap();
        debug_assert!(state.open_units > 0, "settled more units than opened");
        state.open_units = state.open_units.saturating_sub(1);
    }

    pub fn open_units(&self, target: &Target) -> usize {
        let entry = self.entry(target);
        let state = entry.lock().unwrap();
        state.open_units
    }

    /// Merges one successful module result into the target's record.
    pub fn merge(&self, target: &Target, result: ModuleResult) {
        let entry = self.entry(target);
        let mut state = entry.lock().unwrap();

        for (name, value) in result.fields {
            let contributions = state.fields.entry(name).or_default();
            match contributions
                .iter_mut()
                .find(|c| c.module == result.module)
            {
                Some(existing) => {
                    existing.value = value;
                    existing.recorded_at = result.recorded_at;
                }
                None => contributions.push(FieldContribution {
                    module: result.module.clone(),
                    value,
                    recorded_at: result.recorded_at,
                }),
            }
        }

        match state
            .contributions
            .iter_mut()
            .find(|p| p.module == result.module)
        {
            Some(existing) => existing.recorded_at = result.recorded_at,
            None => state.contributions.push(Provenance {
                module: result.module.clone(),
                recorded_at: result.recorded_at,
            }),
        }
    }

    /// Attaches a terminal failure to the target's record.
    pub fn record_failure(&self, target: &Target, failure: TerminalFailure) {
        let entry = self.entry(target);
        let mut state = entry.lock().unwrap();
        state.failures.push(failure);
    }

    /// The target's current capability set: its seed capabilities plus
    /// every field name merged so far.
    pub fn capabilities(&self, target: &Target) -> BTreeSet<String> {
        let entry = self.entry(target);
        let state = entry.lock().unwrap();
        let mut caps = state.target.seed_capabilities();
        caps.extend(state.fields.keys().cloned());
        caps
    }

    /// Snapshot of the merged fields, for a module execution's view.
    pub fn snapshot(&self, target: &Target) -> BTreeMap<String, Vec<FieldValue>> {
        let entry = self.entry(target);
        let state = entry.lock().unwrap();
        state
            .fields
            .iter()
            .map(|(name, contributions)| {
                let values = contributions.iter().map(|c| c.value.clone()).collect();
                (name.clone(), values)
            })
            .collect()
    }

    /// Seals the record. Errors while any unit for the target is still
    /// open; the scheduler calls this exactly once per target.
    pub fn finalize(
        &self,
        target: &Target,
        outcome: RecordOutcome,
    ) -> Result<TargetRecord, EngineError> {
        let entry = self.entry(target);
        let mut state = entry.lock().unwrap();
        if state.open_units > 0 || state.finalized {
            return Err(EngineError::NotReady(target.identity.clone()));
        }
        state.finalized = true;
        Ok(TargetRecord {
            target: state.target.clone(),
            fields: state.fields.clone(),
            contributions: state.contributions.clone(),
            failures: state.failures.clone(),
            outcome,
        })
    }
}
