//! Aggregated per-target results.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use crate::module::FieldValue;
use crate::network::target::Target;

/// One module's value for one field.
#[derive(Debug, Clone)]
pub struct FieldContribution {
    pub module: String,
    pub value: FieldValue,
    pub recorded_at: SystemTime,
}

/// A module that contributed to a record, in first-merge order.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub module: String,
    pub recorded_at: SystemTime,
}

/// Terminal classification of a failed work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retries exhausted on a retryable error.
    Transient,
    /// The module reported an unrecoverable condition.
    Fatal,
    /// The run was cancelled before the unit could finish.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Fatal => f.write_str("fatal"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A work unit that settled without a merged result.
#[derive(Debug, Clone)]
pub struct TerminalFailure {
    pub module: String,
    pub kind: FailureKind,
    pub message: String,
    /// Executions completed when the unit settled.
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Every unit for the target settled normally.
    Completed,
    /// The run was cancelled before the target finished.
    Cancelled,
}

/// The canonical per-target result. Built incrementally by the
/// aggregator, immutable once finalized.
///
/// A field key maps to one contribution per module: different modules
/// observing the same field sit side by side, while a module re-emitting
/// a field within a run replaces its own earlier value.
#[derive(Debug, Clone)]
pub struct TargetRecord {
    pub target: Target,
    pub fields: BTreeMap<String, Vec<FieldContribution>>,
    pub contributions: Vec<Provenance>,
    pub failures: Vec<TerminalFailure>,
    pub outcome: RecordOutcome,
}

impl TargetRecord {
    /// True when no module produced any field for this target.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
