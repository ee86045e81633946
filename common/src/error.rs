//! Error taxonomy for the engine.
//!
//! Three tiers with different blast radii:
//! * [`TargetError`] — input-stage problems, recorded as warnings, never
//!   fatal to a run.
//! * [`ModuleError`] — one module execution against one target failed;
//!   isolated to that work unit.
//! * [`EngineError`] — setup or contract violations, fatal to the caller.

use std::time::Duration;

use thiserror::Error;

/// A raw target input that could not become scan targets.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid target '{input}': {reason}")]
    Invalid { input: String, reason: String },

    #[error("range '{input}' expands to {hosts} hosts, over the ceiling of {ceiling}")]
    RangeTooLarge {
        input: String,
        hosts: u64,
        ceiling: u64,
    },
}

/// Failure of a single module execution.
#[derive(Debug, Clone, Error)]
pub enum ModuleError {
    /// The module's deadline elapsed before it produced a result.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Something that may succeed on a later attempt (connection reset,
    /// flaky resolver, throttled upstream).
    #[error("{0}")]
    Transient(String),

    /// The module reported an unrecoverable condition for this target.
    #[error("{0}")]
    Fatal(String),

    /// The run was cancelled while this unit was pending or running.
    #[error("cancelled")]
    Cancelled,
}

impl ModuleError {
    /// Only transient failures and deadline overruns consume retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transient(_))
    }
}

/// Misuse of the engine API or a broken setup. Surfaced to the caller
/// before any scheduling happens, or as a panic-grade contract breach.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("module '{0}' is already registered")]
    DuplicateModule(String),

    #[error("target '{0}' still has work units in flight")]
    NotReady(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
