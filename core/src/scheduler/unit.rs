//! Work-unit state machine.

use std::sync::Arc;

use sondr_common::module::ReconModule;
use sondr_common::network::target::Target;

/// Lifecycle of one (target, module) pairing.
///
/// `Pending → Running → {Succeeded | Failed}`; a failed unit with
/// remaining retry budget re-enters `Pending` with its attempt count
/// incremented. `Cancelled` is reachable from `Pending` or `Running`
/// only through run-level cancellation. Terminal states never move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl UnitState {
    pub fn can_transition(self, next: UnitState) -> bool {
        matches!(
            (self, next),
            (UnitState::Pending, UnitState::Running)
                | (UnitState::Pending, UnitState::Cancelled)
                | (UnitState::Running, UnitState::Succeeded)
                | (UnitState::Running, UnitState::Failed)
                | (UnitState::Running, UnitState::Cancelled)
                | (UnitState::Failed, UnitState::Pending)
        )
    }
}

/// A schedulable (target, module) pairing with its attempt count.
pub struct WorkUnit {
    pub target: Arc<Target>,
    pub module: Arc<dyn ReconModule>,
    /// Failures so far; a retried unit keeps its identity and counts up.
    pub attempt: u32,
    pub state: UnitState,
}

impl WorkUnit {
    pub fn new(target: Arc<Target>, module: Arc<dyn ReconModule>) -> Self {
        Self {
            target,
            module,
            attempt: 0,
            state: UnitState::Pending,
        }
    }

    pub fn module_id(&self) -> &str {
        &self.module.descriptor().id
    }

    /// Moves to `next`, enforcing monotonic transitions.
    pub fn advance(&mut self, next: UnitState) {
        debug_assert!(
            self.state.can_transition(next),
            "illegal unit transition {:?} -> {next:?}",
            self.state
        );
        self.state = next;
    }
}
