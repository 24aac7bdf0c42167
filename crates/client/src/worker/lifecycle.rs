//! Worker lifecycle state machine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use folio_core::Error;

/// Lifecycle phases of a cache worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Configured, nothing precached yet
    #[default]
    Parsed,
    /// Precache manifest being fetched
    Installing,
    /// Precache written, waiting to activate
    Installed,
    /// Stale partitions being removed
    Activating,
    /// Cleanup done, clients claimed
    Activated,
}

impl WorkerState {
    /// Whether an install may start from this phase.
    pub fn can_install(&self) -> bool {
        matches!(self, WorkerState::Parsed | WorkerState::Installed | WorkerState::Activated)
    }

    /// Whether an activation may start from this phase.
    pub fn can_activate(&self) -> bool {
        matches!(self, WorkerState::Installed | WorkerState::Activated)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
        }
    }
}

/// Snapshot of the lifecycle flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Lifecycle {
    pub phase: WorkerState,
    /// Activation may proceed without waiting for old clients.
    pub skip_waiting: bool,
    /// Worker has claimed the existing clients.
    pub controlling: bool,
    /// Phase to return to if the running install fails.
    #[serde(skip)]
    previous: Option<WorkerState>,
}

impl Lifecycle {
    pub(crate) fn begin_install(&mut self) -> Result<(), Error> {
        if !self.phase.can_install() {
            return Err(Error::InvalidInput(format!("cannot install while {}", self.phase)));
        }
        self.previous = Some(self.phase);
        self.transition(WorkerState::Installing);
        Ok(())
    }

    pub(crate) fn complete_install(&mut self) {
        self.previous = None;
        self.skip_waiting = true;
        self.transition(WorkerState::Installed);
    }

    /// The previous version keeps serving.
    pub(crate) fn fail_install(&mut self) {
        let previous = self.previous.take().unwrap_or_default();
        self.transition(previous);
    }

    pub(crate) fn begin_activate(&mut self) -> Result<(), Error> {
        if !self.phase.can_activate() {
            return Err(Error::InvalidInput(format!("cannot activate while {}", self.phase)));
        }
        self.transition(WorkerState::Activating);
        Ok(())
    }

    pub(crate) fn complete_activate(&mut self) {
        self.controlling = true;
        self.transition(WorkerState::Activated);
    }

    /// Cleanup failed part way; the precache is still in place.
    pub(crate) fn fail_activate(&mut self) {
        self.transition(WorkerState::Installed);
    }

    pub(crate) fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    /// Installed and allowed to take over without waiting.
    pub fn ready_to_activate(&self) -> bool {
        self.phase == WorkerState::Installed && self.skip_waiting
    }

    fn transition(&mut self, next: WorkerState) {
        tracing::debug!(from = %self.phase, to = %next, "worker state change");
        self.phase = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut lc = Lifecycle::default();
        assert_eq!(lc.phase, WorkerState::Parsed);

        lc.begin_install().unwrap();
        assert_eq!(lc.phase, WorkerState::Installing);
        lc.complete_install();
        assert!(lc.ready_to_activate());

        lc.begin_activate().unwrap();
        assert_eq!(lc.phase, WorkerState::Activating);
        lc.complete_activate();
        assert_eq!(lc.phase, WorkerState::Activated);
        assert!(lc.controlling);
        assert!(!lc.ready_to_activate());
    }

    #[test]
    fn test_failed_install_reverts() {
        let mut lc = Lifecycle::default();
        lc.begin_install().unwrap();
        lc.fail_install();
        assert_eq!(lc.phase, WorkerState::Parsed);
        assert!(!lc.skip_waiting);
    }

    #[test]
    fn test_failed_reinstall_keeps_serving() {
        let mut lc = Lifecycle::default();
        lc.begin_install().unwrap();
        lc.complete_install();
        lc.begin_activate().unwrap();
        lc.complete_activate();

        lc.begin_install().unwrap();
        lc.fail_install();
        assert_eq!(lc.phase, WorkerState::Activated);
        assert!(lc.controlling);
    }

    #[test]
    fn test_rejects_out_of_order() {
        let mut lc = Lifecycle::default();
        assert!(matches!(lc.begin_activate(), Err(Error::InvalidInput(_))));

        lc.begin_install().unwrap();
        assert!(lc.begin_install().is_err());
        assert!(lc.begin_activate().is_err());
    }

    #[test]
    fn test_skip_waiting_message() {
        let mut lc = Lifecycle::default();
        lc.skip_waiting();
        assert!(lc.skip_waiting);
        assert!(!lc.ready_to_activate());
    }

    #[test]
    fn test_display() {
        assert_eq!(WorkerState::Installing.to_string(), "installing");
        assert_eq!(WorkerState::Activated.to_string(), "activated");
    }
}
