//! States and outcomes of one update cycle.

use crate::utils::errors::UpdateError;
use semver::Version;
use std::fmt;

/// Where a cycle currently is.
///
/// ```text
/// CheckingVersion -> NoUpdate
///                 -> Downloading -> Verifying -> BackingUp -> Applying -> CleaningUp
/// Downloading | Verifying | BackingUp           -> Aborted
/// Applying                                      -> RollingBack -> RolledBack | RollbackFailed
/// ```
///
/// `Aborted` covers every failure before a backup exists: nothing in the
/// installation was touched, so there is nothing to roll back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    CheckingVersion,
    NoUpdate,
    Aborted,
    Downloading,
    Verifying,
    BackingUp,
    Applying,
    CleaningUp,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

impl CycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::CheckingVersion => "checking_version",
            CycleState::NoUpdate => "no_update",
            CycleState::Aborted => "aborted",
            CycleState::Downloading => "downloading",
            CycleState::Verifying => "verifying",
            CycleState::BackingUp => "backing_up",
            CycleState::Applying => "applying",
            CycleState::CleaningUp => "cleaning_up",
            CycleState::RollingBack => "rolling_back",
            CycleState::RolledBack => "rolled_back",
            CycleState::RollbackFailed => "rollback_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CycleState::NoUpdate
                | CycleState::Aborted
                | CycleState::CleaningUp
                | CycleState::RolledBack
                | CycleState::RollbackFailed
        )
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one cycle, handed to the scheduler.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The new version is on disk; the host must restart to run it.
    Applied(Version),
    NoUpdateAvailable,
    Failed(UpdateError),
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }

    pub fn error(&self) -> Option<&UpdateError> {
        match self {
            UpdateOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}
