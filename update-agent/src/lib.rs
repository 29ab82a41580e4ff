//! Update Agent Library
//!
//! Self-update engine for an installed application: polls a distribution
//! server for a newer version, downloads and verifies the package, snapshots
//! the installation, overlays the package and rolls back on failure.

pub mod backup;
pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod install;
pub mod transfer;
pub mod update;
pub mod utils;

// Re-export commonly used types
pub use backup::{BackupManager, BackupRecord};
pub use config::Config;
pub use daemon::{Scheduler, SchedulerExit};
pub use executor::{CycleState, UpdateOrchestrator, UpdateOutcome};
pub use update::UpdateManifest;
pub use utils::errors::{Result, UpdateError};
