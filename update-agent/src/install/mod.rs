//! Applying packages to the live installation and restoring it from backups.

pub mod installer;
pub mod rollback;

pub use installer::Installer;
pub use rollback::RollbackManager;
