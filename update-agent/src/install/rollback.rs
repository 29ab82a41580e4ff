//! Restore the installation from the backup taken before an update.

use crate::fs::archive;
use crate::utils::errors::{Result, UpdateError};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Restores one specific backup over the installation directory.
#[derive(Debug, Clone)]
pub struct RollbackManager {
    install_dir: PathBuf,
    backup_path: PathBuf,
    version: String,
}

impl RollbackManager {
    pub fn new(
        install_dir: impl Into<PathBuf>,
        backup_path: impl Into<PathBuf>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            install_dir: install_dir.into(),
            backup_path: backup_path.into(),
            version: version.into(),
        }
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Overlay the backup onto the installation directory.
    ///
    /// Every file the backup holds is restored. Files the failed update
    /// added, which the backup never contained, are left behind.
    pub fn rollback(&self) -> Result<usize> {
        if !self.backup_path.is_file() {
            return Err(UpdateError::NoBackup {
                version: self.version.clone(),
                path: self.backup_path.display().to_string(),
            });
        }

        warn!(
            version = %self.version,
            backup = %self.backup_path.display(),
            "Rolling back installation"
        );

        let entries = archive::extract_over(&self.backup_path, &self.install_dir)
            .map_err(|e| UpdateError::Extraction(format!("restoring backup: {e}")))?;

        info!(entries, version = %self.version, "Rollback complete");
        Ok(entries)
    }
}
