//! Overlay a verified package onto the installation directory.

use crate::fs::archive;
use crate::utils::errors::{Result, UpdateError};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Installer {
    install_dir: PathBuf,
}

impl Installer {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Extract every entry of `package` over the installation directory.
    ///
    /// Files missing from the package are kept. On error the entries already
    /// written stay in place; restoring the previous state is the caller's job.
    pub fn apply(&self, package: &Path) -> Result<usize> {
        info!(
            package = %package.display(),
            target = %self.install_dir.display(),
            "Applying update package"
        );

        let entries = archive::extract_over(package, &self.install_dir)
            .map_err(|e| UpdateError::Extraction(e.to_string()))?;

        info!(entries, "Update package applied");
        Ok(entries)
    }
}
