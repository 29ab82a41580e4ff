//! Versioned snapshots of the installation directory.
//!
//! One archive per running version, named `<app>_v<version>.zip` inside the
//! backup directory. Snapshotting the same version again replaces its slot.
//! Retention keeps the `max_backups` most recently modified archives,
//! regardless of which versions they hold.

use crate::config::Config;
use crate::fs::archive;
use crate::utils::errors::{Result, UpdateError};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// One backup archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub version: String,
    pub modified: SystemTime,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    app_name: String,
    current_version: String,
    install_dir: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
    exclude: Vec<PathBuf>,
}

impl BackupManager {
    /// Creates the home, backup and temp directories if missing.
    pub fn new(config: &Config) -> Result<Self> {
        config.ensure_directories()?;

        // Walked paths and exclusions must agree on symlinks, or a home
        // reached through a link inside the install dir gets snapshotted
        let install_dir = canonical(config.install_dir()?);
        let backup_dir = config.backup_dir();
        let exclude = vec![canonical(backup_dir.clone()), canonical(config.temp_dir())];

        Ok(Self {
            app_name: config.app.name.clone(),
            current_version: config.app.current_version.clone(),
            install_dir,
            backup_dir,
            max_backups: config.update.max_backup_count,
            exclude,
        })
    }

    pub fn archive_name(app_name: &str, version: &str) -> String {
        format!("{app_name}_v{version}.zip")
    }

    /// Slot for the currently running version.
    pub fn current_backup_path(&self) -> PathBuf {
        self.backup_dir
            .join(Self::archive_name(&self.app_name, &self.current_version))
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Snapshot the installation directory for the running version.
    pub fn create_backup(&self) -> Result<BackupRecord> {
        std::fs::create_dir_all(&self.backup_dir).map_err(|e| {
            UpdateError::Backup(format!("cannot create {}: {e}", self.backup_dir.display()))
        })?;

        let target = self.current_backup_path();
        let partial = target.with_extension("zip.partial");
        info!(
            version = %self.current_version,
            path = %target.display(),
            source = %self.install_dir.display(),
            "Creating backup"
        );

        let entries = match archive::create_zip(&self.install_dir, &partial, &self.exclude) {
            Ok(entries) => entries,
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                return Err(UpdateError::Backup(e.to_string()));
            }
        };

        std::fs::rename(&partial, &target).map_err(|e| {
            let _ = std::fs::remove_file(&partial);
            UpdateError::Backup(format!("cannot move backup into {}: {e}", target.display()))
        })?;

        let modified = std::fs::metadata(&target)
            .and_then(|m| m.modified())
            .map_err(|e| UpdateError::Backup(format!("cannot stat {}: {e}", target.display())))?;

        info!(entries, path = %target.display(), "Backup created");
        Ok(BackupRecord {
            path: target,
            version: self.current_version.clone(),
            modified,
        })
    }

    /// All archives matching the naming convention, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        let read_dir = match std::fs::read_dir(&self.backup_dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{}_v", self.app_name);
        let mut backups: Vec<BackupRecord> = read_dir
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let version = name.strip_prefix(&prefix)?.strip_suffix(".zip")?.to_string();
                let modified = e
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(UNIX_EPOCH);
                Some(BackupRecord {
                    path: e.path(),
                    version,
                    modified,
                })
            })
            .collect();

        backups.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
        Ok(backups)
    }

    /// Delete every backup beyond the `max_backups` most recent.
    /// Returns the removed paths.
    pub fn evict_old_backups(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();

        for old in self.list_backups()?.into_iter().skip(self.max_backups) {
            match std::fs::remove_file(&old.path) {
                Ok(()) => {
                    info!(path = %old.path.display(), version = %old.version, "Removed old backup");
                    removed.push(old.path);
                }
                Err(e) => warn!(path = %old.path.display(), error = %e, "Failed to remove old backup"),
            }
        }

        debug!(removed = removed.len(), kept = self.max_backups, "Backup eviction finished");
        Ok(removed)
    }
}

/// Resolve symlinks; a path that does not exist yet is kept as given.
fn canonical(path: PathBuf) -> PathBuf {
    path.canonicalize().unwrap_or(path)
}
