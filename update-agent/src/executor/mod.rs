//! Update cycle orchestration.
//!
//! One call to [`UpdateOrchestrator::run_cycle`] drives a full
//! check → download → verify → backup → apply sequence and always resolves
//! to an [`UpdateOutcome`]; errors never escape as panics or `Err`.
//! Filesystem-heavy stages run on the blocking pool so the async runtime
//! stays responsive, but stages still run strictly one after another.

pub mod state;

pub use state::{CycleState, UpdateOutcome};

use crate::backup::{BackupManager, BackupRecord};
use crate::config::Config;
use crate::install::{Installer, RollbackManager};
use crate::update::fetcher::{LocalPackage, PackageFetcher};
use crate::update::manifest::{ManifestClient, UpdateManifest};
use crate::update::version::{compare_versions, parse_version};
use crate::utils::errors::{Result, UpdateError};
use semver::Version;
use std::cmp::Ordering;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

pub struct UpdateOrchestrator {
    current_version: Version,
    manifests: ManifestClient,
    fetcher: PackageFetcher,
    backups: BackupManager,
    installer: Installer,
    temp_dir: PathBuf,
    state: CycleState,
}

impl UpdateOrchestrator {
    /// Build every component from one configuration value.
    ///
    /// Creates the home, backup and temp directories if they are missing.
    pub fn new(config: &Config) -> Result<Self> {
        config.ensure_directories()?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .user_agent(format!(
                "{}/{} ({})",
                config.app.name,
                config.app.current_version,
                env!("CARGO_PKG_NAME")
            ))
            .build()
            .map_err(|e| UpdateError::Network(format!("cannot build HTTP client: {e}")))?;

        let backups = BackupManager::new(config)?;
        let installer = Installer::new(backups.install_dir());

        Ok(Self {
            current_version: parse_version(&config.app.current_version)?,
            manifests: ManifestClient::new(config, http.clone()),
            fetcher: PackageFetcher::new(config, http),
            backups,
            installer,
            temp_dir: config.temp_dir(),
            state: CycleState::Idle,
        })
    }

    pub fn current_version(&self) -> &Version {
        &self.current_version
    }

    /// Terminal state of the most recent cycle (`Idle` before the first one).
    pub fn last_state(&self) -> CycleState {
        self.state
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Run one update attempt to a terminal state.
    pub async fn run_cycle(&mut self) -> UpdateOutcome {
        self.transition(CycleState::CheckingVersion);
        let (manifest, target) = match self.check_for_update().await {
            Ok(Some(found)) => found,
            Ok(None) => {
                self.transition(CycleState::NoUpdate);
                return UpdateOutcome::NoUpdateAvailable;
            }
            Err(e) => return self.abort(e),
        };

        info!(
            current = %self.current_version,
            available = %target,
            published = ?manifest.published_at(),
            changelog = %manifest.changelog,
            "Update available"
        );

        self.transition(CycleState::Downloading);
        let package = match self.fetcher.download(&manifest).await {
            Ok(package) => package,
            Err(e) => return self.abort(e),
        };

        self.transition(CycleState::Verifying);
        let package = match self.fetcher.verify(package, &manifest) {
            Ok(package) => package,
            Err(e) => return self.abort(e),
        };

        self.transition(CycleState::BackingUp);
        let backups = self.backups.clone();
        let backup = match run_blocking(move || backups.create_backup()).await {
            Ok(backup) => backup,
            Err(e) => {
                discard(package);
                return self.abort(e);
            }
        };

        self.transition(CycleState::Applying);
        let installer = self.installer.clone();
        let package_path = package.path().to_path_buf();
        if let Err(e) = run_blocking(move || installer.apply(&package_path)).await {
            discard(package);
            return self.recover(e, &backup).await;
        }

        self.transition(CycleState::CleaningUp);
        discard(package);
        self.cleanup().await;

        info!(from = %self.current_version, to = %target, "Update applied, restart required");
        UpdateOutcome::Applied(target)
    }

    /// Fetch the manifest and decide whether it offers a newer version.
    async fn check_for_update(&self) -> Result<Option<(UpdateManifest, Version)>> {
        let manifest = self.manifests.fetch_manifest().await?;
        let remote = manifest.parsed_version()?;

        match compare_versions(&remote, &self.current_version) {
            Ordering::Greater => Ok(Some((manifest, remote))),
            Ordering::Equal => {
                debug!(version = %self.current_version, "Already up to date");
                Ok(None)
            }
            Ordering::Less => {
                warn!(
                    current = %self.current_version,
                    remote = %remote,
                    "Server offers an older version, ignoring"
                );
                Ok(None)
            }
        }
    }

    /// Failure before any backup exists: nothing to undo.
    fn abort(&mut self, e: UpdateError) -> UpdateOutcome {
        let stage = self.state;
        self.transition(CycleState::Aborted);
        warn!(stage = %stage, error_kind = e.kind(), error = %e, "Update cycle aborted");
        UpdateOutcome::Failed(e)
    }

    /// Apply failed with a backup on disk: restore it, then report the apply error.
    async fn recover(&mut self, cause: UpdateError, backup: &BackupRecord) -> UpdateOutcome {
        error!(error_kind = cause.kind(), error = %cause, "Applying update failed");
        self.transition(CycleState::RollingBack);

        debug!(backup = %backup.path.display(), "Restoring from backup");
        let rollback = RollbackManager::new(
            self.installer.install_dir(),
            backup.path.clone(),
            backup.version.clone(),
        );

        match run_blocking(move || rollback.rollback()).await {
            Ok(_) => {
                self.transition(CycleState::RolledBack);
                UpdateOutcome::Failed(cause)
            }
            Err(rollback_error) => {
                self.transition(CycleState::RollbackFailed);
                error!(
                    error_kind = rollback_error.kind(),
                    error = %rollback_error,
                    "Rollback failed, installation may be inconsistent"
                );
                UpdateOutcome::Failed(UpdateError::RollbackFailed {
                    cause: Box::new(cause),
                    rollback: Box::new(rollback_error),
                })
            }
        }
    }

    /// Empty the scratch directory and apply backup retention. Errors are only logged.
    async fn cleanup(&self) {
        let temp_dir = self.temp_dir.clone();
        if let Err(e) = run_blocking(move || clear_dir(&temp_dir)).await {
            warn!(error = %e, "Failed to clear temp directory");
        }

        let backups = self.backups.clone();
        if let Err(e) = run_blocking(move || backups.evict_old_backups()).await {
            warn!(error = %e, "Backup eviction failed");
        }
    }

    fn transition(&mut self, next: CycleState) {
        debug!(from = %self.state, to = %next, "Update cycle state");
        self.state = next;
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| UpdateError::Io(std::io::Error::other(e)))?
}

fn discard(package: LocalPackage) {
    let path = package.path().to_path_buf();
    if let Err(e) = package.discard() {
        warn!(path = %path.display(), error = %e, "Failed to remove downloaded package");
    }
}

/// Remove everything inside `dir`, keeping `dir` itself.
fn clear_dir(dir: &std::path::Path) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}
