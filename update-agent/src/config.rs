//! Configuration management for the update agent.
//!
//! Loads configuration from an optional TOML file with environment variable
//! overrides (`UPDATER_<SECTION>__<KEY>`, e.g. `UPDATER_SERVER__URL`). The
//! resulting value is built once at startup and handed to every component.

use crate::utils::errors::{Result, UpdateError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "UPDATER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub server: ServerConfig,
    pub update: UpdateConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application identifier, used for the home directory and backup names
    pub name: String,

    /// Version of the installation that is currently running
    pub current_version: String,

    /// Live installation directory (default: directory of the running executable)
    pub install_dir: Option<PathBuf>,

    /// Per-application home holding `backups/` and `temp/` (default: `~/.<name>`)
    pub home_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the distribution server
    pub url: String,

    /// Path of the version manifest, relative to `url`
    pub check_endpoint: String,

    /// Path of the package download, relative to `url`
    pub download_endpoint: String,

    /// Timeout applied to each network call, in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Number of backup archives kept after eviction
    pub max_backup_count: usize,

    /// Verify the package SHA-256 against the manifest
    pub verify_checksums: bool,

    /// Pause between update cycles, in seconds
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "nametag".to_string(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            install_dir: None,
            home_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            check_endpoint: "/api/version".to_string(),
            download_endpoint: "/api/download".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            max_backup_count: 5,
            verify_checksums: true,
            check_interval_secs: 300,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| UpdateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file without environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| UpdateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| UpdateError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.app.name.trim().is_empty() {
            return Err(UpdateError::Config("app.name must not be empty".into()));
        }
        crate::update::version::parse_version(&self.app.current_version)?;
        if self.server.url.trim().is_empty() {
            return Err(UpdateError::Config("server.url must not be empty".into()));
        }
        if self.server.timeout_secs == 0 {
            return Err(UpdateError::Config("server.timeout_secs must be positive".into()));
        }
        if self.update.max_backup_count == 0 {
            return Err(UpdateError::Config(
                "update.max_backup_count must be at least 1".into(),
            ));
        }
        if self.update.check_interval_secs == 0 {
            return Err(UpdateError::Config(
                "update.check_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn home_dir(&self) -> PathBuf {
        match &self.app.home_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(format!(".{}", self.app.name)),
        }
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.home_dir().join("backups")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.home_dir().join("temp")
    }

    /// The live installation directory.
    pub fn install_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.app.install_dir {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe()?.canonicalize()?;
        exe.parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| UpdateError::Config(format!("{} has no parent directory", exe.display())))
    }

    /// Create the home, backup and temp directories if missing.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.home_dir(), self.backup_dir(), self.temp_dir()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn check_url(&self) -> String {
        join_url(&self.server.url, &self.server.check_endpoint)
    }

    pub fn download_url(&self) -> String {
        join_url(&self.server.url, &self.server.download_endpoint)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.update.check_interval_secs)
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
