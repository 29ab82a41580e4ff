//! Remote version manifest and the client that fetches it.
//!
//! The distribution server publishes one manifest describing the newest
//! package:
//!
//! ```json
//! {"version": "1.0.17", "timestamp": "2025-01-01T00:00:00+00:00",
//!  "filename": "nametag_v1.0.17.zip", "checksum": "<sha256 hex>",
//!  "size": 4096, "changelog": "Updated to version 1.0.17"}
//! ```

use crate::config::Config;
use crate::update::version::parse_version;
use crate::utils::errors::{Result, UpdateError};
use chrono::{DateTime, FixedOffset};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Metadata for one available version of the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateManifest {
    pub version: String,
    pub checksum: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub changelog: String,
}

/// Wire shape with every field optional, so a missing `version` or
/// `checksum` is reported as an unusable manifest rather than a JSON error.
#[derive(Deserialize)]
struct RawManifest {
    version: Option<String>,
    checksum: Option<String>,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    changelog: String,
}

impl UpdateManifest {
    /// Parse and validate a manifest document.
    pub fn from_json(body: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(body)
            .map_err(|e| UpdateError::Manifest(format!("malformed manifest: {e}")))?;

        let version = raw
            .version
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| UpdateError::Manifest("manifest has no version".into()))?;
        let checksum = raw
            .checksum
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| UpdateError::Manifest("manifest has no checksum".into()))?;

        let manifest = Self {
            version: version.trim().to_string(),
            checksum: checksum.trim().to_string(),
            filename: raw.filename,
            size: raw.size,
            timestamp: raw.timestamp,
            changelog: raw.changelog,
        };
        manifest.parsed_version()?;
        Ok(manifest)
    }

    pub fn parsed_version(&self) -> Result<Version> {
        parse_version(&self.version)
    }

    /// Publication time, when the timestamp is valid RFC 3339.
    pub fn published_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }
}

/// Fetches the manifest from `<server>/<check-endpoint>`. No retries here;
/// the scheduler's next interval is the retry.
#[derive(Debug, Clone)]
pub struct ManifestClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl ManifestClient {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            url: config.check_url(),
            timeout: config.timeout(),
        }
    }

    pub async fn fetch_manifest(&self) -> Result<UpdateManifest> {
        debug!(url = %self.url, "Fetching update manifest");

        let response = self
            .http
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpdateError::Network(format!("GET {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Network(format!("HTTP {status} from {}", self.url)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpdateError::Network(format!("failed to read manifest body: {e}")))?;

        let manifest = UpdateManifest::from_json(&body)?;
        info!(
            version = %manifest.version,
            filename = %manifest.filename,
            size = manifest.size,
            "Fetched update manifest"
        );
        Ok(manifest)
    }
}
