//! Read side of the updates directory.
//!
//! `latest_manifest.json` names the newest package; `latest.zip` is the
//! fallback when the manifest is missing or points at a file that is gone.

use anyhow::Context;
use std::path::{Path, PathBuf};
use update_agent::UpdateManifest;

pub const LATEST_MANIFEST: &str = "latest_manifest.json";
pub const LATEST_PACKAGE: &str = "latest.zip";

#[derive(Debug, Clone)]
pub struct ReleaseStore {
    dir: PathBuf,
}

impl ReleaseStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The published manifest, or `None` if nothing has been published yet.
    pub async fn latest_manifest(&self) -> anyhow::Result<Option<UpdateManifest>> {
        let path = self.dir.join(LATEST_MANIFEST);
        let body = match tokio::fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        let manifest = UpdateManifest::from_json(&body)
            .with_context(|| format!("invalid manifest {}", path.display()))?;
        Ok(Some(manifest))
    }

    /// Package file to serve for downloads.
    pub async fn latest_package(&self) -> Option<PathBuf> {
        if let Ok(Some(manifest)) = self.latest_manifest().await {
            if let Some(path) = self.package_path(&manifest.filename) {
                if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
                    return Some(path);
                }
            }
            tracing::warn!(filename = %manifest.filename, "Manifest package missing, trying {}", LATEST_PACKAGE);
        }

        let fallback = self.dir.join(LATEST_PACKAGE);
        tokio::fs::metadata(&fallback)
            .await
            .is_ok_and(|m| m.is_file())
            .then_some(fallback)
    }

    /// Resolve a bare filename inside the updates directory.
    fn package_path(&self, filename: &str) -> Option<PathBuf> {
        let name = Path::new(filename).file_name()?;
        (name == filename).then(|| self.dir.join(name))
    }
}
