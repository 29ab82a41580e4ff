//! Package download and integrity verification.
//!
//! The package is streamed to `temp/update_<version>.zip` and hashed on the
//! way through, so verification needs no second read of the file. Any
//! failure removes the scratch file before returning.

use crate::config::Config;
use crate::transfer::progress::{format_bytes, format_speed, DownloadProgress};
use crate::update::checksum::{checksums_match, finish_hex};
use crate::update::manifest::UpdateManifest;
use crate::utils::errors::{Result, UpdateError};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Write buffer size; bounds memory held per download.
const DOWNLOAD_CHUNK_SIZE: usize = 8192;

/// Downloaded bytes for one candidate version, waiting in scratch storage.
#[derive(Debug)]
pub struct LocalPackage {
    path: PathBuf,
    sha256: String,
}

impl LocalPackage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercase hex SHA-256 of the downloaded bytes.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Delete the scratch file. A file that is already gone is not an error.
    pub fn discard(self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PackageFetcher {
    http: reqwest::Client,
    url: String,
    temp_dir: PathBuf,
    timeout: Duration,
    verify_checksums: bool,
}

impl PackageFetcher {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            url: config.download_url(),
            temp_dir: config.temp_dir(),
            timeout: config.timeout(),
            verify_checksums: config.update.verify_checksums,
        }
    }

    /// Scratch file for a version; distinct versions never collide.
    pub fn package_path(&self, version: &str) -> PathBuf {
        self.temp_dir.join(format!("update_{version}.zip"))
    }

    /// Download then verify.
    pub async fn fetch(&self, manifest: &UpdateManifest) -> Result<LocalPackage> {
        let package = self.download(manifest).await?;
        self.verify(package, manifest)
    }

    /// Stream the package to scratch storage.
    pub async fn download(&self, manifest: &UpdateManifest) -> Result<LocalPackage> {
        let dest = self.package_path(&manifest.version);

        tokio::fs::create_dir_all(&self.temp_dir).await.map_err(|e| {
            UpdateError::Download(format!("cannot create {}: {e}", self.temp_dir.display()))
        })?;

        info!(
            version = %manifest.version,
            filename = %manifest.filename,
            url = %self.url,
            "Downloading update package"
        );

        match self.stream_to_file(&dest).await {
            Ok((size, sha256)) => {
                if manifest.size > 0 && manifest.size != size {
                    warn!(
                        expected = manifest.size,
                        actual = size,
                        "Downloaded size differs from manifest"
                    );
                }
                Ok(LocalPackage { path: dest, sha256 })
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&dest).await;
                Err(e)
            }
        }
    }

    /// Compare the package digest with the manifest. A mismatch deletes the file.
    pub fn verify(&self, package: LocalPackage, manifest: &UpdateManifest) -> Result<LocalPackage> {
        if !self.verify_checksums {
            debug!("Checksum verification disabled, skipping");
            return Ok(package);
        }

        if checksums_match(&package.sha256, &manifest.checksum) {
            info!(sha256 = %package.sha256, "Package checksum verified");
            return Ok(package);
        }

        let error = UpdateError::Checksum {
            file: package.path.display().to_string(),
            expected: manifest.checksum.to_lowercase(),
            actual: package.sha256.clone(),
        };
        if let Err(e) = package.discard() {
            warn!(error = %e, "Failed to remove package after checksum mismatch");
        }
        Err(error)
    }

    async fn stream_to_file(&self, dest: &Path) -> Result<(u64, String)> {
        let response = tokio::time::timeout(self.timeout, self.http.get(&self.url).send())
            .await
            .map_err(|_| {
                UpdateError::Download(format!("timed out connecting to {}", self.url))
            })?
            .map_err(|e| UpdateError::Download(format!("GET {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Download(format!("HTTP {status} from {}", self.url)));
        }

        let file = tokio::fs::File::create(dest).await.map_err(|e| {
            UpdateError::Download(format!("cannot create {}: {e}", dest.display()))
        })?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);

        let mut progress = DownloadProgress::new(response.content_length());
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::time::timeout(self.timeout, stream.next())
                .await
                .map_err(|_| {
                    UpdateError::Download(format!(
                        "no data received for {}s from {}",
                        self.timeout.as_secs(),
                        self.url
                    ))
                })?;

            let Some(chunk) = next else { break };
            let chunk = chunk
                .map_err(|e| UpdateError::Download(format!("failed to read chunk: {e}")))?;

            hasher.update(&chunk);
            writer.write_all(&chunk).await.map_err(|e| {
                UpdateError::Download(format!("failed to write {}: {e}", dest.display()))
            })?;

            if let Some(snapshot) = progress.advance(chunk.len() as u64) {
                match snapshot.percent {
                    Some(percent) => info!(
                        "Download progress: {:.1}% ({}, {})",
                        percent,
                        format_bytes(snapshot.downloaded),
                        format_speed(snapshot.bytes_per_second)
                    ),
                    None => info!(
                        "Download progress: {} ({})",
                        format_bytes(snapshot.downloaded),
                        format_speed(snapshot.bytes_per_second)
                    ),
                }
            }
        }

        writer.flush().await.map_err(|e| {
            UpdateError::Download(format!("failed to flush {}: {e}", dest.display()))
        })?;
        writer.into_inner().sync_all().await.map_err(|e| {
            UpdateError::Download(format!("failed to sync {}: {e}", dest.display()))
        })?;

        info!(
            bytes = progress.downloaded(),
            elapsed_ms = progress.elapsed().as_millis() as u64,
            "Download complete"
        );
        Ok((progress.downloaded(), finish_hex(hasher)))
    }
}
