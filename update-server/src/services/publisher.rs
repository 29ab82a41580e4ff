//! Package authoring: archive a release tree and publish it as the latest version.

use crate::services::release_store::{ReleaseStore, LATEST_MANIFEST, LATEST_PACKAGE};
use anyhow::{bail, Context};
use semver::Version;
use std::path::{Path, PathBuf};
use update_agent::fs::archive;
use update_agent::update::checksum::compute_sha256;
use update_agent::update::version::{bump_patch, compare_versions, parse_version};
use update_agent::{BackupManager, UpdateManifest};

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub source: PathBuf,
    pub app_name: String,
    /// Exact version to publish
    pub version: Option<Version>,
    /// Publish the next patch after this version
    pub bump_from: Option<Version>,
    pub changelog: Option<String>,
    /// Agent config inside `source`, relative path, stamped with the new version
    pub config_file: Option<PathBuf>,
}

/// Pick the version to publish: explicit, bumped from `--bump-from`, or the
/// patch after the currently published manifest (`0.1.0` when there is none).
pub async fn next_version(store: &ReleaseStore, request: &PublishRequest) -> anyhow::Result<Version> {
    let published = store
        .latest_manifest()
        .await?
        .map(|m| parse_version(&m.version))
        .transpose()?;

    let version = match (&request.version, &request.bump_from, &published) {
        (Some(explicit), _, _) => explicit.clone(),
        (None, Some(base), _) => bump_patch(base),
        (None, None, Some(current)) => bump_patch(current),
        (None, None, None) => Version::new(0, 1, 0),
    };

    if let Some(current) = &published {
        if compare_versions(&version, current).is_le() {
            bail!("version {version} is not newer than published {current}");
        }
    }
    Ok(version)
}

/// Archive `request.source`, write its manifests and move the `latest` pointers.
pub async fn publish(store: &ReleaseStore, request: &PublishRequest) -> anyhow::Result<UpdateManifest> {
    if !request.source.is_dir() {
        bail!("source {} is not a directory", request.source.display());
    }

    let version = next_version(store, request).await?;
    if let Some(rel) = &request.config_file {
        stamp_config(&request.source.join(rel), &version).await?;
    }

    let dir = store.dir().to_path_buf();
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let filename = BackupManager::archive_name(&request.app_name, &version.to_string());
    let package = dir.join(&filename);
    let source = request.source.clone();
    let exclude = vec![dir.canonicalize().unwrap_or_else(|_| dir.clone())];

    let (entries, checksum, size) = tokio::task::spawn_blocking({
        let package = package.clone();
        move || -> anyhow::Result<(usize, String, u64)> {
            let source = source.canonicalize()?;
            let entries = archive::create_zip(&source, &package, &exclude)?;
            let checksum = compute_sha256(&package)?;
            let size = std::fs::metadata(&package)?.len();
            Ok((entries, checksum, size))
        }
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;

    let manifest = UpdateManifest {
        version: version.to_string(),
        checksum,
        filename: filename.clone(),
        size,
        timestamp: chrono::Utc::now().to_rfc3339(),
        changelog: request
            .changelog
            .clone()
            .unwrap_or_else(|| format!("Updated to version {version}")),
    };

    let manifest_name = format!("manifest_v{version}.json");
    let body = serde_json::to_string_pretty(&manifest)?;
    tokio::fs::write(dir.join(&manifest_name), &body)
        .await
        .with_context(|| format!("writing {manifest_name}"))?;

    point_latest(&dir, LATEST_MANIFEST, &manifest_name)?;
    point_latest(&dir, LATEST_PACKAGE, &filename)?;

    tracing::info!(
        version = %manifest.version,
        entries,
        size,
        checksum = %manifest.checksum,
        "Published {}",
        filename
    );
    Ok(manifest)
}

/// Set `app.current_version` in the agent config so the installed agent
/// reports the version it was shipped as. Other keys are kept.
async fn stamp_config(path: &Path, version: &Version) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading agent config {}", path.display()))?;
    let mut table: toml::Table = content
        .parse()
        .with_context(|| format!("parsing agent config {}", path.display()))?;

    let app = table
        .entry("app")
        .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    let Some(app) = app.as_table_mut() else {
        bail!("[app] in {} is not a table", path.display());
    };
    app.insert(
        "current_version".to_string(),
        toml::Value::String(version.to_string()),
    );

    tokio::fs::write(path, toml::to_string_pretty(&table)?)
        .await
        .with_context(|| format!("writing agent config {}", path.display()))?;
    tracing::debug!(path = %path.display(), %version, "Stamped agent config");
    Ok(())
}

/// Replace `dir/link` with a pointer to `dir/target`.
#[cfg(unix)]
fn point_latest(dir: &Path, link: &str, target: &str) -> anyhow::Result<()> {
    let link_path = dir.join(link);
    remove_if_present(&link_path)?;
    std::os::unix::fs::symlink(target, &link_path)
        .with_context(|| format!("linking {} -> {target}", link_path.display()))
}

#[cfg(not(unix))]
fn point_latest(dir: &Path, link: &str, target: &str) -> anyhow::Result<()> {
    let link_path = dir.join(link);
    remove_if_present(&link_path)?;
    std::fs::copy(dir.join(target), &link_path)
        .with_context(|| format!("copying {target} to {}", link_path.display()))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            Err(e).with_context(|| format!("removing {}", path.display()))
        }
        _ => Ok(()),
    }
}
