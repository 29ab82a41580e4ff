//! ZIP archive creation and overlay extraction.
//!
//! Extraction overlays an archive onto an existing directory: entries
//! overwrite files at the same relative path and create what is missing,
//! while files absent from the archive are left alone. Each file is written
//! to a hidden sibling and renamed over its target, so a single file is
//! never half-written and a running executable can be replaced. The tree as
//! a whole is not swapped atomically: an error part-way leaves the entries
//! already written in place.

use crate::fs::walker::{walk_directory, WalkOptions};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Zip {
        context: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("refusing to extract unsafe path: {0}")]
    UnsafePath(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

fn io_err(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> ArchiveError {
    let context = context.into();
    move |source| ArchiveError::Io { context, source }
}

fn zip_err(context: impl Into<String>) -> impl FnOnce(zip::result::ZipError) -> ArchiveError {
    let context = context.into();
    move |source| ArchiveError::Zip { context, source }
}

/// Archive every entry under `source_dir` into a deflate ZIP at `archive_path`.
///
/// Subtrees in `exclude` are skipped. Returns the number of entries written.
pub fn create_zip(source_dir: &Path, archive_path: &Path, exclude: &[PathBuf]) -> Result<usize> {
    let options = WalkOptions {
        follow_links: false,
        include_dirs: true,
        exclude_paths: exclude.to_vec(),
    };
    let entries = walk_directory(source_dir, &options)
        .map_err(io_err(format!("Failed to walk {}", source_dir.display())))?;

    let file = File::create(archive_path)
        .map_err(io_err(format!("Failed to create archive {}", archive_path.display())))?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));

    for entry in &entries {
        let name = entry_name(&entry.relative_path);
        let mut options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        if let Some(mode) = entry.mode {
            options = options.unix_permissions(mode);
        }

        if entry.is_dir {
            zip.add_directory(name.as_str(), options)
                .map_err(zip_err(format!("Failed to add directory {name}")))?;
            continue;
        }

        zip.start_file(name.as_str(), options)
            .map_err(zip_err(format!("Failed to add file {name}")))?;
        let mut reader = BufReader::new(
            File::open(&entry.path)
                .map_err(io_err(format!("Failed to open {}", entry.path.display())))?,
        );
        std::io::copy(&mut reader, &mut zip)
            .map_err(io_err(format!("Failed to archive {}", entry.path.display())))?;
    }

    let writer = zip
        .finish()
        .map_err(zip_err(format!("Failed to finish {}", archive_path.display())))?;
    writer
        .into_inner()
        .map_err(|e| ArchiveError::Io {
            context: format!("Failed to flush {}", archive_path.display()),
            source: e.into_error(),
        })?
        .sync_all()
        .map_err(io_err(format!("Failed to sync {}", archive_path.display())))?;

    Ok(entries.len())
}

/// Extract every entry of `archive_path` over `dest_dir`.
///
/// Returns the number of entries extracted.
pub fn extract_over(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let file = File::open(archive_path)
        .map_err(io_err(format!("Failed to open archive {}", archive_path.display())))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(zip_err(format!("Failed to read ZIP archive {}", archive_path.display())))?;

    std::fs::create_dir_all(dest_dir)
        .map_err(io_err(format!("Failed to create directory {}", dest_dir.display())))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(zip_err(format!("Failed to read archive entry {i}")))?;

        let relative_path = entry
            .enclosed_name()
            .filter(|p| is_safe_relative(p))
            .ok_or_else(|| ArchiveError::UnsafePath(entry.name().to_string()))?;
        let output_path = dest_dir.join(&relative_path);

        if entry.is_dir() {
            std::fs::create_dir_all(&output_path).map_err(io_err(format!(
                "Failed to create directory {}",
                output_path.display()
            )))?;
            continue;
        }

        let parent = output_path.parent().unwrap_or(dest_dir);
        std::fs::create_dir_all(parent)
            .map_err(io_err(format!("Failed to create directory {}", parent.display())))?;

        let staging = staging_path(&output_path);
        let written = write_entry(&mut entry, &staging).and_then(|()| {
            if let Some(mode) = entry.unix_mode() {
                set_mode(&staging, mode)?;
            }
            std::fs::rename(&staging, &output_path)
        });
        if let Err(e) = written {
            let _ = std::fs::remove_file(&staging);
            return Err(ArchiveError::Io {
                context: format!("Failed to extract {}", output_path.display()),
                source: e,
            });
        }
    }

    Ok(archive.len())
}

/// List the file names stored in an archive.
pub fn list_entries(archive_path: &Path) -> Result<Vec<String>> {
    let file = File::open(archive_path)
        .map_err(io_err(format!("Failed to open archive {}", archive_path.display())))?;
    let archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(zip_err(format!("Failed to read ZIP archive {}", archive_path.display())))?;
    Ok(archive.file_names().map(str::to_string).collect())
}

fn write_entry<R: std::io::Read>(entry: &mut R, staging: &Path) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(staging)?);
    std::io::copy(entry, &mut out)?;
    out.into_inner().map_err(|e| e.into_error())?.sync_all()
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// `.name.extracting` next to the target.
fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.extracting"))
}

fn is_safe_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// ZIP entry names always use `/`.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
