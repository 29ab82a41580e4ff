//! Directory traversal for installation snapshots.
//!
//! Produces every file (and optionally directory) under a root, with paths
//! relative to that root and unix permission bits, skipping whole subtrees
//! listed in `exclude_paths`.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Report directories as well as files (keeps empty directories in snapshots)
    pub include_dirs: bool,

    /// Absolute subtrees to skip entirely
    pub exclude_paths: Vec<PathBuf>,
}

/// Information about an entry discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes (0 for directories)
    pub size: u64,

    /// Is this a directory?
    pub is_dir: bool,

    /// Unix permission bits, where the platform has them
    pub mode: Option<u32>,
}

impl FileInfo {
    /// Create FileInfo from a DirEntry.
    /// File symlinks are resolved and reported as regular files, so a snapshot
    /// stores a copy of the target. Symlinks to directories and broken
    /// symlinks yield `None`; nothing beneath them can be restored later.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        let metadata = if entry.path_is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_dir() => {
                    warn!(path = %path.display(), "Skipping symlinked directory");
                    return Ok(None);
                }
                Ok(resolved) => {
                    debug!(path = %path.display(), "Storing symlinked file as a copy");
                    resolved
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping broken symlink");
                    return Ok(None);
                }
            }
        } else {
            entry.metadata()?
        };

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode() & 0o7777)
        };

        #[cfg(not(unix))]
        let mode = None;

        Ok(Some(Self {
            path,
            relative_path,
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            is_dir: metadata.is_dir(),
            mode,
        }))
    }
}

/// Walk a directory tree and collect its entries, parents before children.
///
/// The root itself is never reported.
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry.path(), &options.exclude_paths));

    for entry in walker {
        let entry = entry?;

        if entry.file_type().is_dir() && !options.include_dirs {
            continue;
        }

        if let Some(file_info) = FileInfo::from_entry(&entry, root)? {
            files.push(file_info);
        }
    }

    Ok(files)
}

fn is_excluded(path: &Path, excluded: &[PathBuf]) -> bool {
    excluded.iter().any(|prefix| path.starts_with(prefix))
}
