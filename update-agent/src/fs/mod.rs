//! Filesystem helpers: directory walking and ZIP archives.

pub mod archive;
pub mod walker;
