//! Transfer helpers shared by the package fetcher.

pub mod progress;
