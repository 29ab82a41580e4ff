//! Remote side of an update: manifest, version ordering, package download.

pub mod checksum;
pub mod fetcher;
pub mod manifest;
pub mod version;

pub use fetcher::{LocalPackage, PackageFetcher};
pub use manifest::{ManifestClient, UpdateManifest};
