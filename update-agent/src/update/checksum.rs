//! SHA-256 digests for downloaded packages.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Read size used when hashing files from disk.
const HASH_BUFFER_SIZE: usize = 8192;

/// Computes the SHA-256 of a file as a lowercase hex string.
pub fn compute_sha256(file_path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(file_path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hex-encode a finished digest.
pub fn finish_hex(hasher: Sha256) -> String {
    hex::encode(hasher.finalize())
}

/// Case-insensitive comparison of two hex digests.
pub fn checksums_match(actual: &str, expected: &str) -> bool {
    actual.trim().eq_ignore_ascii_case(expected.trim())
}
