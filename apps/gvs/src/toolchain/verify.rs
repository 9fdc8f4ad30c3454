//! SHA-256 checks for cached and downloaded archives.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::{GvsError, GvsResult};

/// Verifies that a file hashes to the expected digest.
///
/// The comparison ignores hex case.
///
/// # Errors
///
/// Returns `ChecksumMismatch` when the digests differ, or `Io` when the file
/// cannot be read.
pub fn verify_checksum(file_path: &Path, expected: &str) -> GvsResult<()> {
    let computed = compute_sha256(file_path)?;
    if !computed.eq_ignore_ascii_case(expected.trim()) {
        return Err(GvsError::checksum_mismatch(expected.to_lowercase(), computed));
    }
    Ok(())
}

/// Computes the lowercase hex SHA-256 of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn compute_sha256(file_path: &Path) -> GvsResult<String> {
    let mut file = std::fs::File::open(file_path).map_err(|e| {
        GvsError::io(
            format!("Failed to open file for checksum: {}", file_path.display()),
            e,
        )
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| {
            GvsError::io(
                format!("Failed to read file for checksum: {}", file_path.display()),
                e,
            )
        })?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Returns true when `value` looks like a SHA-256 hex digest.
#[must_use]
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
