//! Checksum verification for downloaded files.
//!
//! Providers may attach a checksum to the content they resolve. Only SHA-256 is
//! understood; it may be given as 64 hex characters, optionally prefixed with
//! `sha256:`.
//!
//! # Examples
//!
//! ```rust
//! use haul::download::hash::{detect_hash_type, HashType};
//!
//! let empty = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
//! assert_eq!(detect_hash_type(empty), Some(HashType::Sha256));
//! assert_eq!(detect_hash_type("invalid"), None);
//! ```

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Supported hash types for file verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    Sha256,
}

/// Detect hash type based on the hash string format.
pub fn detect_hash_type(hash: &str) -> Option<HashType> {
    let digest = strip_prefix(hash);
    if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(HashType::Sha256)
    } else {
        None
    }
}

/// Computes the lowercase hex SHA-256 of a file.
pub fn sha256_file(file_path: &Path) -> io::Result<String> {
    let mut file = File::open(file_path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verify hash of a local file against an expected hash.
///
/// * `Ok(true)` if hashes match or no hash is provided
/// * `Ok(false)` if the file doesn't exist, the hash format is unknown or hashes differ
/// * `Err` if the file cannot be read
pub fn verify_hash(file_path: &Path, expected_hash: Option<&str>) -> io::Result<bool> {
    let Some(expected_hash) = expected_hash else {
        return Ok(true);
    };

    if !file_path.exists() {
        return Ok(false);
    }

    match detect_hash_type(expected_hash) {
        Some(HashType::Sha256) => {
            let calculated = sha256_file(file_path)?;
            Ok(calculated.eq_ignore_ascii_case(strip_prefix(expected_hash)))
        }
        None => Ok(false),
    }
}

fn strip_prefix(hash: &str) -> &str {
    let hash = hash.trim();
    hash.strip_prefix("sha256:").unwrap_or(hash)
}
