//! Checksum utilities for raw-file fingerprinting
//!
//! Every raw extract processed by an ingest run is fingerprinted so the run
//! report can tie results back to the exact bytes that produced them.

use crate::error::{JdpError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::io::Read;
use std::path::Path;

/// Checksum algorithm type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
            ChecksumAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

/// A computed fingerprint together with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub digest: String,
}

impl Checksum {
    /// Fingerprint an in-memory byte buffer with the default algorithm
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            algorithm: ChecksumAlgorithm::Sha256,
            digest: hex::encode(hasher.finalize()),
        }
    }

    /// Fingerprint a file on disk with the default algorithm
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let digest = compute_checksum(&mut file, ChecksumAlgorithm::Sha256)?;
        Ok(Self {
            algorithm: ChecksumAlgorithm::Sha256,
            digest,
        })
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

/// Compute checksum for any readable source
pub fn compute_checksum<R: Read>(reader: &mut R, algorithm: ChecksumAlgorithm) -> Result<String> {
    match algorithm {
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            let mut buffer = [0u8; 8192];

            loop {
                let bytes_read = reader.read(&mut buffer)?;
                if bytes_read == 0 {
                    break;
                }
                hasher.update(&buffer[..bytes_read]);
            }

            Ok(hex::encode(hasher.finalize()))
        },
        ChecksumAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            let mut buffer = [0u8; 8192];

            loop {
                let bytes_read = reader.read(&mut buffer)?;
                if bytes_read == 0 {
                    break;
                }
                hasher.update(&buffer[..bytes_read]);
            }

            Ok(hex::encode(hasher.finalize()))
        },
    }
}

/// Verify checksum for a file
pub fn verify_file_checksum(
    path: impl AsRef<Path>,
    expected: &str,
    algorithm: ChecksumAlgorithm,
) -> Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let actual = compute_checksum(&mut file, algorithm)?;
    if actual == expected {
        Ok(true)
    } else {
        Err(JdpError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
