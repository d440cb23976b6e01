//! # Hash Module
//!
//! Content digests for the provenance pipeline: build-step op digests, the
//! digest of a serialized in-toto statement, and the blobs written into a
//! content store. Digests are hex strings; [`digest_string`] renders the
//! OCI `"<alg>:<hex>"` form used by descriptors and step inputs.
//!
//! ## Examples
//!
//! ```
//! use buildprov::hash::{calculate_hash, digest_string, DigestAlgorithm};
//!
//! let hash = calculate_hash(b"Hello, World!");
//! assert_eq!(hash.len(), 64); // SHA-256 produces 64 hex characters
//!
//! let digest = digest_string(b"Hello, World!", DigestAlgorithm::Sha256);
//! assert!(digest.starts_with("sha256:"));
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;

/// Digest algorithms used for content addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of the hex encoding of a digest produced by this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha384 => 96,
            DigestAlgorithm::Sha512 => 128,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calculate the SHA-256 hash of the given data as a hex string.
///
/// For other algorithms, use [`calculate_hash_with_algorithm`].
pub fn calculate_hash(data: &[u8]) -> String {
    calculate_hash_with_algorithm(data, DigestAlgorithm::Sha256)
}

/// Calculate the hash of data using the specified algorithm
///
/// # Examples
///
/// ```
/// use buildprov::hash::{calculate_hash_with_algorithm, DigestAlgorithm};
///
/// let data = b"Hello, World!";
/// assert_eq!(calculate_hash_with_algorithm(data, DigestAlgorithm::Sha256).len(), 64);
/// assert_eq!(calculate_hash_with_algorithm(data, DigestAlgorithm::Sha384).len(), 96);
/// assert_eq!(calculate_hash_with_algorithm(data, DigestAlgorithm::Sha512).len(), 128);
/// ```
pub fn calculate_hash_with_algorithm(data: &[u8], algorithm: DigestAlgorithm) -> String {
    match algorithm {
        DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        DigestAlgorithm::Sha384 => hex::encode(Sha384::digest(data)),
        DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
    }
}

/// Hash `data` and render it in the OCI `"<alg>:<hex>"` form.
pub fn digest_string(data: &[u8], algorithm: DigestAlgorithm) -> String {
    format!(
        "{}:{}",
        algorithm.as_str(),
        calculate_hash_with_algorithm(data, algorithm)
    )
}

/// Split an OCI digest string into its algorithm and validated hex part.
///
/// ```
/// use buildprov::hash::{parse_digest, DigestAlgorithm};
///
/// let digest = format!("sha256:{}", "a".repeat(64));
/// let (alg, hex) = parse_digest(&digest).unwrap();
/// assert_eq!(alg, DigestAlgorithm::Sha256);
/// assert_eq!(hex.len(), 64);
/// assert!(parse_digest("sha256:zz").is_err());
/// ```
pub fn parse_digest(digest: &str) -> Result<(DigestAlgorithm, &str)> {
    let (alg, encoded) = digest
        .split_once(':')
        .ok_or_else(|| Error::Validation(format!("digest '{digest}' has no algorithm")))?;
    let algorithm = parse_algorithm(alg)?;

    if encoded.len() != algorithm.hex_len() {
        return Err(Error::Validation(format!(
            "digest '{digest}' has invalid length for {algorithm}"
        )));
    }
    hex::decode(encoded)?;

    Ok((algorithm, encoded))
}

/// Parse an algorithm name
pub fn parse_algorithm(s: &str) -> Result<DigestAlgorithm> {
    match s.to_lowercase().as_str() {
        "sha256" => Ok(DigestAlgorithm::Sha256),
        "sha384" => Ok(DigestAlgorithm::Sha384),
        "sha512" => Ok(DigestAlgorithm::Sha512),
        _ => Err(Error::Validation(format!("Invalid hash algorithm: {s}"))),
    }
}
