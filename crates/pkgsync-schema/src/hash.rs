//! Digest and hex primitives.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use thiserror::Error;

/// Errors produced while hashing or decoding digests.
#[derive(Error, Debug)]
pub enum HashError {
    /// The input is not valid hexadecimal.
    #[error("Invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The algorithm name is not one we can compute.
    #[error("Unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    /// A fingerprint must be exactly 64 hex characters once separators are removed.
    #[error("Invalid fingerprint '{0}': expected 64 hex characters")]
    InvalidFingerprint(String),

    /// An encoded certificate decoded to zero bytes.
    #[error("Empty certificate")]
    EmptyCertificate,

    /// Reading the hashed file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Digest algorithms understood by the index formats and by signed archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    /// SHA-1. Only accepted where old signing tools still emit it.
    Sha1,
    /// SHA-256, the default for package hashes and fingerprints.
    #[default]
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashType {
    /// Canonical lowercase name, as written in index files (`sha256`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Name used as the attribute prefix in JAR manifests (`SHA-256-Digest`).
    pub fn jar_name(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Length of the raw digest in bytes.
    pub fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Compute the raw digest of `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Start an incremental digest.
    pub fn hasher(self) -> IncrementalHash {
        match self {
            Self::Sha1 => IncrementalHash::Sha1(Sha1::new()),
            Self::Sha256 => IncrementalHash::Sha256(Sha256::new()),
            Self::Sha384 => IncrementalHash::Sha384(Sha384::new()),
            Self::Sha512 => IncrementalHash::Sha512(Sha512::new()),
        }
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashType {
    type Err = HashError;

    /// Accepts both index spellings (`sha256`) and JAR spellings (`SHA-256`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Digest state for any [`HashType`].
#[derive(Debug, Clone)]
pub enum IncrementalHash {
    /// SHA-1 state.
    Sha1(Sha1),
    /// SHA-256 state.
    Sha256(Sha256),
    /// SHA-384 state.
    Sha384(Sha384),
    /// SHA-512 state.
    Sha512(Sha512),
}

impl IncrementalHash {
    /// Feed more bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    /// Consume the state and return the raw digest.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Lowercase hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex in either case. Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`HashError::InvalidHex`] on odd length or non-hex characters.
pub fn hex_decode(s: &str) -> Result<Vec<u8>, HashError> {
    Ok(hex::decode(s.trim())?)
}

/// Lowercase hex digest of `data`.
pub fn digest_hex(data: &[u8], algorithm: HashType) -> String {
    hex_encode(&algorithm.digest(data))
}

#[derive(Debug)]
enum Source {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// Hashes one input with one algorithm, computing the digest at most once.
///
/// The result is cached after the first successful call, so a file hasher
/// keeps answering even if the file is later removed.
#[derive(Debug)]
pub struct Hasher {
    source: Source,
    algorithm: HashType,
    cached: OnceLock<String>,
}

impl Hasher {
    /// Hash an in-memory buffer.
    pub fn for_bytes(bytes: impl Into<Vec<u8>>, algorithm: HashType) -> Self {
        Self {
            source: Source::Bytes(bytes.into()),
            algorithm,
            cached: OnceLock::new(),
        }
    }

    /// Hash a file, streamed in 64 KiB blocks.
    pub fn for_file(path: impl AsRef<Path>, algorithm: HashType) -> Self {
        Self {
            source: Source::File(path.as_ref().to_path_buf()),
            algorithm,
            cached: OnceLock::new(),
        }
    }

    /// The algorithm this hasher computes.
    pub fn algorithm(&self) -> HashType {
        self.algorithm
    }

    /// Lowercase hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Io`] if the file cannot be read.
    pub fn hash(&self) -> Result<&str, HashError> {
        if let Some(hash) = self.cached.get() {
            return Ok(hash);
        }
        let computed = match &self.source {
            Source::Bytes(bytes) => digest_hex(bytes, self.algorithm),
            Source::File(path) => {
                let mut file = File::open(path)?;
                let mut state = self.algorithm.hasher();
                let mut buf = vec![0u8; 64 * 1024];
                loop {
                    let n = file.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    state.update(&buf[..n]);
                }
                hex_encode(&state.finalize())
            }
        };
        Ok(self.cached.get_or_init(|| computed))
    }

    /// Case-insensitive comparison against an expected hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Io`] if the file cannot be read.
    pub fn matches(&self, expected: &str) -> Result<bool, HashError> {
        Ok(self.hash()?.eq_ignore_ascii_case(expected.trim()))
    }
}
