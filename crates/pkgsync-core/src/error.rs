//! Error taxonomy for a repo update.
//!
//! Every stage has its own error type; [`UpdateError`] is their union and
//! [`RepoUpdateError`] is what leaves the per-repo boundary.

use std::fmt;

use pkgsync_schema::{HashError, Repo, RepoId};
use thiserror::Error;

pub use crate::io::download::DownloadError;

/// The archive or the index inside it could not be read.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Archive has no '{0}' entry")]
    MissingEntry(String),

    #[error("XML error: {0}")]
    Xml(#[from] xml::reader::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Index has no repo header")]
    MissingHeader,

    #[error("Invalid value for '{field}': {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// Anything wrong with who signed the index. Always fatal.
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Index archive is not signed")]
    Unsigned,

    #[error("Index archive has {0} signers, expected exactly one")]
    MultipleSigners(usize),

    #[error("Signer carries {0} certificates, expected exactly one")]
    CertificateChain(usize),

    #[error("No signature file matching {0}")]
    MissingSignatureFile(String),

    #[error("Malformed signature data: {0}")]
    Malformed(String),

    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signature does not verify")]
    BadSignature,

    #[error("Digest mismatch for {0}")]
    DigestMismatch(String),

    #[error("Certificate fingerprint {actual} does not match expected {expected}")]
    FingerprintMismatch { expected: String, actual: String },

    #[error("Signing certificate differs from the one pinned for this repo")]
    CertificateChanged,

    #[error("Index header does not carry the signing certificate")]
    MissingHeaderCertificate,

    #[error("Certificate in the index header does not match the archive signer")]
    HeaderCertificateMismatch,
}

impl From<der::Error> for SigningError {
    fn from(e: der::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

impl From<HashError> for SigningError {
    fn from(e: HashError) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Failure reported by a [`CatalogStore`](crate::CatalogStore).
#[derive(Error, Debug)]
#[error("Store error: {0}")]
pub struct StoreError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    /// Wrap any store backend error.
    pub fn new(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(e.into())
    }
}

/// Why a single update failed.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error(transparent)]
    Network(#[from] DownloadError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("Index timestamp {found} is older than the stored {current}, refusing possible replay")]
    Replay { current: i64, found: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Update cancelled")]
    Cancelled,
}

impl From<zip::result::ZipError> for UpdateError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Format(e.into())
    }
}

/// Coarse classification of an [`UpdateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Format,
    Signing,
    Replay,
    Store,
    Io,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Format => "format",
            Self::Signing => "signing",
            Self::Replay => "replay",
            Self::Store => "store",
            Self::Io => "io",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl UpdateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Format(_) => ErrorKind::Format,
            Self::Signing(_) => ErrorKind::Signing,
            Self::Replay { .. } => ErrorKind::Replay,
            Self::Store(_) => ErrorKind::Store,
            Self::Io(_) => ErrorKind::Io,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// A failed update, tagged with the repo it belongs to.
#[derive(Error, Debug)]
#[error("{address}: {message}")]
pub struct RepoUpdateError {
    pub repo_id: RepoId,
    pub address: String,
    pub message: String,
    #[source]
    pub cause: UpdateError,
}

impl RepoUpdateError {
    pub fn new(repo: &Repo, cause: UpdateError) -> Self {
        Self {
            repo_id: repo.id,
            address: repo.address.clone(),
            message: cause.to_string(),
            cause,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }
}
