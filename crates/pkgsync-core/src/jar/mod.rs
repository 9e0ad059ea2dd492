//! Signed index archives (JAR v1 signature scheme).
//!
//! Verification chain, outermost first:
//!
//! ```text
//! META-INF/X.RSA  --signs-->  META-INF/X.SF  --digests-->  META-INF/MANIFEST.MF
//!                                                             --digests-->  payload
//! ```
//!
//! [`SignedIndexJar::open`] checks everything down to the manifest before it
//! returns. The payload digest can only be checked once the payload has been
//! read, which [`SignedIndexJar::read_payload`] does after the consumer is done
//! and before handing back its result.

pub mod manifest;
pub mod pkcs7;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use pkgsync_schema::{HashType, IncrementalHash};
use zip::ZipArchive;

use crate::error::{FormatError, SigningError, UpdateError};
use manifest::Manifest;

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// An index archive whose signer has been verified. The payload has not been
/// read yet.
pub struct SignedIndexJar {
    archive: ZipArchive<File>,
    payload_entry: String,
    payload_digest: (HashType, Vec<u8>),
    certificate: Vec<u8>,
}

impl std::fmt::Debug for SignedIndexJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedIndexJar")
            .field("payload_entry", &self.payload_entry)
            .field("certificate_len", &self.certificate.len())
            .finish_non_exhaustive()
    }
}

fn is_signature_block(name: &str) -> bool {
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if file.contains('/') {
        return false;
    }
    let upper = file.to_ascii_uppercase();
    upper.ends_with(".RSA") || upper.ends_with(".DSA") || upper.ends_with(".EC")
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Option<Vec<u8>>, UpdateError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

impl SignedIndexJar {
    /// Open `path` and verify its signer, signature file and manifest.
    pub fn open(path: &Path, payload_entry: &str) -> Result<Self, UpdateError> {
        let mut archive = ZipArchive::new(File::open(path)?)?;

        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        if !names.iter().any(|n| n == payload_entry) {
            return Err(FormatError::MissingEntry(payload_entry.to_string()).into());
        }

        let blocks: Vec<&String> = names.iter().filter(|n| is_signature_block(n)).collect();
        let block_name = match blocks.as_slice() {
            [] => return Err(SigningError::Unsigned.into()),
            [one] => one.as_str(),
            many => return Err(SigningError::MultipleSigners(many.len()).into()),
        };
        let stem = block_name
            .rsplit_once('.')
            .map_or(block_name, |(stem, _)| stem);
        let sf_name = format!("{stem}.SF");

        let block = read_entry(&mut archive, block_name)?
            .ok_or_else(|| FormatError::MissingEntry(block_name.to_string()))?;
        let sf_bytes = read_entry(&mut archive, &sf_name)?
            .ok_or_else(|| SigningError::MissingSignatureFile(block_name.to_string()))?;
        let manifest_bytes = read_entry(&mut archive, MANIFEST_PATH)?
            .ok_or_else(|| SigningError::Malformed(format!("missing {MANIFEST_PATH}")))?;

        let certificate = pkcs7::verify_signature_block(&block, &sf_bytes)?;
        tracing::debug!(block = block_name, "signature block verified");

        let signature_file = Manifest::parse(&sf_bytes)?;
        let manifest = Manifest::parse(&manifest_bytes)?;
        verify_signature_file(&signature_file, &manifest, &manifest_bytes, payload_entry)?;

        let payload_digest = manifest
            .entry(payload_entry)
            .map(|section| section.digest("-Digest"))
            .transpose()?
            .flatten()
            .ok_or_else(|| {
                SigningError::Malformed(format!("manifest has no digest for {payload_entry}"))
            })?;

        Ok(Self {
            archive,
            payload_entry: payload_entry.to_string(),
            payload_digest,
            certificate,
        })
    }

    /// DER of the single signing certificate.
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate
    }

    /// Stream the payload through `consume`, then check the payload digest.
    ///
    /// `consume` receives the reader and the uncompressed payload size. Bytes
    /// it leaves unread are drained so the digest always covers the whole
    /// entry. Its result is only returned if the digest matches.
    pub fn read_payload<T>(
        &mut self,
        consume: impl FnOnce(&mut dyn Read, u64) -> Result<T, UpdateError>,
    ) -> Result<T, UpdateError> {
        let entry = self.archive.by_name(&self.payload_entry)?;
        let size = entry.size();
        let mut reader = DigestingReader {
            inner: entry,
            state: self.payload_digest.0.hasher(),
        };

        // A consumer failure on tampered bytes must still report the tampering.
        let value = consume(&mut reader, size);
        io::copy(&mut reader, &mut io::sink())?;

        if reader.state.finalize() != self.payload_digest.1 {
            return Err(SigningError::DigestMismatch(self.payload_entry.clone()).into());
        }
        value
    }
}

/// The `.SF` must vouch for the manifest: either for the whole file or, for
/// signers that only list entries, for the payload's own section.
fn verify_signature_file(
    signature_file: &Manifest<'_>,
    manifest: &Manifest<'_>,
    manifest_bytes: &[u8],
    payload_entry: &str,
) -> Result<(), SigningError> {
    let main = signature_file
        .main()
        .ok_or_else(|| SigningError::Malformed("signature file has no main section".into()))?;

    if let Some((algorithm, expected)) = main.digest("-Digest-Manifest")? {
        if algorithm.digest(manifest_bytes) == expected {
            return Ok(());
        }
        tracing::debug!("whole-manifest digest stale, checking entry section");
    }

    let mismatch = || SigningError::DigestMismatch(MANIFEST_PATH.to_string());
    let (algorithm, expected) = signature_file
        .entry(payload_entry)
        .map(|section| section.digest("-Digest"))
        .transpose()?
        .flatten()
        .ok_or_else(mismatch)?;
    let section = manifest.entry(payload_entry).ok_or_else(mismatch)?;
    if algorithm.digest(section.raw()) != expected {
        return Err(mismatch());
    }
    Ok(())
}

struct DigestingReader<R> {
    inner: R,
    state: IncrementalHash,
}

impl<R: Read> Read for DigestingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.state.update(&buf[..n]);
        Ok(n)
    }
}
