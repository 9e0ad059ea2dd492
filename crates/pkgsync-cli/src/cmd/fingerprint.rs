//! `pkgsync fingerprint`

use std::path::Path;

use anyhow::{Context as _, Result};
use pkgsync_core::jar::SignedIndexJar;
use pkgsync_core::{FormatError, UpdateError};
use pkgsync_schema::{Fingerprint, IndexFormat};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Print the SHA-256 fingerprint of a DER certificate, or of the certificate
/// that signed an index archive.
pub fn fingerprint(file: &Path) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let fingerprint = if bytes.starts_with(ZIP_MAGIC) {
        signer_of(file)?
    } else {
        Fingerprint::of_der(&bytes)
    };
    println!("{}", fingerprint.formatted());
    Ok(())
}

fn signer_of(file: &Path) -> Result<Fingerprint> {
    for format in [IndexFormat::V1Json, IndexFormat::LegacyXml] {
        match SignedIndexJar::open(file, format.payload_entry()) {
            Ok(jar) => return Ok(Fingerprint::of_der(jar.certificate_der())),
            Err(UpdateError::Format(FormatError::MissingEntry(_))) => {}
            Err(e) => {
                return Err(e).with_context(|| format!("{} is not a valid signed index", file.display()));
            }
        }
    }
    anyhow::bail!("{} contains no index payload", file.display())
}
