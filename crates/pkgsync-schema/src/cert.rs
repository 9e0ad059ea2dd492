//! Certificate identities.
//!
//! Two encodings of the same certificate exist and must not be mixed up:
//!
//! - [`CertificateHex`]: lowercase hex of the full DER bytes. This is what a
//!   repo stores as its signing certificate and what is compared on every
//!   update.
//! - [`Fingerprint`]: uppercase SHA-256 of the DER bytes. This is what a user
//!   reads, types or scans from a QR code.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::{HashError, HashType, hex_decode, hex_encode};

/// Hex encoding of a DER certificate; the storage and comparison key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateHex(String);

impl CertificateHex {
    /// Encode raw DER bytes.
    pub fn from_der(der: &[u8]) -> Self {
        Self(hex_encode(der))
    }

    /// Parse a stored or transmitted hex string, normalizing it to lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidHex`] for malformed input and
    /// [`HashError::EmptyCertificate`] if it decodes to nothing.
    pub fn parse(s: &str) -> Result<Self, HashError> {
        let der = hex_decode(s)?;
        if der.is_empty() {
            return Err(HashError::EmptyCertificate);
        }
        Ok(Self::from_der(&der))
    }

    /// The lowercase hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode back to DER.
    ///
    /// # Errors
    ///
    /// Only fails if the value was built from corrupt storage.
    pub fn to_der(&self) -> Result<Vec<u8>, HashError> {
        hex_decode(&self.0)
    }

    /// Human-facing fingerprint of the same certificate.
    ///
    /// # Errors
    ///
    /// See [`CertificateHex::to_der`].
    pub fn fingerprint(&self) -> Result<Fingerprint, HashError> {
        Ok(Fingerprint::of_der(&self.to_der()?))
    }
}

impl fmt::Display for CertificateHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CertificateHex {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Uppercase SHA-256 of a DER certificate, without separators.
///
/// Deserialization goes through [`Fingerprint::parse`], so configuration
/// files may use any accepted spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of raw DER bytes.
    pub fn of_der(der: &[u8]) -> Self {
        Self(hex_encode(&HashType::Sha256.digest(der)).to_ascii_uppercase())
    }

    /// Parse user input. Whitespace and `:` separators are dropped and case is
    /// ignored, so `ab:cd:...` and `AB CD ...` are both accepted.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidFingerprint`] unless exactly 64 hex
    /// characters remain.
    pub fn parse(s: &str) -> Result<Self, HashError> {
        let cleaned: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        if cleaned.len() != 64 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidFingerprint(s.to_string()));
        }
        Ok(Self(cleaned.to_ascii_uppercase()))
    }

    /// The 64-character uppercase form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive equality against another fingerprint string.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }

    /// Whether these DER bytes hash to this fingerprint.
    pub fn matches_der(&self, der: &[u8]) -> bool {
        self.matches(Self::of_der(der).as_str())
    }

    /// Space-separated byte pairs (`AB CD EF ...`), for display and QR codes.
    pub fn formatted(&self) -> String {
        self.0
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = HashError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_hex_normalizes_case() {
        let cert = CertificateHex::parse("3082ABCD").unwrap();
        assert_eq!(cert.as_str(), "3082abcd");
        assert_eq!(cert.to_der().unwrap(), vec![0x30, 0x82, 0xab, 0xcd]);
    }

    #[test]
    fn certificate_hex_rejects_empty() {
        assert!(matches!(
            CertificateHex::parse("  "),
            Err(HashError::EmptyCertificate)
        ));
    }

    #[test]
    fn fingerprint_is_uppercase_sha256() {
        let fp = Fingerprint::of_der(b"hello world");
        assert_eq!(
            fp.as_str(),
            "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"
        );
        assert!(fp.matches("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"));
        assert!(fp.matches_der(b"hello world"));
        assert!(!fp.matches_der(b"hello world!"));
    }

    #[test]
    fn fingerprint_parse_strips_separators() {
        let spaced = "b9 4d 27 b9 93 4d 3e 08 a5 2e 52 d7 da 7d ab fa \
                      c4 84 ef e3 7a 53 80 ee 90 88 f7 ac e2 ef cd e9";
        let fp = Fingerprint::parse(spaced).unwrap();
        assert_eq!(fp, Fingerprint::of_der(b"hello world"));

        let coloned = fp.formatted().replace(' ', ":");
        assert_eq!(Fingerprint::parse(&coloned).unwrap(), fp);

        assert!(Fingerprint::parse("abcd").is_err());
        assert!(Fingerprint::parse(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn fingerprint_and_storage_key_differ() {
        let der = b"not really a certificate";
        let hex = CertificateHex::from_der(der);
        let fp = hex.fingerprint().unwrap();
        assert_ne!(hex.as_str().to_ascii_uppercase(), fp.as_str());
        assert_eq!(fp, Fingerprint::of_der(der));
    }

    #[test]
    fn formatted_groups_pairs() {
        let fp = Fingerprint::of_der(b"hello world");
        let formatted = fp.formatted();
        assert!(formatted.starts_with("B9 4D 27"));
        assert_eq!(formatted.split(' ').count(), 32);
    }
}
