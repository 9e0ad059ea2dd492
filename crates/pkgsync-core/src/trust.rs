//! Signing-certificate trust policy.
//!
//! A repo is either unpinned (no stored certificate) or pinned. The first
//! accepted certificate is stored and every later index must be signed by
//! exactly that certificate. On first contact the certificate is checked
//! against an expected fingerprint when one is known, from the user or from
//! the [`TrustAnchors`] list, and otherwise accepted as-is (trust on first
//! use). That last path offers no protection against an attacker present on
//! first contact; it is kept because existing users depend on it.

use pkgsync_schema::{CertificateHex, Fingerprint, Repo};
use serde::{Deserialize, Serialize};

use crate::error::SigningError;

const FDROID_FINGERPRINT: &str = "43238D512C1E5EB2D6569F4A3AFBF5523418B82E0A3ED1552770ABB9A9C9CCAB";

/// A repo address with the fingerprint its index must be signed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAnchor {
    pub address: String,
    pub fingerprint: Fingerprint,
}

/// Versioned list of well-known repos and their fingerprints.
///
/// Replaceable at runtime (see [`TrustAnchors::newest`]) so a configuration
/// file, or a test, can supply its own anchors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAnchors {
    #[serde(default)]
    pub version: u32,
    #[serde(default, rename = "anchor")]
    pub anchors: Vec<TrustAnchor>,
}

fn normalize(address: &str) -> &str {
    address.trim().trim_end_matches('/')
}

impl TrustAnchors {
    /// Anchors compiled into the binary.
    pub fn builtin() -> Self {
        let fingerprint = Fingerprint::parse(FDROID_FINGERPRINT).ok();
        let anchors = ["https://f-droid.org/repo", "https://f-droid.org/archive"]
            .into_iter()
            .filter_map(|address| {
                Some(TrustAnchor {
                    address: address.to_string(),
                    fingerprint: fingerprint.clone()?,
                })
            })
            .collect();
        Self {
            version: 1,
            anchors,
        }
    }

    /// Whichever list has the higher version; `other` wins a tie.
    pub fn newest(self, other: Self) -> Self {
        if other.version >= self.version {
            other
        } else {
            self
        }
    }

    /// Expected fingerprint for `address`, if it is a known repo.
    pub fn pin_for(&self, address: &str) -> Option<&Fingerprint> {
        let address = normalize(address);
        self.anchors
            .iter()
            .find(|a| normalize(&a.address).eq_ignore_ascii_case(address))
            .map(|a| &a.fingerprint)
    }
}

/// Decide whether the archive certificate `der` may sign `repo`'s index.
///
/// Returns the certificate to store when this is the repo's first accepted
/// certificate, `None` when it matches the one already pinned.
pub fn verify_certificate(
    repo: &Repo,
    anchors: &TrustAnchors,
    der: &[u8],
) -> Result<Option<CertificateHex>, SigningError> {
    let certificate = CertificateHex::from_der(der);

    if let Some(stored) = &repo.signing_certificate {
        if *stored == certificate {
            return Ok(None);
        }
        tracing::error!(repo = %repo.address, "signing certificate changed");
        return Err(SigningError::CertificateChanged);
    }

    let expected = repo
        .fingerprint
        .as_ref()
        .or_else(|| anchors.pin_for(&repo.address));

    match expected {
        Some(expected) => {
            let actual = Fingerprint::of_der(der);
            if !expected.matches(actual.as_str()) {
                return Err(SigningError::FingerprintMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
            tracing::info!(repo = %repo.address, fingerprint = %actual, "pinning verified certificate");
        }
        None => {
            tracing::warn!(
                repo = %repo.address,
                fingerprint = %Fingerprint::of_der(der),
                "no fingerprint to check against, trusting certificate on first use"
            );
        }
    }
    Ok(Some(certificate))
}

/// Legacy XML indexes repeat the signing certificate in their header; it
/// must be present and agree with the archive signer.
pub fn verify_header_certificate(pubkey: Option<&str>, der: &[u8]) -> Result<(), SigningError> {
    let pubkey = pubkey
        .filter(|p| !p.trim().is_empty())
        .ok_or(SigningError::MissingHeaderCertificate)?;
    let header = CertificateHex::parse(pubkey).map_err(|_| SigningError::HeaderCertificateMismatch)?;
    if header != CertificateHex::from_der(der) {
        return Err(SigningError::HeaderCertificateMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgsync_schema::RepoId;

    const DER_A: &[u8] = b"certificate a";
    const DER_B: &[u8] = b"certificate b";

    fn repo() -> Repo {
        Repo::new(RepoId(1), "https://repo.example.org/fdroid/repo")
    }

    #[test]
    fn first_use_without_fingerprint_stores_certificate() {
        let stored = verify_certificate(&repo(), &TrustAnchors::default(), DER_A).unwrap();
        assert_eq!(stored, Some(CertificateHex::from_der(DER_A)));
    }

    #[test]
    fn pinned_certificate_must_match_exactly() {
        let mut repo = repo();
        repo.signing_certificate = Some(CertificateHex::from_der(DER_A));

        assert_eq!(verify_certificate(&repo, &TrustAnchors::default(), DER_A).unwrap(), None);
        assert!(matches!(
            verify_certificate(&repo, &TrustAnchors::default(), DER_B),
            Err(SigningError::CertificateChanged)
        ));
    }

    #[test]
    fn user_fingerprint_is_enforced_case_insensitively() {
        let mut repo = repo();
        let lower = Fingerprint::of_der(DER_A).as_str().to_ascii_lowercase();
        repo.fingerprint = Some(Fingerprint::parse(&lower).unwrap());

        let stored = verify_certificate(&repo, &TrustAnchors::default(), DER_A).unwrap();
        assert_eq!(stored, Some(CertificateHex::from_der(DER_A)));

        assert!(matches!(
            verify_certificate(&repo, &TrustAnchors::default(), DER_B),
            Err(SigningError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn anchors_apply_to_known_addresses() {
        let anchors = TrustAnchors {
            version: 2,
            anchors: vec![TrustAnchor {
                address: "https://repo.example.org/fdroid/repo/".into(),
                fingerprint: Fingerprint::of_der(DER_A),
            }],
        };
        assert!(verify_certificate(&repo(), &anchors, DER_A).unwrap().is_some());
        assert!(verify_certificate(&repo(), &anchors, DER_B).is_err());
    }

    #[test]
    fn newest_anchor_list_wins() {
        let custom = TrustAnchors {
            version: 5,
            anchors: Vec::new(),
        };
        assert_eq!(TrustAnchors::builtin().newest(custom.clone()), custom);
        let old = TrustAnchors {
            version: 0,
            anchors: Vec::new(),
        };
        assert_eq!(TrustAnchors::builtin().newest(old), TrustAnchors::builtin());
        assert!(TrustAnchors::builtin().pin_for("https://f-droid.org/repo/").is_some());
    }

    #[test]
    fn anchors_parse_from_toml() {
        let anchors: TrustAnchors = toml::from_str(
            r#"
            version = 3
            [[anchor]]
            address = "https://repo.example.org/fdroid/repo"
            fingerprint = "b9:4d:27:b9:93:4d:3e:08:a5:2e:52:d7:da:7d:ab:fa:c4:84:ef:e3:7a:53:80:ee:90:88:f7:ac:e2:ef:cd:e9"
            "#,
        )
        .unwrap();
        assert_eq!(anchors.version, 3);
        assert_eq!(
            anchors.pin_for("https://repo.example.org/fdroid/repo"),
            Some(&Fingerprint::of_der(b"hello world"))
        );
    }

    #[test]
    fn header_certificate_must_be_present_and_equal() {
        let hex_a = CertificateHex::from_der(DER_A);
        assert!(verify_header_certificate(Some(hex_a.as_str().to_uppercase().as_str()), DER_A).is_ok());
        assert!(matches!(
            verify_header_certificate(None, DER_A),
            Err(SigningError::MissingHeaderCertificate)
        ));
        assert!(matches!(
            verify_header_certificate(Some(hex_a.as_str()), DER_B),
            Err(SigningError::HeaderCertificateMismatch)
        ));
    }
}
