//! Detached CMS (PKCS#7) signature blocks, the `.RSA`/`.EC`/`.DSA` entries.

use std::borrow::Cow;

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::{ObjectIdentifier, OctetString};
use der::{Decode, Encode};
use pkgsync_schema::HashType;
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use x509_cert::Certificate;

use crate::error::SigningError;

const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
const ID_SUBJECT_KEY_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");

const ID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const ID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const ID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
const ID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const CURVE_P256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const CURVE_P384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// Verifies `block` as a detached signature over `signed_content` and
/// returns the DER of its only certificate.
///
/// Exactly one certificate and one signer are accepted; anything else is
/// ambiguous and rejected rather than resolved.
pub fn verify_signature_block(
    block: &[u8],
    signed_content: &[u8],
) -> Result<Vec<u8>, SigningError> {
    let info = ContentInfo::from_der(block)?;
    if info.content_type != ID_SIGNED_DATA {
        return Err(SigningError::Malformed(format!(
            "expected SignedData, found content type {}",
            info.content_type
        )));
    }
    let signed = SignedData::from_der(&info.content.to_der()?)?;

    let certificates: Vec<&CertificateChoices> = signed
        .certificates
        .as_ref()
        .map(|set| set.0.iter().collect())
        .unwrap_or_default();
    let [choice] = certificates.as_slice() else {
        return Err(SigningError::CertificateChain(certificates.len()));
    };
    let CertificateChoices::Certificate(certificate) = choice else {
        return Err(SigningError::Malformed(
            "signature block carries a non-X.509 certificate".to_string(),
        ));
    };

    let signers: Vec<&SignerInfo> = signed.signer_infos.0.iter().collect();
    let [signer] = signers.as_slice() else {
        return Err(SigningError::MultipleSigners(signers.len()));
    };

    if !signer_matches(&signer.sid, certificate)? {
        return Err(SigningError::Malformed(
            "signer does not reference the enclosed certificate".to_string(),
        ));
    }

    let digest = digest_algorithm(&signer.digest_alg.oid)?;
    let message: Cow<'_, [u8]> = match &signer.signed_attrs {
        Some(attrs) => {
            let expected = attrs
                .iter()
                .find(|attr| attr.oid == ID_MESSAGE_DIGEST)
                .and_then(|attr| attr.values.iter().next())
                .ok_or_else(|| {
                    SigningError::Malformed("signed attributes lack messageDigest".to_string())
                })?;
            if expected.value() != digest.digest(signed_content).as_slice() {
                return Err(SigningError::DigestMismatch("signature file".to_string()));
            }
            Cow::Owned(attrs.to_der()?)
        }
        None => Cow::Borrowed(signed_content),
    };

    let spki = &certificate.tbs_certificate.subject_public_key_info;
    let algorithm = verification_algorithm(signer, certificate, digest)?;
    let public_key = spki.subject_public_key.as_bytes().ok_or_else(|| {
        SigningError::Malformed("public key has unused bits".to_string())
    })?;

    UnparsedPublicKey::new(algorithm, public_key)
        .verify(&message, signer.signature.as_bytes())
        .map_err(|_| SigningError::BadSignature)?;

    Ok(certificate.to_der()?)
}

fn signer_matches(sid: &SignerIdentifier, certificate: &Certificate) -> Result<bool, SigningError> {
    let tbs = &certificate.tbs_certificate;
    match sid {
        SignerIdentifier::IssuerAndSerialNumber(ias) => Ok(ias.issuer.to_der()?
            == tbs.issuer.to_der()?
            && ias.serial_number.as_bytes() == tbs.serial_number.as_bytes()),
        SignerIdentifier::SubjectKeyIdentifier(ski) => {
            let Some(extensions) = &tbs.extensions else {
                return Ok(false);
            };
            for ext in extensions {
                if ext.extn_id == ID_SUBJECT_KEY_IDENTIFIER {
                    let key_id = OctetString::from_der(ext.extn_value.as_bytes())?;
                    return Ok(key_id.as_bytes() == ski.0.as_bytes());
                }
            }
            Ok(false)
        }
    }
}

fn digest_algorithm(oid: &ObjectIdentifier) -> Result<HashType, SigningError> {
    match *oid {
        ID_SHA1 => Ok(HashType::Sha1),
        ID_SHA256 => Ok(HashType::Sha256),
        ID_SHA384 => Ok(HashType::Sha384),
        ID_SHA512 => Ok(HashType::Sha512),
        other => Err(SigningError::UnsupportedAlgorithm(format!("digest {other}"))),
    }
}

fn verification_algorithm(
    signer: &SignerInfo,
    certificate: &Certificate,
    digest: HashType,
) -> Result<&'static dyn VerificationAlgorithm, SigningError> {
    // Signers disagree on whether signatureAlgorithm names the key type alone
    // or key type plus hash.
    let hash = match signer.signature_algorithm.oid {
        RSA_ENCRYPTION | EC_PUBLIC_KEY => digest,
        SHA1_WITH_RSA => HashType::Sha1,
        SHA256_WITH_RSA | ECDSA_WITH_SHA256 => HashType::Sha256,
        SHA384_WITH_RSA | ECDSA_WITH_SHA384 => HashType::Sha384,
        SHA512_WITH_RSA => HashType::Sha512,
        other => {
            return Err(SigningError::UnsupportedAlgorithm(format!("signature {other}")));
        }
    };

    let key = &certificate.tbs_certificate.subject_public_key_info.algorithm;
    match key.oid {
        RSA_ENCRYPTION => Ok(match hash {
            HashType::Sha1 => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            HashType::Sha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
            HashType::Sha384 => &signature::RSA_PKCS1_2048_8192_SHA384,
            HashType::Sha512 => &signature::RSA_PKCS1_2048_8192_SHA512,
        }),
        EC_PUBLIC_KEY => {
            let curve = key.parameters.as_ref().map(der::Any::value);
            match (curve, hash) {
                (Some(c), HashType::Sha256) if c == CURVE_P256.as_bytes() => {
                    Ok(&signature::ECDSA_P256_SHA256_ASN1)
                }
                (Some(c), HashType::Sha384) if c == CURVE_P256.as_bytes() => {
                    Ok(&signature::ECDSA_P256_SHA384_ASN1)
                }
                (Some(c), HashType::Sha256) if c == CURVE_P384.as_bytes() => {
                    Ok(&signature::ECDSA_P384_SHA256_ASN1)
                }
                (Some(c), HashType::Sha384) if c == CURVE_P384.as_bytes() => {
                    Ok(&signature::ECDSA_P384_SHA384_ASN1)
                }
                _ => Err(SigningError::UnsupportedAlgorithm(format!(
                    "ECDSA with {hash} on this curve"
                ))),
            }
        }
        other => Err(SigningError::UnsupportedAlgorithm(format!("key {other}"))),
    }
}
