//! Per-submission ECDSA signature verification.
//!
//! Devices sign SHA-256 of a canonical byte payload with their attested
//! TEE key. The payload layout is a wire contract shared with the device
//! firmware: any change invalidates every previously issued signature.
//!
//! Only ECDSA on P-256 is supported. RSA keys are rejected with a typed
//! error rather than silently accepted; freshness of the signed timestamp
//! is the caller's policy, not this module's.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use p256::ecdsa::signature::DigestVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;
use x509_parser::x509::SubjectPublicKeyInfo;

use asn1_rs::{oid, Oid};

use crate::error::VerifyError;

const OID_EC_PUBLIC_KEY: Oid<'static> = oid!(1.2.840.10045.2.1);
const OID_PRIME256V1: Oid<'static> = oid!(1.2.840.10045.3.1.7);

/// Build the canonical signed payload.
///
/// Layout: UTF-8 bytes of `sensor_hash`, then UTF-8 bytes of `gnss_hash`,
/// then the 8-byte big-endian unsigned encoding of `timestamp`. Must match
/// the device firmware byte for byte.
pub fn canonical_payload(sensor_hash: &str, gnss_hash: &str, timestamp: i64) -> Vec<u8> {
    let mut payload =
        Vec::with_capacity(sensor_hash.len() + gnss_hash.len() + std::mem::size_of::<u64>());
    payload.extend_from_slice(sensor_hash.as_bytes());
    payload.extend_from_slice(gnss_hash.as_bytes());
    payload.extend_from_slice(&(timestamp as u64).to_be_bytes());
    payload
}

/// Verify a device signature over the canonical payload.
///
/// `public_key_der` is the SPKI/PKIX encoding registered for the node;
/// `signature_der` is an ASN.1 DER ECDSA signature.
///
/// # Errors
///
/// - [`VerifyError::PublicKeyInvalid`] if the SPKI does not parse
/// - [`VerifyError::KeyTypeUnsupported`] for anything but ECDSA P-256
/// - [`VerifyError::SignatureInvalid`] if the signature does not verify
pub fn verify_submission(
    public_key_der: &[u8],
    signature_der: &[u8],
    sensor_hash: &str,
    gnss_hash: &str,
    timestamp: i64,
) -> Result<(), VerifyError> {
    let (_, spki) = SubjectPublicKeyInfo::from_der(public_key_der).map_err(|e| {
        VerifyError::PublicKeyInvalid {
            reason: e.to_string(),
        }
    })?;

    if spki.algorithm.algorithm != OID_EC_PUBLIC_KEY {
        return Err(VerifyError::KeyTypeUnsupported {
            found: format!("algorithm OID {}", spki.algorithm.algorithm),
        });
    }
    let curve = spki
        .algorithm
        .parameters
        .as_ref()
        .and_then(|params| params.as_oid().ok());
    match curve {
        Some(oid) if oid == OID_PRIME256V1 => {},
        Some(oid) => {
            return Err(VerifyError::KeyTypeUnsupported {
                found: format!("EC curve OID {oid}"),
            });
        },
        None => {
            return Err(VerifyError::KeyTypeUnsupported {
                found: "EC key without named curve parameters".to_string(),
            });
        },
    }

    let verifying_key = VerifyingKey::from_sec1_bytes(spki.subject_public_key.data.as_ref())
        .map_err(|e| VerifyError::PublicKeyInvalid {
            reason: e.to_string(),
        })?;
    let signature = Signature::from_der(signature_der).map_err(|_| VerifyError::SignatureInvalid)?;

    let digest = Sha256::new_with_prefix(canonical_payload(sensor_hash, gnss_hash, timestamp));
    verifying_key
        .verify_digest(digest, &signature)
        .map_err(|_| VerifyError::SignatureInvalid)
}

/// Decode a registered public key from its textual transport form.
///
/// Devices submit keys either PEM-wrapped or as bare base64 of the SPKI
/// DER; both are accepted.
///
/// # Errors
///
/// [`VerifyError::PublicKeyInvalid`] if neither form decodes.
pub fn decode_public_key(text: &str) -> Result<Vec<u8>, VerifyError> {
    let trimmed = text.trim();
    if trimmed.contains("-----BEGIN") {
        let (_, pem) = x509_parser::pem::parse_x509_pem(trimmed.as_bytes()).map_err(|e| {
            VerifyError::PublicKeyInvalid {
                reason: format!("PEM decoding failed: {e}"),
            }
        })?;
        return Ok(pem.contents);
    }

    // Tolerate whitespace/newlines inside transport base64.
    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| VerifyError::PublicKeyInvalid {
            reason: format!("base64 decoding failed: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::DigestSigner;
    use p256::ecdsa::SigningKey;
    use p256::elliptic_curve::rand_core::OsRng;
    use p256::pkcs8::EncodePublicKey;

    fn test_key() -> (SigningKey, Vec<u8>) {
        let signing_key = SigningKey::random(&mut OsRng);
        let spki = signing_key
            .verifying_key()
            .to_public_key_der()
            .unwrap()
            .as_bytes()
            .to_vec();
        (signing_key, spki)
    }

    fn sign(key: &SigningKey, sensor: &str, gnss: &str, timestamp: i64) -> Vec<u8> {
        let digest = Sha256::new_with_prefix(canonical_payload(sensor, gnss, timestamp));
        let signature: Signature = key.sign_digest(digest);
        signature.to_der().as_bytes().to_vec()
    }

    /// SPKI for an rsaEncryption key (algorithm OID 1.2.840.113549.1.1.1).
    fn rsa_spki() -> Vec<u8> {
        vec![
            0x30, 0x16, // SEQUENCE
            0x30, 0x0D, // AlgorithmIdentifier
            0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01, // rsaEncryption
            0x05, 0x00, // NULL params
            0x03, 0x05, 0x00, 0x01, 0x02, 0x03, 0x04, // BIT STRING (dummy)
        ]
    }

    #[test]
    fn test_canonical_payload_layout() {
        let payload = canonical_payload("abc", "def", 0x0102_0304_0506_0708);
        assert_eq!(&payload[..3], b"abc");
        assert_eq!(&payload[3..6], b"def");
        assert_eq!(
            &payload[6..],
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn test_valid_signature_verifies() {
        let (key, spki) = test_key();
        let sig = sign(&key, "sensor-hash", "gnss-hash", 1_700_000_000);
        verify_submission(&spki, &sig, "sensor-hash", "gnss-hash", 1_700_000_000).unwrap();
    }

    #[test]
    fn test_tampered_timestamp_fails() {
        let (key, spki) = test_key();
        let sig = sign(&key, "sensor-hash", "gnss-hash", 1_700_000_000);
        let err = verify_submission(&spki, &sig, "sensor-hash", "gnss-hash", 1_700_000_001)
            .unwrap_err();
        assert!(matches!(err, VerifyError::SignatureInvalid));
    }

    #[test]
    fn test_tampered_hash_fails() {
        let (key, spki) = test_key();
        let sig = sign(&key, "sensor-hash", "gnss-hash", 1_700_000_000);
        let err =
            verify_submission(&spki, &sig, "sensor-hasX", "gnss-hash", 1_700_000_000).unwrap_err();
        assert!(matches!(err, VerifyError::SignatureInvalid));
    }

    #[test]
    fn test_wrong_key_fails() {
        let (key, _) = test_key();
        let (_, other_spki) = test_key();
        let sig = sign(&key, "sensor-hash", "gnss-hash", 1_700_000_000);
        let err = verify_submission(&other_spki, &sig, "sensor-hash", "gnss-hash", 1_700_000_000)
            .unwrap_err();
        assert!(matches!(err, VerifyError::SignatureInvalid));
    }

    #[test]
    fn test_rsa_key_rejected() {
        // An RSA-keyed submission is a typed rejection, never silently
        // accepted.
        let err = verify_submission(&rsa_spki(), &[0x30, 0x00], "s", "g", 0).unwrap_err();
        match err {
            VerifyError::KeyTypeUnsupported { found } => {
                assert!(found.contains("1.2.840.113549.1.1.1"), "found: {found}");
            },
            other => panic!("expected KeyTypeUnsupported, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_spki_rejected() {
        let err = verify_submission(b"garbage", &[0x30, 0x00], "s", "g", 0).unwrap_err();
        assert!(matches!(err, VerifyError::PublicKeyInvalid { .. }));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let (_, spki) = test_key();
        let err = verify_submission(&spki, b"not a signature", "s", "g", 0).unwrap_err();
        assert!(matches!(err, VerifyError::SignatureInvalid));
    }

    #[test]
    fn test_decode_public_key_base64() {
        let (_, spki) = test_key();
        let text = BASE64.encode(&spki);
        assert_eq!(decode_public_key(&text).unwrap(), spki);
    }

    #[test]
    fn test_decode_public_key_pem() {
        let (_, spki) = test_key();
        let body = BASE64.encode(&spki);
        let pem = format!("-----BEGIN PUBLIC KEY-----\n{body}\n-----END PUBLIC KEY-----\n");
        assert_eq!(decode_public_key(&pem).unwrap(), spki);
    }

    #[test]
    fn test_decode_public_key_garbage() {
        assert!(decode_public_key("!!!not base64!!!").is_err());
    }
}
