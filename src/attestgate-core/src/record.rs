//! ASN.1 decoding of the vendor key-attestation record.
//!
//! The record is a SEQUENCE of positional header fields followed by two
//! authorization lists. Each authorization-list entry is an explicitly
//! tagged, optional field keyed by context tag number; an absent tag means
//! the field was simply not asserted, which is the common case, not an
//! error. Tags this decoder does not know are skipped so that newer schema
//! versions still parse.

use asn1_rs::{Any, Class, FromDer, Tag};

use crate::error::VerifyError;
use crate::types::{SecurityLevel, VerifiedBootState};

/// Hardware-backed assertion of the device's boot integrity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootOfTrust {
    /// Public key the bootloader verified the OS against.
    pub verified_boot_key: Vec<u8>,
    /// Whether the bootloader is locked.
    pub device_locked: bool,
    /// Outcome of verified boot.
    pub verified_boot_state: VerifiedBootState,
    /// Digest of the booted image, when asserted.
    pub verified_boot_hash: Option<Vec<u8>>,
}

/// Sparse set of optional, explicitly tagged authorization fields.
///
/// `None` (or `false` for the presence flags) means the field was not
/// asserted in the encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationList {
    /// Allowed key purposes (tag 1).
    pub purpose: Option<Vec<i64>>,
    /// Key algorithm (tag 2).
    pub algorithm: Option<i64>,
    /// Key size in bits (tag 3).
    pub key_size: Option<i64>,
    /// Allowed digests (tag 5).
    pub digest: Option<Vec<i64>>,
    /// Allowed paddings (tag 6).
    pub padding: Option<Vec<i64>>,
    /// Elliptic curve (tag 10).
    pub ec_curve: Option<i64>,
    /// RSA public exponent (tag 200).
    pub rsa_public_exponent: Option<i64>,
    /// Start of validity, ms since epoch (tag 400).
    pub active_date_time: Option<i64>,
    /// Signing-use expiry, ms since epoch (tag 401).
    pub origination_expire_date_time: Option<i64>,
    /// Verification-use expiry, ms since epoch (tag 402).
    pub usage_expire_date_time: Option<i64>,
    /// Key usable without user authentication (tag 503).
    pub no_auth_required: bool,
    /// Required user authentication types (tag 504).
    pub user_auth_type: Option<i64>,
    /// Authentication validity window in seconds (tag 505).
    pub auth_timeout: Option<i64>,
    /// Key usable while device is on-body (tag 506).
    pub allow_while_on_body: bool,
    /// Key available to all applications (tag 600).
    pub all_applications: bool,
    /// Bound application id (tag 601).
    pub application_id: Option<Vec<u8>>,
    /// Key creation time, ms since epoch (tag 701).
    pub creation_date_time: Option<i64>,
    /// How the key material originated (tag 702).
    pub origin: Option<i64>,
    /// Root of trust (tag 704).
    pub root_of_trust: Option<RootOfTrust>,
    /// Attested OS version (tag 705).
    pub os_version: Option<i64>,
    /// Attested OS patch level (tag 706).
    pub os_patch_level: Option<i64>,
    /// Attested application id blob (tag 709).
    pub attestation_application_id: Option<Vec<u8>>,
    /// Attested device brand (tag 710).
    pub attestation_id_brand: Option<Vec<u8>>,
    /// Attested device name (tag 711).
    pub attestation_id_device: Option<Vec<u8>>,
    /// Attested product name (tag 712).
    pub attestation_id_product: Option<Vec<u8>>,
}

/// Decoded vendor attestation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationRecord {
    /// Attestation schema version.
    pub attestation_version: i32,
    /// Security level of the environment that produced the attestation.
    pub attestation_security_level: SecurityLevel,
    /// Keymaster/KeyMint version.
    pub keymaster_version: i32,
    /// Security level of the keymaster implementation.
    pub keymaster_security_level: SecurityLevel,
    /// The challenge the device embedded at key generation.
    pub attestation_challenge: Vec<u8>,
    /// Opaque device identifier.
    pub unique_id: Vec<u8>,
    /// Properties enforced by the OS.
    pub software_enforced: AuthorizationList,
    /// Properties enforced inside the TEE.
    pub tee_enforced: AuthorizationList,
}

impl AttestationRecord {
    /// Decode an attestation record from the raw extension bytes.
    ///
    /// # Errors
    ///
    /// [`VerifyError::Asn1DecodeError`] on any malformed encoding.
    pub fn parse(der: &[u8]) -> Result<Self, VerifyError> {
        let top = parse_any(der)?.1;
        if top.tag() != Tag::Sequence {
            return Err(decode_err("attestation record is not a SEQUENCE"));
        }

        let mut rem = top.data;
        let attestation_version = int_field(&mut rem, "attestationVersion")?;
        let attestation_security_level =
            SecurityLevel::try_from(int_field(&mut rem, "attestationSecurityLevel")?)?;
        let keymaster_version = int_field(&mut rem, "keymasterVersion")?;
        let keymaster_security_level =
            SecurityLevel::try_from(int_field(&mut rem, "keymasterSecurityLevel")?)?;
        let attestation_challenge = octet_field(&mut rem, "attestationChallenge")?;
        let unique_id = octet_field(&mut rem, "uniqueId")?;
        let software_enforced = auth_list_field(&mut rem, "softwareEnforced")?;
        let tee_enforced = auth_list_field(&mut rem, "teeEnforced")?;
        // Later schema versions append further fields; ignore them.

        Ok(Self {
            attestation_version: clamp_i32(attestation_version),
            attestation_security_level,
            keymaster_version: clamp_i32(keymaster_version),
            keymaster_security_level,
            attestation_challenge,
            unique_id,
            software_enforced,
            tee_enforced,
        })
    }
}

fn decode_err(reason: impl Into<String>) -> VerifyError {
    VerifyError::Asn1DecodeError {
        reason: reason.into(),
    }
}

fn parse_any(data: &[u8]) -> Result<(&[u8], Any<'_>), VerifyError> {
    Any::from_der(data).map_err(|e| decode_err(e.to_string()))
}

fn take_any<'a>(rem: &mut &'a [u8], field: &str) -> Result<Any<'a>, VerifyError> {
    if rem.is_empty() {
        return Err(decode_err(format!("truncated record: missing {field}")));
    }
    let (next, any) = parse_any(rem)?;
    *rem = next;
    Ok(any)
}

/// DER INTEGER/ENUMERATED content bytes, big-endian two's complement.
fn int_from_content(data: &[u8], field: &str) -> Result<i64, VerifyError> {
    if data.is_empty() || data.len() > 8 {
        return Err(decode_err(format!("invalid integer length for {field}")));
    }
    let mut value: i64 = if data[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in data {
        value = (value << 8) | i64::from(b);
    }
    Ok(value)
}

fn expect_int(any: &Any<'_>, field: &str) -> Result<i64, VerifyError> {
    match any.tag() {
        Tag::Integer | Tag::Enumerated => int_from_content(any.data, field),
        other => Err(decode_err(format!(
            "{field}: expected INTEGER or ENUMERATED, got tag {other:?}"
        ))),
    }
}

fn int_field(rem: &mut &[u8], field: &str) -> Result<i64, VerifyError> {
    let any = take_any(rem, field)?;
    expect_int(&any, field)
}

fn octet_field(rem: &mut &[u8], field: &str) -> Result<Vec<u8>, VerifyError> {
    let any = take_any(rem, field)?;
    if any.tag() != Tag::OctetString {
        return Err(decode_err(format!("{field}: expected OCTET STRING")));
    }
    Ok(any.data.to_vec())
}

fn auth_list_field(rem: &mut &[u8], field: &str) -> Result<AuthorizationList, VerifyError> {
    let any = take_any(rem, field)?;
    if any.tag() != Tag::Sequence {
        return Err(decode_err(format!("{field}: expected SEQUENCE")));
    }
    parse_authorization_list(any.data)
}

/// Walk the explicitly tagged entries of an authorization list.
fn parse_authorization_list(data: &[u8]) -> Result<AuthorizationList, VerifyError> {
    let mut list = AuthorizationList::default();
    let mut rem = data;

    while !rem.is_empty() {
        let (next, entry) = parse_any(rem)?;
        rem = next;

        if entry.class() != Class::ContextSpecific {
            return Err(decode_err(format!(
                "authorization list entry has class {:?}, expected context-specific",
                entry.class()
            )));
        }

        let inner = entry.data;
        match entry.tag().0 {
            1 => list.purpose = Some(tagged_int_collection(inner, "purpose")?),
            2 => list.algorithm = Some(tagged_int(inner, "algorithm")?),
            3 => list.key_size = Some(tagged_int(inner, "keySize")?),
            5 => list.digest = Some(tagged_int_collection(inner, "digest")?),
            6 => list.padding = Some(tagged_int_collection(inner, "padding")?),
            10 => list.ec_curve = Some(tagged_int(inner, "ecCurve")?),
            200 => list.rsa_public_exponent = Some(tagged_int(inner, "rsaPublicExponent")?),
            400 => list.active_date_time = Some(tagged_int(inner, "activeDateTime")?),
            401 => {
                list.origination_expire_date_time =
                    Some(tagged_int(inner, "originationExpireDateTime")?);
            },
            402 => list.usage_expire_date_time = Some(tagged_int(inner, "usageExpireDateTime")?),
            503 => list.no_auth_required = tagged_flag(inner, "noAuthRequired")?,
            504 => list.user_auth_type = Some(tagged_int(inner, "userAuthType")?),
            505 => list.auth_timeout = Some(tagged_int(inner, "authTimeout")?),
            506 => list.allow_while_on_body = tagged_flag(inner, "allowWhileOnBody")?,
            600 => list.all_applications = tagged_flag(inner, "allApplications")?,
            601 => list.application_id = Some(tagged_octets(inner, "applicationId")?),
            701 => list.creation_date_time = Some(tagged_int(inner, "creationDateTime")?),
            702 => list.origin = Some(tagged_int(inner, "origin")?),
            704 => list.root_of_trust = Some(parse_root_of_trust(inner)?),
            705 => list.os_version = Some(tagged_int(inner, "osVersion")?),
            706 => list.os_patch_level = Some(tagged_int(inner, "osPatchLevel")?),
            709 => {
                list.attestation_application_id =
                    Some(tagged_octets(inner, "attestationApplicationId")?);
            },
            710 => list.attestation_id_brand = Some(tagged_octets(inner, "attestationIdBrand")?),
            711 => list.attestation_id_device = Some(tagged_octets(inner, "attestationIdDevice")?),
            712 => {
                list.attestation_id_product = Some(tagged_octets(inner, "attestationIdProduct")?);
            },
            _ => {}, // unknown tag: not asserted by this decoder, skip
        }
    }

    Ok(list)
}

/// Inner value of an explicitly tagged INTEGER/ENUMERATED.
fn tagged_int(data: &[u8], field: &str) -> Result<i64, VerifyError> {
    let (_, any) = parse_any(data)?;
    expect_int(&any, field)
}

/// Inner value of an explicitly tagged SET/SEQUENCE OF INTEGER.
fn tagged_int_collection(data: &[u8], field: &str) -> Result<Vec<i64>, VerifyError> {
    let (_, any) = parse_any(data)?;
    if any.tag() != Tag::Set && any.tag() != Tag::Sequence {
        return Err(decode_err(format!("{field}: expected SET OF INTEGER")));
    }
    let mut values = Vec::new();
    let mut rem = any.data;
    while !rem.is_empty() {
        let (next, item) = parse_any(rem)?;
        values.push(expect_int(&item, field)?);
        rem = next;
    }
    Ok(values)
}

/// Inner value of an explicitly tagged OCTET STRING.
fn tagged_octets(data: &[u8], field: &str) -> Result<Vec<u8>, VerifyError> {
    let (_, any) = parse_any(data)?;
    if any.tag() != Tag::OctetString {
        return Err(decode_err(format!("{field}: expected OCTET STRING")));
    }
    Ok(any.data.to_vec())
}

/// Presence flag: encoded as NULL (presence implies true) or BOOLEAN.
fn tagged_flag(data: &[u8], field: &str) -> Result<bool, VerifyError> {
    if data.is_empty() {
        return Ok(true);
    }
    let (_, any) = parse_any(data)?;
    match any.tag() {
        Tag::Null => Ok(true),
        Tag::Boolean => Ok(any.data.first().copied().unwrap_or(0) != 0),
        other => Err(decode_err(format!(
            "{field}: expected NULL or BOOLEAN, got tag {other:?}"
        ))),
    }
}

/// Nested RootOfTrust SEQUENCE inside tag 704.
fn parse_root_of_trust(data: &[u8]) -> Result<RootOfTrust, VerifyError> {
    let (_, seq) = parse_any(data)?;
    if seq.tag() != Tag::Sequence {
        return Err(decode_err("rootOfTrust: expected SEQUENCE"));
    }

    let mut rem = seq.data;
    let verified_boot_key = octet_field(&mut rem, "verifiedBootKey")?;

    let locked = take_any(&mut rem, "deviceLocked")?;
    if locked.tag() != Tag::Boolean {
        return Err(decode_err("deviceLocked: expected BOOLEAN"));
    }
    let device_locked = locked.data.first().copied().unwrap_or(0) != 0;

    let verified_boot_state =
        VerifiedBootState::try_from(int_field(&mut rem, "verifiedBootState")?)?;

    let verified_boot_hash = if rem.is_empty() {
        None
    } else {
        Some(octet_field(&mut rem, "verifiedBootHash")?)
    };

    Ok(RootOfTrust {
        verified_boot_key,
        device_locked,
        verified_boot_state,
        verified_boot_hash,
    })
}

fn clamp_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal DER encoder for building test records.

    fn enc_len(out: &mut Vec<u8>, len: usize) {
        if len < 128 {
            out.push(len as u8);
        } else {
            let bytes = len.to_be_bytes();
            let first = bytes.iter().position(|&b| b != 0).unwrap_or(7);
            let significant = &bytes[first..];
            out.push(0x80 | significant.len() as u8);
            out.extend_from_slice(significant);
        }
    }

    fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        enc_len(&mut out, content.len());
        out.extend_from_slice(content);
        out
    }

    fn der_int(value: i64) -> Vec<u8> {
        let bytes = value.to_be_bytes();
        let mut first = 0;
        while first < 7 && bytes[first] == 0 && bytes[first + 1] & 0x80 == 0 {
            first += 1;
        }
        tlv(0x02, &bytes[first..])
    }

    fn der_enum(value: i64) -> Vec<u8> {
        let mut out = der_int(value);
        out[0] = 0x0A;
        out
    }

    fn der_octets(data: &[u8]) -> Vec<u8> {
        tlv(0x04, data)
    }

    fn der_bool(value: bool) -> Vec<u8> {
        tlv(0x01, &[if value { 0xFF } else { 0x00 }])
    }

    fn der_null() -> Vec<u8> {
        tlv(0x05, &[])
    }

    fn der_seq(parts: &[Vec<u8>]) -> Vec<u8> {
        let content: Vec<u8> = parts.concat();
        tlv(0x30, &content)
    }

    fn der_set(parts: &[Vec<u8>]) -> Vec<u8> {
        let content: Vec<u8> = parts.concat();
        tlv(0x31, &content)
    }

    /// Context-specific constructed tag, high-tag-number form when needed.
    fn ctx(tag: u32, content: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        if tag < 31 {
            out.push(0xA0 | tag as u8);
        } else {
            out.push(0xBF);
            let mut groups = Vec::new();
            let mut v = tag;
            loop {
                groups.push((v & 0x7F) as u8);
                v >>= 7;
                if v == 0 {
                    break;
                }
            }
            groups.reverse();
            let last = groups.len() - 1;
            for (i, g) in groups.iter().enumerate() {
                out.push(if i == last { *g } else { g | 0x80 });
            }
        }
        enc_len(&mut out, content.len());
        out.extend_from_slice(content);
        out
    }

    fn root_of_trust_der(boot_key: &[u8], locked: bool, state: i64) -> Vec<u8> {
        der_seq(&[
            der_octets(boot_key),
            der_bool(locked),
            der_enum(state),
            der_octets(&[0xAB; 32]),
        ])
    }

    fn sample_record_der(challenge: &[u8]) -> Vec<u8> {
        let tee = der_seq(&[
            ctx(1, &der_set(&[der_int(2), der_int(3)])),
            ctx(3, &der_int(256)),
            ctx(10, &der_int(1)),
            ctx(503, &der_null()),
            ctx(701, &der_int(1_700_000_000_000)),
            ctx(702, &der_int(0)),
            ctx(704, &root_of_trust_der(&[0x11; 32], true, 0)),
            ctx(705, &der_int(140_000)),
            ctx(706, &der_int(2024_06)),
        ]);
        let software = der_seq(&[ctx(709, &der_octets(b"app-id-blob"))]);

        der_seq(&[
            der_int(4),
            der_enum(1),
            der_int(41),
            der_enum(1),
            der_octets(challenge),
            der_octets(b"unique"),
            software,
            tee,
        ])
    }

    #[test]
    fn test_parse_full_record() {
        let der = sample_record_der(b"the-challenge");
        let record = AttestationRecord::parse(&der).unwrap();

        assert_eq!(record.attestation_version, 4);
        assert_eq!(record.attestation_security_level, SecurityLevel::Tee);
        assert_eq!(record.keymaster_version, 41);
        assert_eq!(record.attestation_challenge, b"the-challenge");
        assert_eq!(record.unique_id, b"unique");

        let tee = &record.tee_enforced;
        assert_eq!(tee.purpose.as_deref(), Some(&[2, 3][..]));
        assert_eq!(tee.key_size, Some(256));
        assert_eq!(tee.ec_curve, Some(1));
        assert!(tee.no_auth_required);
        assert_eq!(tee.creation_date_time, Some(1_700_000_000_000));
        assert_eq!(tee.os_version, Some(140_000));

        let rot = tee.root_of_trust.as_ref().unwrap();
        assert_eq!(rot.verified_boot_key, vec![0x11; 32]);
        assert!(rot.device_locked);
        assert_eq!(rot.verified_boot_state, VerifiedBootState::Verified);
        assert_eq!(rot.verified_boot_hash.as_deref(), Some(&[0xAB; 32][..]));

        assert_eq!(
            record.software_enforced.attestation_application_id.as_deref(),
            Some(&b"app-id-blob"[..])
        );
        // Absent tags stay unasserted.
        assert!(record.software_enforced.root_of_trust.is_none());
        assert!(tee.rsa_public_exponent.is_none());
        assert!(!tee.all_applications);
    }

    #[test]
    fn test_empty_authorization_lists() {
        let der = der_seq(&[
            der_int(3),
            der_enum(2),
            der_int(4),
            der_enum(2),
            der_octets(b"c"),
            der_octets(b""),
            der_seq(&[]),
            der_seq(&[]),
        ]);
        let record = AttestationRecord::parse(&der).unwrap();
        assert_eq!(record.attestation_security_level, SecurityLevel::StrongBox);
        assert_eq!(record.tee_enforced, AuthorizationList::default());
        assert!(record.tee_enforced.root_of_trust.is_none());
    }

    #[test]
    fn test_unknown_tags_are_skipped() {
        let tee = der_seq(&[
            ctx(999, &der_int(42)),
            ctx(704, &root_of_trust_der(&[0x22; 32], false, 1)),
        ]);
        let der = der_seq(&[
            der_int(3),
            der_enum(1),
            der_int(4),
            der_enum(1),
            der_octets(b"c"),
            der_octets(b""),
            der_seq(&[]),
            tee,
        ]);
        let record = AttestationRecord::parse(&der).unwrap();
        let rot = record.tee_enforced.root_of_trust.unwrap();
        assert!(!rot.device_locked);
        assert_eq!(rot.verified_boot_state, VerifiedBootState::SelfSigned);
    }

    #[test]
    fn test_root_of_trust_without_hash() {
        let rot_der = der_seq(&[der_octets(&[0x33; 32]), der_bool(true), der_enum(0)]);
        let rot = parse_root_of_trust(&rot_der).unwrap();
        assert!(rot.verified_boot_hash.is_none());
        assert!(rot.device_locked);
    }

    #[test]
    fn test_boolean_flag_encoding_accepted() {
        let tee = der_seq(&[ctx(503, &der_bool(false)), ctx(600, &der_bool(true))]);
        let list = parse_authorization_list(&tlv_content(&tee)).unwrap();
        assert!(!list.no_auth_required);
        assert!(list.all_applications);
    }

    // Strip the outer SEQUENCE header to get at the content bytes.
    fn tlv_content(der: &[u8]) -> Vec<u8> {
        let (_, any) = Any::from_der(der).unwrap();
        any.data.to_vec()
    }

    #[test]
    fn test_truncated_record_fails() {
        let der = der_seq(&[der_int(4), der_enum(1)]);
        let err = AttestationRecord::parse(&der).unwrap_err();
        match err {
            VerifyError::Asn1DecodeError { reason } => {
                assert!(reason.contains("keymasterVersion"), "reason: {reason}");
            },
            other => panic!("expected Asn1DecodeError, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_fails() {
        assert!(AttestationRecord::parse(&[0xFF, 0x00, 0x01]).is_err());
        assert!(AttestationRecord::parse(&[]).is_err());
    }

    #[test]
    fn test_unknown_security_level_fails() {
        let der = der_seq(&[
            der_int(3),
            der_enum(9),
            der_int(4),
            der_enum(1),
            der_octets(b"c"),
            der_octets(b""),
            der_seq(&[]),
            der_seq(&[]),
        ]);
        let err = AttestationRecord::parse(&der).unwrap_err();
        assert!(matches!(err, VerifyError::Asn1DecodeError { .. }));
    }

    #[test]
    fn test_long_form_length_round_trip() {
        // A challenge long enough to force long-form lengths upstream.
        let challenge = vec![0x5A; 200];
        let der = sample_record_der(&challenge);
        let record = AttestationRecord::parse(&der).unwrap();
        assert_eq!(record.attestation_challenge, challenge);
    }
}
