//! Shared types produced and consumed by the verification engine.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::VerifyError;

/// Security level of the environment that holds the attested key.
///
/// Numeric values follow the vendor attestation schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityLevel {
    /// Key material lives in ordinary application software.
    Software = 0,
    /// Key material lives in a Trusted Execution Environment.
    Tee = 1,
    /// Key material lives in a dedicated secure element.
    StrongBox = 2,
}

impl SecurityLevel {
    /// Numeric wire value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i64> for SecurityLevel {
    type Error = VerifyError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Software),
            1 => Ok(Self::Tee),
            2 => Ok(Self::StrongBox),
            other => Err(VerifyError::Asn1DecodeError {
                reason: format!("unknown security level: {other}"),
            }),
        }
    }
}

impl Serialize for SecurityLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

/// Outcome of the device's verified-boot process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedBootState {
    /// Boot chain verified against the OEM key.
    Verified = 0,
    /// Boot chain verified against a user-installed key.
    SelfSigned = 1,
    /// Boot chain was not verified.
    Unverified = 2,
    /// Boot verification failed outright.
    Failed = 3,
}

impl VerifiedBootState {
    /// Numeric wire value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i64> for VerifiedBootState {
    type Error = VerifyError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Verified),
            1 => Ok(Self::SelfSigned),
            2 => Ok(Self::Unverified),
            3 => Ok(Self::Failed),
            other => Err(VerifyError::Asn1DecodeError {
                reason: format!("unknown verified boot state: {other}"),
            }),
        }
    }
}

impl fmt::Display for VerifiedBootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Verified => "Verified",
            Self::SelfSigned => "SelfSigned",
            Self::Unverified => "Unverified",
            Self::Failed => "Failed",
        };
        write!(f, "{name}")
    }
}

impl Serialize for VerifiedBootState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

/// The sole output of attestation verification consumed downstream.
///
/// Policy failures are reported through `success` / `message`, never as
/// errors; the detail fields are populated only on success.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    /// Whether the attestation passed every fatal policy check.
    pub success: bool,
    /// Human-readable outcome, suitable for returning to the device.
    pub message: String,
    /// Security level of the attested key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_level: Option<SecurityLevel>,
    /// Whether the device bootloader was locked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_locked: Option<bool>,
    /// Verified-boot outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_state: Option<VerifiedBootState>,
    /// Key creation time in milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    /// Attestation schema version the record declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_version: Option<i32>,
    /// Attested OS version, when the TEE asserted one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<i64>,
    /// Attested OS patch level, when the TEE asserted one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_patch_level: Option<i64>,
}

impl VerificationResult {
    /// Build a failure result from a policy error, carrying its message.
    pub fn failure(err: &VerifyError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            security_level: None,
            device_locked: None,
            boot_state: None,
            creation_time: None,
            attestation_version: None,
            os_version: None,
            os_patch_level: None,
        }
    }
}

/// A registered device identity, as maintained by the external ledger layer.
///
/// The engine reads these (public key for signature checks, tier and level
/// for scoring); it never persists them itself.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    /// Stable identifier for the device.
    pub node_id: String,
    /// SPKI/PKIX DER encoding of the device's TEE public key.
    pub public_key_der: Vec<u8>,
    /// Trust tier assigned at registration.
    pub trust_tier: u8,
    /// Security level established by attestation.
    pub security_level: SecurityLevel,
    /// Whether the bootloader was locked at registration.
    pub device_locked: bool,
    /// Verified-boot outcome established at registration.
    pub boot_state: VerifiedBootState,
    /// Unix timestamp (seconds) of registration.
    pub registered_at: i64,
}
