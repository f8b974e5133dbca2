//! Error types for verification operations.

use thiserror::Error;

use crate::types::VerifiedBootState;

/// Errors that can occur during attestation and signature verification.
///
/// Policy failures are returned to callers as structured values so the
/// submitting device can be told exactly why it was rejected. Nothing in
/// this taxonomy aborts the process.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The submitted certificate chain contained no certificates.
    #[error("certificate chain is empty")]
    EmptyChain,

    /// A certificate blob failed transport (base64) decoding.
    #[error("certificate {index} failed transport decoding: {reason}")]
    DecodeError {
        /// Zero-based position of the bad entry in the chain.
        index: usize,
        /// Decoder error detail.
        reason: String,
    },

    /// A certificate blob decoded but was not valid X.509 DER.
    #[error("certificate {index} failed X.509 parsing: {reason}")]
    CertificateParseError {
        /// Zero-based position of the bad entry in the chain.
        index: usize,
        /// Parser error detail.
        reason: String,
    },

    /// The chain-of-trust walk failed at a link.
    ///
    /// Advisory by default; fatal only when the engine is configured with
    /// `require_trusted_chain`.
    #[error("chain of trust could not be verified at certificate {index}: {reason}")]
    ChainVerificationFailed {
        /// Zero-based position of the certificate whose signature failed.
        index: usize,
        /// Verification error detail.
        reason: String,
    },

    /// The leaf certificate carries no key-attestation extension.
    #[error("key attestation extension not present in leaf certificate")]
    ExtensionMissing,

    /// The attestation extension was present but its ASN.1 encoding was
    /// malformed.
    #[error("attestation record ASN.1 decoding failed: {reason}")]
    Asn1DecodeError {
        /// Decoder error detail.
        reason: String,
    },

    /// The challenge embedded in the attestation record does not match the
    /// one the server issued.
    #[error("challenge mismatch (expected: {expected}, got: {got})")]
    ChallengeMismatch {
        /// The challenge the server issued.
        expected: String,
        /// The challenge found in the attestation record.
        got: String,
    },

    /// The challenge token is unknown, already used, or past its TTL.
    #[error("invalid or expired challenge")]
    ChallengeExpiredOrUnknown,

    /// The attested key lives in software, not hardware.
    #[error("key is not hardware protected (Software security level)")]
    SecurityLevelInsufficient,

    /// No root of trust in the TEE-enforced authorization list.
    #[error("root of trust missing from TEE-enforced authorization list")]
    RootOfTrustMissing,

    /// The device bootloader is unlocked.
    #[error("bootloader is not locked")]
    BootloaderUnlocked,

    /// Verified boot did not complete with a `Verified` outcome.
    #[error("OS integrity check failed (boot state: {state})")]
    BootIntegrityFailed {
        /// The boot state the device reported.
        state: VerifiedBootState,
    },

    /// The registered public key could not be decoded or parsed.
    #[error("invalid public key: {reason}")]
    PublicKeyInvalid {
        /// Parser error detail.
        reason: String,
    },

    /// The registered key is not ECDSA on P-256.
    ///
    /// RSA verification is an explicit, documented gap — RSA keys are
    /// rejected here rather than silently accepted.
    #[error("unsupported key type: expected ECDSA P-256, got {found}")]
    KeyTypeUnsupported {
        /// Description of the key type that was found.
        found: String,
    },

    /// The submission signature does not verify against the registered key.
    #[error("signature verification failed: data does not match registered device key")]
    SignatureInvalid,

    /// The secure random source failed while issuing a challenge.
    #[error("randomness source unavailable: {reason}")]
    RandomnessUnavailable {
        /// Source error detail.
        reason: String,
    },

    /// A submission referenced a node that was never registered.
    #[error("unknown node: {node_id}")]
    UnknownNode {
        /// The node id the submission claimed.
        node_id: String,
    },

    /// The submission timestamp fell outside the freshness window.
    #[error("submission timestamp outside freshness window: {timestamp} vs server time {now}")]
    StaleTimestamp {
        /// The timestamp the device signed.
        timestamp: i64,
        /// The server clock at evaluation time.
        now: i64,
    },

    /// A pluggable verifier claimed applicability and then rejected the
    /// submission, voiding it entirely.
    #[error("verifier '{name}' rejected the submission: {reason}")]
    PluginRejected {
        /// Name of the verifier that rejected.
        name: String,
        /// Rejection detail.
        reason: String,
    },
}
