//! # attestgate-core
//!
//! Attestation and signature verification engine for hardware-rooted
//! sensor nodes. Remote devices prove they run on a locked, hardware-backed
//! execution environment before their data submissions are trusted.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Verification Engine                     │
//! │                                                              │
//! │  ┌────────────────┐  ┌──────────────────┐  ┌─────────────┐  │
//! │  │ ChallengeStore │  │ CertificateChain │  │ Attestation │  │
//! │  │ (anti-replay)  │  │ (base64 + X.509) │  │ Record      │  │
//! │  └────────────────┘  └──────────────────┘  └─────────────┘  │
//! │                              │                               │
//! │                              ▼                               │
//! │  ┌────────────────────────────────────────────────────────┐ │
//! │  │                    PolicyEvaluator                     │ │
//! │  │   (challenge, security level, root of trust, boot)     │ │
//! │  └────────────────────────────────────────────────────────┘ │
//! │                              │                               │
//! │  ┌───────────────────┐       ▼        ┌───────────────────┐ │
//! │  │ SignatureVerifier │──────────────▶ │    TrustScorer    │ │
//! │  │ (ECDSA P-256)     │                │ (bounded + tags)  │ │
//! │  └───────────────────┘                └───────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! - **Anti-replay**: challenge tokens verify successfully at most once
//! - **Hardware-rooted**: only TEE/StrongBox keys with a locked bootloader
//!   and verified boot pass the policy
//! - **Tamper-evident**: per-submission ECDSA signatures bind payload hashes
//!   to a single submission instant
//! - **Fail-explicit**: every rejection carries a precise, typed reason

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod chain;
pub mod challenge;
pub mod config;
pub mod error;
pub mod policy;
pub mod record;
pub mod score;
pub mod signature;
pub mod types;

pub use chain::{CertificateChain, KEY_ATTESTATION_OID};
pub use challenge::{ChallengeStore, Clock, NonceSource, OsNonceSource, SystemClock};
pub use config::EngineConfig;
pub use error::VerifyError;
pub use policy::PolicyEvaluator;
pub use record::{AttestationRecord, AuthorizationList, RootOfTrust};
pub use score::{
    is_high_priority, ClaimVerifier, ScoreInput, ScoreOutcome, ScoringConfig, TrustScorer,
};
pub use signature::{canonical_payload, decode_public_key, verify_submission};
pub use types::{NodeIdentity, SecurityLevel, VerificationResult, VerifiedBootState};
