//! Security policy applied to a decoded attestation record.
//!
//! Checks run in a fixed order and the first fatal failure is terminal,
//! returned as a `success = false` result (never an `Err` — policy
//! rejections are answers, not faults). Two conditions are advisory only
//! and are logged without affecting the outcome: a stale key and a low
//! attestation schema version.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::error::VerifyError;
use crate::record::AttestationRecord;
use crate::types::{SecurityLevel, VerificationResult, VerifiedBootState};

/// Evaluates the attestation security policy.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    /// Key age beyond which a staleness warning is emitted.
    key_staleness: Duration,
    /// Attestation versions below this emit a low-version warning.
    min_advisory_version: i32,
}

impl Default for PolicyEvaluator {
    fn default() -> Self {
        Self {
            key_staleness: Duration::from_secs(30 * 24 * 60 * 60),
            min_advisory_version: 3,
        }
    }
}

impl PolicyEvaluator {
    /// Create an evaluator with custom advisory thresholds.
    pub fn new(key_staleness: Duration, min_advisory_version: i32) -> Self {
        Self {
            key_staleness,
            min_advisory_version,
        }
    }

    /// Apply the policy to `record` against the challenge the server issued.
    ///
    /// Fatal checks, in order: challenge match, security level at least
    /// TEE, root of trust present with a non-empty verified-boot key,
    /// bootloader locked, verified boot state `Verified`.
    pub fn evaluate(
        &self,
        record: &AttestationRecord,
        expected_challenge: &str,
    ) -> VerificationResult {
        // 1. Challenge binding. Tokens are issued as lowercase hex, so the
        // record's challenge bytes are re-encoded the same way.
        let got = hex::encode(&record.attestation_challenge);
        if got != expected_challenge {
            return VerificationResult::failure(&VerifyError::ChallengeMismatch {
                expected: expected_challenge.to_string(),
                got,
            });
        }

        // 2. Hardware backing.
        if record.attestation_security_level < SecurityLevel::Tee {
            return VerificationResult::failure(&VerifyError::SecurityLevelInsufficient);
        }

        // 3. Root of trust must be asserted by the TEE.
        let rot = match record.tee_enforced.root_of_trust.as_ref() {
            Some(rot) if !rot.verified_boot_key.is_empty() => rot,
            _ => return VerificationResult::failure(&VerifyError::RootOfTrustMissing),
        };

        // 4. Bootloader lock.
        if !rot.device_locked {
            return VerificationResult::failure(&VerifyError::BootloaderUnlocked);
        }

        // 5. Verified boot.
        if rot.verified_boot_state != VerifiedBootState::Verified {
            return VerificationResult::failure(&VerifyError::BootIntegrityFailed {
                state: rot.verified_boot_state,
            });
        }

        // 6. Advisory checks: logged, never fatal.
        let creation_time = record.tee_enforced.creation_date_time;
        if let Some(created_ms) = creation_time {
            if created_ms > 0 && self.key_age(created_ms) > self.key_staleness {
                warn!(
                    creation_time_ms = created_ms,
                    "attested key is older than {} days",
                    self.key_staleness.as_secs() / 86_400
                );
            }
        }
        if record.attestation_version < self.min_advisory_version {
            warn!(
                attestation_version = record.attestation_version,
                "low attestation schema version"
            );
        }

        VerificationResult {
            success: true,
            message: "TEE attestation verified".to_string(),
            security_level: Some(record.attestation_security_level),
            device_locked: Some(rot.device_locked),
            boot_state: Some(rot.verified_boot_state),
            creation_time,
            attestation_version: Some(record.attestation_version),
            os_version: record.tee_enforced.os_version,
            os_patch_level: record.tee_enforced.os_patch_level,
        }
    }

    fn key_age(&self, created_ms: i64) -> Duration {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Duration::from_millis(now_ms.saturating_sub(created_ms).max(0) as u64)
    }
}
