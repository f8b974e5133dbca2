//! Trust scoring and the pluggable verifier registry.
//!
//! The score combines the attestation outcome, peer density, and the
//! outputs of registered verifier plugins into a bounded number the reward
//! layer gates on. Plugins are the engine's sole extension point: a plugin
//! that claims applicability and then fails voids the whole submission.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::VerifyError;
use crate::types::{SecurityLevel, VerifiedBootState};

/// Payload tags that double the reward multiplier.
pub const HIGH_PRIORITY_TAGS: [&str; 3] = ["#SOS", "#TRUTH", "#EMERGENCY"];

/// Whether a payload carries a high-priority tag (exact, case-sensitive).
pub fn is_high_priority(payload: &str) -> bool {
    HIGH_PRIORITY_TAGS.iter().any(|tag| payload.contains(tag))
}

/// Externally supplied scoring weights.
///
/// Deserializes from a JSON document in which every omitted field keeps
/// its default, so deployments only state the weights they change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Score every submission starts from.
    pub base_score: i64,
    /// Bonus for StrongBox-level keys.
    pub strongbox_bonus: i64,
    /// Bonus for TEE-level keys.
    pub tee_bonus: i64,
    /// Bonus when verified boot completed with a locked bootloader.
    pub boot_lock_bonus: i64,
    /// Bonus per registered nearby peer.
    pub density_per_peer: i64,
    /// Ceiling the score is clamped to.
    pub max_trust_score: i64,
    /// Scores below this earn no reward.
    pub min_score_threshold: i64,
    /// Additive weight per named verifier plugin.
    pub verifier_weights: HashMap<String, i64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score: 0,
            strongbox_bonus: 50,
            tee_bonus: 30,
            boot_lock_bonus: 10,
            density_per_peer: 20,
            max_trust_score: 100,
            min_score_threshold: 20,
            verifier_weights: HashMap::new(),
        }
    }
}

/// Everything a scoring pass (and its plugins) can see about a submission.
#[derive(Debug)]
pub struct ScoreInput<'a> {
    /// Security level established at registration.
    pub security_level: SecurityLevel,
    /// Verified-boot outcome established at registration.
    pub boot_state: VerifiedBootState,
    /// Count of nearby nodes that are themselves registered.
    pub valid_nearby_peers: u32,
    /// The submitted payload text.
    pub payload: &'a str,
    /// Opaque per-submission attestation data for plugins.
    pub extra: &'a HashMap<String, String>,
}

/// Outcome of a scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreOutcome {
    /// Bounded trust score.
    pub score: i64,
    /// 0 below threshold, else 1, or 2 for high-priority payloads.
    pub reward_multiplier: i64,
}

/// A pluggable verification module.
///
/// Future security modules (biometrics, ZK proofs, anomaly analysis) hook
/// in here without touching the core scoring logic.
pub trait ClaimVerifier: Send + Sync {
    /// Unique name; also the key into [`ScoringConfig::verifier_weights`].
    fn name(&self) -> &str;

    /// Whether this verifier has anything to say about the submission.
    fn can_verify(&self, extra: &HashMap<String, String>) -> bool;

    /// Perform the check. An error voids the submission entirely.
    fn verify(&self, input: &ScoreInput<'_>) -> Result<(), VerifyError>;
}

/// Combines attestation state, peer density, and plugin outcomes into a
/// bounded trust score and reward multiplier.
pub struct TrustScorer {
    config: ScoringConfig,
    verifiers: Vec<Box<dyn ClaimVerifier>>,
}

impl TrustScorer {
    /// Create a scorer with no plugins registered.
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            verifiers: Vec::new(),
        }
    }

    /// Register a verifier plugin.
    ///
    /// Registration order is evaluation order; scoring is deterministic
    /// over it.
    pub fn register_verifier(&mut self, verifier: Box<dyn ClaimVerifier>) {
        self.verifiers.push(verifier);
    }

    /// Names of registered verifiers, in evaluation order.
    pub fn verifier_names(&self) -> Vec<&str> {
        self.verifiers.iter().map(|v| v.name()).collect()
    }

    /// Score a submission.
    ///
    /// # Errors
    ///
    /// Propagates the failure of any applicable plugin, which rejects the
    /// submission outright.
    pub fn score(&self, input: &ScoreInput<'_>) -> Result<ScoreOutcome, VerifyError> {
        let cfg = &self.config;
        let mut score = cfg.base_score;

        score += match input.security_level {
            SecurityLevel::StrongBox => cfg.strongbox_bonus,
            SecurityLevel::Tee => cfg.tee_bonus,
            SecurityLevel::Software => 0,
        };

        if input.boot_state == VerifiedBootState::Verified {
            score += cfg.boot_lock_bonus;
        }

        score += i64::from(input.valid_nearby_peers) * cfg.density_per_peer;

        for verifier in &self.verifiers {
            if !verifier.can_verify(input.extra) {
                continue;
            }
            verifier.verify(input)?;
            let weight = cfg
                .verifier_weights
                .get(verifier.name())
                .copied()
                .unwrap_or(0);
            if weight > 0 {
                score += weight;
                info!(verifier = verifier.name(), weight, "plugin verified");
            }
        }

        score = score.clamp(0, cfg.max_trust_score);

        let reward_multiplier = if score < cfg.min_score_threshold {
            warn!(score, threshold = cfg.min_score_threshold, "score below threshold, no reward");
            0
        } else if is_high_priority(input.payload) {
            info!("high-priority payload, bonus multiplier applied");
            2
        } else {
            1
        };

        Ok(ScoreOutcome {
            score,
            reward_multiplier,
        })
    }
}
