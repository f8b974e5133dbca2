//! Node registration and data-submission service.
//!
//! Thin delegations over the engine: the service wires the challenge
//! store, chain decoding, policy evaluation, signature verification, and
//! scoring together, and keeps an in-memory directory of registered nodes.
//! Durable ledger persistence of nodes and claims lives outside this
//! process; [`NodeService::insert_identity`] is the seam the ledger layer
//! uses to sync identities in.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use attestgate_core::{
    decode_public_key, verify_submission, AttestationRecord, CertificateChain, ChallengeStore,
    EngineConfig, NodeIdentity, PolicyEvaluator, ScoreInput, SecurityLevel, TrustScorer,
    VerificationResult, VerifiedBootState, VerifyError,
};

/// Seconds a submission timestamp may lag the server clock.
const FRESHNESS_PAST_SECS: i64 = 120;
/// Seconds a submission timestamp may lead the server clock.
const FRESHNESS_FUTURE_SECS: i64 = 60;

/// Request to register a device by attestation.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    /// Identifier the node will be known by.
    pub node_id: String,
    /// The challenge the device claims it embedded.
    pub challenge: String,
    /// Attestation certificate chain, leaf first, base64 DER.
    pub cert_chain: Vec<String>,
    /// Device public key, PEM or base64 SPKI DER.
    pub public_key: String,
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    /// Whether the node was registered.
    pub success: bool,
    /// The node id, echoed back.
    pub node_id: String,
    /// Full attestation verification result.
    pub result: VerificationResult,
}

/// A signed sensor-data submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    /// Registered node id.
    pub node_id: String,
    /// Payload text (may carry high-priority tags).
    pub payload: String,
    /// Base64 DER ECDSA signature over the canonical payload.
    pub signature: String,
    /// Hash of the raw sensor data.
    pub sensor_hash: String,
    /// Hash of the GNSS fix.
    pub gnss_hash: String,
    /// Unix timestamp (seconds) the device signed.
    pub timestamp: i64,
    /// Node ids the device claims are nearby.
    #[serde(default)]
    pub nearby_nodes: Vec<String>,
    /// Opaque attestation data for pluggable verifiers.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    /// Whether the submission was accepted.
    pub success: bool,
    /// Bounded trust score.
    pub score: i64,
    /// Reward multiplier the ledger applies.
    pub reward_multiplier: i64,
}

/// Verification service shared by every transport handler.
pub struct NodeService {
    config: EngineConfig,
    challenges: Arc<ChallengeStore>,
    policy: PolicyEvaluator,
    scorer: TrustScorer,
    directory: RwLock<HashMap<String, NodeIdentity>>,
}

impl NodeService {
    /// Create a service with the given engine configuration and scorer.
    pub fn new(config: EngineConfig, scorer: TrustScorer) -> Self {
        let challenges = Arc::new(ChallengeStore::new(config.challenge_ttl));
        Self {
            config,
            challenges,
            policy: PolicyEvaluator::default(),
            scorer,
            directory: RwLock::new(HashMap::new()),
        }
    }

    /// The shared challenge store (for issuance and the background sweep).
    pub fn challenges(&self) -> Arc<ChallengeStore> {
        self.challenges.clone()
    }

    /// Decode a chain and evaluate the attestation policy against
    /// `expected_challenge`.
    ///
    /// The chain-of-trust walk runs when intermediates are present; its
    /// failure is advisory unless `require_trusted_chain` is set.
    ///
    /// # Errors
    ///
    /// Decode/parse failures, and chain-trust failures when configured
    /// fatal. Policy rejections are reported inside the returned result.
    pub fn verify_attestation(
        &self,
        cert_chain: &[String],
        expected_challenge: &str,
    ) -> Result<VerificationResult, VerifyError> {
        let chain = CertificateChain::decode(cert_chain)?;

        if let Err(err) = chain.verify_chain_of_trust() {
            if self.config.require_trusted_chain {
                return Err(err);
            }
            warn!(error = %err, "certificate chain of trust unverified, continuing");
        }

        let extension = chain.attestation_extension()?;
        let record = AttestationRecord::parse(&extension)?;
        Ok(self.policy.evaluate(&record, expected_challenge))
    }

    /// Register a node from its attestation chain.
    ///
    /// Consumes the challenge, evaluates the policy, and on success stores
    /// the node identity with its submitted public key.
    ///
    /// # Errors
    ///
    /// Challenge, decode, and key errors. Policy rejections come back as a
    /// `success = false` response, not an error.
    pub fn register_node(
        &self,
        req: &RegisterRequest,
        now_unix: i64,
    ) -> Result<RegisterResponse, VerifyError> {
        let public_key_der = decode_public_key(&req.public_key)?;

        if self.config.dev_mode {
            warn!(node_id = %req.node_id, "dev mode: skipping TEE verification");
            let result = dev_mode_result();
            self.store_identity(req, &result, public_key_der, now_unix);
            return Ok(RegisterResponse {
                success: true,
                node_id: req.node_id.clone(),
                result,
            });
        }

        if !self.challenges.verify(&req.challenge) {
            return Err(VerifyError::ChallengeExpiredOrUnknown);
        }

        let result = self.verify_attestation(&req.cert_chain, &req.challenge)?;
        if !result.success {
            info!(node_id = %req.node_id, message = %result.message, "registration rejected");
            return Ok(RegisterResponse {
                success: false,
                node_id: req.node_id.clone(),
                result,
            });
        }

        self.store_identity(req, &result, public_key_der, now_unix);
        info!(
            node_id = %req.node_id,
            security_level = ?result.security_level,
            "node registered"
        );
        Ok(RegisterResponse {
            success: true,
            node_id: req.node_id.clone(),
            result,
        })
    }

    /// Verify and score a data submission.
    ///
    /// # Errors
    ///
    /// Unknown node, stale timestamp, signature failures, and plugin
    /// rejections all void the submission.
    pub fn submit_data(
        &self,
        req: &SubmitRequest,
        now_unix: i64,
    ) -> Result<SubmitResponse, VerifyError> {
        let node = self
            .directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&req.node_id)
            .cloned()
            .ok_or_else(|| VerifyError::UnknownNode {
                node_id: req.node_id.clone(),
            })?;

        if self.config.dev_mode {
            warn!(node_id = %req.node_id, "dev mode: skipping signature verification");
        } else {
            // Replay guard: the signed timestamp must sit inside the
            // freshness window around the server clock.
            if req.timestamp < now_unix - FRESHNESS_PAST_SECS
                || req.timestamp > now_unix + FRESHNESS_FUTURE_SECS
            {
                return Err(VerifyError::StaleTimestamp {
                    timestamp: req.timestamp,
                    now: now_unix,
                });
            }

            let signature = BASE64
                .decode(req.signature.trim())
                .map_err(|_| VerifyError::SignatureInvalid)?;
            verify_submission(
                &node.public_key_der,
                &signature,
                &req.sensor_hash,
                &req.gnss_hash,
                req.timestamp,
            )?;
        }

        let valid_nearby_peers = {
            let directory = self.directory.read().unwrap_or_else(PoisonError::into_inner);
            req.nearby_nodes
                .iter()
                .filter(|peer| directory.contains_key(*peer))
                .count() as u32
        };

        let outcome = self.scorer.score(&ScoreInput {
            security_level: node.security_level,
            boot_state: node.boot_state,
            valid_nearby_peers,
            payload: &req.payload,
            extra: &req.extra,
        })?;

        info!(
            node_id = %req.node_id,
            trust_tier = node.trust_tier,
            score = outcome.score,
            reward_multiplier = outcome.reward_multiplier,
            "submission scored"
        );
        Ok(SubmitResponse {
            success: true,
            score: outcome.score,
            reward_multiplier: outcome.reward_multiplier,
        })
    }

    /// Insert or replace a node identity directly.
    ///
    /// Used by the external ledger layer to sync registered nodes into a
    /// fresh process.
    pub fn insert_identity(&self, identity: NodeIdentity) {
        self.directory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.node_id.clone(), identity);
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn store_identity(
        &self,
        req: &RegisterRequest,
        result: &VerificationResult,
        public_key_der: Vec<u8>,
        now_unix: i64,
    ) {
        let security_level = result.security_level.unwrap_or(SecurityLevel::Tee);
        let identity = NodeIdentity {
            node_id: req.node_id.clone(),
            public_key_der,
            trust_tier: if security_level == SecurityLevel::StrongBox {
                2
            } else {
                1
            },
            security_level,
            device_locked: result.device_locked.unwrap_or(false),
            boot_state: result.boot_state.unwrap_or(VerifiedBootState::Verified),
            registered_at: now_unix,
        };
        self.insert_identity(identity);
    }
}

/// Synthetic result used when dev mode bypasses attestation.
fn dev_mode_result() -> VerificationResult {
    VerificationResult {
        success: true,
        message: "dev mode: attestation bypassed".to_string(),
        security_level: Some(SecurityLevel::Tee),
        device_locked: Some(true),
        boot_state: Some(VerifiedBootState::Verified),
        creation_time: None,
        attestation_version: None,
        os_version: None,
        os_patch_level: None,
    }
}
