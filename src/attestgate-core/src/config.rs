//! Configuration for the verification engine.

use std::time::Duration;

/// Engine-level configuration.
///
/// `dev_mode` and `require_trusted_chain` are the two security-posture
/// switches: both default to the posture the production protocol expects,
/// and any relaxation has to be an explicit, auditable configuration choice.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an issued challenge stays valid.
    pub challenge_ttl: Duration,
    /// Interval for the background sweep of stale challenges.
    pub sweep_interval: Duration,
    /// Treat a failed chain-of-trust walk as fatal instead of advisory.
    ///
    /// The walk runs whenever more than one certificate is submitted; with
    /// this flag off its failures are only logged.
    pub require_trusted_chain: bool,
    /// Skip TEE and signature verification entirely.
    ///
    /// Every bypassed request is logged with a warning. Never enable this
    /// outside development.
    pub dev_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            challenge_ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
            require_trusted_chain: false,
            dev_mode: false,
        }
    }
}
