//! Single-use challenge issuance and anti-replay verification.
//!
//! The store hands out 32-byte random tokens that a device must embed in
//! its attestation certificate to prove freshness. A token is removed from
//! the store on its *first* verification attempt, successful or not — a
//! captured certificate can never be replayed.
//!
//! Time and entropy are injected so tests can drive both deterministically;
//! nothing here reads ambient global state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::RngCore;
use tracing::{debug, warn};

use crate::error::VerifyError;

/// Number of random bytes per challenge (256 bits of entropy).
pub const CHALLENGE_BYTES: usize = 32;

/// Clock abstraction for the store's TTL checks.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// Real monotonic clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Source of challenge entropy.
pub trait NonceSource: Send + Sync {
    /// Fill `buf` with cryptographically secure random bytes.
    fn fill(&self, buf: &mut [u8]) -> Result<(), VerifyError>;
}

/// Operating-system CSPRNG.
#[derive(Debug, Default)]
pub struct OsNonceSource;

impl NonceSource for OsNonceSource {
    fn fill(&self, buf: &mut [u8]) -> Result<(), VerifyError> {
        rand::rngs::OsRng
            .try_fill_bytes(buf)
            .map_err(|e| VerifyError::RandomnessUnavailable {
                reason: e.to_string(),
            })
    }
}

/// Issues time-bound, single-use challenge tokens.
///
/// All operations serialize on one lock; each critical section is a map
/// lookup or a retain pass, so contention is not a concern at the expected
/// volume.
pub struct ChallengeStore {
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    nonce_source: Arc<dyn NonceSource>,
}

impl ChallengeStore {
    /// Create a store backed by the system clock and OS CSPRNG.
    pub fn new(ttl: Duration) -> Self {
        Self::with_parts(ttl, Arc::new(SystemClock), Arc::new(OsNonceSource))
    }

    /// Create a store with injected clock and entropy source.
    pub fn with_parts(
        ttl: Duration,
        clock: Arc<dyn Clock>,
        nonce_source: Arc<dyn NonceSource>,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
            nonce_source,
        }
    }

    /// Issue a fresh challenge token.
    ///
    /// Draws 32 random bytes, hex-encodes them, records the issuance time,
    /// and opportunistically sweeps stale entries while the lock is held.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::RandomnessUnavailable`] if the entropy source
    /// fails.
    pub fn generate(&self) -> Result<String, VerifyError> {
        let mut nonce = [0u8; CHALLENGE_BYTES];
        self.nonce_source.fill(&mut nonce)?;
        let token = hex::encode(nonce);

        let now = self.clock.now();
        let ttl = self.ttl;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, issued| now.saturating_duration_since(*issued) <= ttl);
        entries.insert(token.clone(), now);

        debug!(token = %token, "issued challenge");
        Ok(token)
    }

    /// Check a token and consume it.
    ///
    /// Removal is unconditional on lookup: whatever the outcome, the token
    /// can never verify again. Returns `true` only if the token was present
    /// and within its TTL.
    pub fn verify(&self, token: &str) -> bool {
        let now = self.clock.now();
        let issued = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.remove(token)
        };

        match issued {
            None => {
                warn!(token = %token, "challenge unknown or already used");
                false
            },
            Some(issued) if now.saturating_duration_since(issued) > self.ttl => {
                warn!(token = %token, "challenge expired");
                false
            },
            Some(_) => true,
        }
    }

    /// Remove every entry older than the TTL. Returns how many were removed.
    ///
    /// Runs synchronously inside [`generate`](Self::generate) and on the
    /// caller's periodic schedule; interleaving with foreground calls is
    /// safe because everything serializes on the one lock.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, issued| now.saturating_duration_since(*issued) <= ttl);
        before - entries.len()
    }

    /// Number of outstanding challenges.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no challenges are outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
