//! Hashing helpers for values stored in state.
//!
//! Secrets such as root passwords are written to state as SHA-256 digests so
//! the host can detect a change without ever persisting the plaintext. Data
//! sources derive a stable id from the canonical JSON of their filter.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Hasher for secrets and data source ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct StateHasher;

impl StateHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Hex SHA-256 digest of a secret.
    #[must_use]
    pub fn hash_secret(&self, secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// True when `value` already has the shape of a stored digest.
    #[must_use]
    pub fn is_digest(value: &str) -> bool {
        value.len() == DIGEST_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Digest of a secret unless it is already stored as one.
    #[must_use]
    pub fn state_secret(&self, value: &str) -> String {
        if Self::is_digest(value) {
            value.to_string()
        } else {
            self.hash_secret(value)
        }
    }

    /// Stable id for a data source query.
    ///
    /// `serde_json` maps are ordered, so equal queries serialize identically.
    #[must_use]
    pub fn filter_id(&self, query: &serde_json::Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(query.to_string().as_bytes());
        STANDARD.encode(hasher.finalize())
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        // Constant-time comparison
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// True when a plaintext secret corresponds to a stored digest.
    #[must_use]
    pub fn secret_matches(&self, plaintext: &str, stored: &str) -> bool {
        Self::hashes_match(&self.state_secret(plaintext), stored)
    }
}
