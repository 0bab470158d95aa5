//! Server secret commitments.
//!
//! A round starts by drawing a fresh secret and publishing only its SHA-256 digest. The
//! secret itself is handed out once the round is over, at which point anyone can recompute
//! the digest and compare it to what was published before the spin.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineResult;
use crate::rng::{derive_hash_hex, random_bytes};

/// Bytes of entropy behind every server secret.
pub const SECRET_BYTES: usize = 32;

/// Hex-encoded server secret. Hidden until the round is revealed.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerSecret(String);

impl ServerSecret {
    pub fn generate() -> EngineResult<Self> {
        Ok(Self(hex::encode(random_bytes(SECRET_BYTES)?)))
    }

    /// Wraps an already revealed secret, e.g. for verification.
    pub fn from_revealed(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn commitment(&self) -> Commitment {
        Commitment(derive_hash_hex(self.0.as_bytes()))
    }
}

impl fmt::Debug for ServerSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServerSecret(<redacted>)")
    }
}

/// Digest of a server secret, safe to publish before the spin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Commitment(String);

impl Commitment {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, secret: &str) -> bool {
        verify_commitment(secret, self)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Draws a fresh secret and its commitment. Only the commitment may leave the server.
pub fn begin_round() -> EngineResult<(ServerSecret, Commitment)> {
    let secret = ServerSecret::generate()?;
    let commitment = secret.commitment();
    Ok((secret, commitment))
}

/// Recomputes the commitment of a revealed secret.
pub fn reveal_round(secret: &str) -> Commitment {
    Commitment(derive_hash_hex(secret.as_bytes()))
}

pub fn verify_commitment(secret: &str, published: &Commitment) -> bool {
    reveal_round(secret) == *published
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_is_digest_of_secret() {
        let (secret, commitment) = begin_round().unwrap();
        assert_eq!(secret.expose().len(), SECRET_BYTES * 2);
        assert_eq!(
            commitment.as_str(),
            derive_hash_hex(secret.expose().as_bytes())
        );
        assert!(verify_commitment(secret.expose(), &commitment));
    }

    #[test]
    fn other_secret_fails_commitment() {
        let (secret, commitment) = begin_round().unwrap();
        let (other, _) = begin_round().unwrap();
        assert_ne!(secret, other);
        assert!(!commitment.matches(other.expose()));
        assert!(!commitment.matches(&format!("{}0", secret.expose())));
    }

    #[test]
    fn published_commitment_is_case_insensitive() {
        let secret = ServerSecret::from_revealed("abc001");
        let upper = Commitment::from_hex(secret.commitment().as_str().to_uppercase());
        assert!(upper.matches("abc001"));
    }

    #[test]
    fn debug_redacts_secret() {
        let secret = ServerSecret::from_revealed("hunter2");
        assert_eq!(format!("{secret:?}"), "ServerSecret(<redacted>)");
    }
}
