use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{EngineError, EngineResult};
use crate::symbols::{REELS, SLOTS};

// Provably-fair derivation:
// server_secret + "-" + client_seed + "-" + nonce -> SHA-256 -> reel stops and respin draws.
// Bonus tier draws are HMAC-SHA256 keyed by the same digest, so nothing leaves the seed chain.

pub type HmacSha256 = Hmac<Sha256>;

/// Length of the hex digest produced by [`derive_hash_hex`].
pub const DIGEST_HEX_LEN: usize = 64;
const DIGEST_LEN: usize = DIGEST_HEX_LEN / 2;

// One 8-hex slice per reel and one 4-hex slice per respin slot must fit in a single digest.
const _: () = assert!(DIGEST_HEX_LEN >= REELS * 8);
const _: () = assert!(DIGEST_HEX_LEN >= SLOTS * 4);

pub fn digest(input: &[u8]) -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&Sha256::digest(input));
    out
}

pub fn derive_hash_hex(input: &[u8]) -> String {
    hex::encode(digest(input))
}

/// `n` bytes from the operating system CSPRNG. Never falls back to a weaker source.
pub fn random_bytes(n: usize) -> EngineResult<Vec<u8>> {
    let mut out = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut out)
        .map_err(|e| EngineError::Entropy(e.to_string()))?;
    Ok(out)
}

/// Maps a u32 onto [0, 1).
pub fn unit_interval(v: u32) -> f64 {
    (v as f64) / (u32::MAX as f64 + 1.0)
}

/// Digest of one spin or respin's seed state.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DerivedHash([u8; DIGEST_LEN]);

impl DerivedHash {
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// 32-bit slice for `reel`: hex characters `[8*reel, 8*reel + 8)`.
    pub fn reel_slice(&self, reel: usize) -> u32 {
        let b = &self.0[reel * 4..reel * 4 + 4];
        u32::from_be_bytes([b[0], b[1], b[2], b[3]])
    }

    /// 16-bit slice for `slot`: hex characters `[4*slot, 4*slot + 4)`.
    pub fn slot_slice(&self, slot: usize) -> u16 {
        let b = &self.0[slot * 2..slot * 2 + 2];
        u16::from_be_bytes([b[0], b[1]])
    }

    /// Labelled draw in [0, 1): HMAC-SHA256 keyed by this digest over `label`.
    pub fn labelled_unit(&self, label: &str) -> f64 {
        let mut mac = HmacSha256::new_from_slice(&self.0).expect("HMAC accepts any key length");
        mac.update(label.as_bytes());
        let out = mac.finalize().into_bytes();
        unit_interval(u32::from_be_bytes([out[0], out[1], out[2], out[3]]))
    }
}

impl fmt::Debug for DerivedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedHash({})", self.to_hex())
    }
}

impl fmt::Display for DerivedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Seed state for a single spin or respin.
#[derive(Clone)]
pub struct SpinSeeds {
    pub server_secret: String,
    pub client_seed: String,
    pub nonce: u64,
}

impl SpinSeeds {
    pub fn new(
        server_secret: impl Into<String>,
        client_seed: impl Into<String>,
        nonce: u64,
    ) -> Self {
        Self {
            server_secret: server_secret.into(),
            client_seed: client_seed.into(),
            nonce,
        }
    }

    pub fn derived_hash(&self) -> DerivedHash {
        let msg = format!("{}-{}-{}", self.server_secret, self.client_seed, self.nonce);
        DerivedHash(digest(msg.as_bytes()))
    }

    /// Same secret and client seed at another nonce.
    pub fn with_nonce(&self, nonce: u64) -> Self {
        Self {
            nonce,
            ..self.clone()
        }
    }
}

impl fmt::Debug for SpinSeeds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinSeeds")
            .field("server_secret", &"<redacted>")
            .field("client_seed", &self.client_seed)
            .field("nonce", &self.nonce)
            .finish()
    }
}
