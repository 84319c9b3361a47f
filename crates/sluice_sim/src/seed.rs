//! Seed management for reproducible simulated randomness.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Seed for the simulated sandbox's random source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimSeed(u64);

impl SimSeed {
    /// Create a seed from a literal value
    #[must_use]
    pub const fn from_literal(seed: u64) -> Self {
        Self(seed)
    }

    /// Create a seed by hashing a label
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let digest = blake3::hash(label.as_bytes());
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        Self(u64::from_le_bytes(word))
    }

    /// Seed value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Deterministic RNG for this seed
    #[must_use]
    pub fn into_rng(self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.0)
    }
}

impl Default for SimSeed {
    fn default() -> Self {
        Self(42)
    }
}
