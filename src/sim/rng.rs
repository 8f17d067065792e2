//! Seeded random source for particle paths
//!
//! Every random draw in the simulation goes through a `SeededRng`. It never
//! touches the platform entropy source, so the same seed and the same call
//! sequence give bit-identical particle paths on every platform.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Deterministic PCG stream seeded from an integer
#[derive(Debug, Clone)]
pub struct SeededRng {
    seed: u64,
    inner: Pcg32,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: Pcg32::seed_from_u64(seed),
        }
    }

    /// Seed this stream was created from
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform float in [0, 1)
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        self.inner.random::<f64>()
    }

    /// Uniform float in [0, 1)
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        self.inner.random::<f32>()
    }

    /// Fair coin flip: 1 = right, 0 = left
    #[inline]
    pub fn next_bit(&mut self) -> u8 {
        u8::from(self.next_f64() >= 0.5)
    }
}

/// Stateless hash of a per-particle value and a row, mapped to [0, 1)
///
/// Used for per-peg variation that must not consume draws from the stream.
pub fn peg_noise(jitter: f32, row: u32) -> f32 {
    let mut z = (jitter.to_bits() as u64) ^ (u64::from(row).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    (z >> 40) as f32 / (1u64 << 24) as f32
}
