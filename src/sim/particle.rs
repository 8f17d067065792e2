//! Particle: a precomputed binomial path plus live kinetic state

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::rng::SeededRng;

/// A falling grain
///
/// `path` is drawn once at creation and decides the bin; physics only
/// animates the trip there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// One choice per peg row: 0 = left, 1 = right
    path: Vec<u8>,
    /// Sum of `path`, cached at creation
    bin: u32,
    pub pos: Vec2,
    pub vel: Vec2,
    /// Next peg row to resolve; equals the row count once in the settle phase
    pub peg_index: u32,
    pub settled: bool,
    /// Fixed per-particle value in [0, 1) for bounce variation
    pub jitter: f32,
}

impl Particle {
    /// Draw a new particle from the stream. Consumes `num_rows + 1` draws.
    pub fn spawn(rng: &mut SeededRng, num_rows: u32, emit: Vec2, spread: f32) -> Self {
        let path: Vec<u8> = (0..num_rows).map(|_| rng.next_bit()).collect();
        let jitter = rng.next_f32();
        let mut particle = Self::from_path(path, jitter);
        particle.pos = Vec2::new(emit.x + (jitter - 0.5) * spread, emit.y);
        particle
    }

    /// Build a particle at rest at the origin from an explicit path
    pub fn from_path(path: Vec<u8>, jitter: f32) -> Self {
        let bin = path.iter().map(|&b| u32::from(b)).sum();
        Self {
            path,
            bin,
            pos: Vec2::ZERO,
            vel: Vec2::ZERO,
            peg_index: 0,
            settled: false,
            jitter,
        }
    }

    pub fn path(&self) -> &[u8] {
        &self.path
    }

    pub fn bin(&self) -> u32 {
        self.bin
    }

    pub fn num_rows(&self) -> u32 {
        self.path.len() as u32
    }

    /// Direction bit at `row` (1 = right); rows past the path read as left
    pub fn direction(&self, row: u32) -> u8 {
        self.path.get(row as usize).copied().unwrap_or(0)
    }

    /// Lattice index of the peg this particle meets at `row`
    pub fn peg_slot(&self, row: u32) -> u32 {
        let row = (row as usize).min(self.path.len());
        self.path[..row].iter().map(|&b| u32::from(b)).sum()
    }

    /// Past the last peg row, falling toward the pile
    pub fn in_settle_phase(&self) -> bool {
        self.peg_index >= self.num_rows()
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos.x
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos.y
    }

    #[inline]
    pub fn vx(&self) -> f32 {
        self.vel.x
    }

    #[inline]
    pub fn vy(&self) -> f32 {
        self.vel.y
    }
}
