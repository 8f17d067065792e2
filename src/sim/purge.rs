//! End-of-round animations: draining the stacks and refilling the hopper
//!
//! Both run on their own simple kinematics and never touch particle paths.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::layout::Layout;
use super::rng::SeededRng;
use crate::consts::*;

/// Drain state of one bin's stack
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinDrain {
    /// Downward offset of the whole stack (px)
    pub offset: f32,
    pub velocity: f32,
    /// Seconds left before this stack starts falling
    pub delay: f32,
    /// Render opacity, 0 once the stack is gone
    pub alpha: f32,
}

/// Stacks falling off-screen, each after its own random delay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drain {
    bins: Vec<BinDrain>,
    fall_distance: f32,
}

impl Drain {
    pub fn new(bin_counts: &[u32], fall_distance: f32, seed: u64) -> Self {
        let mut rng = SeededRng::new(seed);
        let bins = bin_counts
            .iter()
            .map(|&count| BinDrain {
                offset: 0.0,
                velocity: 0.0,
                delay: rng.next_f32() * DRAIN_MAX_DELAY,
                alpha: if count > 0 { 1.0 } else { 0.0 },
            })
            .collect();
        Self {
            bins,
            fall_distance: fall_distance.max(MIN_EXTENT),
        }
    }

    /// Advance by `dt` seconds; true once every stack has faded out
    pub fn advance(&mut self, dt: f32) -> bool {
        let dt = dt.max(0.0);
        for bin in self.bins.iter_mut().filter(|b| b.alpha > 0.0) {
            let mut t = dt;
            if bin.delay > 0.0 {
                bin.delay -= t;
                if bin.delay > 0.0 {
                    continue;
                }
                t = -bin.delay;
                bin.delay = 0.0;
            }
            bin.velocity += GRAIN_GRAVITY * t;
            bin.offset += bin.velocity * t;
            bin.alpha = (1.0 - bin.offset / self.fall_distance).max(0.0);
        }
        self.is_done()
    }

    pub fn is_done(&self) -> bool {
        self.bins.iter().all(|b| b.alpha <= 0.0)
    }

    pub fn bins(&self) -> &[BinDrain] {
        &self.bins
    }
}

/// A grain of the refill pre-roll
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grain {
    pub pos: Vec2,
    pub vel: Vec2,
    /// Seconds before this grain starts falling
    pub delay: f32,
    pub landed: bool,
}

/// Fixed-length animation of grains pouring into the hopper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refill {
    grains: Vec<Grain>,
    elapsed_ms: f64,
    duration_ms: f64,
    funnel_top: f32,
    funnel_bottom: f32,
    top_half_width: f32,
    neck_half_width: f32,
    center_x: f32,
}

impl Refill {
    pub fn new(layout: &Layout, seed: u64) -> Self {
        let mut rng = SeededRng::new(seed);
        let hopper = layout.hopper;
        let center_x = layout.geom.center_x;
        let spawn_window = (REFILL_DURATION_MS * 0.5 / 1000.0) as f32;
        let grains = (0..REFILL_GRAINS)
            .map(|_| {
                let x = center_x + (rng.next_f32() * 2.0 - 1.0) * hopper.top_half_width;
                Grain {
                    pos: Vec2::new(x, hopper.top - rng.next_f32() * layout.viewport.height.max(MIN_EXTENT) * 0.1),
                    vel: Vec2::ZERO,
                    delay: rng.next_f32() * spawn_window,
                    landed: false,
                }
            })
            .collect();
        Self {
            grains,
            elapsed_ms: 0.0,
            duration_ms: REFILL_DURATION_MS,
            funnel_top: hopper.top,
            funnel_bottom: hopper.bottom,
            top_half_width: hopper.top_half_width,
            neck_half_width: hopper.neck_half_width,
            center_x,
        }
    }

    /// Advance by `dt_ms`; true once the fixed duration has passed
    pub fn advance(&mut self, dt_ms: f64) -> bool {
        let dt_ms = dt_ms.max(0.0);
        self.elapsed_ms += dt_ms;
        let dt = (dt_ms / 1000.0) as f32;
        let rest_y = self.funnel_bottom;

        for grain in self.grains.iter_mut().filter(|g| !g.landed) {
            let mut t = dt;
            if grain.delay > 0.0 {
                grain.delay -= t;
                if grain.delay > 0.0 {
                    continue;
                }
                t = -grain.delay;
                grain.delay = 0.0;
            }
            grain.vel.y += GRAIN_GRAVITY * t;
            grain.pos += grain.vel * t;

            // Funnel walls narrow linearly from top to neck
            let depth = (self.funnel_bottom - self.funnel_top).max(MIN_EXTENT);
            let f = ((grain.pos.y - self.funnel_top) / depth).clamp(0.0, 1.0);
            let half = crate::lerp(self.top_half_width, self.neck_half_width, f);
            grain.pos.x = grain.pos.x.clamp(self.center_x - half, self.center_x + half);

            if grain.pos.y >= rest_y {
                grain.pos.y = rest_y;
                grain.vel = Vec2::ZERO;
                grain.landed = true;
            }
        }
        self.is_done()
    }

    pub fn is_done(&self) -> bool {
        self.elapsed_ms >= self.duration_ms
    }

    /// Fraction of the pre-roll elapsed, 0..=1
    pub fn progress(&self) -> f32 {
        (self.elapsed_ms / self.duration_ms).clamp(0.0, 1.0) as f32
    }

    pub fn grains(&self) -> &[Grain] {
        &self.grains
    }
}
