//! Live-tunable physics parameters
//!
//! Owned by the `Simulation` and replaced through `Simulation::set_physics`,
//! so sliders and tests both hand the engine an explicit value.

use serde::{Deserialize, Serialize};

use crate::consts::MAX_STEP_MS;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsParams {
    /// Gravity in peg spacings per second squared
    pub gravity: f32,
    /// Exponential drag between peg rows (1/s)
    pub peg_drag: f32,
    /// Exponential drag below the last row (1/s)
    pub settle_drag: f32,
    /// Bounce restitution off a peg
    pub restitution: f32,
    /// Relative per-peg spread of restitution (0 = identical bounces)
    pub restitution_jitter: f32,
    /// Blend toward the target peg x on contact (0 = none, 1 = snap)
    pub nudge: f32,
    /// Peg collision radius as a fraction of peg spacing
    pub peg_radius: f32,
    /// Largest normalized contact offset (keeps the normal off horizontal)
    pub max_offset: f32,
    /// Smallest normalized contact offset, signed by the path bit
    pub min_lateral: f32,
    /// Emission x spread as a fraction of peg spacing
    pub emit_spread: f32,
    /// Half-width of a bin column as a fraction of peg spacing
    pub bin_slot: f32,
    /// Longest physics step per update (ms)
    pub max_step_ms: f64,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            gravity: 40.0,
            peg_drag: 0.6,
            settle_drag: 2.5,
            restitution: 0.45,
            restitution_jitter: 0.25,
            nudge: 0.35,
            peg_radius: 0.5,
            max_offset: 0.9,
            min_lateral: 0.2,
            emit_spread: 0.15,
            bin_slot: 0.45,
            max_step_ms: MAX_STEP_MS,
        }
    }
}

impl PhysicsParams {
    /// Frictionless, perfectly elastic, no steering
    pub fn elastic() -> Self {
        Self {
            peg_drag: 0.0,
            settle_drag: 0.0,
            restitution: 1.0,
            restitution_jitter: 0.0,
            nudge: 0.0,
            min_lateral: 0.0,
            emit_spread: 0.0,
            ..Self::default()
        }
    }

    /// Bring slider input back into a range the integrator can use
    pub fn clamped(&self) -> Self {
        let max_offset = self.max_offset.clamp(0.0, 0.99);
        Self {
            gravity: self.gravity.max(0.0),
            peg_drag: self.peg_drag.max(0.0),
            settle_drag: self.settle_drag.max(0.0),
            restitution: self.restitution.clamp(0.0, 1.0),
            restitution_jitter: self.restitution_jitter.clamp(0.0, 1.0),
            nudge: self.nudge.clamp(0.0, 1.0),
            peg_radius: self.peg_radius.max(0.01),
            max_offset,
            min_lateral: self.min_lateral.clamp(0.0, max_offset),
            emit_spread: self.emit_spread.clamp(0.0, 1.0),
            bin_slot: self.bin_slot.clamp(0.0, 0.5),
            max_step_ms: self.max_step_ms.clamp(1.0, 1000.0),
        }
    }
}
