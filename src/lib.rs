//! Galton Timer - a particle Galton board that counts down a timer
//!
//! Core modules:
//! - `sim`: Deterministic simulation (layout, particles, physics, run state)
//! - `timer`: Countdown task running on its own thread, message-driven
//! - `config`: Validated board configuration (rows, particles, duration, seed)
//! - `web`: wasm32 bindings for the browser front-end

pub mod config;
pub mod sim;
pub mod timer;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use config::{BoardConfig, ConfigError};
pub use sim::{Layout, PhysicsParams, Run, RunPhase, Simulation, Viewport};
pub use timer::{TimerCommand, TimerEvent, TimerHandle};

/// Board configuration constants
pub mod consts {
    /// Row count bounds accepted at the configuration boundary
    pub const MIN_ROWS: u32 = 4;
    pub const MAX_ROWS: u32 = 64;
    /// Particle count bounds accepted at the configuration boundary
    pub const MIN_PARTICLES: u32 = 10;
    pub const MAX_PARTICLES: u32 = 3600;
    /// Shortest countdown (seconds)
    pub const MIN_DURATION_SECS: f64 = 1.0;

    /// Largest physics step per frame (ms); longer frames are truncated
    pub const MAX_STEP_MS: f64 = 100.0;

    /// Timer tick cadence (ms)
    pub const TICK_INTERVAL_MS: u64 = 100;

    /// Vertical peg spacing relative to horizontal spacing (equilateral lattice)
    pub const ROW_ASPECT: f32 = 0.866;
    /// Fraction of viewport height the peg board aims to occupy
    pub const BOARD_HEIGHT_FRACTION: f32 = 0.4;
    /// Fraction of viewport height reserved for the hopper
    pub const HOPPER_HEIGHT_FRACTION: f32 = 0.14;
    /// Share of the accumulation height the tallest stack may use
    pub const STACK_FILL: f32 = 0.95;
    /// Headroom over the expected count of the central bin
    pub const STACK_SAFETY: f32 = 1.15;
    /// Smallest extent any derived length may collapse to
    pub const MIN_EXTENT: f32 = 1.0;
    /// Smallest peg spacing
    pub const MIN_PEG_SPACING: f32 = 0.5;
    /// Smallest height of one settled layer
    pub const MIN_STACK_ROW_H: f32 = 0.01;

    /// Gravity for drained stacks and refill grains (px/s²)
    pub const GRAIN_GRAVITY: f32 = 2400.0;
    /// Longest random delay before a bin starts draining (seconds)
    pub const DRAIN_MAX_DELAY: f32 = 0.35;
    /// Refill pre-roll length (ms)
    pub const REFILL_DURATION_MS: f64 = 1500.0;
    /// Grains shown falling into the hopper during refill
    pub const REFILL_GRAINS: usize = 48;
}

/// Linear interpolation between `a` and `b`
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Finite-or-fallback guard for derived geometry
#[inline]
pub fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}
