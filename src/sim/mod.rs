//! Deterministic simulation module
//!
//! All board logic lives here. This module must be pure and deterministic:
//! - Seeded RNG only, one stream per engine
//! - Emission driven by timer-supplied elapsed time, never by frame deltas
//! - Stable iteration order (creation order of particles)
//! - No rendering or platform dependencies

pub mod collision;
pub mod engine;
pub mod ground;
pub mod layout;
pub mod params;
pub mod particle;
pub mod physics;
pub mod purge;
pub mod rng;
pub mod run;

pub use collision::{apply_drag, ballistic, peg_normal, reflect_velocity, time_to_reach};
pub use engine::{SimConfig, Simulation};
pub use ground::{FlatGround, FnGround, Ground, stack_ground_y};
pub use layout::{Accumulation, BoardGeom, Hopper, Layout, Viewport, bin_probability, max_bin_probability};
pub use params::PhysicsParams;
pub use particle::Particle;
pub use physics::{StepReport, advance_particle};
pub use purge::{BinDrain, Drain, Grain, Refill};
pub use rng::{SeededRng, peg_noise};
pub use run::{FrameOutput, Run, RunEvent, RunPhase, TimerPort};
