//! Per-particle integration with analytic time of impact
//!
//! A tick is split into segments. Each segment ends either when the tick's
//! time budget runs out or exactly at the next horizontal plane the particle
//! must meet: the next peg row while it is in the lattice, the pile surface
//! once it has passed the last row. No plane can be skipped at any frame
//! rate, so every row registers exactly one contact.

use glam::Vec2;

use super::collision::{apply_drag, ballistic, peg_normal, reflect_velocity, time_to_reach};
use super::ground::Ground;
use super::layout::BoardGeom;
use super::params::PhysicsParams;
use super::particle::Particle;
use super::rng::peg_noise;

/// What happened to one particle during a tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Peg rows resolved this tick
    pub pegs_hit: u32,
    /// Particle reached the pile surface
    pub settled: bool,
}

/// Advance `particle` by `dt` seconds
pub fn advance_particle<G: Ground + ?Sized>(
    particle: &mut Particle,
    dt: f32,
    params: &PhysicsParams,
    geom: &BoardGeom,
    ground: &G,
    bin_counts: &[u32],
) -> StepReport {
    let mut report = StepReport::default();
    if particle.settled || dt <= 0.0 {
        return report;
    }

    let g = params.gravity * geom.peg_spacing;
    particle.vel = apply_drag(particle.vel, drag_coeff(particle, params, geom), dt);

    let mut remaining = dt;
    for _ in 0..geom.num_rows + 2 {
        if remaining <= 0.0 {
            break;
        }

        let settling = particle.peg_index >= geom.num_rows;
        let target = if settling {
            keep_in_bin_column(particle, params, geom);
            ground.ground_y(particle.pos.x, bin_counts)
        } else {
            geom.peg_y(particle.peg_index)
        };

        match time_to_reach(particle.pos.y, particle.vel.y, g, target) {
            Some(t) if t <= remaining => {
                let (pos, vel) = ballistic(particle.pos, particle.vel, g, t);
                particle.pos = Vec2::new(pos.x, target);
                particle.vel = vel;
                remaining -= t;

                if settling {
                    particle.settled = true;
                    particle.vel = Vec2::ZERO;
                    report.settled = true;
                    break;
                }
                bounce_off_peg(particle, params, geom);
                report.pegs_hit += 1;
                if particle.peg_index == geom.num_rows {
                    // Peg drag was charged for the whole tick; the rest is settle drag
                    let extra = params.settle_drag - params.peg_drag;
                    particle.vel = apply_drag(particle.vel, extra, remaining);
                }
            }
            _ => {
                let (pos, vel) = ballistic(particle.pos, particle.vel, g, remaining);
                particle.pos = pos;
                particle.vel = vel;
                remaining = 0.0;
            }
        }
    }

    particle.pos.x = particle.pos.x.clamp(geom.left, geom.right);
    report
}

fn drag_coeff(particle: &Particle, params: &PhysicsParams, geom: &BoardGeom) -> f32 {
    if particle.peg_index >= geom.num_rows {
        params.settle_drag
    } else {
        params.peg_drag
    }
}

/// Resolve contact with the peg at `particle.peg_index` and move to the next row
fn bounce_off_peg(particle: &mut Particle, params: &PhysicsParams, geom: &BoardGeom) {
    let row = particle.peg_index;
    let peg_x = geom.peg_x(row, particle.peg_slot(row));

    // Visual capture toward the lattice position of the precomputed path
    particle.pos.x += (peg_x - particle.pos.x) * params.nudge;

    let radius = (params.peg_radius * geom.peg_spacing).max(f32::EPSILON);
    let mut u = ((particle.pos.x - peg_x) / radius).clamp(-params.max_offset, params.max_offset);
    // Never bounce against the path direction
    u = if particle.direction(row) == 1 {
        u.max(params.min_lateral)
    } else {
        u.min(-params.min_lateral)
    };

    let spread = 2.0 * peg_noise(particle.jitter, row) - 1.0;
    let e = (params.restitution * (1.0 + params.restitution_jitter * spread)).clamp(0.0, 1.0);

    particle.vel = reflect_velocity(particle.vel, peg_normal(u), e);
    particle.peg_index += 1;
}

/// Below the lattice the particle stays over its own bin
fn keep_in_bin_column(particle: &mut Particle, params: &PhysicsParams, geom: &BoardGeom) {
    let center = geom.bin_x(particle.bin());
    let half = params.bin_slot * geom.peg_spacing;
    let x = particle.pos.x.clamp(center - half, center + half);
    if x != particle.pos.x {
        particle.pos.x = x;
        particle.vel.x = 0.0;
    }
}
