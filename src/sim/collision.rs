//! Continuous collision primitives
//!
//! Particles never step-then-check. Each segment of motion solves for the
//! exact time the particle reaches the next horizontal plane (a peg row or
//! the pile surface) and advances to that instant.

use glam::Vec2;

/// Below this magnitude gravity is treated as zero and motion as linear
pub const GRAVITY_EPSILON: f32 = 1e-6;

/// Time until `y(t) = y0 + vy t + g t² / 2` reaches `target`
///
/// Returns the smallest non-negative root, `Some(0.0)` when the particle is
/// already at or past the plane, and `None` when the plane is never reached.
pub fn time_to_reach(y0: f32, vy: f32, g: f32, target: f32) -> Option<f32> {
    let d = target - y0;
    if d <= 0.0 {
        return Some(0.0);
    }

    if g.abs() < GRAVITY_EPSILON {
        return if vy > 0.0 { Some(d / vy) } else { None };
    }

    let disc = vy * vy + 2.0 * g * d;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();

    if g > 0.0 {
        // Only one positive root; this form avoids cancellation when vy >> g t
        return Some(2.0 * d / (vy + sq));
    }

    let t1 = (-vy - sq) / g;
    let t2 = (-vy + sq) / g;
    let (lo, hi) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
    if lo >= 0.0 {
        Some(lo)
    } else if hi >= 0.0 {
        Some(hi)
    } else {
        None
    }
}

/// Constant-acceleration motion under vertical gravity for time `t`
#[inline]
pub fn ballistic(pos: Vec2, vel: Vec2, g: f32, t: f32) -> (Vec2, Vec2) {
    let accel = Vec2::new(0.0, g);
    (pos + vel * t + 0.5 * accel * t * t, vel + accel * t)
}

/// Closed-form exponential damping over `dt`
#[inline]
pub fn apply_drag(vel: Vec2, coeff: f32, dt: f32) -> Vec2 {
    vel * (-coeff * dt).exp()
}

/// Surface normal of a circular peg at normalized horizontal offset `u`
///
/// Screen space: +y is down, so the normal of the upper half points to -y.
#[inline]
pub fn peg_normal(u: f32) -> Vec2 {
    let u = u.clamp(-1.0, 1.0);
    Vec2::new(u, -(1.0 - u * u).max(0.0).sqrt())
}

/// Reflect the normal component of `velocity` with restitution `e`
///
/// Velocities already leaving the surface are returned unchanged.
#[inline]
pub fn reflect_velocity(velocity: Vec2, normal: Vec2, e: f32) -> Vec2 {
    let vn = velocity.dot(normal);
    if vn >= 0.0 {
        return velocity;
    }
    velocity - (1.0 + e) * vn * normal
}
