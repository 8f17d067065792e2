//! Simulation engine: emission schedule, integration, accumulation
//!
//! Emission is a pure function of the externally supplied elapsed time.
//! `update` never uses its frame delta to decide how many particles exist;
//! the delta only drives physics for particles already in flight. After any
//! stall the next `update` emits exactly the particles that should exist by
//! now, never more and never fewer.

use glam::Vec2;

use super::ground::Ground;
use super::layout::BoardGeom;
use super::params::PhysicsParams;
use super::particle::Particle;
use super::physics::advance_particle;
use super::purge::Drain;
use super::rng::SeededRng;

/// Fixed shape of one round
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    pub num_rows: u32,
    pub total_particles: u32,
    pub total_time_ms: f64,
}

/// Particles, bins and the emission clock for one round
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimConfig,
    physics: PhysicsParams,
    rng: SeededRng,
    /// In-flight particles in creation order
    active: Vec<Particle>,
    bin_counts: Vec<u32>,
    emitted_count: u32,
    elapsed_ms: f64,
    /// Rounds completed through `reset`
    round: u32,
    drain: Option<Drain>,
}

impl Simulation {
    pub fn new(config: SimConfig, rng: SeededRng) -> Self {
        log::debug!(
            "Simulation: {} rows, {} particles over {:.1}s (seed {})",
            config.num_rows,
            config.total_particles,
            config.total_time_ms / 1000.0,
            rng.seed()
        );
        Self {
            config,
            physics: PhysicsParams::default(),
            rng,
            active: Vec::new(),
            bin_counts: vec![0; config.num_rows as usize + 1],
            emitted_count: 0,
            elapsed_ms: 0.0,
            round: 0,
            drain: None,
        }
    }

    pub fn with_physics(mut self, physics: PhysicsParams) -> Self {
        self.set_physics(physics);
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn physics(&self) -> &PhysicsParams {
        &self.physics
    }

    /// Swap tuning live; particles in flight keep their state
    pub fn set_physics(&mut self, physics: PhysicsParams) {
        self.physics = physics.clamped();
    }

    /// Written only from timer ticks
    pub fn set_elapsed_ms(&mut self, elapsed_ms: f64) {
        self.elapsed_ms = elapsed_ms;
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    /// Stretch the schedule (timer ADD_TIME). Already emitted particles stay.
    pub fn set_total_time_ms(&mut self, total_time_ms: f64) {
        self.config.total_time_ms = total_time_ms;
    }

    pub fn active(&self) -> &[Particle] {
        &self.active
    }

    pub fn bin_counts(&self) -> &[u32] {
        &self.bin_counts
    }

    pub fn emitted_count(&self) -> u32 {
        self.emitted_count
    }

    pub fn settled_count(&self) -> u32 {
        self.bin_counts.iter().sum()
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn all_emitted(&self) -> bool {
        self.emitted_count >= self.config.total_particles
    }

    pub fn all_settled(&self) -> bool {
        self.all_emitted() && self.active.is_empty()
    }

    /// Particles that should exist after `elapsed_ms`
    pub fn expected_emitted(&self, elapsed_ms: f64) -> u32 {
        let total = self.config.total_particles;
        if total == 0 || elapsed_ms <= 0.0 {
            return 0;
        }
        let interval = self.config.total_time_ms / f64::from(total);
        if !(interval > 0.0) || elapsed_ms >= self.config.total_time_ms {
            return total;
        }
        let expected = (elapsed_ms / interval).floor();
        if expected >= f64::from(total) {
            total
        } else {
            expected as u32
        }
    }

    fn shortfall(&self) -> u32 {
        self.expected_emitted(self.elapsed_ms).saturating_sub(self.emitted_count)
    }

    fn spawn(&mut self, geom: &BoardGeom) -> Particle {
        self.emitted_count += 1;
        let spread = self.physics.emit_spread * geom.peg_spacing;
        Particle::spawn(
            &mut self.rng,
            self.config.num_rows,
            Vec2::new(geom.emit_x, geom.emit_y),
            spread,
        )
    }

    /// Emit the shortfall, integrate active particles, return those that settled
    pub fn update<G: Ground + ?Sized>(&mut self, dt_ms: f64, geom: &BoardGeom, ground: &G) -> Vec<Particle> {
        for _ in 0..self.shortfall() {
            let particle = self.spawn(geom);
            self.active.push(particle);
        }

        // `f64::min` would turn a NaN delta into a full step
        let dt_ms = if dt_ms.is_nan() { 0.0 } else { dt_ms.min(self.physics.max_step_ms) };
        let dt = (dt_ms / 1000.0) as f32;
        let mut settled = Vec::new();
        if dt <= 0.0 || self.active.is_empty() {
            return settled;
        }

        let in_flight = std::mem::take(&mut self.active);
        self.active.reserve(in_flight.len());
        for mut particle in in_flight {
            let report = advance_particle(&mut particle, dt, &self.physics, geom, ground, &self.bin_counts);
            if report.settled {
                self.bin_counts[particle.bin() as usize] += 1;
                settled.push(particle);
            } else {
                self.active.push(particle);
            }
        }
        settled
    }

    /// Land every in-flight particle on its own stack immediately
    pub fn force_settle_active<G: Ground + ?Sized>(&mut self, geom: &BoardGeom, ground: &G) -> Vec<Particle> {
        let in_flight = std::mem::take(&mut self.active);
        in_flight
            .into_iter()
            .map(|particle| self.settle_in_place(particle, geom, ground))
            .collect()
    }

    /// Materialize the emission shortfall already settled, without physics
    pub fn instant_snap<G: Ground + ?Sized>(&mut self, geom: &BoardGeom, ground: &G) -> Vec<Particle> {
        let missing = self.shortfall();
        (0..missing)
            .map(|_| {
                let particle = self.spawn(geom);
                self.settle_in_place(particle, geom, ground)
            })
            .collect()
    }

    fn settle_in_place<G: Ground + ?Sized>(&mut self, mut particle: Particle, geom: &BoardGeom, ground: &G) -> Particle {
        let x = geom.bin_x(particle.bin());
        particle.pos = Vec2::new(x, ground.ground_y(x, &self.bin_counts));
        particle.vel = Vec2::ZERO;
        particle.peg_index = self.config.num_rows;
        particle.settled = true;
        self.bin_counts[particle.bin() as usize] += 1;
        particle
    }

    /// Start draining the stacks; counts stay until the drain completes
    pub fn begin_purge(&mut self, fall_distance: f32) {
        let seed = self.rng.seed() ^ u64::from(self.round).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        self.drain = Some(Drain::new(&self.bin_counts, fall_distance, seed));
    }

    /// Advance the drain by `dt` seconds; true (and counts cleared) when done
    pub fn purge_stacks(&mut self, dt: f32) -> bool {
        let done = match self.drain.as_mut() {
            Some(drain) => drain.advance(dt),
            None => true,
        };
        if done {
            self.drain = None;
            self.active.clear();
            self.bin_counts.iter_mut().for_each(|c| *c = 0);
        }
        done
    }

    pub fn drain(&self) -> Option<&Drain> {
        self.drain.as_ref()
    }

    /// Clear particles, counts and the emission clock. The RNG stream continues.
    pub fn reset(&mut self) {
        self.active.clear();
        self.bin_counts.iter_mut().for_each(|c| *c = 0);
        self.emitted_count = 0;
        self.elapsed_ms = 0.0;
        self.drain = None;
        self.round += 1;
        log::debug!("Simulation reset (round {})", self.round);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::layout::{Layout, Viewport};
    use proptest::prelude::*;

    fn sim(rows: u32, particles: u32, secs: f64, seed: u64) -> (Simulation, Layout) {
        let config = SimConfig {
            num_rows: rows,
            total_particles: particles,
            total_time_ms: secs * 1000.0,
        };
        let layout = Layout::compute(Viewport::new(800.0, 1000.0), rows, particles);
        (Simulation::new(config, SeededRng::new(seed)), layout)
    }

    #[test]
    fn test_expected_emitted_schedule() {
        let (s, _) = sim(10, 100, 10.0, 1);
        assert_eq!(s.expected_emitted(0.0), 0);
        assert_eq!(s.expected_emitted(99.9), 0);
        assert_eq!(s.expected_emitted(100.0), 1);
        assert_eq!(s.expected_emitted(5000.0), 50);
        assert_eq!(s.expected_emitted(9999.0), 99);
        assert_eq!(s.expected_emitted(10_000.0), 100);
        assert_eq!(s.expected_emitted(1.0e9), 100);
        assert_eq!(s.expected_emitted(-5.0), 0);
    }

    #[test]
    fn test_emission_at_half_time() {
        let (mut s, l) = sim(10, 100, 10.0, 1);
        let g = l.board_geom();
        s.set_elapsed_ms(5000.0);
        s.update(16.0, &g, &l);
        assert_eq!(s.emitted_count(), 50);
    }

    #[test]
    fn test_jump_to_end_emits_everything_once() {
        let (mut s, l) = sim(10, 100, 10.0, 1);
        let g = l.board_geom();
        s.set_elapsed_ms(10_000.0);
        s.update(16.0, &g, &l);
        assert_eq!(s.emitted_count(), 100);
        for _ in 0..10 {
            s.update(16.0, &g, &l);
        }
        assert_eq!(s.emitted_count(), 100);
        assert!(s.all_emitted());
    }

    #[test]
    fn test_dt_never_drives_emission() {
        let (mut s, l) = sim(10, 100, 10.0, 1);
        let g = l.board_geom();
        for _ in 0..100 {
            s.update(100.0, &g, &l);
        }
        assert_eq!(s.emitted_count(), 0);
    }

    #[test]
    fn test_nan_frame_delta_does_not_move_particles() {
        let (mut s, l) = sim(10, 100, 10.0, 1);
        let g = l.board_geom();
        s.set_elapsed_ms(1000.0);
        s.update(0.0, &g, &l);
        assert_eq!(s.active().len(), 10);
        let before: Vec<_> = s.active().iter().map(|p| (p.pos, p.vel)).collect();

        assert!(s.update(f64::NAN, &g, &l).is_empty());
        let after: Vec<_> = s.active().iter().map(|p| (p.pos, p.vel)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_elapsed_going_backwards_does_not_unemit() {
        let (mut s, l) = sim(10, 100, 10.0, 1);
        let g = l.board_geom();
        s.set_elapsed_ms(6000.0);
        s.update(0.0, &g, &l);
        s.set_elapsed_ms(1000.0);
        s.update(16.0, &g, &l);
        assert_eq!(s.emitted_count(), 60);
    }

    #[test]
    fn test_settled_particles_credit_their_path_bin() {
        let (mut s, l) = sim(10, 200, 2.0, 9);
        let g = l.board_geom();
        let mut credited = vec![0u32; 11];
        let mut t = 0.0;
        for _ in 0..5000 {
            t += 16.0;
            s.set_elapsed_ms(t);
            for p in s.update(16.0, &g, &l) {
                assert!(p.settled);
                assert_eq!(p.bin(), p.path().iter().map(|&b| u32::from(b)).sum::<u32>());
                assert_eq!(p.peg_index, 10);
                credited[p.bin() as usize] += 1;
            }
            if s.all_settled() {
                break;
            }
        }
        assert!(s.all_settled());
        assert_eq!(credited, s.bin_counts());
        assert_eq!(s.settled_count(), 200);
    }

    #[test]
    fn test_force_settle_then_snap() {
        let (mut s, l) = sim(12, 500, 10.0, 4);
        let g = l.board_geom();
        s.set_elapsed_ms(1000.0);
        s.update(16.0, &g, &l);
        assert_eq!(s.active().len(), 50);

        // Hidden for a while
        s.set_elapsed_ms(7000.0);
        let landed = s.force_settle_active(&g, &l);
        assert_eq!(landed.len(), 50);
        assert!(s.active().is_empty());
        let snapped = s.instant_snap(&g, &l);
        assert_eq!(snapped.len(), 300);
        assert_eq!(s.emitted_count(), 350);
        assert_eq!(s.settled_count(), 350);
        assert!(s.active().is_empty());
        for p in landed.iter().chain(&snapped) {
            assert!(p.settled);
            assert_eq!(g.nearest_bin(p.x()), p.bin());
        }
        // Nothing left to catch up
        assert!(s.instant_snap(&g, &l).is_empty());
        s.update(16.0, &g, &l);
        assert_eq!(s.emitted_count(), 350);
    }

    #[test]
    fn test_snapped_particles_stack_up() {
        let (mut s, l) = sim(4, 100, 1.0, 8);
        let g = l.board_geom();
        s.set_elapsed_ms(1000.0);
        let snapped = s.instant_snap(&g, &l);
        let mut last_y = vec![f32::INFINITY; 5];
        for p in &snapped {
            let b = p.bin() as usize;
            assert!(p.y() < last_y[b]);
            last_y[b] = p.y();
        }
    }

    #[test]
    fn test_same_seed_same_paths() {
        let (mut a, l) = sim(16, 300, 3.0, 77);
        let (mut b, _) = sim(16, 300, 3.0, 77);
        let g = l.board_geom();
        let mut t = 0.0;
        for _ in 0..200 {
            t += 16.7;
            a.set_elapsed_ms(t);
            b.set_elapsed_ms(t);
            let sa = a.update(16.7, &g, &l);
            let sb = b.update(16.7, &g, &l);
            assert_eq!(sa, sb);
        }
        assert_eq!(a.active(), b.active());
        assert_eq!(a.bin_counts(), b.bin_counts());
    }

    #[test]
    fn test_purge_clears_counts() {
        let (mut s, l) = sim(10, 300, 1.0, 5);
        let g = l.board_geom();
        s.set_elapsed_ms(1000.0);
        s.instant_snap(&g, &l);
        assert_eq!(s.settled_count(), 300);
        s.begin_purge(l.viewport.height);
        let mut calls = 0;
        while !s.purge_stacks(1.0 / 60.0) {
            calls += 1;
            assert!(calls < 1000);
            assert_eq!(s.settled_count(), 300);
        }
        assert!(s.bin_counts().iter().all(|&c| c == 0));
        assert!(s.drain().is_none());
    }

    #[test]
    fn test_reset_restarts_round() {
        let (mut s, l) = sim(10, 100, 10.0, 1);
        let g = l.board_geom();
        s.set_elapsed_ms(5000.0);
        s.update(16.0, &g, &l);
        s.reset();
        assert_eq!(s.emitted_count(), 0);
        assert_eq!(s.elapsed_ms(), 0.0);
        assert!(s.active().is_empty());
        assert_eq!(s.bin_counts(), &[0; 11]);
        assert_eq!(s.round(), 1);
    }

    #[test]
    fn test_set_physics_is_clamped() {
        let (mut s, _) = sim(10, 100, 10.0, 1);
        s.set_physics(PhysicsParams {
            restitution: 3.0,
            ..Default::default()
        });
        assert_eq!(s.physics().restitution, 1.0);
    }

    proptest! {
        #[test]
        fn prop_emission_depends_only_on_elapsed(
            steps in proptest::collection::vec((0.0f64..400.0, 0.0f64..250.0), 1..40),
        ) {
            let (mut s, l) = sim(10, 100, 10.0, 1);
            let g = l.board_geom();
            let mut elapsed = 0.0;
            for (advance, dt) in steps {
                elapsed += advance;
                s.set_elapsed_ms(elapsed);
                s.update(dt, &g, &l);
            }
            s.set_elapsed_ms(5000.0_f64.max(elapsed));
            s.update(16.0, &g, &l);
            let expected = s.expected_emitted(5000.0_f64.max(elapsed));
            prop_assert_eq!(s.emitted_count(), expected);
            prop_assert_eq!(s.emitted_count(), s.active().len() as u32 + s.settled_count());
        }
    }
}
