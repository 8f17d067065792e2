//! Round lifecycle: idle, running, paused, purging, refilling
//!
//! `Run` ties one [`Simulation`] to its [`Layout`] and to the countdown timer.
//! Elapsed time only ever enters the engine through timer events.

use serde::{Deserialize, Serialize};

use super::engine::{SimConfig, Simulation};
use super::layout::{Layout, Viewport};
use super::params::PhysicsParams;
use super::particle::Particle;
use super::purge::Refill;
use super::rng::SeededRng;
use crate::config::BoardConfig;
use crate::consts::MIN_EXTENT;
use crate::timer::{TimerCommand, TimerEvent, TimerHandle};

/// Current phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    /// Built, countdown not started
    Idle,
    /// Countdown live, particles falling
    Running,
    /// Countdown and physics frozen
    Paused,
    /// Stacks draining off-screen
    Purging,
    /// Grains pouring back into the hopper
    Refilling,
}

impl RunPhase {
    /// Purge and refill cannot be interrupted
    pub fn is_transition(self) -> bool {
        matches!(self, RunPhase::Purging | RunPhase::Refilling)
    }
}

/// Notable things that happened during a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEvent {
    /// Every particle of the round has settled (alarm)
    RoundComplete,
    /// Drain finished, bins are empty
    PurgeComplete,
    /// Refill finished, a fresh countdown has started
    RoundStarted,
}

/// Result of one animation frame
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    /// Particles that landed this frame, for baking into the stacks
    pub settled: Vec<Particle>,
    pub events: Vec<RunEvent>,
}

/// Outbound side of the timer protocol
pub trait TimerPort {
    fn send_command(&mut self, command: TimerCommand);
}

/// Outbox drained by a front-end that owns the real timer
impl TimerPort for Vec<TimerCommand> {
    fn send_command(&mut self, command: TimerCommand) {
        self.push(command);
    }
}

impl TimerPort for TimerHandle {
    fn send_command(&mut self, command: TimerCommand) {
        if let Err(e) = self.send(command) {
            log::warn!("Timer command dropped: {}", e);
        }
    }
}

/// One board from first start through any number of rounds
pub struct Run<T: TimerPort> {
    phase: RunPhase,
    config: BoardConfig,
    layout: Layout,
    sim: Simulation,
    timer: T,
    refill: Option<Refill>,
    hidden: bool,
    round_complete_sent: bool,
    remaining_ms: f64,
    /// Particles force-settled outside a frame, handed out by the next frame
    pending: Vec<Particle>,
}

impl<T: TimerPort> Run<T> {
    pub fn new(config: BoardConfig, viewport: Viewport, timer: T) -> Self {
        let layout = Layout::compute(viewport, config.rows, config.particles);
        let sim = build_simulation(&config, PhysicsParams::default());
        log::info!(
            "Run: {} rows, {} particles, {:.0}s, seed {}",
            config.rows,
            config.particles,
            config.duration_secs,
            config.seed
        );
        Self {
            phase: RunPhase::Idle,
            remaining_ms: config.total_ms(),
            config,
            layout,
            sim,
            timer,
            refill: None,
            hidden: false,
            round_complete_sent: false,
            pending: Vec::new(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn refill(&self) -> Option<&Refill> {
        self.refill.as_ref()
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Countdown remaining as last reported by the timer
    pub fn remaining_ms(&self) -> f64 {
        self.remaining_ms
    }

    fn set_phase(&mut self, phase: RunPhase) {
        if self.phase != phase {
            log::info!("Run: {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn start_countdown(&mut self, now_ms: f64) {
        self.timer.send_command(TimerCommand::Start {
            total_ms: self.sim.config().total_time_ms,
            start_absolute_time: now_ms,
        });
        self.remaining_ms = self.sim.config().total_time_ms;
        self.round_complete_sent = false;
    }

    /// Idle -> Running
    pub fn start(&mut self, now_ms: f64) -> bool {
        if self.phase != RunPhase::Idle {
            return false;
        }
        self.start_countdown(now_ms);
        self.set_phase(RunPhase::Running);
        true
    }

    /// Running -> Paused
    pub fn pause(&mut self) -> bool {
        if self.phase != RunPhase::Running {
            return false;
        }
        self.timer.send_command(TimerCommand::Pause);
        self.set_phase(RunPhase::Paused);
        true
    }

    /// Paused -> Running; the timer re-anchors at `now_ms`
    pub fn resume(&mut self, now_ms: f64) -> bool {
        if self.phase != RunPhase::Paused {
            return false;
        }
        self.timer.send_command(TimerCommand::Resume {
            resume_absolute_time: now_ms,
        });
        self.set_phase(RunPhase::Running);
        true
    }

    pub fn toggle_pause(&mut self, now_ms: f64) -> bool {
        match self.phase {
            RunPhase::Running => self.pause(),
            RunPhase::Paused => self.resume(now_ms),
            _ => false,
        }
    }

    /// Running/Paused -> Purging. In-flight particles land first and are
    /// returned by the next frame.
    pub fn stop(&mut self) -> bool {
        if !matches!(self.phase, RunPhase::Running | RunPhase::Paused) {
            return false;
        }
        self.timer.send_command(TimerCommand::Reset);
        let geom = self.layout.board_geom();
        let landed = self.sim.force_settle_active(&geom, &self.layout);
        self.pending.extend(landed);
        let fall = (self.layout.viewport.height - self.layout.accumulation.top).max(MIN_EXTENT);
        self.sim.begin_purge(fall);
        self.set_phase(RunPhase::Purging);
        true
    }

    /// Advance one animation frame
    pub fn frame(&mut self, now_ms: f64, dt_ms: f64) -> FrameOutput {
        let mut out = FrameOutput {
            settled: std::mem::take(&mut self.pending),
            events: Vec::new(),
        };

        match self.phase {
            RunPhase::Idle | RunPhase::Paused => {}
            RunPhase::Running => {
                if !self.hidden {
                    let geom = self.layout.board_geom();
                    out.settled.extend(self.sim.update(dt_ms, &geom, &self.layout));
                }
                if self.sim.all_settled() && !self.round_complete_sent {
                    self.round_complete_sent = true;
                    log::info!("Round complete: {} particles settled", self.sim.settled_count());
                    out.events.push(RunEvent::RoundComplete);
                }
            }
            RunPhase::Purging => {
                if self.sim.purge_stacks((dt_ms.max(0.0) / 1000.0) as f32) {
                    let seed = self.config.seed ^ u64::from(self.sim.round()).wrapping_add(1);
                    self.refill = Some(Refill::new(&self.layout, seed));
                    out.events.push(RunEvent::PurgeComplete);
                    self.set_phase(RunPhase::Refilling);
                }
            }
            RunPhase::Refilling => {
                let done = self.refill.as_mut().is_none_or(|refill| refill.advance(dt_ms));
                if done {
                    self.refill = None;
                    self.sim.reset();
                    self.timer.send_command(TimerCommand::Reset);
                    self.start_countdown(now_ms);
                    out.events.push(RunEvent::RoundStarted);
                    self.set_phase(RunPhase::Running);
                }
            }
        }
        out
    }

    /// Visibility change. Becoming visible while running settles what landed
    /// in the meantime and snaps in everything emitted since, without physics.
    pub fn set_hidden(&mut self, hidden: bool) -> Vec<Particle> {
        let was_hidden = std::mem::replace(&mut self.hidden, hidden);
        if hidden || !was_hidden || self.phase != RunPhase::Running {
            return Vec::new();
        }
        let geom = self.layout.board_geom();
        let mut batch = self.sim.force_settle_active(&geom, &self.layout);
        let landed = batch.len();
        batch.extend(self.sim.instant_snap(&geom, &self.layout));
        log::info!(
            "Caught up after hidden period: {} landed, {} snapped",
            landed,
            batch.len() - landed
        );
        batch
    }

    /// Consume a message from the timer
    pub fn on_timer_event(&mut self, event: &TimerEvent) {
        // Ticks from a countdown that was just reset may still be queued
        if !matches!(self.phase, RunPhase::Running | RunPhase::Paused) {
            return;
        }
        match *event {
            TimerEvent::Tick {
                remaining_ms,
                elapsed_ms,
            } => {
                self.remaining_ms = remaining_ms;
                self.sim.set_elapsed_ms(elapsed_ms);
            }
            TimerEvent::Done => {
                log::info!("Timer done");
                self.remaining_ms = 0.0;
                let total = self.sim.config().total_time_ms;
                self.sim.set_elapsed_ms(total);
            }
        }
    }

    /// Extend the current countdown
    pub fn add_time(&mut self, add_ms: f64) -> bool {
        if !matches!(self.phase, RunPhase::Running | RunPhase::Paused) || !(add_ms > 0.0) {
            return false;
        }
        self.timer.send_command(TimerCommand::AddTime { add_ms });
        let total = self.sim.config().total_time_ms + add_ms;
        self.sim.set_total_time_ms(total);
        self.config.duration_secs = total / 1000.0;
        self.remaining_ms += add_ms;
        true
    }

    /// Recompute the layout for a new viewport; bins and particles are kept
    pub fn resize(&mut self, viewport: Viewport) {
        self.layout = Layout::compute(viewport, self.config.rows, self.config.particles);
        log::debug!(
            "Resized to {}x{}, peg spacing {:.2}",
            viewport.width,
            viewport.height,
            self.layout.peg_spacing()
        );
    }

    /// Apply a new configuration. A change of board shape or seed replaces
    /// the engine and returns to Idle; a duration change alone retimes the
    /// current round. Returns true when the engine was replaced.
    pub fn reconfigure(&mut self, config: BoardConfig) -> bool {
        let reshaped = config.rows != self.config.rows
            || config.particles != self.config.particles
            || config.seed != self.config.seed;
        if reshaped {
            log::info!(
                "Reconfigured: {} rows, {} particles, seed {}",
                config.rows,
                config.particles,
                config.seed
            );
            if self.phase != RunPhase::Idle {
                self.timer.send_command(TimerCommand::Reset);
            }
            self.sim = build_simulation(&config, *self.sim.physics());
            self.layout = Layout::compute(self.layout.viewport, config.rows, config.particles);
            self.refill = None;
            self.pending.clear();
            self.remaining_ms = config.total_ms();
            self.config = config;
            self.set_phase(RunPhase::Idle);
            return true;
        }

        let delta = config.total_ms() - self.config.total_ms();
        if delta != 0.0 {
            if matches!(self.phase, RunPhase::Running | RunPhase::Paused) {
                self.timer.send_command(TimerCommand::AddTime { add_ms: delta });
                self.remaining_ms = (self.remaining_ms + delta).max(0.0);
            } else {
                self.remaining_ms = config.total_ms();
            }
            self.sim.set_total_time_ms(config.total_ms());
        }
        self.config = config;
        false
    }

    /// Live physics tuning
    pub fn set_physics(&mut self, params: PhysicsParams) {
        self.sim.set_physics(params);
    }
}

fn build_simulation(config: &BoardConfig, physics: PhysicsParams) -> Simulation {
    let sim_config = SimConfig {
        num_rows: config.rows,
        total_particles: config.particles,
        total_time_ms: config.total_ms(),
    };
    Simulation::new(sim_config, SeededRng::new(config.seed)).with_physics(physics)
}
