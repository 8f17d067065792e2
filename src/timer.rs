//! Countdown timer running on its own thread
//!
//! The render side never measures time for the countdown itself. It sends
//! [`TimerCommand`]s and consumes [`TimerEvent`]s. Elapsed time is always
//! derived from absolute timestamps (`banked + now - anchor`), never from
//! summed tick deltas, so the countdown cannot drift.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::consts::TICK_INTERVAL_MS;

/// Messages to the timer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum TimerCommand {
    Start { total_ms: f64, start_absolute_time: f64 },
    AddTime { add_ms: f64 },
    Pause,
    Resume { resume_absolute_time: f64 },
    Reset,
}

/// Messages from the timer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum TimerEvent {
    Tick { remaining_ms: f64, elapsed_ms: f64 },
    Done,
}

#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("timer thread has stopped")]
    Disconnected,

    #[error("failed to spawn timer thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Countdown state, independent of any thread or clock
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Countdown {
    total_ms: f64,
    /// Time accumulated before the current anchor
    banked_ms: f64,
    /// Absolute time the current running stretch began; `None` while stopped
    anchor_ms: Option<f64>,
    started: bool,
    /// Set by `Pause`, cleared by `Resume`; only `Resume` re-anchors
    paused: bool,
    done: bool,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a command received at absolute time `now_ms`
    pub fn apply(&mut self, command: &TimerCommand, now_ms: f64) {
        match *command {
            TimerCommand::Start {
                total_ms,
                start_absolute_time,
            } => {
                *self = Self {
                    total_ms: total_ms.max(0.0),
                    banked_ms: 0.0,
                    anchor_ms: Some(start_absolute_time),
                    started: true,
                    paused: false,
                    done: false,
                };
            }
            TimerCommand::AddTime { add_ms } => {
                self.total_ms = (self.total_ms + add_ms).max(0.0);
                // A finished countdown with time left picks up from now, or
                // from the next resume when paused
                if self.done && self.banked_ms < self.total_ms {
                    self.done = false;
                    if !self.paused {
                        self.anchor_ms = Some(now_ms);
                    }
                }
            }
            TimerCommand::Pause => {
                if !self.started {
                    return;
                }
                self.paused = true;
                if let Some(anchor) = self.anchor_ms.take() {
                    self.banked_ms += (now_ms - anchor).max(0.0);
                }
            }
            TimerCommand::Resume { resume_absolute_time } => {
                if !self.paused {
                    return;
                }
                self.paused = false;
                if !self.done && self.anchor_ms.is_none() {
                    self.anchor_ms = Some(resume_absolute_time);
                }
            }
            TimerCommand::Reset => *self = Self::default(),
        }
    }

    /// Elapsed countdown time at `now_ms`, never beyond the total
    pub fn elapsed_ms(&self, now_ms: f64) -> f64 {
        let running = self.anchor_ms.map_or(0.0, |anchor| (now_ms - anchor).max(0.0));
        (self.banked_ms + running).min(self.total_ms)
    }

    pub fn remaining_ms(&self, now_ms: f64) -> f64 {
        (self.total_ms - self.elapsed_ms(now_ms)).max(0.0)
    }

    pub fn total_ms(&self) -> f64 {
        self.total_ms
    }

    pub fn is_running(&self) -> bool {
        self.anchor_ms.is_some()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Events due at `now_ms`: a tick while running, plus `Done` once at the end
    pub fn poll(&mut self, now_ms: f64) -> Vec<TimerEvent> {
        if !self.is_running() {
            return Vec::new();
        }
        let elapsed_ms = self.elapsed_ms(now_ms);
        let mut events = vec![TimerEvent::Tick {
            remaining_ms: self.total_ms - elapsed_ms,
            elapsed_ms,
        }];
        if elapsed_ms >= self.total_ms {
            self.banked_ms = self.total_ms;
            self.anchor_ms = None;
            self.done = true;
            events.push(TimerEvent::Done);
        }
        events
    }
}

/// Source of absolute time in milliseconds
pub trait Clock: Send + 'static {
    fn now_ms(&self) -> f64;
}

/// Monotonic wall clock measured from its creation. Clones share the origin.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven clock for tests; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(now_ms: f64) -> Self {
        let clock = Self::default();
        clock.set(now_ms);
        clock
    }

    pub fn set(&self, now_ms: f64) {
        self.bits.store(now_ms.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, ms: f64) {
        self.set(self.now_ms() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Owner side of the timer thread. Dropping it stops the thread.
pub struct TimerHandle {
    commands: Option<Sender<TimerCommand>>,
    events: Receiver<TimerEvent>,
    thread: Option<JoinHandle<()>>,
}

impl TimerHandle {
    pub fn spawn<C: Clock>(clock: C) -> Result<Self, TimerError> {
        Self::spawn_with_interval(clock, Duration::from_millis(TICK_INTERVAL_MS))
    }

    pub fn spawn_with_interval<C: Clock>(clock: C, interval: Duration) -> Result<Self, TimerError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("galton-timer".into())
            .spawn(move || timer_loop(clock, command_rx, event_tx, interval))?;
        log::debug!("Timer thread started ({}ms cadence)", interval.as_millis());
        Ok(Self {
            commands: Some(command_tx),
            events: event_rx,
            thread: Some(thread),
        })
    }

    pub fn send(&self, command: TimerCommand) -> Result<(), TimerError> {
        self.commands
            .as_ref()
            .ok_or(TimerError::Disconnected)?
            .send(command)
            .map_err(|_| TimerError::Disconnected)
    }

    /// Everything received so far, in send order
    pub fn drain_events(&self) -> Vec<TimerEvent> {
        self.events.try_iter().collect()
    }

    /// Block up to `timeout` for the next event; `Ok(None)` on timeout
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<TimerEvent>, TimerError> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TimerError::Disconnected),
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        // Closing the command channel ends the loop
        self.commands.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Timer thread panicked");
            }
        }
    }
}

fn timer_loop<C: Clock>(clock: C, commands: Receiver<TimerCommand>, events: Sender<TimerEvent>, interval: Duration) {
    let mut countdown = Countdown::new();
    let mut next_tick = Instant::now() + interval;

    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match commands.recv_timeout(wait) {
            Ok(command) => {
                log::debug!("Timer: {:?}", command);
                countdown.apply(&command, clock.now_ms());
                continue;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        next_tick = (next_tick + interval).max(Instant::now());
        for event in countdown.poll(clock.now_ms()) {
            if event == TimerEvent::Done {
                log::info!("Countdown finished");
            }
            if events.send(event).is_err() {
                log::debug!("Timer event receiver dropped");
                return;
            }
        }
    }
    log::debug!("Timer thread stopped");
}

/// Countdown text: `MM:SS`, or `H:MM:SS` from one hour up. Partial seconds round up.
pub fn format_remaining(remaining_ms: f64) -> String {
    let total_secs = if remaining_ms.is_finite() && remaining_ms > 0.0 {
        (remaining_ms / 1000.0).ceil() as u64
    } else {
        0
    };
    let (hours, minutes, seconds) = (total_secs / 3600, (total_secs / 60) % 60, total_secs % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
