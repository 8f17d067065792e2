//! Browser binding
//!
//! The page owns the canvas, the animation-frame loop and a Web Worker
//! running the countdown. This wrapper turns their calls into `Run`
//! operations and exposes flat buffers for drawing. Timer traffic crosses
//! the boundary as the JSON form of `TimerCommand`/`TimerEvent`.

use wasm_bindgen::prelude::*;

use crate::config::BoardConfig;
use crate::sim::{Particle, PhysicsParams, Run, RunEvent, Viewport};
use crate::timer::{TimerCommand, TimerEvent, format_remaining};

/// Install the panic hook and console logger once the module loads
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Info).is_err() {
        // Already initialized by an earlier instance
        return;
    }
    log::info!("Galton Timer (wasm) loaded");
}

#[wasm_bindgen]
pub struct WebBoard {
    run: Run<Vec<TimerCommand>>,
    /// Landed particles not yet collected by the renderer, as (x, y, bin)
    settled: Vec<f32>,
    events: Vec<RunEvent>,
}

#[wasm_bindgen]
impl WebBoard {
    /// Build from a URL query string (`rows`, `particles`, `duration`, `seed`)
    #[wasm_bindgen(constructor)]
    pub fn new(query: &str, width: f32, height: f32, dpr: f32) -> WebBoard {
        let config = BoardConfig::from_query(query);
        Self {
            run: Run::new(config, viewport(width, height, dpr), Vec::new()),
            settled: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn start(&mut self, now_ms: f64) -> bool {
        self.run.start(now_ms)
    }

    pub fn pause(&mut self) -> bool {
        self.run.pause()
    }

    pub fn resume(&mut self, now_ms: f64) -> bool {
        self.run.resume(now_ms)
    }

    pub fn toggle_pause(&mut self, now_ms: f64) -> bool {
        self.run.toggle_pause(now_ms)
    }

    pub fn stop(&mut self) -> bool {
        self.run.stop()
    }

    pub fn add_time(&mut self, add_ms: f64) -> bool {
        self.run.add_time(add_ms)
    }

    /// One animation frame; returns the number of particles that landed
    pub fn frame(&mut self, now_ms: f64, dt_ms: f64) -> u32 {
        let out = self.run.frame(now_ms, dt_ms);
        self.events.extend(out.events);
        self.push_settled(&out.settled)
    }

    /// Tab visibility; returns the number of caught-up particles on reveal
    pub fn set_hidden(&mut self, hidden: bool) -> u32 {
        let batch = self.run.set_hidden(hidden);
        self.push_settled(&batch)
    }

    /// Feed one message posted by the timer worker
    pub fn on_timer_message(&mut self, json: &str) -> Result<(), JsValue> {
        let event: TimerEvent =
            serde_json::from_str(json).map_err(|e| JsValue::from_str(&format!("Invalid timer message: {}", e)))?;
        self.run.on_timer_event(&event);
        Ok(())
    }

    /// Commands queued for the timer worker, as a JSON array
    pub fn take_timer_commands(&mut self) -> String {
        let commands: Vec<TimerCommand> = self.run.timer_mut().drain(..).collect();
        serde_json::to_string(&commands).unwrap_or_else(|_| "[]".to_string())
    }

    /// Run events since the last call, as a JSON array
    pub fn take_events(&mut self) -> String {
        let events = std::mem::take(&mut self.events);
        serde_json::to_string(&events).unwrap_or_else(|_| "[]".to_string())
    }

    /// Landed particles since the last call, flattened as x, y, bin
    pub fn take_settled(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.settled)
    }

    pub fn resize(&mut self, width: f32, height: f32, dpr: f32) {
        self.run.resize(viewport(width, height, dpr));
    }

    /// Apply a new query string; returns true when the board was rebuilt
    pub fn reconfigure(&mut self, query: &str) -> bool {
        let rebuilt = self.run.reconfigure(BoardConfig::from_query(query));
        if rebuilt {
            self.settled.clear();
        }
        rebuilt
    }

    /// Replace physics tuning from JSON; missing fields take defaults
    pub fn set_physics(&mut self, json: &str) -> Result<(), JsValue> {
        let params: PhysicsParams =
            serde_json::from_str(json).map_err(|e| JsValue::from_str(&format!("Invalid physics: {}", e)))?;
        self.run.set_physics(params);
        Ok(())
    }

    pub fn physics(&self) -> String {
        serde_json::to_string(self.run.simulation().physics()).unwrap_or_default()
    }

    /// Current layout record as JSON
    pub fn layout(&self) -> String {
        serde_json::to_string(self.run.layout()).unwrap_or_default()
    }

    /// Peg centres flattened as x, y
    pub fn pegs(&self) -> Vec<f32> {
        self.run.layout().pegs().iter().flat_map(|p| [p.x, p.y]).collect()
    }

    /// In-flight particles flattened as x, y
    pub fn particle_positions(&self) -> Vec<f32> {
        self.run
            .simulation()
            .active()
            .iter()
            .flat_map(|p| [p.x(), p.y()])
            .collect()
    }

    pub fn bin_counts(&self) -> Vec<u32> {
        self.run.simulation().bin_counts().to_vec()
    }

    /// Per-bin drain offset and alpha while purging, flattened
    pub fn drain_state(&self) -> Vec<f32> {
        self.run
            .simulation()
            .drain()
            .map(|d| d.bins().iter().flat_map(|b| [b.offset, b.alpha]).collect())
            .unwrap_or_default()
    }

    /// Refill grains flattened as x, y
    pub fn refill_grains(&self) -> Vec<f32> {
        self.run
            .refill()
            .map(|r| r.grains().iter().flat_map(|g| [g.pos.x, g.pos.y]).collect())
            .unwrap_or_default()
    }

    pub fn phase(&self) -> String {
        format!("{:?}", self.run.phase())
    }

    pub fn remaining_text(&self) -> String {
        format_remaining(self.run.remaining_ms())
    }

    pub fn query(&self) -> String {
        self.run.config().to_query()
    }
}

impl WebBoard {
    fn push_settled(&mut self, particles: &[Particle]) -> u32 {
        self.settled
            .extend(particles.iter().flat_map(|p| [p.x(), p.y(), p.bin() as f32]));
        particles.len() as u32
    }
}

fn viewport(width: f32, height: f32, dpr: f32) -> Viewport {
    Viewport {
        dpr,
        ..Viewport::new(width, height)
    }
}
