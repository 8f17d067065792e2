//! End-to-end scenarios across engine, run state machine and timer.

use std::time::{Duration, Instant};

use galton_timer::sim::{
    Layout, RunEvent, RunPhase, SeededRng, SimConfig, Simulation, Viewport, bin_probability,
};
use galton_timer::timer::{Clock, ManualClock, TimerHandle};
use galton_timer::{BoardConfig, Run, TimerCommand, TimerEvent};

/// Fixed test seed for reproducibility.
const TEST_SEED: u64 = 42;

const FRAME_MS: f64 = 16.0;
const TICK_MS: f64 = 100.0;

fn board(rows: u32, particles: u32, secs: f64, seed: u64) -> (Simulation, Layout) {
    let config = SimConfig {
        num_rows: rows,
        total_particles: particles,
        total_time_ms: secs * 1000.0,
    };
    let layout = Layout::compute(Viewport::new(900.0, 1200.0), rows, particles);
    (Simulation::new(config, SeededRng::new(seed)), layout)
}

/// Helper: drive a simulation with 100 ms timer ticks and 16 ms frames until
/// everything has settled. Returns the number of settled particles handed out.
fn run_to_completion(sim: &mut Simulation, layout: &Layout) -> u32 {
    let geom = layout.board_geom();
    let total_ms = sim.config().total_time_ms;
    let mut now = 0.0;
    let mut next_tick = 0.0;
    let mut handed_out = 0;
    for _ in 0..1_000_000 {
        now += FRAME_MS;
        if now >= next_tick {
            next_tick += TICK_MS;
            sim.set_elapsed_ms(now.min(total_ms));
        }
        handed_out += sim.update(FRAME_MS, &geom, layout).len() as u32;

        if sim.all_settled() {
            assert!(sim.all_emitted());
            assert!(sim.active().is_empty());
            return handed_out;
        }
    }
    panic!("round never completed");
}

fn chi_square(counts: &[u32]) -> f64 {
    let n = counts.len() as u32 - 1;
    let total: u32 = counts.iter().sum();
    counts
        .iter()
        .enumerate()
        .map(|(k, &observed)| {
            let expected = bin_probability(n, k as u32) * f64::from(total);
            let d = f64::from(observed) - expected;
            d * d / expected
        })
        .sum()
}

// =============================================================================
// Full round: 10 rows, 1000 particles, 10 s
// =============================================================================

#[test]
fn full_round_settles_every_particle() {
    let (mut sim, layout) = board(10, 1000, 10.0, TEST_SEED);
    let handed_out = run_to_completion(&mut sim, &layout);

    let counts = sim.bin_counts();
    assert_eq!(counts.iter().sum::<u32>(), 1000);
    assert_eq!(handed_out, 1000);
    let central: u32 = counts[4..=6].iter().sum();
    assert!(central > 500, "central bins hold {central} of 1000");
}

#[test]
fn full_round_fits_accumulation_region() {
    let (mut sim, layout) = board(10, 1000, 10.0, TEST_SEED);
    run_to_completion(&mut sim, &layout);
    let tallest = sim.bin_counts().iter().copied().max().unwrap_or(0) as f32;
    assert!(tallest * layout.stack_row_h <= layout.accumulation.height());
}

// =============================================================================
// Binomial fairness: 10,000 particles against binomial(10, 0.5)
// =============================================================================

#[test]
fn snapped_distribution_is_binomial() {
    let (mut sim, layout) = board(10, 10_000, 1.0, TEST_SEED);
    sim.set_elapsed_ms(1000.0);
    let snapped = sim.instant_snap(&layout.board_geom(), &layout);
    assert_eq!(snapped.len(), 10_000);

    // 10 degrees of freedom, p = 0.001
    let stat = chi_square(sim.bin_counts());
    assert!(stat < 29.59, "chi-square {stat:.2} over {:?}", sim.bin_counts());
}

#[test]
fn physics_round_credits_the_same_bins_as_snapping() {
    let (mut animated, layout) = board(10, 400, 4.0, 7);
    let (mut snapped, _) = board(10, 400, 4.0, 7);
    run_to_completion(&mut animated, &layout);
    snapped.set_elapsed_ms(4000.0);
    snapped.instant_snap(&layout.board_geom(), &layout);
    assert_eq!(animated.bin_counts(), snapped.bin_counts());
}

// =============================================================================
// Emission across stalls
// =============================================================================

#[test]
fn jump_to_end_emits_each_particle_once() {
    let (mut sim, layout) = board(12, 600, 30.0, TEST_SEED);
    let geom = layout.board_geom();
    sim.update(FRAME_MS, &geom, &layout);
    assert_eq!(sim.emitted_count(), 0);

    sim.set_elapsed_ms(30_000.0);
    sim.update(FRAME_MS, &geom, &layout);
    assert_eq!(sim.emitted_count(), 600);
    assert_eq!(sim.active().len() as u32 + sim.settled_count(), 600);

    for _ in 0..100 {
        sim.update(FRAME_MS, &geom, &layout);
    }
    assert_eq!(sim.emitted_count(), 600);
}

#[test]
fn hidden_tab_catch_up_through_run() {
    let config = BoardConfig {
        rows: 16,
        particles: 1200,
        duration_secs: 60.0,
        seed: TEST_SEED,
    };
    let mut run = Run::new(config, Viewport::new(1024.0, 768.0), Vec::<TimerCommand>::new());
    run.start(0.0);

    for step in 1..=60 {
        let now = f64::from(step) * FRAME_MS;
        run.on_timer_event(&TimerEvent::Tick {
            remaining_ms: 60_000.0 - now,
            elapsed_ms: now,
        });
        run.frame(now, FRAME_MS);
    }
    let now = 60.0 * FRAME_MS;
    let before = run.simulation().emitted_count();
    assert!(before > 0);

    run.set_hidden(true);
    // 40 s pass; ticks still arrive
    run.on_timer_event(&TimerEvent::Tick {
        remaining_ms: 20_000.0 - now,
        elapsed_ms: 40_000.0 + now,
    });
    let batch = run.set_hidden(false);
    let expected = run.simulation().expected_emitted(40_000.0 + now);
    assert_eq!(run.simulation().emitted_count(), expected);
    assert_eq!(run.simulation().settled_count(), expected);
    assert!(batch.len() as u32 >= expected - before);
    assert!(run.simulation().active().is_empty());
}

// =============================================================================
// Purge completeness
// =============================================================================

#[test]
fn purge_empties_every_distribution() {
    for (rows, particles, seed) in [(4, 10, 1), (10, 1000, 2), (24, 3600, 3), (64, 500, 4)] {
        let (mut sim, layout) = board(rows, particles, 1.0, seed);
        sim.set_elapsed_ms(1000.0);
        sim.instant_snap(&layout.board_geom(), &layout);
        sim.begin_purge(layout.viewport.height);

        let mut calls = 0;
        while !sim.purge_stacks(1.0 / 30.0) {
            calls += 1;
            assert!(calls < 600, "purge did not finish for {rows} rows");
        }
        assert!(sim.bin_counts().iter().all(|&c| c == 0));
    }
}

#[test]
fn stop_cycles_back_to_a_fresh_round() {
    let config = BoardConfig {
        rows: 8,
        particles: 100,
        duration_secs: 2.0,
        seed: TEST_SEED,
    };
    let mut run = Run::new(config, Viewport::new(400.0, 700.0), Vec::<TimerCommand>::new());
    run.start(0.0);
    run.on_timer_event(&TimerEvent::Tick {
        remaining_ms: 0.0,
        elapsed_ms: 2000.0,
    });

    let mut now = 0.0;
    let mut events = Vec::new();
    while !events.contains(&RunEvent::RoundComplete) {
        now += FRAME_MS;
        events.extend(run.frame(now, FRAME_MS).events);
        assert!(now < 120_000.0);
    }
    assert!(run.stop());

    while run.phase() != RunPhase::Running {
        now += FRAME_MS;
        events.extend(run.frame(now, FRAME_MS).events);
        assert!(now < 240_000.0);
    }
    assert_eq!(
        events,
        vec![RunEvent::RoundComplete, RunEvent::PurgeComplete, RunEvent::RoundStarted]
    );
    assert_eq!(run.simulation().settled_count(), 0);
    assert_eq!(run.simulation().round(), 1);
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn same_seed_same_outcome() {
    let (mut a, layout) = board(14, 700, 7.0, 99);
    let (mut b, _) = board(14, 700, 7.0, 99);
    run_to_completion(&mut a, &layout);
    run_to_completion(&mut b, &layout);
    assert_eq!(a.bin_counts(), b.bin_counts());

    let (mut c, _) = board(14, 700, 7.0, 100);
    run_to_completion(&mut c, &layout);
    assert_ne!(a.bin_counts(), c.bin_counts());
}

// =============================================================================
// Timer thread drives a run
// =============================================================================

#[test]
fn timer_thread_drives_run_to_completion() {
    let clock = ManualClock::new(0.0);
    let timer = TimerHandle::spawn_with_interval(clock.clone(), Duration::from_millis(2)).unwrap();
    let config = BoardConfig {
        rows: 6,
        particles: 30,
        duration_secs: 3.0,
        seed: TEST_SEED,
    };
    let mut run = Run::new(config, Viewport::new(400.0, 600.0), timer);
    assert!(run.start(0.0));

    let deadline = Instant::now() + Duration::from_secs(20);
    let mut done = 0;
    let mut complete = false;
    while !complete {
        assert!(Instant::now() < deadline, "timer never finished the round");
        clock.advance(FRAME_MS * 4.0);
        std::thread::sleep(Duration::from_millis(1));
        for event in run.timer().drain_events() {
            if event == TimerEvent::Done {
                done += 1;
            }
            run.on_timer_event(&event);
        }
        let out = run.frame(clock.now_ms(), FRAME_MS);
        complete = out.events.contains(&RunEvent::RoundComplete);
    }
    assert!(done <= 1);
    assert_eq!(run.simulation().settled_count(), 30);
}
