//! Galton Timer entry point
//!
//! Native: runs one round headless and prints the final histogram.
//! `galton-timer [query] [--fast]`, e.g. `galton-timer "rows=12&n=600&t=20" --fast`

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::thread;
    use std::time::Duration;

    use galton_timer::sim::{RunEvent, bin_probability};
    use galton_timer::timer::{Clock, Countdown, SystemClock, TimerHandle, format_remaining};
    use galton_timer::{BoardConfig, Run, TimerCommand, Viewport};

    const FRAME_MS: f64 = 1000.0 / 60.0;
    const HISTOGRAM_WIDTH: usize = 60;

    pub fn main() {
        env_logger::init();

        let mut query = String::new();
        let mut fast = false;
        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "--fast" => fast = true,
                "-h" | "--help" => {
                    println!("usage: galton-timer [rows=N&particles=N&duration=SECS&seed=N] [--fast]");
                    return;
                }
                _ => query = arg,
            }
        }

        let config = BoardConfig::from_query(&query);
        log::info!("Galton Timer (native) starting: {}", config.to_query());
        let viewport = Viewport::new(800.0, 1000.0);

        let counts = if fast {
            simulated(config, viewport)
        } else {
            match realtime(config, viewport) {
                Ok(counts) => counts,
                Err(e) => {
                    log::error!("{}", e);
                    std::process::exit(1);
                }
            }
        };
        print_histogram(&counts);
    }

    /// Real countdown on the timer thread, ~60 frames per second
    fn realtime(config: BoardConfig, viewport: Viewport) -> Result<Vec<u32>, galton_timer::timer::TimerError> {
        let clock = SystemClock::new();
        let timer = TimerHandle::spawn(clock)?;
        let mut run = Run::new(config, viewport, timer);

        let mut last = clock.now_ms();
        run.start(last);
        let mut next_report = 0.0;
        loop {
            thread::sleep(Duration::from_millis(16));
            for event in run.timer().drain_events() {
                run.on_timer_event(&event);
            }
            let now = clock.now_ms();
            let out = run.frame(now, now - last);
            last = now;

            if now >= next_report {
                next_report = now + 1000.0;
                report(&run);
            }
            if out.events.contains(&RunEvent::RoundComplete) {
                break;
            }
        }
        Ok(run.simulation().bin_counts().to_vec())
    }

    /// Simulated time: the countdown is polled in-process on its own cadence
    fn simulated(config: BoardConfig, viewport: Viewport) -> Vec<u32> {
        let mut run = Run::new(config, viewport, Vec::<TimerCommand>::new());
        let mut countdown = Countdown::new();
        let tick_ms = galton_timer::consts::TICK_INTERVAL_MS as f64;

        let mut now = 0.0;
        let mut next_tick = tick_ms;
        run.start(now);
        loop {
            now += FRAME_MS;
            for command in run.timer_mut().drain(..) {
                countdown.apply(&command, now);
            }
            if now >= next_tick {
                next_tick += tick_ms;
                for event in countdown.poll(now) {
                    run.on_timer_event(&event);
                }
            }
            let out = run.frame(now, FRAME_MS);
            if (now / 1000.0).floor() != ((now - FRAME_MS) / 1000.0).floor() {
                report(&run);
            }
            if out.events.contains(&RunEvent::RoundComplete) {
                break;
            }
        }
        log::info!("Simulated {:.1}s of board time", now / 1000.0);
        run.simulation().bin_counts().to_vec()
    }

    fn report<T: galton_timer::sim::TimerPort>(run: &Run<T>) {
        let sim = run.simulation();
        log::info!(
            "{} remaining, {} emitted, {} in flight, {} settled",
            format_remaining(run.remaining_ms()),
            sim.emitted_count(),
            sim.active().len(),
            sim.settled_count()
        );
    }

    fn print_histogram(counts: &[u32]) {
        let total: u32 = counts.iter().sum();
        let max = counts.iter().copied().max().unwrap_or(0).max(1);
        let rows = counts.len().saturating_sub(1) as u32;
        println!("bin  count  expected");
        for (bin, &count) in counts.iter().enumerate() {
            let expected = bin_probability(rows, bin as u32) * f64::from(total);
            let bar = "#".repeat(count as usize * HISTOGRAM_WIDTH / max as usize);
            println!("{bin:>3}  {count:>5}  {expected:>8.1}  {bar}");
        }
        println!("total {total}");
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    native::main();
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is web::WebBoard, this is just to satisfy the compiler
}
