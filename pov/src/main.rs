//! Demo harness: drives `pov_core::Pipeline` with a simulated hall sensor
//! and a counting LED sink so the rotor core can be exercised without
//! hardware attached.

mod clock;
mod effects;
mod sim;
mod sink;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use clap::Parser;
use pov_common::config::RotorConfig;
use pov_common::ports::{Clock, HallSource};
use pov_core::pipeline::{CorePinning, Pipeline};
use pov_core::EffectRegistry;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pov", about = "Persistence-of-vision rotor core demo harness")]
struct Args {
    /// Path to a TOML config file; built-in defaults are used if omitted.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Simulated rotor speed in revolutions per minute.
    #[arg(long, default_value_t = 300.0)]
    rpm: f64,

    /// How long to run the demo before shutting the pipeline down.
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// Pin the render/output workers to distinct CPU cores (requires the
    /// `affinity` feature; a no-op otherwise).
    #[arg(long)]
    pin_cores: bool,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let rpm = args.rpm;
    let duration_secs = args.duration_secs;
    let pin_cores = args.pin_cores;

    let config = match &args.config {
        Some(path) => pov_common::config::load(path).unwrap_or_else(|err| {
            tracing::error!(%err, "failed to load config, falling back to defaults");
            RotorConfig::default()
        }),
        None => RotorConfig::default(),
    };

    let system_clock: Arc<dyn Clock> = Arc::new(clock::SystemClock::new());
    let timer = Arc::new(pov_core::RevolutionTimer::new(config));

    let mut registry = EffectRegistry::new();
    registry.register(Box::new(effects::RainbowSpin::new()));
    registry.register(Box::new(effects::Pulse::new()));
    registry.set_active(config.starting_effect);

    let sink = sink::ConsoleSink::default();
    let frame_count = sink.frame_count();

    let pinning =
        if pin_cores { Some(CorePinning { render_core: 0, output_core: 1 }) } else { None };

    let (pipeline, commands) =
        Pipeline::spawn(config, timer.clone(), system_clock.clone(), registry, sink, pinning);

    let running = Arc::new(AtomicBool::new(true));

    let hall_thread = {
        let timer = timer.clone();
        let clock = system_clock.clone();
        let running = running.clone();
        std::thread::spawn(move || {
            let mut hall = sim::SimulatedHall::new(clock, rpm);
            while running.load(Ordering::Relaxed) {
                if let Some(pulse) = hall.poll() {
                    timer.add_pulse(pulse);
                }
                std::thread::sleep(StdDuration::from_micros(200));
            }
        })
    };

    let stats_thread = {
        let diag = pipeline.diagnostics();
        let timer = timer.clone();
        let running = running.clone();
        std::thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                std::thread::sleep(StdDuration::from_secs(1));
                let snap = diag.snapshot(&timer);
                info!(
                    rev_count = snap.rev_count,
                    rendered = snap.frames.rendered,
                    skipped = snap.frames.skipped,
                    not_rotating = snap.frames.not_rotating,
                    buffer_timeout = snap.frames.buffer_timeout,
                    commands_dropped = snap.frames.commands_dropped,
                    too_fast = snap.outliers.too_fast,
                    too_slow = snap.outliers.too_slow,
                    ratio_low = snap.outliers.ratio_low,
                    render_avg_us = snap.render_avg_us,
                    output_avg_us = snap.output_avg_us,
                    active_effect = snap.active_effect,
                    brightness = snap.brightness,
                    "diagnostics"
                );
            }
        })
    };

    std::thread::sleep(StdDuration::from_secs(duration_secs));

    running.store(false, Ordering::Relaxed);
    let _ = hall_thread.join();
    let _ = stats_thread.join();
    drop(commands);
    if let Err(err) = pipeline.shutdown() {
        tracing::error!(%err, "pipeline shutdown reported a worker failure");
    }

    info!(frames = frame_count.load(Ordering::Relaxed), "demo run complete");
}
