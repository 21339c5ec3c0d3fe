//! Wires the render and output workers onto their own threads, connected
//! by a [`buffer_pool::BufferPool`] (spec §5 "Concurrency & Resource
//! Model").

pub mod buffer_pool;
pub mod output_worker;
pub mod render_worker;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use pov_common::config::RotorConfig;
use pov_common::ports::{Clock, LedSink};
use pov_common::time::Duration;
use tracing::info;

use crate::diagnostics::SharedDiagnostics;
use crate::dispatcher::{self, CommandProducer, DispatcherState};
use crate::effect::EffectRegistry;
use crate::error::PipelineError;
use crate::pipeline::render_worker::RenderLoopState;
use crate::scheduler::SlotScheduler;
use crate::timer::RevolutionTimer;
use buffer_pool::BufferPool;

/// Best-effort core indices the render/output threads are pinned to when
/// the `affinity` feature is enabled (spec §6 "Concurrency & Resource
/// Model": "the render and output workers run on distinct CPU cores").
#[derive(Debug, Clone, Copy)]
pub struct CorePinning {
    pub render_core: usize,
    pub output_core: usize,
}

/// Owns the render and output worker threads for the lifetime of a
/// session. Dropping a `Pipeline` signals both threads to stop and joins
/// them.
pub struct Pipeline {
    running: Arc<AtomicBool>,
    render_handle: Option<JoinHandle<()>>,
    output_handle: Option<JoinHandle<()>>,
    diagnostics: Arc<SharedDiagnostics>,
    startup_errors: Arc<std::sync::Mutex<Vec<PipelineError>>>,
}

impl Pipeline {
    /// Start the pipeline. `registry` is moved onto the render thread;
    /// `sink` is moved onto the output thread. Returns the pipeline handle
    /// plus a [`CommandProducer`] for submitting remote commands.
    pub fn spawn<L>(
        config: RotorConfig,
        timer: Arc<RevolutionTimer>,
        clock: Arc<dyn Clock>,
        registry: EffectRegistry,
        sink: L,
        pinning: Option<CorePinning>,
    ) -> (Self, CommandProducer)
    where
        L: LedSink + Send + 'static,
    {
        let pool = Arc::new(BufferPool::new());
        let (producer, consumer) = dispatcher::channel(config.command_queue_capacity);
        let running = Arc::new(AtomicBool::new(true));
        let brightness = Arc::new(AtomicU8::new(config.starting_brightness.min(10)));
        let diagnostics = SharedDiagnostics::new();

        let buffer_timeout = Duration::from_micros(config.buffer_acquire_timeout_us);
        let startup_errors = Arc::new(std::sync::Mutex::new(Vec::new()));

        let render_handle = {
            let pool = pool.clone();
            let timer = timer.clone();
            let clock = clock.clone();
            let running = running.clone();
            let brightness = brightness.clone();
            let diagnostics = diagnostics.clone();
            let producer = producer.clone();
            let render_core = pinning.map(|p| p.render_core);
            let startup_errors = startup_errors.clone();
            std::thread::Builder::new()
                .name("pov-render".into())
                .spawn(move || {
                    if let Some(core) = render_core {
                        if let Err(e) = pin_current_thread(core) {
                            tracing::warn!(error = %e, "render worker affinity pinning failed");
                            startup_errors.lock().unwrap().push(e);
                        }
                    }
                    let mut registry = registry;
                    let mut scheduler = SlotScheduler::new();
                    let mut state = DispatcherState::new(config.starting_brightness);
                    let mut loop_state = RenderLoopState::new();
                    while running.load(Ordering::Relaxed) {
                        render_worker::render_step(
                            &timer,
                            &mut scheduler,
                            &mut registry,
                            &mut state,
                            &consumer,
                            &pool,
                            clock.as_ref(),
                            buffer_timeout,
                            &mut loop_state,
                            config.outer_phase_units,
                            config.inside_phase_units,
                            config.min_revolution_period_us,
                            config.max_revolution_period_us,
                            &diagnostics,
                        );
                        brightness.store(state.effective_brightness(&registry), Ordering::Relaxed);
                        diagnostics.set_commands_dropped(producer.dropped_count());
                    }
                })
                .expect("failed to spawn render worker thread")
        };

        let output_handle = {
            let pool = pool.clone();
            let timer = timer.clone();
            let clock = clock.clone();
            let running = running.clone();
            let brightness = brightness.clone();
            let diagnostics = diagnostics.clone();
            let output_core = pinning.map(|p| p.output_core);
            let startup_errors = startup_errors.clone();
            std::thread::Builder::new()
                .name("pov-output".into())
                .spawn(move || {
                    if let Some(core) = output_core {
                        if let Err(e) = pin_current_thread(core) {
                            tracing::warn!(error = %e, "output worker affinity pinning failed");
                            startup_errors.lock().unwrap().push(e);
                        }
                    }
                    let mut sink = sink;
                    while running.load(Ordering::Relaxed) {
                        output_worker::output_step(
                            &timer,
                            &pool,
                            &mut sink,
                            clock.as_ref(),
                            brightness.load(Ordering::Relaxed),
                            buffer_timeout,
                            &diagnostics,
                        );
                    }
                })
                .expect("failed to spawn output worker thread")
        };

        info!("pipeline started");
        (
            Pipeline {
                running,
                render_handle: Some(render_handle),
                output_handle: Some(output_handle),
                diagnostics,
                startup_errors,
            },
            producer,
        )
    }

    /// A cheap-to-clone handle for periodically reading diagnostics, e.g.
    /// from a [`pov_common::ports::StatsSink`] reporting loop.
    pub fn diagnostics(&self) -> Arc<SharedDiagnostics> {
        self.diagnostics.clone()
    }

    /// Signal both workers to stop and block until they exit. Returns the
    /// first failure observed: an affinity-pinning failure recorded at
    /// startup, or a worker thread panic surfaced by `join()` (spec §8
    /// "the pipeline's own startup" is the one place outside `ConfigError`
    /// that can fail).
    pub fn shutdown(mut self) -> Result<(), PipelineError> {
        self.running.store(false, Ordering::Relaxed);
        let mut result = Ok(());
        if let Some(h) = self.render_handle.take() {
            if let Err(e) = join_worker(h) {
                result = result.and(Err(e));
            }
        }
        if let Some(h) = self.output_handle.take() {
            if let Err(e) = join_worker(h) {
                result = result.and(Err(e));
            }
        }
        if result.is_ok() {
            if let Some(e) = self.startup_errors.lock().unwrap().drain(..).next() {
                result = Err(e);
            }
        }
        result
    }
}

fn join_worker(handle: JoinHandle<()>) -> Result<(), PipelineError> {
    handle.join().map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "worker thread panicked with a non-string payload".into());
        PipelineError::WorkerPanicked(message)
    })
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.render_handle.take() {
            if let Err(e) = join_worker(h) {
                tracing::error!(error = %e, "render worker panicked during drop");
            }
        }
        if let Some(h) = self.output_handle.take() {
            if let Err(e) = join_worker(h) {
                tracing::error!(error = %e, "output worker panicked during drop");
            }
        }
    }
}

#[cfg(feature = "affinity")]
fn pin_current_thread(core: usize) -> Result<(), PipelineError> {
    let fail = |reason: &str| PipelineError::AffinityFailed { core, reason: reason.to_string() };
    let core_ids = core_affinity::get_core_ids().ok_or_else(|| fail("no core IDs available on this platform"))?;
    let id = core_ids.get(core).ok_or_else(|| fail("requested core index not available for pinning"))?;
    if core_affinity::set_for_current(*id) {
        Ok(())
    } else {
        Err(fail("failed to pin worker thread to core"))
    }
}

#[cfg(not(feature = "affinity"))]
fn pin_current_thread(core: usize) -> Result<(), PipelineError> {
    let _ = core;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pov_common::time::Instant;
    use std::sync::atomic::AtomicU64;

    struct FakeClock(AtomicU64);
    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            Instant::from_micros(self.0.load(Ordering::Relaxed))
        }
    }

    #[derive(Default, Clone)]
    struct NullSink;
    impl LedSink for NullSink {
        fn set(&mut self, _physical_index: u16, _rgb: (u8, u8, u8)) {}
        fn show(&mut self) {}
    }

    struct Quiet;
    impl crate::effect::Effect for Quiet {
        fn name(&self) -> &str {
            "quiet"
        }
        fn render(&mut self, _ctx: &mut crate::render_context::RenderContext) {}
    }

    struct Panicky;
    impl crate::effect::Effect for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        fn render(&mut self, _ctx: &mut crate::render_context::RenderContext) {
            panic!("effect render exploded");
        }
    }

    #[test]
    fn shutdown_returns_ok_when_both_workers_exit_cleanly() {
        let config = RotorConfig::default();
        let timer = Arc::new(RevolutionTimer::new(config));
        let clock: Arc<dyn Clock> = Arc::new(FakeClock(AtomicU64::new(0)));
        let mut registry = EffectRegistry::new();
        registry.register(Box::new(Quiet));
        registry.set_active(1);

        let (pipeline, _commands) = Pipeline::spawn(config, timer, clock, registry, NullSink, None);
        assert!(pipeline.shutdown().is_ok());
    }

    #[test]
    fn shutdown_surfaces_a_worker_panic_as_worker_panicked() {
        let config = RotorConfig::default();
        let timer = Arc::new(RevolutionTimer::new(config));
        timer.add_pulse(Instant::from_micros(0));
        timer.add_pulse(Instant::from_micros(20_000));
        let clock: Arc<dyn Clock> = Arc::new(FakeClock(AtomicU64::new(20_000)));
        let mut registry = EffectRegistry::new();
        registry.register(Box::new(Panicky));
        registry.set_active(1);

        let (pipeline, _commands) = Pipeline::spawn(config, timer, clock, registry, NullSink, None);
        // Give the render thread time to hit the panicking effect before we
        // ask it to stop; shutdown() still blocks until the join resolves
        // either way.
        std::thread::sleep(std::time::Duration::from_millis(50));
        match pipeline.shutdown() {
            Err(PipelineError::WorkerPanicked(_)) => {}
            other => panic!("expected WorkerPanicked, got {other:?}"),
        }
    }
}
