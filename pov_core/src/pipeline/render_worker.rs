//! The render worker: walks the slot scheduler, applies pending commands,
//! and invokes the active effect (spec §5 "RenderWorker loop", grounded on
//! the render task's acquire → populate → release sequencing).

use std::time::Duration as StdDuration;

use pov_common::angle::FULL_CIRCLE;
use pov_common::ports::Clock;
use pov_common::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::diagnostics::SharedDiagnostics;
use crate::dispatcher::{CommandConsumer, DispatcherState};
use crate::effect::EffectRegistry;
use crate::pipeline::buffer_pool::BufferPool;
use crate::render_context::spin_speed_from_period;
use crate::scheduler::SlotScheduler;
use crate::timer::RevolutionTimer;

/// Loop-persistent state threaded through successive [`render_step`] calls:
/// the slot counter, the last revolution seen (to detect the rollover that
/// triggers `on_revolution`), and the last frame's timestamp (to compute
/// `frame_delta_us`).
pub struct RenderLoopState {
    pub slot_index: u32,
    pub last_rev_count: u64,
    pub last_frame_t: Option<Instant>,
}

impl RenderLoopState {
    pub fn new() -> Self {
        Self { slot_index: 0, last_rev_count: 0, last_frame_t: None }
    }
}

impl Default for RenderLoopState {
    fn default() -> Self {
        Self::new()
    }
}

/// One iteration of the render loop: apply any queued commands, compute
/// the next slot, and run the active effect into a freshly leased buffer.
/// Returns `false` when no slot was produced (rotor not rotating yet, or
/// the buffer pool timed out) — the caller keeps looping regardless, this
/// is only useful for metrics.
#[allow(clippy::too_many_arguments)]
pub fn render_step(
    timer: &RevolutionTimer,
    scheduler: &mut SlotScheduler,
    registry: &mut EffectRegistry,
    dispatcher_state: &mut DispatcherState,
    commands: &CommandConsumer,
    pool: &BufferPool,
    clock: &dyn Clock,
    buffer_timeout: Duration,
    loop_state: &mut RenderLoopState,
    outer_phase_units: u16,
    inside_phase_units: u16,
    min_revolution_period_us: u64,
    max_revolution_period_us: u64,
    diag: &SharedDiagnostics,
) -> bool {
    commands.apply_pending(registry, dispatcher_state);
    diag.set_active_effect(registry.active_index());
    diag.set_brightness(dispatcher_state.effective_brightness(registry));

    let now = clock.now();
    let state = timer.snapshot();
    let Some(target) = scheduler.next(&state, now) else {
        trace!("render worker idle: rotor not rotating");
        diag.record_not_rotating();
        return false;
    };

    if state.rev_count != loop_state.last_rev_count {
        // Forwarded from the render loop rather than the hall-pulse path
        // itself, so a slow effect can never stall pulse acceptance (spec
        // §5: the pulse-event context may only forward to non-blocking
        // callees).
        registry.forward_revolution(state.smoothed_interval, now, state.rev_count);
        loop_state.last_rev_count = state.rev_count;
    }

    if !dispatcher_state.power_on {
        // Power(false) suppresses output entirely without switching or
        // ending the active effect — the scheduler cursor still advances
        // above so the rotor stays in sync while dark.
        return false;
    }

    let render_start = clock.now();
    let Some(mut lease) = pool.acquire_write(StdDuration::from_micros(buffer_timeout.as_micros())) else {
        warn!("render worker timed out acquiring a write buffer");
        diag.record_buffer_timeout();
        return false;
    };

    let frame_delta = match loop_state.last_frame_t {
        Some(prev) => now.saturating_since(prev),
        None => Duration::ZERO,
    };
    loop_state.last_frame_t = Some(now);

    // spec §4.3 step 5: arm1 carries the raw scheduled angle, arm0/arm2 are
    // phase-shifted copies of it — the three arms sit at different angles
    // on the disc at any given instant.
    let arm1_angle = target.angle.value();
    let arm0_angle = (arm1_angle + outer_phase_units) % FULL_CIRCLE;
    let arm2_angle = (arm1_angle + inside_phase_units) % FULL_CIRCLE;

    let spin_speed = if state.smoothed_interval.as_micros() > 0 {
        spin_speed_from_period(state.smoothed_interval, min_revolution_period_us, max_revolution_period_us)
    } else {
        0
    };

    let ctx = lease.context_mut();
    ctx.begin_frame(
        loop_state.slot_index as u64,
        now,
        frame_delta,
        state.smoothed_interval,
        state.slot_width_units,
        arm0_angle,
        arm1_angle,
        arm2_angle,
    );
    ctx.set_spin_speed(spin_speed);

    registry.render_active(ctx);

    lease.release(target.target_t);
    loop_state.slot_index += 1;
    diag.record_rendered();

    let render_time = clock.now().saturating_since(render_start);
    timer.record_render_time(render_time);
    debug!(angle = target.angle.value(), render_us = render_time.as_micros(), "rendered slot");
    true
}
