//! The output worker: copies a rendered frame to the physical LED strip
//! and busy-waits for its scheduled fire time (spec §5 "OutputWorker loop",
//! grounded on the output task's acquire → copy → release-immediately →
//! busy-wait → show sequencing; busy-wait rather than sleep because target
//! precision is microsecond-scale, spec §4.2).

use std::time::Duration as StdDuration;

use pov_common::ports::{Clock, LedSink};
use pov_common::time::Duration;
use tracing::{debug, warn};

use crate::diagnostics::SharedDiagnostics;
use crate::pipeline::buffer_pool::BufferPool;
use crate::render_context::{apply_brightness, RenderContext, ARM_LEN};
use crate::timer::RevolutionTimer;

/// Physical slot reserved by the wiring for a level-shifter tap; the CORE
/// never assigns pixel data there (spec §6 "LedSink").
const RESERVED_HUB_INDEX: u16 = 0;

const ARM0_BASE: u16 = RESERVED_HUB_INDEX + 1;
const ARM1_BASE: u16 = ARM0_BASE + 14;
const ARM2_BASE: u16 = ARM1_BASE + ARM_LEN as u16;

/// One iteration of the output loop. Returns `false` if no frame was ready
/// within `buffer_timeout` — the caller keeps looping regardless.
pub fn output_step(
    timer: &RevolutionTimer,
    pool: &BufferPool,
    sink: &mut dyn LedSink,
    clock: &dyn Clock,
    brightness: u8,
    buffer_timeout: Duration,
    diag: &SharedDiagnostics,
) -> bool {
    let Some(lease) = pool.acquire_read(StdDuration::from_micros(buffer_timeout.as_micros())) else {
        warn!("output worker timed out acquiring a read buffer");
        diag.record_buffer_timeout();
        return false;
    };

    let target_t = lease.target_t;
    copy_frame(lease.context(), brightness, sink);
    lease.release();

    let output_start = clock.now();
    while clock.now() < target_t {
        std::hint::spin_loop();
    }
    sink.show();

    let output_time = clock.now().saturating_since(output_start);
    timer.record_output_time(output_time);
    debug!(output_us = output_time.as_micros(), "output slot fired");
    true
}

/// Map a [`RenderContext`]'s virtual rows onto physical strip indices and
/// push them through `sink`, applying the current brightness curve. Arm 1
/// is wired in reverse of the other two (spec §3 "physical LED layout").
fn copy_frame(ctx: &RenderContext, brightness: u8, sink: &mut dyn LedSink) {
    for (i, &rgb) in ctx.arm0().iter().enumerate() {
        sink.set(ARM0_BASE + i as u16, apply_brightness(rgb, brightness));
    }
    for (i, &rgb) in ctx.arm1().iter().enumerate() {
        let physical = ARM1_BASE + (ARM_LEN - 1 - i) as u16;
        sink.set(physical, apply_brightness(rgb, brightness));
    }
    for (i, &rgb) in ctx.arm2().iter().enumerate() {
        sink.set(ARM2_BASE + i as u16, apply_brightness(rgb, brightness));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pov_common::config::RotorConfig;
    use pov_common::time::Instant;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeClock(AtomicU64);
    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            Instant::from_micros(self.0.load(Ordering::Relaxed))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sets: Vec<(u16, (u8, u8, u8))>,
        shown: u32,
    }
    impl LedSink for RecordingSink {
        fn set(&mut self, physical_index: u16, rgb: (u8, u8, u8)) {
            self.sets.push((physical_index, rgb));
        }
        fn show(&mut self) {
            self.shown += 1;
        }
    }

    #[test]
    fn copy_frame_never_touches_reserved_index() {
        let mut ctx = RenderContext::new();
        ctx.fill_virtual(|_| (10, 10, 10));
        let mut sink = RecordingSink::default();
        copy_frame(&ctx, 10, &mut sink);
        assert!(sink.sets.iter().all(|&(idx, _)| idx != RESERVED_HUB_INDEX));
    }

    #[test]
    fn copy_frame_covers_all_forty_data_pixels() {
        let mut ctx = RenderContext::new();
        ctx.fill_virtual(|_| (1, 1, 1));
        let mut sink = RecordingSink::default();
        copy_frame(&ctx, 10, &mut sink);
        assert_eq!(sink.sets.len(), 14 + ARM_LEN + ARM_LEN);
    }

    #[test]
    fn arm1_is_wired_in_reverse() {
        let mut ctx = RenderContext::new();
        ctx.set_virtual(1, (1, 0, 0)); // arm1[0]
        let mut sink = RecordingSink::default();
        copy_frame(&ctx, 10, &mut sink);
        let reversed_physical = ARM1_BASE + (ARM_LEN - 1) as u16;
        let found = sink.sets.iter().find(|&&(idx, _)| idx == reversed_physical).unwrap();
        assert_eq!(found.1 .0, apply_brightness((1, 0, 0), 10).0);
    }

    #[test]
    fn output_step_waits_until_target_then_shows() {
        let timer = RevolutionTimer::new(RotorConfig::default());
        let pool = BufferPool::new();
        let mut w = pool.acquire_write(StdDuration::from_millis(10)).unwrap();
        w.context_mut().set_virtual(0, (3, 3, 3));
        w.release(Instant::from_micros(500));

        let clock = FakeClock(AtomicU64::new(500));
        let mut sink = RecordingSink::default();
        let diag = SharedDiagnostics::new();
        let produced = output_step(&timer, &pool, &mut sink, &clock, 10, Duration::from_micros(10_000), &diag);

        assert!(produced);
        assert_eq!(sink.shown, 1);
    }

    #[test]
    fn output_step_times_out_with_no_frame() {
        let timer = RevolutionTimer::new(RotorConfig::default());
        let pool = BufferPool::new();
        let clock = FakeClock(AtomicU64::new(0));
        let mut sink = RecordingSink::default();
        let diag = SharedDiagnostics::new();
        let produced = output_step(&timer, &pool, &mut sink, &clock, 10, Duration::from_micros(5_000), &diag);
        assert!(!produced);
        assert_eq!(sink.shown, 0);
    }
}
