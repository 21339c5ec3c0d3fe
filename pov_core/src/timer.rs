//! Revolution timer: ingests hall timestamps, rejects outliers, and reports
//! a smoothed revolution period plus an adaptive slot width (spec §4.1).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use pov_common::angle::SlotWidth;
use pov_common::config::RotorConfig;
use pov_common::diagnostics::OutlierCounters;
use pov_common::time::{Duration, Instant};

const ROLLING_WINDOW_CAPACITY: usize = 20;
const STAGE_AVG_WINDOW: usize = 8;

/// A fixed-capacity circular buffer averaging the most recent `n` samples,
/// `n <= ROLLING_WINDOW_CAPACITY` (spec §4.1 "Adaptive rolling window").
/// Touched only by the pulse-acceptance path, per spec §4.1's concurrency
/// note — never shared with a reader.
#[derive(Debug, Clone)]
struct RollingWindow {
    samples: [u64; ROLLING_WINDOW_CAPACITY],
    next: usize,
    len: usize,
}

impl RollingWindow {
    const fn new() -> Self {
        Self { samples: [0; ROLLING_WINDOW_CAPACITY], next: 0, len: 0 }
    }

    fn push(&mut self, sample_us: u64) {
        self.samples[self.next] = sample_us;
        self.next = (self.next + 1) % ROLLING_WINDOW_CAPACITY;
        if self.len < ROLLING_WINDOW_CAPACITY {
            self.len += 1;
        }
    }

    /// Mean of the `n` most recently pushed samples, clamped to what's
    /// available.
    fn mean_of_recent(&self, n: usize) -> u64 {
        let n = n.clamp(1, self.len.max(1)).min(self.len.max(1));
        if self.len == 0 {
            return 0;
        }
        let n = n.min(self.len);
        let mut idx = (self.next + ROLLING_WINDOW_CAPACITY - n) % ROLLING_WINDOW_CAPACITY;
        let mut sum: u128 = 0;
        for _ in 0..n {
            sum += self.samples[idx] as u128;
            idx = (idx + 1) % ROLLING_WINDOW_CAPACITY;
        }
        (sum / n as u128) as u64
    }

    fn reset(&mut self) {
        *self = RollingWindow::new();
    }
}

/// A small rolling average used for the render/output stage-time EMAs
/// (spec §4.1 "record_render_time / record_output_time").
#[derive(Debug, Clone)]
struct StageAverage {
    samples: [u32; STAGE_AVG_WINDOW],
    next: usize,
    len: usize,
}

impl StageAverage {
    const fn new() -> Self {
        Self { samples: [0; STAGE_AVG_WINDOW], next: 0, len: 0 }
    }

    fn push(&mut self, sample_us: u32) {
        self.samples[self.next] = sample_us;
        self.next = (self.next + 1) % STAGE_AVG_WINDOW;
        if self.len < STAGE_AVG_WINDOW {
            self.len += 1;
        }
    }

    fn average(&self) -> u32 {
        if self.len == 0 {
            return 0;
        }
        let sum: u64 = self.samples[..self.len].iter().map(|&s| s as u64).sum();
        (sum / self.len as u64) as u32
    }
}

/// Atomic snapshot of the fields shared between the pulse-acceptance path
/// and reader contexts (spec §3 "RevolutionState", invariant I3 and the
/// "Ordering guarantees" in §5). Plain data, `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevolutionState {
    pub last_pulse_t: Instant,
    pub last_raw_interval: Duration,
    pub smoothed_interval: Duration,
    pub rev_count: u64,
    pub rotating: bool,
    pub warmup_done: bool,
    /// 0 means "not yet selected"; the scheduler substitutes a default.
    pub slot_width_units: u16,
}

impl Default for RevolutionState {
    fn default() -> Self {
        Self {
            last_pulse_t: Instant::ZERO,
            last_raw_interval: Duration::ZERO,
            smoothed_interval: Duration::ZERO,
            rev_count: 0,
            rotating: false,
            warmup_done: false,
            slot_width_units: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SharedTuple {
    seeded: bool,
    state: RevolutionState,
}

/// Turns a stream of hall pulse timestamps into a stable revolution period
/// and slot width, rejecting noise (spec §4.1). Exists for the whole
/// session; `reset()` clears state without destroying the object.
pub struct RevolutionTimer {
    config: RotorConfig,
    shared: Mutex<SharedTuple>,
    window: Mutex<RollingWindow>,
    stage: Mutex<(StageAverage, StageAverage)>, // (render, output)
    too_fast: AtomicU64,
    too_slow: AtomicU64,
    ratio_low: AtomicU64,
}

impl RevolutionTimer {
    pub fn new(config: RotorConfig) -> Self {
        Self {
            config,
            shared: Mutex::new(SharedTuple::default()),
            window: Mutex::new(RollingWindow::new()),
            stage: Mutex::new((StageAverage::new(), StageAverage::new())),
            too_fast: AtomicU64::new(0),
            too_slow: AtomicU64::new(0),
            ratio_low: AtomicU64::new(0),
        }
    }

    /// Ingest a hall pulse timestamp (spec §4.1 "add_pulse"). May reject,
    /// may accept; outliers are counted, never surfaced as errors.
    pub fn add_pulse(&self, t: Instant) {
        let mut shared = self.shared.lock().unwrap();

        if !shared.seeded {
            shared.seeded = true;
            shared.state.last_pulse_t = t;
            return;
        }

        let delta = t.saturating_since(shared.state.last_pulse_t);

        if delta.as_micros() < self.config.min_reasonable_interval_us {
            self.too_fast.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if shared.state.smoothed_interval.as_micros() > 0 {
            let ratio = delta.as_micros() as f64 / shared.state.smoothed_interval.as_micros() as f64;
            if ratio > self.config.max_ratio {
                shared.state.last_pulse_t = t;
                self.too_slow.fetch_add(1, Ordering::Relaxed);
                return;
            }
            if ratio < self.config.min_ratio {
                self.ratio_low.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        shared.state.last_pulse_t = t;

        if delta.as_micros() > self.config.rotation_timeout_us {
            shared.state.rotating = false;
            shared.state.rev_count = 0;
            shared.state.smoothed_interval = Duration::ZERO;
            shared.state.warmup_done = false;
            drop(shared);
            self.window.lock().unwrap().reset();
            return;
        }

        shared.state.rotating = true;
        shared.state.last_raw_interval = delta;
        shared.state.rev_count += 1;
        if shared.state.rev_count >= self.config.warmup_revolutions as u64 {
            shared.state.warmup_done = true;
        }

        let smoothed = {
            let mut window = self.window.lock().unwrap();
            window.push(delta.as_micros());
            let n = self.adaptive_window_size(delta);
            Duration::from_micros(window.mean_of_recent(n))
        };
        shared.state.smoothed_interval = smoothed;

        if smoothed.as_micros() > 0 {
            let width = self.select_slot_width(smoothed);
            shared.state.slot_width_units = width.units();
        }
    }

    /// Linear interpolation of the rolling-window sample count between 20
    /// (at `slow_speed_anchor_us`) and 2 (at `fast_speed_anchor_us`),
    /// clamped (spec §4.1 "Adaptive rolling window").
    fn adaptive_window_size(&self, interval: Duration) -> usize {
        let slow = self.config.slow_speed_anchor_us as f64;
        let fast = self.config.fast_speed_anchor_us as f64;
        let x = interval.as_micros() as f64;
        if x >= slow {
            return ROLLING_WINDOW_CAPACITY;
        }
        if x <= fast {
            return 2;
        }
        let t = (x - fast) / (slow - fast);
        let n = 2.0 + t * (ROLLING_WINDOW_CAPACITY as f64 - 2.0);
        (n.round() as usize).clamp(2, ROLLING_WINDOW_CAPACITY)
    }

    /// Slot-width selection, run once per accepted revolution (spec §4.1).
    fn select_slot_width(&self, smoothed: Duration) -> SlotWidth {
        let (render, output) = &*self.stage.lock().unwrap();
        let stage_time_us = render.average().max(output.average()) as f64 * self.config.safety_margin;
        let us_per_degree = smoothed.as_micros() as f64 / 360.0;
        let min_degrees = stage_time_us / us_per_degree;
        SlotWidth::select_for_min_span(min_degrees)
    }

    /// Record a `RenderWorker` stage duration, feeding slot-width selection.
    pub fn record_render_time(&self, dt: Duration) {
        self.stage.lock().unwrap().0.push(dt.as_micros() as u32);
    }

    /// Record an `OutputWorker` stage duration, feeding slot-width selection.
    pub fn record_output_time(&self, dt: Duration) {
        self.stage.lock().unwrap().1.push(dt.as_micros() as u32);
    }

    /// Atomic read of all timer state (spec §4.1 "snapshot").
    pub fn snapshot(&self) -> RevolutionState {
        self.shared.lock().unwrap().state
    }

    /// Current render/output stage averages in microseconds, for the
    /// diagnostics snapshot.
    pub fn stage_averages(&self) -> (u32, u32) {
        let (render, output) = &*self.stage.lock().unwrap();
        (render.average(), output.average())
    }

    /// Outlier counters accumulated since the last `reset()`.
    pub fn outlier_counters(&self) -> OutlierCounters {
        OutlierCounters {
            too_fast: self.too_fast.load(Ordering::Relaxed),
            too_slow: self.too_slow.load(Ordering::Relaxed),
            ratio_low: self.ratio_low.load(Ordering::Relaxed),
        }
    }

    /// Zero all state; used at session start and on a hard-restart signal.
    pub fn reset(&self) {
        *self.shared.lock().unwrap() = SharedTuple::default();
        self.window.lock().unwrap().reset();
        *self.stage.lock().unwrap() = (StageAverage::new(), StageAverage::new());
        self.too_fast.store(0, Ordering::Relaxed);
        self.too_slow.store(0, Ordering::Relaxed);
        self.ratio_low.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer() -> RevolutionTimer {
        RevolutionTimer::new(RotorConfig::default())
    }

    fn us(v: u64) -> Instant {
        Instant::from_micros(v)
    }

    // P1: last_pulse_t is either unchanged or equals the latest argument.
    #[test]
    fn last_pulse_t_only_ever_unchanged_or_latest() {
        let t = timer();
        t.add_pulse(us(0));
        assert_eq!(t.snapshot().last_pulse_t, us(0));
        // too-fast: rejected without update.
        t.add_pulse(us(100));
        assert_eq!(t.snapshot().last_pulse_t, us(0));
        t.add_pulse(us(20_000));
        assert_eq!(t.snapshot().last_pulse_t, us(20_000));
    }

    // B2: first real interval is accepted even though smoothed_interval == 0.
    #[test]
    fn first_interval_accepted_with_no_smoothed_average() {
        let t = timer();
        t.add_pulse(us(0));
        t.add_pulse(us(20_000));
        let snap = t.snapshot();
        assert!(snap.rotating);
        assert_eq!(snap.last_raw_interval, Duration::from_micros(20_000));
    }

    // S1: steady state at 20ms/rev for 20 pulses.
    #[test]
    fn s1_steady_state_warms_up_and_selects_width() {
        let t = timer();
        for i in 0..=20u64 {
            t.add_pulse(us(i * 20_000));
        }
        let snap = t.snapshot();
        assert!(snap.rotating);
        assert!(snap.warmup_done);
        assert_eq!(snap.rev_count, 20);
        assert_eq!(snap.smoothed_interval, Duration::from_micros(20_000));

        t.record_render_time(Duration::from_micros(400));
        t.record_output_time(Duration::from_micros(350));
        t.add_pulse(us(21 * 20_000));
        assert_eq!(t.snapshot().slot_width_units, 15);
    }

    // S2: too-fast pulse rejected, counter increments, last_pulse_t unchanged.
    #[test]
    fn s2_too_fast_rejected() {
        let t = timer();
        for i in 0..=3u64 {
            t.add_pulse(us(i * 20_000));
        }
        let before = t.snapshot().last_pulse_t;
        t.add_pulse(us(3 * 20_000 + 100));
        assert_eq!(t.snapshot().last_pulse_t, before);
        assert_eq!(t.outlier_counters().too_fast, 1);
    }

    // S3: missed pulse — ratio exactly 2.5 is NOT rejected (only > 2.5 is);
    // ratio 2.75 is rejected as too_slow and resyncs last_pulse_t.
    #[test]
    fn s3_missed_pulse_ratio_threshold() {
        let t = timer();
        for i in 0..=3u64 {
            t.add_pulse(us(i * 20_000)); // 0, 20000, 40000, 60000
        }
        t.add_pulse(us(100_000)); // delta 40000, ratio 2.0 -> accepted
        t.add_pulse(us(140_000)); // delta 40000, ratio 2.0 -> accepted
        // smoothed interval is now pulled up from 20000 by the last 2 samples.
        let ratio_boundary_delta = (t.snapshot().smoothed_interval.as_micros() as f64 * 2.5) as u64;
        let exact = us(140_000 + ratio_boundary_delta);
        t.add_pulse(exact); // ratio == 2.5 exactly -> accepted (not > 2.5)
        let after_exact = t.snapshot().last_pulse_t;
        assert_eq!(after_exact, exact);

        let too_slow = us(exact.as_micros() + ratio_boundary_delta + 10_000);
        t.add_pulse(too_slow);
        assert_eq!(t.snapshot().last_pulse_t, too_slow); // resynced
        assert_eq!(t.outlier_counters().too_slow, 1);
    }

    #[test]
    fn rotation_timeout_declares_not_rotating() {
        let mut cfg = RotorConfig::default();
        cfg.rotation_timeout_us = 50_000;
        let t = RevolutionTimer::new(cfg);
        t.add_pulse(us(0));
        t.add_pulse(us(20_000));
        assert!(t.snapshot().rotating);
        t.add_pulse(us(20_000 + 60_000));
        let snap = t.snapshot();
        assert!(!snap.rotating);
        assert_eq!(snap.rev_count, 0);
    }

    // R3: two successive snapshots with no pulses in between are equal.
    #[test]
    fn snapshot_is_pure_between_pulses() {
        let t = timer();
        t.add_pulse(us(0));
        t.add_pulse(us(20_000));
        assert_eq!(t.snapshot(), t.snapshot());
    }

    #[test]
    fn reset_zeroes_state() {
        let t = timer();
        t.add_pulse(us(0));
        t.add_pulse(us(20_000));
        t.add_pulse(us(100)); // too fast, bump counter
        t.reset();
        assert_eq!(t.snapshot(), RevolutionState::default());
        assert_eq!(t.outlier_counters().too_fast, 0);
    }
}
