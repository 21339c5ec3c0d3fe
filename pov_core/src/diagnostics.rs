//! Lock-free counters the render/output workers update in place, combined
//! with the revolution timer's own state into a [`DiagnosticsSnapshot`]
//! for an optional [`pov_common::ports::StatsSink`] (spec §4 "diagnostics
//! supplement": per-session outlier/frame counters and stage-time
//! averages beyond the bare revolution period).

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use pov_common::diagnostics::{DiagnosticsSnapshot, FrameCounters};

use crate::timer::RevolutionTimer;

/// Frame-pipeline counters, shared between the render/output threads and
/// whoever polls [`SharedDiagnostics::snapshot`] (typically the host
/// binary's stats-reporting loop).
#[derive(Default)]
pub struct SharedDiagnostics {
    rendered: AtomicU64,
    skipped: AtomicU64,
    not_rotating: AtomicU64,
    buffer_timeout: AtomicU64,
    commands_dropped: AtomicU64,
    active_effect: AtomicU8,
    brightness: AtomicU8,
}

impl SharedDiagnostics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_rendered(&self) {
        self.rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_rotating(&self) {
        self.not_rotating.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_buffer_timeout(&self) {
        self.buffer_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_commands_dropped(&self, n: u64) {
        self.commands_dropped.store(n, Ordering::Relaxed);
    }

    pub fn set_active_effect(&self, index: u8) {
        self.active_effect.store(index, Ordering::Relaxed);
    }

    pub fn set_brightness(&self, level: u8) {
        self.brightness.store(level, Ordering::Relaxed);
    }

    /// Combine these counters with the timer's own state into one
    /// reportable snapshot.
    pub fn snapshot(&self, timer: &RevolutionTimer) -> DiagnosticsSnapshot {
        let state = timer.snapshot();
        let outliers = timer.outlier_counters();
        let (render_avg_us, output_avg_us) = timer.stage_averages();
        DiagnosticsSnapshot {
            rev_count: state.rev_count,
            outliers,
            frames: FrameCounters {
                rendered: self.rendered.load(Ordering::Relaxed),
                skipped: self.skipped.load(Ordering::Relaxed),
                not_rotating: self.not_rotating.load(Ordering::Relaxed),
                buffer_timeout: self.buffer_timeout.load(Ordering::Relaxed),
                commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
            },
            active_effect: self.active_effect.load(Ordering::Relaxed),
            brightness: self.brightness.load(Ordering::Relaxed),
            render_avg_us,
            output_avg_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pov_common::config::RotorConfig;

    #[test]
    fn snapshot_reflects_recorded_counters() {
        let diag = SharedDiagnostics::new();
        diag.record_rendered();
        diag.record_rendered();
        diag.record_skipped();
        diag.set_active_effect(3);
        diag.set_brightness(7);

        let timer = RevolutionTimer::new(RotorConfig::default());
        let snap = diag.snapshot(&timer);
        assert_eq!(snap.frames.rendered, 2);
        assert_eq!(snap.frames.skipped, 1);
        assert_eq!(snap.active_effect, 3);
        assert_eq!(snap.brightness, 7);
    }
}
