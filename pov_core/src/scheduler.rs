//! Slot scheduler: turns the revolution timer's snapshot into successive
//! absolute wall-clock targets for each angular slot (spec §4.2).

use pov_common::angle::{AngleUnits, SlotWidth, FULL_CIRCLE};
use pov_common::time::{Duration, Instant};

use crate::timer::RevolutionState;

/// The maximum slot the scheduler will hand out before wrapping back to
/// slot 0 of the next revolution; kept in sync with [`FULL_CIRCLE`].
const MAX_SLOT_GAP_BEFORE_COMPENSATION_US: u64 = 10_000;

/// A single scheduled slot: the angle it covers and the absolute time it
/// should fire at (spec §4.2 "SlotTarget").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTarget {
    pub angle: AngleUnits,
    pub target_t: Instant,
}

/// Walks slot angles forward one slot width at a time, deriving each
/// slot's absolute fire time from the revolution timer's last pulse and
/// smoothed interval (spec §4.2). Cheap, stateless except for the current
/// angle cursor — recreated or `reset()` whenever rotation restarts.
pub struct SlotScheduler {
    current_angle: AngleUnits,
    last_emit_t: Option<Instant>,
}

impl SlotScheduler {
    pub fn new() -> Self {
        Self { current_angle: AngleUnits::ZERO, last_emit_t: None }
    }

    /// Reset the angle cursor to the top of the revolution, e.g. after a
    /// rotation-timeout or explicit restart.
    pub fn reset(&mut self) {
        self.current_angle = AngleUnits::ZERO;
        self.last_emit_t = None;
    }

    /// Compute the next [`SlotTarget`] from the current revolution state
    /// (spec §4.2 "next"). Returns `None` if the rotor isn't rotating yet
    /// (no pulse has seeded a reference time) or if the smoothed interval
    /// is still zero (a single pulse has been seen but no interval yet).
    pub fn next(&mut self, state: &RevolutionState, now: Instant) -> Option<SlotTarget> {
        if !state.rotating || state.smoothed_interval.as_micros() == 0 {
            return None;
        }

        let width = SlotWidth::from_units(state.slot_width_units).unwrap_or(SlotWidth::DEFAULT);

        let angle = self.current_angle;
        let mut target_t = self.raw_target(state, angle);

        // Wrap compensation (spec §4.2): if we've fallen far enough behind
        // the wall clock that the naive target already elapsed by more
        // than the tolerance, slide the target forward by whole revolutions
        // until it's ahead of `now` again, rather than firing a storm of
        // already-late slots.
        if let Some(gap) = target_t.as_micros().checked_sub(now.as_micros()) {
            let _ = gap; // target is still ahead; nothing to compensate.
        } else {
            let behind = now.saturating_since(target_t);
            if behind.as_micros() > MAX_SLOT_GAP_BEFORE_COMPENSATION_US {
                let revolution = state.smoothed_interval.as_micros();
                if revolution > 0 {
                    let revs_behind = behind.as_micros() / revolution + 1;
                    target_t = target_t + Duration::from_micros(revs_behind * revolution);
                }
            }
        }

        self.current_angle = angle.add_units(width.units());
        self.last_emit_t = Some(target_t);

        Some(SlotTarget { angle, target_t })
    }

    /// `target_t = last_pulse_t + angle * interval / FULL_CIRCLE` (spec
    /// §4.2), using saturating fixed-point math so slot width choices
    /// never introduce drift. Uses `last_raw_interval` rather than the
    /// smoothed average — spec §3 "for angle math, avoids smoothing lag" —
    /// falling back to `smoothed_interval` only while no raw interval has
    /// been observed yet.
    fn raw_target(&self, state: &RevolutionState, angle: AngleUnits) -> Instant {
        let interval = if state.last_raw_interval.as_micros() == 0 {
            state.smoothed_interval
        } else {
            state.last_raw_interval
        };
        let offset = interval.saturating_mul_div(angle.value() as u32, FULL_CIRCLE as u32);
        state.last_pulse_t + offset
    }
}

impl Default for SlotScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(last_pulse_us: u64, interval_us: u64, width: u16) -> RevolutionState {
        RevolutionState {
            last_pulse_t: Instant::from_micros(last_pulse_us),
            last_raw_interval: Duration::from_micros(interval_us),
            smoothed_interval: Duration::from_micros(interval_us),
            rev_count: 25,
            rotating: true,
            warmup_done: true,
            slot_width_units: width,
        }
    }

    // S4: no wrap compensation needed, target ahead of now.
    #[test]
    fn s4_plain_target_no_compensation() {
        let st = state(1_000_000, 20_000, 15);
        let mut sched = SlotScheduler::new();
        // Advance the cursor to angle 30 units (2 slots of width 15) by
        // calling next() twice, matching the spec's worked sequence.
        let first = sched.next(&st, Instant::from_micros(1_000_000)).unwrap();
        assert_eq!(first.angle, AngleUnits::ZERO);
        let second = sched.next(&st, Instant::from_micros(1_000_833)).unwrap();
        assert_eq!(second.angle, AngleUnits::new(15));
        assert_eq!(second.target_t, Instant::from_micros(1_016_833));
    }

    // S5a: gap of 8167us behind target -> below the 10000us threshold, no
    // compensation.
    #[test]
    fn s5a_small_gap_not_compensated() {
        let st = state(1_000_000, 20_000, 15);
        let mut sched = SlotScheduler::new();
        sched.next(&st, Instant::from_micros(1_000_000)).unwrap();
        let target = sched.raw_target(&st, AngleUnits::new(15));
        assert_eq!(target, Instant::from_micros(1_016_833));
        let result = sched.next(&st, Instant::from_micros(1_025_000)).unwrap();
        assert_eq!(result.target_t, Instant::from_micros(1_016_833));
    }

    // S5b: gap of 13167us behind target -> above threshold, compensated
    // forward by one revolution.
    #[test]
    fn s5b_large_gap_compensated_forward() {
        let st = state(1_000_000, 20_000, 15);
        let mut sched = SlotScheduler::new();
        sched.next(&st, Instant::from_micros(1_000_000)).unwrap(); // angle 0
        let result = sched.next(&st, Instant::from_micros(1_030_000)).unwrap();
        assert_eq!(result.angle, AngleUnits::new(15));
        assert_eq!(result.target_t, Instant::from_micros(1_036_833));
    }

    #[test]
    fn not_rotating_yields_no_slot() {
        let mut st = state(0, 0, 15);
        st.rotating = false;
        st.smoothed_interval = Duration::ZERO;
        let mut sched = SlotScheduler::new();
        assert!(sched.next(&st, Instant::from_micros(0)).is_none());
    }

    #[test]
    fn angle_cursor_wraps_with_slot_width() {
        let st = state(0, 3600, 200);
        let mut sched = SlotScheduler::new();
        let mut angles = Vec::new();
        for i in 0..20 {
            let target = sched.next(&st, Instant::from_micros(i as u64)).unwrap();
            angles.push(target.angle.value());
        }
        assert_eq!(angles[0], 0);
        assert_eq!(angles[18], 3600 - 200);
        assert_eq!(angles[19], 0); // wrapped back to start of next revolution
    }

    // During acceleration/deceleration last_raw_interval and
    // smoothed_interval diverge; target_t must track the raw interval, not
    // the lagging smoothed one, or the slot drifts off the physical angle.
    #[test]
    fn target_uses_raw_interval_not_smoothed_during_acceleration() {
        let mut st = state(1_000_000, 20_000, 15);
        st.last_raw_interval = Duration::from_micros(10_000); // disc just sped up
        st.smoothed_interval = Duration::from_micros(20_000); // average hasn't caught up
        let mut sched = SlotScheduler::new();
        let first = sched.next(&st, Instant::from_micros(1_000_000)).unwrap();
        assert_eq!(first.target_t, Instant::from_micros(1_000_000));
        let second = sched.next(&st, Instant::from_micros(1_000_833)).unwrap();
        // angle=15 units of 3600 at the raw 10_000us interval -> 41us offset,
        // not the 83us the smoothed interval would have given.
        assert_eq!(second.target_t, Instant::from_micros(1_000_041));
    }

    #[test]
    fn target_falls_back_to_smoothed_interval_when_raw_is_unset() {
        let mut st = state(1_000_000, 20_000, 15);
        st.last_raw_interval = Duration::ZERO;
        let mut sched = SlotScheduler::new();
        sched.next(&st, Instant::from_micros(1_000_000)).unwrap();
        let second = sched.next(&st, Instant::from_micros(1_000_833)).unwrap();
        assert_eq!(second.target_t, Instant::from_micros(1_016_833));
    }

    #[test]
    fn reset_returns_cursor_to_zero() {
        let st = state(0, 20_000, 15);
        let mut sched = SlotScheduler::new();
        sched.next(&st, Instant::from_micros(0)).unwrap();
        sched.next(&st, Instant::from_micros(1_000)).unwrap();
        sched.reset();
        let after = sched.next(&st, Instant::from_micros(0)).unwrap();
        assert_eq!(after.angle, AngleUnits::ZERO);
    }
}
