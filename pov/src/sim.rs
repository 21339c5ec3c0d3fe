//! A simulated hall sensor for running the rotor core without hardware.
//!
//! Emits pulses at a fixed simulated RPM with a small deterministic wobble
//! so the timer's outlier rejection and adaptive window have something
//! realistic to chew on, rather than a perfectly uniform signal no real
//! rotor ever produces.

use std::sync::Arc;

use pov_common::ports::{Clock, HallSource};
use pov_common::time::Instant;

pub struct SimulatedHall {
    clock: Arc<dyn Clock>,
    next_pulse_us: u64,
    interval_us: u64,
    tick: u64,
}

impl SimulatedHall {
    pub fn new(clock: Arc<dyn Clock>, rpm: f64) -> Self {
        let interval_us = (60_000_000.0 / rpm.max(1.0)) as u64;
        let start = clock.now().as_micros();
        Self { clock, next_pulse_us: start + interval_us, interval_us, tick: 0 }
    }
}

impl HallSource for SimulatedHall {
    fn poll(&mut self) -> Option<Instant> {
        let now = self.clock.now().as_micros();
        if now < self.next_pulse_us {
            return None;
        }
        let fired = self.next_pulse_us;
        self.tick += 1;
        // +/- 1.2% wobble on a 7-tick cycle; never drifts the mean interval.
        let wobble = ((self.tick % 7) as i64 - 3) * (self.interval_us as i64 / 250);
        let next_interval = (self.interval_us as i64 + wobble).max(1_000) as u64;
        self.next_pulse_us = fired + next_interval;
        Some(Instant::from_micros(fired))
    }
}
