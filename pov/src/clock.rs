//! A monotonic [`Clock`] backed by [`std::time::Instant`], the CORE's own
//! time domain never runs ahead of (spec §3 "Timestamp").

use std::time::Instant as StdInstant;

use pov_common::ports::Clock;
use pov_common::time::Instant;

pub struct SystemClock {
    epoch: StdInstant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { epoch: StdInstant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.epoch.elapsed().as_micros() as u64)
    }
}
