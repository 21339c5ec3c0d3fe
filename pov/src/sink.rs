//! A console [`LedSink`] that tallies frames instead of driving real
//! hardware, for running the demo harness without a rotor attached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pov_common::ports::LedSink;

#[derive(Default, Clone)]
pub struct ConsoleSink {
    pixels_this_frame: u32,
    frames: Arc<AtomicU64>,
}

impl ConsoleSink {
    pub fn frame_count(&self) -> Arc<AtomicU64> {
        self.frames.clone()
    }
}

impl LedSink for ConsoleSink {
    fn set(&mut self, physical_index: u16, rgb: (u8, u8, u8)) {
        debug_assert_ne!(physical_index, 0, "reserved hub index must never be written");
        self.pixels_this_frame += 1;
        let _ = rgb;
    }

    fn show(&mut self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.pixels_this_frame = 0;
    }
}
