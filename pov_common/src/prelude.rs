//! Convenient re-exports: `use pov_common::prelude::*;`.

pub use crate::angle::{AngleUnits, SlotWidth, FULL_CIRCLE, VALID_SLOT_WIDTHS};
pub use crate::command::Command;
pub use crate::config::{ConfigError, RotorConfig};
pub use crate::diagnostics::{DiagnosticsSnapshot, FrameCounters, OutlierCounters};
pub use crate::ports::{Clock, CommandSource, HallSource, LedSink, StatsSink};
pub use crate::time::{Duration, Instant};
