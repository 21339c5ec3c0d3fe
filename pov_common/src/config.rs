//! TOML-backed configuration for the rotor core (SPEC_FULL §3 "Configuration").
//!
//! Mirrors the teacher's `ConfigLoader` discipline: parse, then validate
//! every bound before the config is allowed to reach the timer or pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error loading or validating a [`RotorConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Tunables for [`crate::angle`]/`pov_core` timer, scheduler, and pipeline
/// behavior. All timing fields are in microseconds unless named otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotorConfig {
    /// Revolutions of accepted pulses before `warmup_done` is set (spec §3).
    pub warmup_revolutions: u32,
    /// `Δ > rotation_timeout_us` declares `rotating = false` (spec §4.1).
    pub rotation_timeout_us: u64,
    /// Hard floor below which a pulse is rejected as `too_fast` (spec §4.1).
    pub min_reasonable_interval_us: u64,
    /// Reject as `too_slow` (missed pulse) above this ratio of `smoothed_interval`.
    pub max_ratio: f64,
    /// Reject as `ratio_low` below this ratio of `smoothed_interval`.
    pub min_ratio: f64,
    /// Multiplier applied to the pipeline's bottleneck stage time (spec §4.1).
    pub safety_margin: f64,
    /// Interval (µs) at/above which the rolling window uses its widest size (20).
    pub slow_speed_anchor_us: u64,
    /// Interval (µs) at/below which the rolling window shrinks to its narrowest size (2).
    pub fast_speed_anchor_us: u64,
    /// Angular offset of arm 0 from the hall reference (spec §4.3, `OUTER_PHASE`).
    pub outer_phase_units: u16,
    /// Angular offset of arm 2 from the hall reference (spec §4.3, `INSIDE_PHASE`).
    pub inside_phase_units: u16,
    /// Bound on the command queue (spec §4.4, §5 "bounded").
    pub command_queue_capacity: usize,
    /// Bounded wait for buffer acquisition (spec §5 "Cancellation & timeouts").
    pub buffer_acquire_timeout_us: u64,
    /// 1-based effect index active at startup (spec §6 "Persistent config").
    pub starting_effect: u8,
    /// Brightness level (0..=10) active at startup.
    pub starting_brightness: u8,
    /// Revolution period (µs) at/below which `spin_speed()` saturates at 255 — the fastest the rotor is expected to spin (spec §4.5).
    pub min_revolution_period_us: u64,
    /// Revolution period (µs) at/above which `spin_speed()` saturates at 0 — the slowest the rotor is expected to spin (spec §4.5).
    pub max_revolution_period_us: u64,
}

impl Default for RotorConfig {
    fn default() -> Self {
        Self {
            warmup_revolutions: 20,
            rotation_timeout_us: 3_000_000,
            min_reasonable_interval_us: 2_000,
            max_ratio: 2.5,
            min_ratio: 0.4,
            safety_margin: 1.5,
            slow_speed_anchor_us: 100_000,
            fast_speed_anchor_us: 10_000,
            outer_phase_units: 2400,
            inside_phase_units: 1200,
            command_queue_capacity: 16,
            buffer_acquire_timeout_us: 100_000,
            starting_effect: 1,
            starting_brightness: 5,
            min_revolution_period_us: 10_000,
            max_revolution_period_us: 100_000,
        }
    }
}

impl RotorConfig {
    /// Validate every bound the timer/scheduler/pipeline rely on
    /// (invariants I1, I2, I5 and the `rotation_timeout_us` range given in
    /// spec §4.1 "2-10 s").
    pub fn validate(&self) -> Result<(), ConfigError> {
        use crate::angle::FULL_CIRCLE;

        let fail = |msg: String| Err(ConfigError::Validation(msg));

        if self.warmup_revolutions == 0 {
            return fail("warmup_revolutions must be > 0".into());
        }
        if !(2_000_000..=10_000_000).contains(&self.rotation_timeout_us) {
            return fail(format!(
                "rotation_timeout_us {} outside 2,000,000..=10,000,000",
                self.rotation_timeout_us
            ));
        }
        if self.min_reasonable_interval_us == 0 {
            return fail("min_reasonable_interval_us must be > 0".into());
        }
        if self.max_ratio <= 1.0 {
            return fail("max_ratio must be > 1.0".into());
        }
        if !(0.0..1.0).contains(&self.min_ratio) {
            return fail("min_ratio must be in 0.0..1.0".into());
        }
        if self.safety_margin <= 0.0 {
            return fail("safety_margin must be > 0.0".into());
        }
        if self.fast_speed_anchor_us == 0 || self.fast_speed_anchor_us >= self.slow_speed_anchor_us {
            return fail("fast_speed_anchor_us must be > 0 and < slow_speed_anchor_us".into());
        }
        if self.outer_phase_units >= FULL_CIRCLE || self.inside_phase_units >= FULL_CIRCLE {
            return fail("phase offsets must be in 0..FULL_CIRCLE".into());
        }
        if self.command_queue_capacity == 0 {
            return fail("command_queue_capacity must be > 0".into());
        }
        if self.starting_brightness > 10 {
            return fail("starting_brightness must be 0..=10".into());
        }
        if self.starting_effect == 0 {
            return fail("starting_effect is 1-based; 0 is invalid".into());
        }
        if self.min_revolution_period_us == 0 || self.min_revolution_period_us >= self.max_revolution_period_us {
            return fail("min_revolution_period_us must be > 0 and < max_revolution_period_us".into());
        }
        Ok(())
    }
}

/// Load and validate a [`RotorConfig`] from a TOML file.
pub fn load(path: &Path) -> Result<RotorConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: RotorConfig = toml::from_str(&text)?;
    config.validate()?;
    Ok(config)
}
