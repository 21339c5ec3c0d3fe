//! The per-frame pixel buffer an [`crate::effect::Effect`] paints into
//! (spec §3 "RenderContext", §4.3).
//!
//! Three physical arms carry a different LED count: arm 0 has one extra
//! "hub" LED nearest the rotation axis that the other two arms lack. Each
//! arm also sits at its own instantaneous angle within a slot — the three
//! are phase-offset on the disc, so a 40-entry virtual view addresses
//! every individual `(row, arm)` pixel rather than broadcasting one color
//! across all three arms.

use pov_common::time::{Duration, Instant};

/// LEDs on the outer arm (includes the hub-extra LED at index 0).
pub const ARM0_LEN: usize = 14;
/// LEDs on each of the other two arms.
pub const ARM_LEN: usize = 13;
/// Virtual pixel count: 1 hub-extra entry + 13 radial rows of 3 pixels,
/// one per arm (spec §3 "indices 1..39 form 13 radial rows of 3 pixels").
pub const VIRTUAL_LEN: usize = 1 + ARM_LEN * 3;

static_assertions::const_assert_eq!(VIRTUAL_LEN, 40);
static_assertions::const_assert_eq!(ARM0_LEN, 1 + ARM_LEN);

pub type Rgb = (u8, u8, u8);

pub const BLACK: Rgb = (0, 0, 0);

/// Pure data: the frame an effect renders and the pipeline later copies to
/// the physical LED strip (spec §4.3 "RenderContext is pure data, never
/// touches the LED driver directly").
#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    arm0: [Rgb; ARM0_LEN],
    arm1: [Rgb; ARM_LEN],
    arm2: [Rgb; ARM_LEN],
    arm0_angle_units: u16,
    arm1_angle_units: u16,
    arm2_angle_units: u16,
    /// 0..255 rotor speed, derived from `revolution_period_us` against the
    /// configured min/max period bounds and clamped (spec §4.5).
    spin_speed: u8,
    frame_number: u64,
    frame_t_us: Instant,
    frame_delta_us: Duration,
    revolution_period_us: Duration,
    slot_width_units: u16,
}

impl RenderContext {
    pub fn new() -> Self {
        Self {
            arm0: [BLACK; ARM0_LEN],
            arm1: [BLACK; ARM_LEN],
            arm2: [BLACK; ARM_LEN],
            arm0_angle_units: 0,
            arm1_angle_units: 0,
            arm2_angle_units: 0,
            spin_speed: 0,
            frame_number: 0,
            frame_t_us: Instant::ZERO,
            frame_delta_us: Duration::ZERO,
            revolution_period_us: Duration::ZERO,
            slot_width_units: 0,
        }
    }

    pub fn clear(&mut self) {
        self.arm0 = [BLACK; ARM0_LEN];
        self.arm1 = [BLACK; ARM_LEN];
        self.arm2 = [BLACK; ARM_LEN];
    }

    pub fn arm0(&self) -> &[Rgb; ARM0_LEN] {
        &self.arm0
    }

    pub fn arm1(&self) -> &[Rgb; ARM_LEN] {
        &self.arm1
    }

    pub fn arm2(&self) -> &[Rgb; ARM_LEN] {
        &self.arm2
    }

    pub fn arm0_angle_units(&self) -> u16 {
        self.arm0_angle_units
    }

    pub fn arm1_angle_units(&self) -> u16 {
        self.arm1_angle_units
    }

    pub fn arm2_angle_units(&self) -> u16 {
        self.arm2_angle_units
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn frame_t_us(&self) -> Instant {
        self.frame_t_us
    }

    pub fn frame_delta_us(&self) -> Duration {
        self.frame_delta_us
    }

    pub fn revolution_period_us(&self) -> Duration {
        self.revolution_period_us
    }

    pub fn slot_width_units(&self) -> u16 {
        self.slot_width_units
    }

    pub fn spin_speed(&self) -> u8 {
        self.spin_speed
    }

    pub fn set_spin_speed(&mut self, speed: u8) {
        self.spin_speed = speed;
    }

    /// Populate the per-frame metadata the render worker computes once per
    /// slot, and clear the pixel arrays for the new frame (spec §4.3 step
    /// 5: `frame_number`, `frame_t_us`, `revolution_period_us`,
    /// `slot_width_units`, and each arm's phase-shifted `angle_units`).
    #[allow(clippy::too_many_arguments)]
    pub fn begin_frame(
        &mut self,
        frame_number: u64,
        frame_t_us: Instant,
        frame_delta_us: Duration,
        revolution_period_us: Duration,
        slot_width_units: u16,
        arm0_angle_units: u16,
        arm1_angle_units: u16,
        arm2_angle_units: u16,
    ) {
        self.clear();
        self.frame_number = frame_number;
        self.frame_t_us = frame_t_us;
        self.frame_delta_us = frame_delta_us;
        self.revolution_period_us = revolution_period_us;
        self.slot_width_units = slot_width_units;
        self.arm0_angle_units = arm0_angle_units;
        self.arm1_angle_units = arm1_angle_units;
        self.arm2_angle_units = arm2_angle_units;
    }

    /// Write one of the 40 virtual pixels (spec §4.5 "`virt(v)`"). Index 0
    /// is arm 0's hub-extra LED; indices 1..39 address radial row
    /// `(v-1)/3 + 1`, arm `(v-1)%3`, independently per arm.
    pub fn set_virtual(&mut self, v: usize, rgb: Rgb) {
        let (arm, index) = virtual_location(v);
        match arm {
            0 => self.arm0[index] = rgb,
            1 => self.arm1[index] = rgb,
            _ => self.arm2[index] = rgb,
        }
    }

    /// Read back a virtual pixel previously written through [`Self::set_virtual`].
    pub fn virt(&self, v: usize) -> Rgb {
        let (arm, index) = virtual_location(v);
        match arm {
            0 => self.arm0[index],
            1 => self.arm1[index],
            _ => self.arm2[index],
        }
    }

    /// Paint every virtual pixel from a closure `f(v) -> Rgb`.
    pub fn fill_virtual<F: FnMut(usize) -> Rgb>(&mut self, mut f: F) {
        for v in 0..VIRTUAL_LEN {
            let rgb = f(v);
            self.set_virtual(v, rgb);
        }
    }

    /// Paint a radial gradient between `inner` (row 0) and `outer` (the
    /// outermost row), linearly interpolated per channel and shared by all
    /// three arms at a given row.
    pub fn fill_virtual_gradient(&mut self, inner: Rgb, outer: Rgb) {
        let last_row = ARM_LEN as f32;
        self.fill_virtual(|v| {
            let row = if v == 0 { 0 } else { (v - 1) / 3 + 1 };
            let t = row as f32 / last_row;
            lerp_rgb(inner, outer, t)
        });
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a virtual pixel index to `(arm_index, pixel_index_within_arm)`.
fn virtual_location(v: usize) -> (usize, usize) {
    assert!(v < VIRTUAL_LEN, "virtual index {v} out of range");
    if v == 0 {
        return (0, 0);
    }
    let row = (v - 1) / 3 + 1;
    let arm = (v - 1) % 3;
    let index = if arm == 0 { row } else { row - 1 };
    (arm, index)
}

fn lerp_channel(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round().clamp(0.0, 255.0) as u8
}

fn lerp_rgb(a: Rgb, b: Rgb, t: f32) -> Rgb {
    (lerp_channel(a.0, b.0, t), lerp_channel(a.1, b.1, t), lerp_channel(a.2, b.2, t))
}

/// 0..=10 discrete brightness level to an 8-bit scalar via a gamma-2.2
/// curve (spec §4.4 "Brightness mapping").
pub fn gamma_scalar(level: u8) -> u8 {
    let level = level.min(10) as f32 / 10.0;
    (level.powf(2.2) * 255.0).round() as u8
}

/// Scale a color by a gamma-corrected brightness level.
pub fn apply_brightness(rgb: Rgb, level: u8) -> Rgb {
    let scalar = gamma_scalar(level) as u32;
    let scale = |c: u8| ((c as u32 * scalar) / 255) as u8;
    (scale(rgb.0), scale(rgb.1), scale(rgb.2))
}

/// Maps a revolution period to a 0..255 spin speed, linearly interpolated
/// between the configured fast (`min_us`) and slow (`max_us`) anchors and
/// clamped at both ends (spec §4.5 "`spin_speed()` ... clamped to 0..255").
pub fn spin_speed_from_period(period: Duration, min_us: u64, max_us: u64) -> u8 {
    if max_us <= min_us {
        return 0;
    }
    let period_us = period.as_micros().clamp(min_us, max_us);
    let span = (max_us - min_us) as f64;
    let frac = (max_us - period_us) as f64 / span;
    (frac * 255.0).round().clamp(0.0, 255.0) as u8
}
