//! Demo effects exercising the full `Effect` surface: a hue-cycling spin
//! and a breathing pulse driven by the frame counter.

use pov_common::angle::FULL_CIRCLE;
use pov_common::Command;
use pov_core::render_context::RenderContext;
use pov_core::Effect;

/// A rainbow that sweeps around the disc once per revolution; the palette
/// offset advances each slot so the pattern itself appears to counter-spin.
pub struct RainbowSpin {
    offset: u16,
}

impl RainbowSpin {
    pub fn new() -> Self {
        Self { offset: 0 }
    }
}

impl Effect for RainbowSpin {
    fn name(&self) -> &str {
        "rainbow-spin"
    }

    fn render(&mut self, ctx: &mut RenderContext) {
        let angle = ctx.arm1_angle_units();
        let offset = self.offset;
        ctx.fill_virtual(|v| {
            let hue = (angle as u32 + offset as u32 + v as u32 * 80) % FULL_CIRCLE as u32;
            hue_to_rgb(hue)
        });
        self.offset = self.offset.wrapping_add(4) % FULL_CIRCLE;
    }

    fn begin(&mut self) {
        self.offset = 0;
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::ParamUp => self.offset = self.offset.wrapping_add(200) % FULL_CIRCLE,
            Command::ParamDown => self.offset = self.offset.wrapping_sub(200) % FULL_CIRCLE,
            _ => {}
        }
    }
}

/// A solid color whose brightness breathes in and out across ~40 frames,
/// independent of rotor speed.
pub struct Pulse {
    color: (u8, u8, u8),
}

impl Pulse {
    pub fn new() -> Self {
        Self { color: (255, 60, 0) }
    }
}

impl Effect for Pulse {
    fn name(&self) -> &str {
        "pulse"
    }

    fn render(&mut self, ctx: &mut RenderContext) {
        const PERIOD: u32 = 40;
        let t = (ctx.frame_number() % PERIOD as u64) as u32;
        let triangle = if t < PERIOD / 2 { t } else { PERIOD - t };
        let level = (triangle * 255 / (PERIOD / 2)) as u8;
        let (r, g, b) = self.color;
        let scale = |c: u8| ((c as u32 * level as u32) / 255) as u8;
        ctx.fill_virtual(|_| (scale(r), scale(g), scale(b)));
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::ParamUp => self.color = (0, 60, 255),
            Command::ParamDown => self.color = (255, 60, 0),
            _ => {}
        }
    }
}

fn hue_to_rgb(hue_tenths: u32) -> (u8, u8, u8) {
    let hue = (hue_tenths % FULL_CIRCLE as u32) as f32 / FULL_CIRCLE as f32 * 360.0;
    let c = 255.0;
    let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
    let (r, g, b) = match hue as u32 {
        0..=59 => (c, x, 0.0),
        60..=119 => (x, c, 0.0),
        120..=179 => (0.0, c, x),
        180..=239 => (0.0, x, c),
        240..=299 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    (r as u8, g as u8, b as u8)
}
