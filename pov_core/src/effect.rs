//! Polymorphic effect dispatch (spec §4.4 "Effect").
//!
//! Effects are trait objects so the render worker can swap the active
//! effect without knowing its concrete type, mirroring the state-machine
//! style used for mode handling elsewhere in the stack.

use pov_common::time::{Duration, Instant};
use pov_common::Command;

use crate::render_context::RenderContext;

/// One visual program. `render` runs once per scheduled slot on the render
/// worker thread only — an effect never touches the pipeline's
/// synchronization primitives directly (spec §4.4 "Effect boundary").
///
/// Capability set per spec §3: `{begin, end, render, on_revolution,
/// on_command, on_power, requires_full_brightness}`.
pub trait Effect: Send {
    /// Human-readable name, shown by stats overlays.
    fn name(&self) -> &str;

    /// Paint one slot's worth of pixels into `ctx`. Per-arm angle, frame
    /// number, and timing metadata are read from `ctx` itself (spec §3
    /// "render(ctx)") — `RenderContext` carries the full frame state so the
    /// signature doesn't grow every time a new metadata field is added.
    fn render(&mut self, ctx: &mut RenderContext);

    /// Called when the effect becomes active; default does nothing.
    fn begin(&mut self) {}

    /// Called when another effect is about to take over; default does
    /// nothing. An effect must not block here (spec §4.4 "Power(false)
    /// suppresses output without calling `end()`" — i.e. `end` is reserved
    /// for genuine effect switches, not power-off).
    fn end(&mut self) {}

    /// Called once per completed revolution with the just-measured period,
    /// the pulse timestamp, and the revolution counter (spec §4.4
    /// "on_revolution — called from the timer's pulse path, forwards to
    /// the current effect"). Default is a no-op for effects that don't
    /// care about rotor speed.
    fn on_revolution(&mut self, period: Duration, t: Instant, rev_count: u64) {
        let _ = (period, t, rev_count);
    }

    /// Forwarded button events the CORE doesn't interpret itself: `ModeNext`,
    /// `ModePrev`, `ParamUp`, `ParamDown`, `Enter` (spec §6 "Forward to
    /// current effect"). Default is a no-op.
    fn on_command(&mut self, command: Command) {
        let _ = command;
    }

    /// Notifies the active effect of a display power change. Default is a
    /// no-op.
    fn on_power(&mut self, on: bool) {
        let _ = on;
    }

    /// When `true`, `EffectDispatcher::brightness()` returns 10 regardless
    /// of the stored level (spec §4.4, P7) — e.g. a calibration or text
    /// effect that must always render at full brightness to be legible.
    fn requires_full_brightness(&self) -> bool {
        false
    }
}

/// Registers effects by a stable 1-based index (spec §4.4: index 0 is
/// reserved — "off"/no active effect) and swaps the active one on command.
pub struct EffectRegistry {
    effects: Vec<Box<dyn Effect>>,
    active: u8,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self { effects: Vec::new(), active: 0 }
    }

    /// Register an effect, returning its 1-based index.
    pub fn register(&mut self, effect: Box<dyn Effect>) -> u8 {
        self.effects.push(effect);
        self.effects.len() as u8
    }

    pub fn active_index(&self) -> u8 {
        self.active
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active_effect().map(|e| e.name())
    }

    /// spec §4.4 "`brightness()` ... returns 10 if the current effect
    /// reports `requires_full_brightness()`".
    pub fn active_requires_full_brightness(&self) -> bool {
        self.active_effect().map(|e| e.requires_full_brightness()).unwrap_or(false)
    }

    fn active_effect(&self) -> Option<&Box<dyn Effect>> {
        if self.active == 0 {
            return None;
        }
        self.effects.get(self.active as usize - 1)
    }

    /// Switch the active effect by 1-based index, calling `end`/`begin` on
    /// the outgoing/incoming effects. Out-of-range indices are ignored
    /// (spec §4.4 "SetEffect with an unknown index is a no-op").
    pub fn set_active(&mut self, index: u8) {
        if index != 0 && index as usize > self.effects.len() {
            return;
        }
        if index == self.active {
            return;
        }
        if let Some(current) = self.active_effect_mut() {
            current.end();
        }
        self.active = index;
        if let Some(current) = self.active_effect_mut() {
            current.begin();
        }
    }

    fn active_effect_mut(&mut self) -> Option<&mut Box<dyn Effect>> {
        if self.active == 0 {
            return None;
        }
        self.effects.get_mut(self.active as usize - 1)
    }

    /// Render the active effect into `ctx`, if any is active.
    pub fn render_active(&mut self, ctx: &mut RenderContext) {
        if let Some(effect) = self.active_effect_mut() {
            effect.render(ctx);
        }
    }

    /// Forward a button event to the active effect (spec §6 "ModeNext/Prev,
    /// ParamUp/Down, Enter -> Forward to current effect") — the registry
    /// itself never reinterprets these as navigation.
    pub fn forward_command(&mut self, command: Command) {
        if let Some(effect) = self.active_effect_mut() {
            effect.on_command(command);
        }
    }

    /// Forward a display power change to the active effect.
    pub fn forward_power(&mut self, on: bool) {
        if let Some(effect) = self.active_effect_mut() {
            effect.on_power(on);
        }
    }

    /// Forward a completed revolution to the active effect (spec §4.4
    /// "on_revolution").
    pub fn forward_revolution(&mut self, period: Duration, t: Instant, rev_count: u64) {
        if let Some(effect) = self.active_effect_mut() {
            effect.on_revolution(period, t, rev_count);
        }
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
