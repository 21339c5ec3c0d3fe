//! Command application: remote commands reach the render worker through a
//! bounded, non-blocking queue and are only ever applied on that thread
//! (spec §4.4 "commands are applied only by the render worker").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;

use pov_common::Command;

use crate::effect::EffectRegistry;

/// Mutable state a command can change that isn't effect-local (spec §4.4
/// "brightness, power, stats overlay").
#[derive(Debug, Clone, Copy)]
pub struct DispatcherState {
    pub brightness: u8,
    pub power_on: bool,
    pub stats_visible: bool,
}

impl DispatcherState {
    pub fn new(starting_brightness: u8) -> Self {
        Self { brightness: starting_brightness.min(10), power_on: true, stats_visible: false }
    }

    /// spec §4.4 "`brightness() -> 0..=10` — returns 10 if the current
    /// effect reports `requires_full_brightness()`, else the stored
    /// brightness" (P7).
    pub fn effective_brightness(&self, registry: &EffectRegistry) -> u8 {
        if registry.active_requires_full_brightness() {
            10
        } else {
            self.brightness
        }
    }
}

/// The producer half: cloned into every `CommandSource` adapter. Submission
/// never blocks (spec §4.4 "non-blocking producers") — a full queue drops
/// the command and counts it.
#[derive(Clone)]
pub struct CommandProducer {
    sender: SyncSender<Command>,
    dropped: Arc<AtomicU64>,
}

impl CommandProducer {
    /// Enqueue a command. Returns `true` if it was accepted.
    pub fn submit(&self, cmd: Command) -> bool {
        match self.sender.try_send(cmd) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// The consumer half: owned exclusively by the render worker.
pub struct CommandConsumer {
    receiver: Receiver<Command>,
}

impl CommandConsumer {
    /// Drain every pending command, applying each to `registry`/`state` in
    /// arrival order (spec §4.4 "commands apply in FIFO order, one pass
    /// per slot").
    pub fn apply_pending(&self, registry: &mut EffectRegistry, state: &mut DispatcherState) {
        while let Ok(cmd) = self.receiver.try_recv() {
            apply_one(cmd, registry, state);
        }
    }
}

fn apply_one(cmd: Command, registry: &mut EffectRegistry, state: &mut DispatcherState) {
    match cmd {
        Command::SetEffect(index) => registry.set_active(index),
        Command::BrightnessUp => state.brightness = (state.brightness + 1).min(10),
        Command::BrightnessDown => state.brightness = state.brightness.saturating_sub(1),
        Command::Power(on) => {
            state.power_on = on;
            registry.forward_power(on);
        }
        Command::StatsToggle => state.stats_visible = !state.stats_visible,
        // spec §6: ModeNext/Prev, ParamUp/Down, Enter forward to the
        // current effect as button events — the registry never
        // reinterprets them as effect navigation.
        Command::ModeNext | Command::ModePrev | Command::ParamUp | Command::ParamDown | Command::Enter => {
            registry.forward_command(cmd);
        }
    }
}

/// Build a bounded command channel (spec §4.4 "EffectDispatcher").
/// `capacity` comes from [`pov_common::config::RotorConfig::command_queue_capacity`].
pub fn channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let (tx, rx) = sync_channel(capacity.max(1));
    let producer = CommandProducer { sender: tx, dropped: Arc::new(AtomicU64::new(0)) };
    let consumer = CommandConsumer { receiver: rx };
    (producer, consumer)
}
