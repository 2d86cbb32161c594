//! Turns press/release of a control into outbound key events with auto-repeat.
//!
//! Repeat timers never touch the channel themselves. Each timer only posts a
//! [`RepeatTick`] back onto the owner's event queue, and the tick is honoured
//! only if it still matches the generation of the key currently held by that
//! control. Release, disconnect and re-press therefore cancel synchronously:
//! a tick already in flight is recognised as stale and dropped.

use std::{collections::HashMap, sync::Arc, time::Duration};

use shared::{domain::ControlId, protocol::KeyEventKind};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::channel::KeyChannel;

pub const DEFAULT_REPEAT_INITIAL_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatConfig {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Default for RepeatConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_REPEAT_INITIAL_DELAY,
            interval: DEFAULT_REPEAT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatTick {
    pub control: ControlId,
    pub generation: u64,
}

struct HeldKey {
    key_name: String,
    generation: u64,
    repeater: JoinHandle<()>,
}

pub struct KeyEventDispatcher {
    channel: Arc<dyn KeyChannel>,
    repeat: RepeatConfig,
    held: HashMap<ControlId, HeldKey>,
    next_generation: u64,
    ticks: mpsc::UnboundedSender<RepeatTick>,
}

impl KeyEventDispatcher {
    /// Returns the dispatcher together with the queue its repeat timers post to.
    /// The owner must feed every received tick back through [`Self::on_repeat_tick`].
    pub fn new(
        channel: Arc<dyn KeyChannel>,
        repeat: RepeatConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RepeatTick>) {
        let (ticks, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            channel,
            repeat,
            held: HashMap::new(),
            next_generation: 0,
            ticks,
        };
        (dispatcher, rx)
    }

    pub fn is_held(&self, control: ControlId) -> bool {
        self.held.contains_key(&control)
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Sends DOWN and arms the repeat timer. Returns false if the key was
    /// already held by this control or the channel dropped the event.
    pub fn on_press(&mut self, control: ControlId, key_name: &str) -> bool {
        if self.held.contains_key(&control) {
            debug!(%control, key = key_name, "press ignored; key already held");
            return false;
        }
        if !self.channel.is_connected() {
            debug!(%control, key = key_name, "press dropped; channel disconnected");
            return false;
        }
        if !self.channel.send(KeyEventKind::KeyDown, key_name) {
            return false;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let repeater = self.spawn_repeater(control, generation);
        self.held.insert(
            control,
            HeldKey {
                key_name: key_name.to_string(),
                generation,
                repeater,
            },
        );
        true
    }

    /// Cancels the repeat timer and sends UP if the control was held. Safe to
    /// call for controls that were never pressed.
    pub fn on_release(&mut self, control: ControlId) -> bool {
        let Some(held) = self.held.remove(&control) else {
            return false;
        };
        held.repeater.abort();
        self.channel.is_connected() && self.channel.send(KeyEventKind::KeyUp, &held.key_name)
    }

    /// Re-sends DOWN for a still-held key. Stale ticks are ignored; a tick that
    /// finds the channel gone ends the repeat instead.
    pub fn on_repeat_tick(&mut self, tick: RepeatTick) -> bool {
        let Some(held) = self.held.get(&tick.control) else {
            return false;
        };
        if held.generation != tick.generation {
            return false;
        }
        if !self.channel.is_connected() {
            if let Some(held) = self.held.remove(&tick.control) {
                held.repeater.abort();
                debug!(control = %tick.control, key = %held.key_name, "repeat stopped; channel disconnected");
            }
            return false;
        }
        self.channel.send(KeyEventKind::KeyDown, &held.key_name)
    }

    /// Forgets every held key without sending UP; the peer has already lost
    /// its key state along with the connection.
    pub fn on_disconnected(&mut self) {
        if self.held.is_empty() {
            return;
        }
        info!(held = self.held.len(), "clearing held keys after disconnect");
        for (_, held) in self.held.drain() {
            held.repeater.abort();
        }
    }

    /// Releases every held key, sending UP for each while connected.
    pub fn release_all(&mut self) {
        let controls: Vec<ControlId> = self.held.keys().copied().collect();
        for control in controls {
            self.on_release(control);
        }
    }

    fn spawn_repeater(&self, control: ControlId, generation: u64) -> JoinHandle<()> {
        let ticks = self.ticks.clone();
        let RepeatConfig {
            initial_delay,
            interval,
        } = self.repeat;
        let interval = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            // The DOWN already sent covers the initial delay; repeats follow one
            // interval after it.
            let mut timer = time::interval_at(Instant::now() + initial_delay + interval, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                if ticks.send(RepeatTick { control, generation }).is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for KeyEventDispatcher {
    fn drop(&mut self) {
        for (_, held) in self.held.drain() {
            held.repeater.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
