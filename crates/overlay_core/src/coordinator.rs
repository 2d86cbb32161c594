//! Composition root of the overlay.
//!
//! One task owns the coordinator and feeds it [`OverlayEvent`]s, channel
//! notifications and repeat ticks through a single `select!` loop, so gesture,
//! mode and held-key state are never mutated concurrently.

use std::{collections::HashMap, sync::Arc};

use shared::domain::{
    ButtonConfig, ControlId, ControlTint, EditMode, ScreenMetrics, PLACEHOLDER_KEY_NAME,
};
use storage::{ButtonConfigStore, StoreError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    channel::{ChannelEvent, KeyChannel},
    control_edit::ControlEdit,
    dispatcher::{KeyEventDispatcher, RepeatConfig, RepeatTick},
    edit_mode::EditModeController,
    gesture::{GestureConfig, GestureEffect, GestureInterpreter, GestureOutput, TouchEvent},
    host::{KeyCapture, OverlaySurface},
};

pub const NEW_CONTROL_X_PERCENT: f32 = 0.4;
pub const NEW_CONTROL_Y_PERCENT: f32 = 0.4;
pub const NEW_CONTROL_SIZE_PERCENT: f32 = 0.06;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRequest {
    Start,
    Stop,
    Show,
    Hide,
    Toggle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEvent {
    Touch { control: ControlId, event: TouchEvent },
    SetMode(EditMode),
    NewControlRequested,
    /// Answer to a key-capture request; ignored unless one is pending for `control`.
    KeyCaptured { control: ControlId, new_key: String },
    /// Replaces every field of the control at `index` in layout order.
    EditControl { index: usize, edit: ControlEdit },
    RemoveControl { index: usize },
    ScreenChanged(ScreenMetrics),
    Channel(ChannelEvent),
    Lifecycle(LifecycleRequest),
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub relay_address: String,
    pub repeat: RepeatConfig,
    pub gesture: GestureConfig,
    pub screen: ScreenMetrics,
}

pub struct OverlayCoordinator {
    modes: EditModeController,
    store: ButtonConfigStore,
    channel: Arc<dyn KeyChannel>,
    dispatcher: KeyEventDispatcher,
    ticks: mpsc::UnboundedReceiver<RepeatTick>,
    surface: Box<dyn OverlaySurface>,
    key_capture: Box<dyn KeyCapture>,
    gestures: HashMap<ControlId, GestureInterpreter>,
    gesture_config: GestureConfig,
    pending_key_capture: Option<ControlId>,
    layout: watch::Sender<Vec<ButtonConfig>>,
    screen: ScreenMetrics,
    relay_address: String,
    visible: bool,
    running: bool,
}

impl OverlayCoordinator {
    pub fn new(
        store: ButtonConfigStore,
        channel: Arc<dyn KeyChannel>,
        surface: Box<dyn OverlaySurface>,
        key_capture: Box<dyn KeyCapture>,
        options: CoordinatorOptions,
    ) -> Self {
        let (dispatcher, ticks) = KeyEventDispatcher::new(Arc::clone(&channel), options.repeat);
        let gestures = store
            .configs()
            .iter()
            .map(|config| (config.id, GestureInterpreter::new(options.gesture)))
            .collect();
        let (layout, _) = watch::channel(store.configs().to_vec());
        Self {
            modes: EditModeController::default(),
            store,
            channel,
            dispatcher,
            ticks,
            surface,
            key_capture,
            gestures,
            gesture_config: options.gesture,
            pending_key_capture: None,
            layout,
            screen: options.screen,
            relay_address: options.relay_address,
            visible: false,
            running: false,
        }
    }

    pub fn modes(&self) -> &EditModeController {
        &self.modes
    }

    pub fn store(&self) -> &ButtonConfigStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &KeyEventDispatcher {
        &self.dispatcher
    }

    /// Snapshot of the stored layout, republished after every handled event.
    pub fn layout(&self) -> watch::Receiver<Vec<ButtonConfig>> {
        self.layout.subscribe()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Drives the coordinator until a stop request arrives or every event
    /// source is gone, then shuts down.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<OverlayEvent>,
        mut channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> anyhow::Result<()> {
        info!("overlay coordinator running");
        let mut channel_open = true;
        loop {
            let keep_running = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => false,
                },
                event = channel_events.recv(), if channel_open => match event {
                    Some(event) => self.handle(OverlayEvent::Channel(event)),
                    None => {
                        channel_open = false;
                        true
                    }
                },
                Some(tick) = self.ticks.recv() => {
                    self.dispatcher.on_repeat_tick(tick);
                    true
                }
            };
            if !keep_running {
                break;
            }
        }
        self.shutdown().await?;
        info!("overlay coordinator stopped");
        Ok(())
    }

    /// Applies one event. Returns false once a stop request has been handled.
    pub fn handle(&mut self, event: OverlayEvent) -> bool {
        let keep_running = self.apply_event(event);
        self.publish_layout();
        keep_running
    }

    fn apply_event(&mut self, event: OverlayEvent) -> bool {
        match event {
            OverlayEvent::Touch { control, event } => self.on_touch(control, &event),
            OverlayEvent::SetMode(mode) => self.on_set_mode(mode),
            OverlayEvent::NewControlRequested => self.on_new_control(),
            OverlayEvent::KeyCaptured { control, new_key } => self.on_key_captured(control, &new_key),
            OverlayEvent::EditControl { index, edit } => self.on_edit_control(index, &edit),
            OverlayEvent::RemoveControl { index } => self.on_remove_control(index),
            OverlayEvent::ScreenChanged(screen) => self.on_screen_changed(screen),
            OverlayEvent::Channel(event) => self.on_channel_event(event),
            OverlayEvent::Lifecycle(request) => return self.on_lifecycle(request),
        }
        true
    }

    fn publish_layout(&self) {
        let configs = self.store.configs();
        self.layout.send_if_modified(|published| {
            if published.as_slice() == configs {
                return false;
            }
            *published = configs.to_vec();
            true
        });
    }

    /// Releases held keys, drops the connection, hides every control and
    /// waits until the layout is durable.
    pub async fn shutdown(&mut self) -> Result<(), StoreError> {
        self.stop();
        self.store.flush().await
    }

    fn on_touch(&mut self, control: ControlId, event: &TouchEvent) {
        if !self.visible {
            debug!(%control, "touch ignored while overlay hidden");
            return;
        }
        let Some(geometry) = self.store.get(control).map(|c| c.pixel_rect(self.screen)) else {
            debug!(%control, "touch on unknown control");
            return;
        };
        let mode = self.modes.current_mode();
        let gesture_config = self.gesture_config;
        let interpreter = self
            .gestures
            .entry(control)
            .or_insert_with(|| GestureInterpreter::new(gesture_config));

        match interpreter.handle(event, mode, geometry, self.screen) {
            GestureEffect::Ignored | GestureEffect::Consumed => {}
            GestureEffect::Preview(rect) => self.surface.move_control(control, rect),
            GestureEffect::Emit(output) => self.apply_gesture(control, output),
        }
    }

    fn apply_gesture(&mut self, control: ControlId, output: GestureOutput) {
        match output {
            GestureOutput::Press => {
                if let Some(key_name) = self.store.get(control).map(|c| c.key_name.clone()) {
                    self.dispatcher.on_press(control, &key_name);
                }
                self.surface.set_tint(control, ControlTint::PRESSED);
            }
            GestureOutput::Release => {
                self.dispatcher.on_release(control);
                self.surface
                    .set_tint(control, self.modes.current_mode().control_tint());
            }
            GestureOutput::MovedTo {
                x_percent,
                y_percent,
            } => self.update_control(control, |config| {
                config.set_position_percent(x_percent, y_percent)
            }),
            GestureOutput::ResizedTo {
                width_percent,
                height_percent,
            } => self.update_control(control, |config| {
                config.set_size_percent(width_percent, height_percent)
            }),
            GestureOutput::AssignKeyRequested => {
                if let Some(config) = self.store.get(control) {
                    self.pending_key_capture = Some(control);
                    self.key_capture.request_key(control, &config.label);
                }
            }
            GestureOutput::DeleteRequested => self.delete_control(control),
        }
    }

    fn update_control(&mut self, control: ControlId, edit: impl FnOnce(&mut ButtonConfig)) {
        let Some(index) = self.store.index_of(control) else {
            warn!(%control, "edit for a control that no longer exists");
            return;
        };
        let mut config = self.store.configs()[index].clone();
        edit(&mut config);
        let rect = config.pixel_rect(self.screen);
        if self.store.update_at(index, config) && self.visible {
            self.surface.move_control(control, rect);
        }
    }

    fn delete_control(&mut self, control: ControlId) {
        self.forget_control(control);
        if self.store.delete_by_id(control) {
            info!(%control, "control deleted");
            self.surface.remove_control(control);
        }
    }

    /// Drops every piece of per-control state held outside the store.
    fn forget_control(&mut self, control: ControlId) {
        self.dispatcher.on_release(control);
        self.gestures.remove(&control);
        if self.pending_key_capture == Some(control) {
            self.pending_key_capture = None;
        }
    }

    fn on_key_captured(&mut self, control: ControlId, new_key: &str) {
        if self.pending_key_capture != Some(control) {
            debug!(%control, "key capture without a pending request ignored");
            return;
        }
        let new_key = new_key.trim().to_uppercase();
        if new_key.is_empty() {
            debug!(%control, "empty key capture ignored");
            return;
        }
        self.pending_key_capture = None;
        let Some(index) = self.store.index_of(control) else {
            warn!(%control, "key captured for a control that no longer exists");
            return;
        };
        let mut config = self.store.configs()[index].clone();
        config.assign_key(new_key.as_str());
        info!(%control, key = %new_key, "key assigned");
        if self.store.update_at(index, config.clone()) && self.visible {
            self.place(&config);
        }
    }

    fn on_edit_control(&mut self, index: usize, edit: &ControlEdit) {
        if let Err(err) = edit.validate() {
            warn!(index, %err, "control edit rejected");
            return;
        }
        let Some(mut config) = self.store.configs().get(index).cloned() else {
            warn!(index, "edit for a position outside the layout");
            return;
        };
        // a held key must be released under its old name
        self.dispatcher.on_release(config.id);
        if let Some(interpreter) = self.gestures.get_mut(&config.id) {
            interpreter.reset();
        }
        edit.apply(&mut config);
        if self.store.update_at(index, config.clone()) {
            info!(control = %config.id, index, label = %config.label, "control edited");
            if self.visible {
                self.place(&config);
            }
        }
    }

    fn on_remove_control(&mut self, index: usize) {
        let Some(control) = self.store.configs().get(index).map(|config| config.id) else {
            warn!(index, "remove for a position outside the layout");
            return;
        };
        self.forget_control(control);
        if self.store.delete_at(index) {
            info!(%control, index, "control removed");
            self.surface.remove_control(control);
        }
    }

    fn on_new_control(&mut self) {
        if self.modes.current_mode() != EditMode::AddMove {
            debug!("new control requested outside add/move mode");
            return;
        }
        let config = ButtonConfig::new(
            self.next_label(),
            PLACEHOLDER_KEY_NAME,
            NEW_CONTROL_X_PERCENT,
            NEW_CONTROL_Y_PERCENT,
            NEW_CONTROL_SIZE_PERCENT,
            NEW_CONTROL_SIZE_PERCENT,
        );
        info!(control = %config.id, label = %config.label, "control added");
        self.gestures
            .insert(config.id, GestureInterpreter::new(self.gesture_config));
        self.store.add(config.clone());
        if self.visible {
            self.place(&config);
        }
    }

    fn next_label(&self) -> String {
        let configs = self.store.configs();
        (configs.len() + 1..)
            .map(|n| format!("Button {n}"))
            .find(|label| configs.iter().all(|config| &config.label != label))
            .unwrap_or_default()
    }

    fn on_set_mode(&mut self, mode: EditMode) {
        if self.modes.set_mode(mode) == mode || !self.visible {
            return;
        }
        for config in self.store.configs() {
            let pressed = self
                .gestures
                .get(&config.id)
                .is_some_and(GestureInterpreter::is_pressed);
            let tint = if pressed {
                ControlTint::PRESSED
            } else {
                mode.control_tint()
            };
            self.surface.set_tint(config.id, tint);
        }
        self.surface
            .set_add_affordance_visible(mode == EditMode::AddMove);
    }

    fn on_screen_changed(&mut self, screen: ScreenMetrics) {
        if screen == self.screen {
            return;
        }
        info!(
            width = screen.width_px(),
            height = screen.height_px(),
            "screen metrics changed"
        );
        self.screen = screen;
        // In-flight drags hold pixel geometry from the old screen; drop them.
        for interpreter in self.gestures.values_mut() {
            if !interpreter.is_idle() && !interpreter.is_pressed() {
                interpreter.reset();
            }
        }
        if !self.visible {
            return;
        }
        for config in self.store.configs() {
            self.surface
                .move_control(config.id, config.pixel_rect(self.screen));
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => info!("key channel connected"),
            ChannelEvent::Disconnected(reason) => {
                warn!(%reason, "key channel disconnected");
                self.dispatcher.on_disconnected();
            }
            ChannelEvent::Error(reason) => {
                warn!(%reason, "key channel error");
                if !self.channel.is_connected() {
                    self.dispatcher.on_disconnected();
                }
            }
        }
    }

    fn on_lifecycle(&mut self, request: LifecycleRequest) -> bool {
        match request {
            LifecycleRequest::Start => self.start(),
            LifecycleRequest::Stop => {
                self.stop();
                return false;
            }
            LifecycleRequest::Show => self.show(),
            LifecycleRequest::Hide => self.hide(),
            LifecycleRequest::Toggle if self.visible => self.hide(),
            LifecycleRequest::Toggle => self.show(),
        }
        true
    }

    fn start(&mut self) {
        if !self.running {
            info!(relay = %self.relay_address, "starting overlay");
            self.running = true;
        }
        if !self.channel.is_connected() {
            self.channel.connect(&self.relay_address);
        }
        self.show();
    }

    fn stop(&mut self) {
        self.hide();
        if self.running {
            info!("stopping overlay");
            self.running = false;
            self.channel.disconnect();
        }
    }

    fn show(&mut self) {
        if self.visible {
            return;
        }
        self.visible = true;
        self.surface.set_overlay_visible(true);
        for config in self.store.configs() {
            self.surface.place_control(
                config.id,
                &config.label,
                config.pixel_rect(self.screen),
                self.modes.current_mode().control_tint(),
            );
        }
        self.surface
            .set_add_affordance_visible(self.modes.current_mode() == EditMode::AddMove);
    }

    fn hide(&mut self) {
        if !self.visible {
            return;
        }
        self.dispatcher.release_all();
        for interpreter in self.gestures.values_mut() {
            interpreter.reset();
        }
        for config in self.store.configs() {
            self.surface.remove_control(config.id);
        }
        self.surface.set_add_affordance_visible(false);
        self.surface.set_overlay_visible(false);
        self.visible = false;
    }

    fn place(&mut self, config: &ButtonConfig) {
        self.surface.place_control(
            config.id,
            &config.label,
            config.pixel_rect(self.screen),
            self.modes.current_mode().control_tint(),
        );
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
