use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use shared::{
    domain::{ControlId, ControlTint, PixelRect},
    protocol::KeyEventKind,
};

use crate::{
    channel::KeyChannel,
    host::{KeyCapture, OverlaySurface},
};

#[derive(Default)]
pub struct RecordingChannel {
    connected: AtomicBool,
    sent: Mutex<Vec<(KeyEventKind, String)>>,
    connects: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn connected() -> Arc<Self> {
        let channel = Self::default();
        channel.set_connected(true);
        Arc::new(channel)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(KeyEventKind, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, kind: KeyEventKind) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(sent, _)| *sent == kind)
            .count()
    }

    pub fn connect_calls(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }
}

impl KeyChannel for RecordingChannel {
    fn connect(&self, address: &str) {
        self.connects.lock().unwrap().push(address.to_string());
        self.set_connected(true);
    }

    fn disconnect(&self) {
        self.set_connected(false);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, kind: KeyEventKind, key_name: &str) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.sent.lock().unwrap().push((kind, key_name.to_string()));
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedControl {
    pub label: String,
    pub rect: PixelRect,
    pub tint: ControlTint,
}

#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub controls: HashMap<ControlId, PlacedControl>,
    pub removed: Vec<ControlId>,
    pub add_affordance_visible: bool,
    pub overlay_visible: bool,
}

#[derive(Clone, Default)]
pub struct RecordingSurface {
    log: Arc<Mutex<SurfaceLog>>,
}

impl RecordingSurface {
    pub fn control(&self, id: ControlId) -> Option<PlacedControl> {
        self.log.lock().unwrap().controls.get(&id).cloned()
    }

    pub fn control_count(&self) -> usize {
        self.log.lock().unwrap().controls.len()
    }

    pub fn removed(&self) -> Vec<ControlId> {
        self.log.lock().unwrap().removed.clone()
    }

    pub fn add_affordance_visible(&self) -> bool {
        self.log.lock().unwrap().add_affordance_visible
    }

    pub fn overlay_visible(&self) -> bool {
        self.log.lock().unwrap().overlay_visible
    }
}

impl OverlaySurface for RecordingSurface {
    fn place_control(&mut self, id: ControlId, label: &str, rect: PixelRect, tint: ControlTint) {
        self.log.lock().unwrap().controls.insert(
            id,
            PlacedControl {
                label: label.to_string(),
                rect,
                tint,
            },
        );
    }

    fn move_control(&mut self, id: ControlId, rect: PixelRect) {
        if let Some(control) = self.log.lock().unwrap().controls.get_mut(&id) {
            control.rect = rect;
        }
    }

    fn remove_control(&mut self, id: ControlId) {
        let mut log = self.log.lock().unwrap();
        log.controls.remove(&id);
        log.removed.push(id);
    }

    fn set_tint(&mut self, id: ControlId, tint: ControlTint) {
        if let Some(control) = self.log.lock().unwrap().controls.get_mut(&id) {
            control.tint = tint;
        }
    }

    fn set_add_affordance_visible(&mut self, visible: bool) {
        self.log.lock().unwrap().add_affordance_visible = visible;
    }

    fn set_overlay_visible(&mut self, visible: bool) {
        self.log.lock().unwrap().overlay_visible = visible;
    }
}

#[derive(Clone, Default)]
pub struct RecordingKeyCapture {
    requests: Arc<Mutex<Vec<(ControlId, String)>>>,
}

impl RecordingKeyCapture {
    pub fn requests(&self) -> Vec<(ControlId, String)> {
        self.requests.lock().unwrap().clone()
    }
}

impl KeyCapture for RecordingKeyCapture {
    fn request_key(&mut self, control: ControlId, current_label: &str) {
        self.requests
            .lock()
            .unwrap()
            .push((control, current_label.to_string()));
    }
}
