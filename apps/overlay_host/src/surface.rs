use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use overlay_core::{KeyCapture, OverlaySurface};
use shared::domain::{ControlId, ControlTint, PixelRect};
use tracing::info;

/// Last rendered geometry of every visible control, shared with the command
/// reader so typed screen coordinates can be mapped onto controls.
#[derive(Clone, Default)]
pub struct ControlDirectory {
    controls: Arc<Mutex<HashMap<ControlId, PixelRect>>>,
}

impl ControlDirectory {
    /// Finds a control by full id or by a unique id prefix.
    pub fn resolve(&self, needle: &str) -> Option<(ControlId, PixelRect)> {
        let needle = needle.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return None;
        }
        let controls = self.controls.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matches = controls
            .iter()
            .filter(|(id, _)| id.to_string().starts_with(&needle));
        let found = matches.next().map(|(id, rect)| (*id, *rect));
        if matches.next().is_some() {
            return None;
        }
        found
    }

    pub fn len(&self) -> usize {
        self.controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn set(&self, id: ControlId, rect: PixelRect) {
        self.controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, rect);
    }

    fn update(&self, id: ControlId, rect: PixelRect) {
        if let Some(current) = self
            .controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
        {
            *current = rect;
        }
    }

    fn remove(&self, id: ControlId) {
        self.controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Headless surface: every render call is logged and mirrored into the
/// [`ControlDirectory`].
pub struct LoggingSurface {
    directory: ControlDirectory,
}

impl LoggingSurface {
    pub fn new(directory: ControlDirectory) -> Self {
        Self { directory }
    }
}

impl OverlaySurface for LoggingSurface {
    fn place_control(&mut self, id: ControlId, label: &str, rect: PixelRect, tint: ControlTint) {
        info!(%id, label, x = rect.x, y = rect.y, w = rect.width, h = rect.height, opacity = tint.opacity, color = ?tint.color, "place control");
        self.directory.set(id, rect);
    }

    fn move_control(&mut self, id: ControlId, rect: PixelRect) {
        info!(%id, x = rect.x, y = rect.y, w = rect.width, h = rect.height, "move control");
        self.directory.update(id, rect);
    }

    fn remove_control(&mut self, id: ControlId) {
        info!(%id, "remove control");
        self.directory.remove(id);
    }

    fn set_tint(&mut self, id: ControlId, tint: ControlTint) {
        info!(%id, opacity = tint.opacity, color = ?tint.color, "tint control");
    }

    fn set_add_affordance_visible(&mut self, visible: bool) {
        info!(visible, "add button visibility");
    }

    fn set_overlay_visible(&mut self, visible: bool) {
        info!(visible, "overlay visibility");
    }
}

/// Prompts on stdout; the user answers with a `key` command.
pub struct PromptKeyCapture;

impl KeyCapture for PromptKeyCapture {
    fn request_key(&mut self, control: ControlId, current_label: &str) {
        info!(%control, current_label, "key capture requested");
        println!("assign a key to '{current_label}': key {control} <KEY_NAME>");
    }
}
