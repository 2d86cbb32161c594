//! Collaborators supplied by whatever process hosts the overlay.

use shared::domain::{ControlId, ControlTint, PixelRect};

/// Render side of the overlay. The coordinator only ever pushes geometry and
/// tint; touches come back in as `OverlayEvent::Touch`.
pub trait OverlaySurface: Send {
    fn place_control(&mut self, id: ControlId, label: &str, rect: PixelRect, tint: ControlTint);
    fn move_control(&mut self, id: ControlId, rect: PixelRect);
    fn remove_control(&mut self, id: ControlId);
    fn set_tint(&mut self, id: ControlId, tint: ControlTint);
    fn set_add_affordance_visible(&mut self, visible: bool);
    fn set_overlay_visible(&mut self, visible: bool);
}

/// Asks the user for a new key name. The answer is delivered asynchronously
/// as `OverlayEvent::KeyCaptured` for the same control.
pub trait KeyCapture: Send {
    fn request_key(&mut self, control: ControlId, current_label: &str);
}
