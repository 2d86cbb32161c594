use shared::domain::EditMode;
use tokio::sync::watch;
use tracing::info;

/// Owns the single system-wide edit mode and notifies observers of changes.
pub struct EditModeController {
    mode: watch::Sender<EditMode>,
}

impl EditModeController {
    pub fn new(initial: EditMode) -> Self {
        let (mode, _) = watch::channel(initial);
        Self { mode }
    }

    pub fn current_mode(&self) -> EditMode {
        *self.mode.borrow()
    }

    /// Replaces the mode unconditionally and returns the previous one.
    pub fn set_mode(&self, mode: EditMode) -> EditMode {
        let previous = self.mode.send_replace(mode);
        if previous != mode {
            info!(from = %previous, to = %mode, "edit mode changed");
        }
        previous
    }

    pub fn subscribe(&self) -> watch::Receiver<EditMode> {
        self.mode.subscribe()
    }
}

impl Default for EditModeController {
    fn default() -> Self {
        Self::new(EditMode::Normal)
    }
}

#[cfg(test)]
#[path = "tests/edit_mode_tests.rs"]
mod tests;
