use std::time::Duration;

use shared::protocol::{InputMode, PcCommand};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RelayOptions {
    pub(crate) key_press_release_delay: Duration,
    pub(crate) default_mode: InputMode,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) options: RelayOptions,
    /// Commands fanned out to every registered PC client.
    pub(crate) pc_commands: broadcast::Sender<PcCommand>,
}

impl AppState {
    pub(crate) fn new(options: RelayOptions) -> Self {
        let (pc_commands, _) = broadcast::channel(256);
        Self {
            options,
            pc_commands,
        }
    }
}
