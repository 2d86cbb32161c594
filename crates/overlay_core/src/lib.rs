//! Floating overlay controls: edit modes, per-control gestures and key
//! forwarding with auto-repeat, composed by [`OverlayCoordinator`].

pub mod channel;
pub mod config;
pub mod control_edit;
pub mod coordinator;
pub mod dispatcher;
pub mod edit_mode;
pub mod gesture;
pub mod host;

pub use channel::{
    ws_url_for, ChannelError, ChannelEvent, KeyChannel, ReconnectPolicy, WsKeyChannel,
};
pub use config::{load_settings, OverlaySettings};
pub use control_edit::{ControlEdit, EditRejected};
pub use coordinator::{CoordinatorOptions, LifecycleRequest, OverlayCoordinator, OverlayEvent};
pub use dispatcher::{KeyEventDispatcher, RepeatConfig, RepeatTick};
pub use edit_mode::EditModeController;
pub use gesture::{
    GestureConfig, GestureEffect, GestureInterpreter, GestureOutput, PointerId, TouchEvent,
    TouchPhase,
};
pub use host::{KeyCapture, OverlaySurface};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
