use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Phase of a key event as sent by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
    /// Down followed by an automatic up on the relay.
    KeyPress,
}

impl KeyEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyEventKind::KeyDown => "KEY_DOWN",
            KeyEventKind::KeyUp => "KEY_UP",
            KeyEventKind::KeyPress => "KEY_PRESS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    #[serde(alias = "android_controller")]
    Controller,
    #[serde(alias = "exe")]
    Pc,
}

/// How the receiving PC should inject input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    Game,
    Desktop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputCommand {
    pub event: KeyEventKind,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<InputMode>,
}

impl InputCommand {
    pub fn new(event: KeyEventKind, key: impl Into<String>) -> Self {
        Self {
            event,
            key: key.into(),
            mode: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    Register { role: ClientRole },
    Input(InputCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PcAction {
    KeyDown,
    KeyUp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcCommand {
    pub action: PcAction,
    pub key: String,
    #[serde(default)]
    pub mode: InputMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RelayEvent {
    Registered { role: ClientRole },
    Control(PcCommand),
    Error(ApiError),
}
