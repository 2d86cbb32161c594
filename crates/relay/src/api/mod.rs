//! Relay protocol: client registration and translation of controller input
//! into commands for PC clients.

use shared::{
    error::{ApiError, ErrorCode},
    protocol::{
        ClientMessage, ClientRole, InputCommand, InputMode, KeyEventKind, PcAction, PcCommand,
        RelayEvent,
    },
};
use tracing::{debug, info};

use crate::{app_state::AppState, keymap::map_key_for_pc};

/// Per-connection state. A connection has no role until it registers.
#[derive(Debug, Default)]
pub(crate) struct ClientSession {
    pub(crate) role: Option<ClientRole>,
}

/// PC commands produced by one controller input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Translation {
    pub(crate) immediate: PcCommand,
    /// Release that follows after the configured delay (`KEY_PRESS` only).
    pub(crate) delayed_release: Option<PcCommand>,
}

pub(crate) fn translate_input(
    input: &InputCommand,
    default_mode: InputMode,
) -> Result<Translation, ApiError> {
    if input.key.trim().is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "key must not be empty"));
    }
    let key = map_key_for_pc(&input.key);
    let mode = input.mode.unwrap_or(default_mode);
    let command = |action| PcCommand {
        action,
        key: key.clone(),
        mode,
    };
    Ok(match input.event {
        KeyEventKind::KeyDown => Translation {
            immediate: command(PcAction::KeyDown),
            delayed_release: None,
        },
        KeyEventKind::KeyUp => Translation {
            immediate: command(PcAction::KeyUp),
            delayed_release: None,
        },
        KeyEventKind::KeyPress => Translation {
            immediate: command(PcAction::KeyDown),
            delayed_release: Some(command(PcAction::KeyUp)),
        },
    })
}

/// Decodes and applies one text frame from a client. Returns the reply to send
/// back to that client, if any.
pub(crate) fn handle_client_text(
    state: &AppState,
    session: &mut ClientSession,
    text: &str,
) -> Result<Option<RelayEvent>, ApiError> {
    let message: ClientMessage = serde_json::from_str(text)
        .map_err(|e| ApiError::new(ErrorCode::Validation, format!("invalid message: {e}")))?;
    match message {
        ClientMessage::Register { role } => {
            info!(?role, "client registered");
            session.role = Some(role);
            Ok(Some(RelayEvent::Registered { role }))
        }
        ClientMessage::Input(input) => {
            if session.role != Some(ClientRole::Controller) {
                return Err(ApiError::new(
                    ErrorCode::NotRegistered,
                    "register as a controller before sending input",
                ));
            }
            forward_input(state, &input)?;
            Ok(None)
        }
    }
}

fn forward_input(state: &AppState, input: &InputCommand) -> Result<(), ApiError> {
    let translation = translate_input(input, state.options.default_mode)?;
    debug!(
        event = input.event.as_str(),
        key = %input.key,
        mapped = %translation.immediate.key,
        "forwarding controller input"
    );
    broadcast(state, translation.immediate);

    if let Some(release) = translation.delayed_release {
        let state = state.clone();
        let delay = state.options.key_press_release_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            broadcast(&state, release);
        });
    }
    Ok(())
}

fn broadcast(state: &AppState, command: PcCommand) {
    if state.pc_commands.send(command).is_err() {
        debug!("no pc clients connected; command dropped");
    }
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
