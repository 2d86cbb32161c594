use std::time::Duration;

use super::*;
use crate::app_state::RelayOptions;

fn state() -> AppState {
    AppState::new(RelayOptions {
        key_press_release_delay: Duration::from_millis(50),
        default_mode: InputMode::Game,
    })
}

fn input_frame(event: &str, key: &str) -> String {
    serde_json::json!({ "type": "input", "payload": { "event": event, "key": key } }).to_string()
}

#[test]
fn key_down_maps_key_and_defaults_mode() {
    let translation = translate_input(
        &InputCommand::new(KeyEventKind::KeyDown, "ARROW_LEFT"),
        InputMode::Game,
    )
    .expect("translate");
    assert_eq!(
        translation,
        Translation {
            immediate: PcCommand {
                action: PcAction::KeyDown,
                key: "left".into(),
                mode: InputMode::Game,
            },
            delayed_release: None,
        }
    );
}

#[test]
fn key_press_expands_to_down_then_delayed_up() {
    let mut input = InputCommand::new(KeyEventKind::KeyPress, "SPACE");
    input.mode = Some(InputMode::Desktop);
    let translation = translate_input(&input, InputMode::Game).expect("translate");
    assert_eq!(translation.immediate.action, PcAction::KeyDown);
    assert_eq!(translation.immediate.mode, InputMode::Desktop);
    let release = translation.delayed_release.expect("release");
    assert_eq!(release.action, PcAction::KeyUp);
    assert_eq!(release.key, "space");
}

#[test]
fn blank_key_is_rejected() {
    let err = translate_input(&InputCommand::new(KeyEventKind::KeyUp, "  "), InputMode::Game)
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn input_before_registration_is_rejected() {
    let state = state();
    let mut pc = state.pc_commands.subscribe();
    let mut session = ClientSession::default();

    let err = handle_client_text(&state, &mut session, &input_frame("KEY_DOWN", "SPACE"))
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::NotRegistered);
    assert!(pc.try_recv().is_err());
}

#[tokio::test]
async fn pc_clients_cannot_send_input() {
    let state = state();
    let mut session = ClientSession::default();
    handle_client_text(&state, &mut session, r#"{"type":"register","payload":{"role":"exe"}}"#)
        .expect("register");
    let err = handle_client_text(&state, &mut session, &input_frame("KEY_DOWN", "SPACE"))
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::NotRegistered);
}

#[tokio::test]
async fn malformed_frame_is_a_validation_error() {
    let state = state();
    let mut session = ClientSession::default();
    let err = handle_client_text(&state, &mut session, "{not json").expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test(start_paused = true)]
async fn registered_controller_input_reaches_pc_subscribers() {
    let state = state();
    let mut pc = state.pc_commands.subscribe();
    let mut session = ClientSession::default();

    let reply = handle_client_text(
        &state,
        &mut session,
        r#"{"type":"register","payload":{"role":"android_controller"}}"#,
    )
    .expect("register");
    assert_eq!(
        reply,
        Some(RelayEvent::Registered {
            role: ClientRole::Controller
        })
    );

    let reply = handle_client_text(&state, &mut session, &input_frame("KEY_PRESS", "ACTION_A"))
        .expect("input");
    assert_eq!(reply, None);

    let down = pc.recv().await.expect("down");
    assert_eq!((down.action, down.key.as_str()), (PcAction::KeyDown, "a"));
    tokio::time::sleep(Duration::from_millis(60)).await;
    let up = pc.recv().await.expect("up");
    assert_eq!((up.action, up.key.as_str()), (PcAction::KeyUp, "a"));
}
