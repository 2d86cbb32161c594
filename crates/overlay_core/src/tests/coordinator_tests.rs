use std::time::Duration;

use shared::{
    domain::{PixelRect, Point, TintColor},
    protocol::KeyEventKind,
};
use storage::{DocumentStore, MemoryDocumentStore};

use super::*;
use crate::{
    gesture::{PointerId, TouchPhase},
    test_support::{RecordingChannel, RecordingKeyCapture, RecordingSurface},
};

const SCREEN: ScreenMetrics = ScreenMetrics::new(1000, 2000);
const RELAY: &str = "http://127.0.0.1:8079";

struct Harness {
    coordinator: OverlayCoordinator,
    documents: Arc<MemoryDocumentStore>,
    channel: Arc<RecordingChannel>,
    surface: RecordingSurface,
    capture: RecordingKeyCapture,
}

fn options() -> CoordinatorOptions {
    CoordinatorOptions {
        relay_address: RELAY.to_string(),
        repeat: RepeatConfig {
            initial_delay: Duration::from_millis(500),
            interval: Duration::from_millis(100),
        },
        gesture: GestureConfig::default(),
        screen: SCREEN,
    }
}

async fn harness(configs: &[ButtonConfig]) -> Harness {
    let documents = Arc::new(MemoryDocumentStore::new());
    let shared_documents: Arc<dyn DocumentStore> = documents.clone();
    let mut store = ButtonConfigStore::open(shared_documents).await;
    for config in configs {
        store.add(config.clone());
    }

    let channel = Arc::new(RecordingChannel::default());
    let surface = RecordingSurface::default();
    let capture = RecordingKeyCapture::default();
    let key_channel: Arc<dyn KeyChannel> = channel.clone();
    let mut coordinator = OverlayCoordinator::new(
        store,
        key_channel,
        Box::new(surface.clone()),
        Box::new(capture.clone()),
        options(),
    );
    assert!(coordinator.handle(OverlayEvent::Lifecycle(LifecycleRequest::Start)));

    Harness {
        coordinator,
        documents,
        channel,
        surface,
        capture,
    }
}

fn control_a() -> ButtonConfig {
    ButtonConfig::new("A", "SPACE", 0.4, 0.4, 0.1, 0.1)
}

fn control_b() -> ButtonConfig {
    ButtonConfig::new("B", "W", 0.1, 0.1, 0.1, 0.1)
}

fn touch(
    control: ControlId,
    pointer: u32,
    phase: TouchPhase,
    raw: (f32, f32),
    local: (f32, f32),
) -> OverlayEvent {
    OverlayEvent::Touch {
        control,
        event: TouchEvent::new(
            PointerId(pointer),
            phase,
            Point::new(raw.0, raw.1),
            Point::new(local.0, local.1),
        ),
    }
}

fn tap(h: &mut Harness, control: ControlId) {
    h.coordinator
        .handle(touch(control, 1, TouchPhase::Down, (450.0, 850.0), (50.0, 50.0)));
    h.coordinator
        .handle(touch(control, 1, TouchPhase::Up, (450.0, 850.0), (50.0, 50.0)));
}

#[tokio::test]
async fn start_connects_and_renders_saved_layout() {
    let a = control_a();
    let h = harness(&[a.clone()]).await;

    assert!(h.coordinator.is_running());
    assert_eq!(h.channel.connect_calls(), vec![RELAY.to_string()]);
    assert!(h.surface.overlay_visible());
    assert!(!h.surface.add_affordance_visible());

    let placed = h.surface.control(a.id).expect("control rendered");
    assert_eq!(placed.label, "A");
    assert_eq!(placed.rect, PixelRect::new(400.0, 800.0, 100.0, 200.0));
    assert_eq!(placed.tint, ControlTint::IDLE);
}

#[tokio::test]
async fn tapping_in_delete_mode_removes_the_control() {
    let a = control_a();
    let mut h = harness(&[a.clone(), control_b()]).await;
    let before = h.coordinator.store().load_all().len();

    h.coordinator.handle(OverlayEvent::SetMode(EditMode::Delete));
    tap(&mut h, a.id);

    let configs = h.coordinator.store().load_all();
    assert_eq!(configs.len(), before - 1);
    assert!(configs.iter().all(|config| config.label != "A"));
    assert_eq!(h.surface.removed(), vec![a.id]);
    assert!(h.channel.sent().is_empty());
}

#[tokio::test]
async fn normal_press_forwards_keys_with_pressed_feedback() {
    let a = control_a();
    let mut h = harness(&[a.clone()]).await;

    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Down, (450.0, 850.0), (50.0, 50.0)));
    assert_eq!(h.surface.control(a.id).unwrap().tint, ControlTint::PRESSED);
    h.coordinator
        .handle(touch(a.id, 2, TouchPhase::Down, (460.0, 860.0), (60.0, 60.0)));
    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Up, (450.0, 850.0), (50.0, 50.0)));
    h.coordinator
        .handle(touch(a.id, 2, TouchPhase::Up, (460.0, 860.0), (60.0, 60.0)));

    assert_eq!(
        h.channel.sent(),
        vec![
            (KeyEventKind::KeyDown, "SPACE".to_string()),
            (KeyEventKind::KeyUp, "SPACE".to_string()),
        ]
    );
    assert_eq!(h.surface.control(a.id).unwrap().tint, ControlTint::IDLE);
}

#[tokio::test]
async fn concurrent_touches_on_two_controls_are_independent() {
    let a = control_a();
    let b = control_b();
    let mut h = harness(&[a.clone(), b.clone()]).await;

    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Down, (450.0, 850.0), (50.0, 50.0)));
    h.coordinator
        .handle(touch(b.id, 2, TouchPhase::Down, (150.0, 250.0), (50.0, 50.0)));
    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Up, (450.0, 850.0), (50.0, 50.0)));
    h.coordinator
        .handle(touch(b.id, 2, TouchPhase::Up, (150.0, 250.0), (50.0, 50.0)));

    assert_eq!(
        h.channel.sent(),
        vec![
            (KeyEventKind::KeyDown, "SPACE".to_string()),
            (KeyEventKind::KeyDown, "W".to_string()),
            (KeyEventKind::KeyUp, "SPACE".to_string()),
            (KeyEventKind::KeyUp, "W".to_string()),
        ]
    );
}

#[tokio::test]
async fn drag_updates_percentages_by_screen_relative_delta() {
    let a = control_a();
    let mut h = harness(&[a.clone()]).await;
    h.coordinator.handle(OverlayEvent::SetMode(EditMode::AddMove));

    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Down, (450.0, 900.0), (50.0, 100.0)));
    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Move, (550.0, 700.0), (0.0, 0.0)));
    assert_eq!(
        h.surface.control(a.id).unwrap().rect,
        PixelRect::new(500.0, 600.0, 100.0, 200.0)
    );
    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Up, (550.0, 700.0), (0.0, 0.0)));

    let moved = h.coordinator.store().get(a.id).cloned().expect("still stored");
    assert!((moved.x_percent - 0.5).abs() < 1e-5);
    assert!((moved.y_percent - 0.3).abs() < 1e-5);
    assert!((moved.width_percent - 0.1).abs() < 1e-6);
    assert!(h.channel.sent().is_empty());
}

#[tokio::test]
async fn resize_from_handle_persists_new_size() {
    let a = control_a();
    let mut h = harness(&[a.clone()]).await;
    h.coordinator.handle(OverlayEvent::SetMode(EditMode::Resize));

    // bottom-right corner of (400, 800, 100, 200)
    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Down, (495.0, 995.0), (95.0, 195.0)));
    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Move, (595.0, 1095.0), (0.0, 0.0)));
    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Up, (595.0, 1095.0), (0.0, 0.0)));

    let resized = h.coordinator.store().get(a.id).cloned().expect("still stored");
    assert!((resized.width_percent - 0.2).abs() < 1e-5);
    assert!((resized.height_percent - 0.15).abs() < 1e-5);
    assert_eq!(resized.x_percent, 0.4);
}

#[tokio::test]
async fn key_capture_renames_control_and_keeps_identity() {
    let a = control_a();
    let mut h = harness(&[a.clone()]).await;
    h.coordinator.handle(OverlayEvent::SetMode(EditMode::AssignKey));
    tap(&mut h, a.id);
    assert_eq!(h.capture.requests(), vec![(a.id, "A".to_string())]);

    h.coordinator.handle(OverlayEvent::KeyCaptured {
        control: a.id,
        new_key: "   ".to_string(),
    });
    assert_eq!(h.coordinator.store().get(a.id).unwrap().key_name, "SPACE");

    h.coordinator.handle(OverlayEvent::KeyCaptured {
        control: a.id,
        new_key: " ARROW_UP ".to_string(),
    });
    let updated = h.coordinator.store().get(a.id).cloned().expect("same id");
    assert_eq!(updated.label, "ARROW_UP");
    assert_eq!(updated.key_name, "ARROW_UP");
    assert_eq!(h.coordinator.store().len(), 1);
    assert_eq!(h.surface.control(a.id).unwrap().label, "ARROW_UP");

    h.coordinator.handle(OverlayEvent::SetMode(EditMode::Normal));
    tap(&mut h, a.id);
    assert_eq!(h.channel.count(KeyEventKind::KeyDown), 1);
    assert_eq!(h.channel.sent()[0].1, "ARROW_UP");
}

#[tokio::test]
async fn new_controls_are_only_added_in_add_move_mode() {
    let mut h = harness(&[control_a()]).await;

    h.coordinator.handle(OverlayEvent::NewControlRequested);
    assert_eq!(h.coordinator.store().len(), 1);

    h.coordinator.handle(OverlayEvent::SetMode(EditMode::AddMove));
    assert!(h.surface.add_affordance_visible());
    h.coordinator.handle(OverlayEvent::NewControlRequested);
    h.coordinator.handle(OverlayEvent::NewControlRequested);

    let configs = h.coordinator.store().load_all();
    let labels: Vec<&str> = configs.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, ["A", "Button 2", "Button 3"]);
    let added = &configs[1];
    assert_eq!(added.key_name, PLACEHOLDER_KEY_NAME);
    assert_eq!(
        (added.x_percent, added.y_percent, added.width_percent, added.height_percent),
        (0.4, 0.4, 0.06, 0.06)
    );
    assert_eq!(h.surface.control_count(), 3);
    assert_eq!(
        h.surface.control(added.id).unwrap().tint,
        ControlTint::editing(TintColor::Cyan)
    );
}

#[tokio::test]
async fn mode_switch_retints_every_control() {
    let a = control_a();
    let b = control_b();
    let mut h = harness(&[a.clone(), b.clone()]).await;

    h.coordinator.handle(OverlayEvent::SetMode(EditMode::Resize));
    for id in [a.id, b.id] {
        assert_eq!(
            h.surface.control(id).unwrap().tint,
            ControlTint::editing(TintColor::Green)
        );
    }
    h.coordinator.handle(OverlayEvent::SetMode(EditMode::Delete));
    assert_eq!(
        h.surface.control(a.id).unwrap().tint,
        ControlTint::editing(TintColor::Red)
    );
    h.coordinator.handle(OverlayEvent::SetMode(EditMode::Normal));
    assert_eq!(h.surface.control(b.id).unwrap().tint, ControlTint::IDLE);
    assert!(!h.surface.add_affordance_visible());
}

#[tokio::test]
async fn mode_switch_mid_press_still_releases() {
    let a = control_a();
    let mut h = harness(&[a.clone()]).await;

    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Down, (450.0, 850.0), (50.0, 50.0)));
    h.coordinator.handle(OverlayEvent::SetMode(EditMode::Delete));
    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Up, (450.0, 850.0), (50.0, 50.0)));

    assert_eq!(h.coordinator.store().len(), 1);
    assert_eq!(h.channel.count(KeyEventKind::KeyUp), 1);
}

#[tokio::test]
async fn rotation_rerenders_from_percentages() {
    let a = control_a();
    let mut h = harness(&[a.clone()]).await;

    h.coordinator
        .handle(OverlayEvent::ScreenChanged(SCREEN.rotated()));
    assert_eq!(
        h.surface.control(a.id).unwrap().rect,
        PixelRect::new(800.0, 400.0, 200.0, 100.0)
    );
    let stored = h.coordinator.store().get(a.id).cloned().unwrap();
    assert_eq!((stored.x_percent, stored.y_percent), (0.4, 0.4));

    // a drag on the rotated screen is converted with the new metrics
    h.coordinator.handle(OverlayEvent::SetMode(EditMode::AddMove));
    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Down, (850.0, 450.0), (50.0, 50.0)));
    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Move, (1050.0, 450.0), (0.0, 0.0)));
    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Up, (1050.0, 450.0), (0.0, 0.0)));
    let stored = h.coordinator.store().get(a.id).cloned().unwrap();
    assert!((stored.x_percent - 0.5).abs() < 1e-5);
    assert!((stored.y_percent - 0.4).abs() < 1e-5);
}

#[tokio::test]
async fn disconnect_mid_press_leaves_no_stuck_key() {
    let a = control_a();
    let mut h = harness(&[a.clone()]).await;

    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Down, (450.0, 850.0), (50.0, 50.0)));
    assert!(h.coordinator.dispatcher().is_held(a.id));

    h.channel.set_connected(false);
    h.coordinator.handle(OverlayEvent::Channel(ChannelEvent::Disconnected(
        "peer closed".to_string(),
    )));
    assert!(!h.coordinator.dispatcher().is_held(a.id));
    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Up, (450.0, 850.0), (50.0, 50.0)));

    h.channel.set_connected(true);
    h.coordinator
        .handle(OverlayEvent::Channel(ChannelEvent::Connected));
    tap(&mut h, a.id);

    assert_eq!(
        h.channel.sent(),
        vec![
            (KeyEventKind::KeyDown, "SPACE".to_string()),
            (KeyEventKind::KeyDown, "SPACE".to_string()),
            (KeyEventKind::KeyUp, "SPACE".to_string()),
        ]
    );
}

#[tokio::test]
async fn hide_releases_keys_and_ignores_touches_until_shown() {
    let a = control_a();
    let mut h = harness(&[a.clone()]).await;

    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Down, (450.0, 850.0), (50.0, 50.0)));
    h.coordinator
        .handle(OverlayEvent::Lifecycle(LifecycleRequest::Toggle));
    assert!(!h.coordinator.is_visible());
    assert!(!h.surface.overlay_visible());
    assert_eq!(h.surface.control_count(), 0);
    assert_eq!(h.channel.count(KeyEventKind::KeyUp), 1);

    tap(&mut h, a.id);
    assert_eq!(h.channel.count(KeyEventKind::KeyDown), 1);

    h.coordinator
        .handle(OverlayEvent::Lifecycle(LifecycleRequest::Show));
    assert_eq!(h.surface.control_count(), 1);
    tap(&mut h, a.id);
    assert_eq!(h.channel.count(KeyEventKind::KeyDown), 2);
}

#[tokio::test]
async fn stop_disconnects_and_persists_layout() {
    let a = control_a();
    let mut h = harness(&[a.clone()]).await;
    h.coordinator.handle(OverlayEvent::SetMode(EditMode::AddMove));
    h.coordinator.handle(OverlayEvent::NewControlRequested);

    assert!(!h
        .coordinator
        .handle(OverlayEvent::Lifecycle(LifecycleRequest::Stop)));
    h.coordinator.shutdown().await.expect("flush");
    assert!(!h.channel.is_connected());
    assert!(!h.coordinator.is_running());

    let documents: Arc<dyn DocumentStore> = h.documents.clone();
    let reopened = ButtonConfigStore::open(documents).await;
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.load_all()[0].id, a.id);
}

#[tokio::test(start_paused = true)]
async fn run_loop_serialises_repeat_ticks_with_touches() {
    let a = control_a();
    let h = harness(&[a.clone()]).await;
    let channel = Arc::clone(&h.channel);
    let (events, events_rx) = mpsc::unbounded_channel();
    let (_channel_events, channel_events_rx) = mpsc::unbounded_channel();
    let running = tokio::spawn(h.coordinator.run(events_rx, channel_events_rx));

    events
        .send(touch(a.id, 1, TouchPhase::Down, (450.0, 850.0), (50.0, 50.0)))
        .unwrap();
    // 1250ms hold with 500ms delay and 100ms interval: 1 + 7 DOWNs
    tokio::time::sleep(Duration::from_millis(1250)).await;
    events
        .send(touch(a.id, 1, TouchPhase::Up, (450.0, 850.0), (50.0, 50.0)))
        .unwrap();
    events
        .send(OverlayEvent::Lifecycle(LifecycleRequest::Stop))
        .unwrap();

    running.await.expect("join").expect("clean shutdown");
    assert_eq!(channel.count(KeyEventKind::KeyDown), 8);
    assert_eq!(channel.count(KeyEventKind::KeyUp), 1);
    assert!(!channel.is_connected());
}

#[tokio::test]
async fn key_capture_requires_a_pending_request_and_is_uppercased() {
    let a = control_a();
    let mut h = harness(&[a.clone()]).await;

    h.coordinator.handle(OverlayEvent::KeyCaptured {
        control: a.id,
        new_key: "q".to_string(),
    });
    assert_eq!(h.coordinator.store().get(a.id).unwrap().key_name, "SPACE");

    h.coordinator.handle(OverlayEvent::SetMode(EditMode::AssignKey));
    tap(&mut h, a.id);
    h.coordinator.handle(OverlayEvent::KeyCaptured {
        control: a.id,
        new_key: "q".to_string(),
    });
    let updated = h.coordinator.store().get(a.id).cloned().unwrap();
    assert_eq!((updated.label.as_str(), updated.key_name.as_str()), ("Q", "Q"));

    // the request was answered; a second reply is stale
    h.coordinator.handle(OverlayEvent::KeyCaptured {
        control: a.id,
        new_key: "E".to_string(),
    });
    assert_eq!(h.coordinator.store().get(a.id).unwrap().key_name, "Q");
}

#[tokio::test]
async fn edit_by_position_rewrites_and_rerenders_the_control() {
    let a = control_a();
    let b = control_b();
    let mut h = harness(&[a.clone(), b.clone()]).await;
    let layout = h.coordinator.layout();

    let edit = ControlEdit::new("Jump", "SPACE", 0.5, 0.25, 0.2, 0.1).expect("valid edit");
    h.coordinator.handle(OverlayEvent::EditControl { index: 1, edit });

    let edited = h.coordinator.store().load_all()[1].clone();
    assert_eq!(edited.id, b.id);
    assert_eq!(edited.label, "Jump");
    assert_eq!(edited.key_name, "SPACE");
    let placed = h.surface.control(b.id).expect("still rendered");
    assert_eq!(placed.label, "Jump");
    assert_eq!(placed.rect, PixelRect::new(500.0, 500.0, 200.0, 200.0));
    assert_eq!(layout.borrow()[1], edited);

    let invalid = ControlEdit {
        label: "X".to_string(),
        key_name: "X".to_string(),
        x_percent: 1.5,
        y_percent: 0.0,
        width_percent: 0.1,
        height_percent: 0.1,
    };
    h.coordinator.handle(OverlayEvent::EditControl {
        index: 0,
        edit: invalid,
    });
    h.coordinator.handle(OverlayEvent::EditControl {
        index: 7,
        edit: ControlEdit::new("X", "X", 0.1, 0.1, 0.1, 0.1).expect("valid edit"),
    });
    assert_eq!(h.coordinator.store().load_all()[0], a);
    assert_eq!(h.coordinator.store().len(), 2);
}

#[tokio::test]
async fn remove_by_position_drops_the_control_everywhere() {
    let a = control_a();
    let b = control_b();
    let mut h = harness(&[a.clone(), b.clone()]).await;
    let layout = h.coordinator.layout();

    h.coordinator
        .handle(touch(a.id, 1, TouchPhase::Down, (450.0, 850.0), (50.0, 50.0)));
    h.coordinator.handle(OverlayEvent::RemoveControl { index: 0 });
    h.coordinator.handle(OverlayEvent::RemoveControl { index: 5 });

    assert_eq!(h.coordinator.store().load_all(), vec![b.clone()]);
    assert_eq!(h.surface.removed(), vec![a.id]);
    assert_eq!(h.channel.count(KeyEventKind::KeyUp), 1);
    assert!(!h.coordinator.dispatcher().is_held(a.id));
    assert_eq!(*layout.borrow(), vec![b]);
}

#[tokio::test]
async fn start_reconnects_a_dropped_channel() {
    let mut h = harness(&[control_a()]).await;
    assert_eq!(h.channel.connect_calls().len(), 1);

    h.coordinator.handle(OverlayEvent::Lifecycle(LifecycleRequest::Start));
    assert_eq!(h.channel.connect_calls().len(), 1);

    h.channel.set_connected(false);
    h.coordinator.handle(OverlayEvent::Channel(ChannelEvent::Disconnected(
        "relay restarted".to_string(),
    )));
    h.coordinator.handle(OverlayEvent::Lifecycle(LifecycleRequest::Start));
    assert_eq!(
        h.channel.connect_calls(),
        vec![RELAY.to_string(), RELAY.to_string()]
    );
    assert!(h.channel.is_connected());
}
