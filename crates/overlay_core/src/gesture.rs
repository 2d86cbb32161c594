//! Per-control touch interpretation.
//!
//! Every control owns one [`GestureInterpreter`]. The edit mode is captured when
//! the first pointer goes down and stays fixed until the gesture ends, so a mode
//! switch made elsewhere never changes a drag or press already in progress.

use std::collections::BTreeSet;

use shared::domain::{EditMode, PixelRect, Point, ScreenMetrics};

pub const DEFAULT_RESIZE_HANDLE_PX: f32 = 50.0;
pub const DEFAULT_MIN_CONTROL_SIZE_PX: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Down,
    Move,
    Up,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchEvent {
    pub pointer: PointerId,
    pub phase: TouchPhase,
    /// Screen coordinates.
    pub raw: Point,
    /// Coordinates relative to the control's top-left corner.
    pub local: Point,
}

impl TouchEvent {
    pub fn new(pointer: PointerId, phase: TouchPhase, raw: Point, local: Point) -> Self {
        Self {
            pointer,
            phase,
            raw,
            local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureOutput {
    Press,
    Release,
    MovedTo { x_percent: f32, y_percent: f32 },
    ResizedTo { width_percent: f32, height_percent: f32 },
    AssignKeyRequested,
    DeleteRequested,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEffect {
    /// The event does not belong to the current gesture.
    Ignored,
    /// The event was absorbed without any visible result.
    Consumed,
    /// Live geometry while dragging or resizing; nothing is committed yet.
    Preview(PixelRect),
    Emit(GestureOutput),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureConfig {
    pub resize_handle_px: f32,
    pub min_size_px: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            resize_handle_px: DEFAULT_RESIZE_HANDLE_PX,
            min_size_px: DEFAULT_MIN_CONTROL_SIZE_PX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GestureSession {
    pointer: PointerId,
    anchor: Point,
    initial: PixelRect,
    current: PixelRect,
    moved: bool,
}

impl GestureSession {
    fn begin(event: &TouchEvent, geometry: PixelRect) -> Self {
        Self {
            pointer: event.pointer,
            anchor: event.raw,
            initial: geometry,
            current: geometry,
            moved: false,
        }
    }

    fn delta(&self, raw: Point) -> (f32, f32) {
        (raw.x - self.anchor.x, raw.y - self.anchor.y)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum GestureState {
    Idle,
    Pressed { pointers: BTreeSet<PointerId> },
    Tap { mode: EditMode, pointer: PointerId },
    TrackingMove(GestureSession),
    TrackingResize(GestureSession),
    /// Resize touch that missed the handle; swallowed until the pointer lifts.
    Inert { pointer: PointerId },
}

#[derive(Debug, Clone)]
pub struct GestureInterpreter {
    config: GestureConfig,
    state: GestureState,
}

impl GestureInterpreter {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            state: GestureState::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == GestureState::Idle
    }

    pub fn is_pressed(&self) -> bool {
        matches!(self.state, GestureState::Pressed { .. })
    }

    /// Mode the in-flight gesture was started under, if any.
    pub fn captured_mode(&self) -> Option<EditMode> {
        match &self.state {
            GestureState::Idle => None,
            GestureState::Pressed { .. } => Some(EditMode::Normal),
            GestureState::Tap { mode, .. } => Some(*mode),
            GestureState::TrackingMove(_) => Some(EditMode::AddMove),
            GestureState::TrackingResize(_) | GestureState::Inert { .. } => Some(EditMode::Resize),
        }
    }

    /// Drops any in-flight gesture without producing output.
    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
    }

    /// Feeds one touch event. `mode` is only consulted when a new gesture starts;
    /// `geometry` is the control's current pixel rect.
    pub fn handle(
        &mut self,
        event: &TouchEvent,
        mode: EditMode,
        geometry: PixelRect,
        screen: ScreenMetrics,
    ) -> GestureEffect {
        match event.phase {
            TouchPhase::Down => self.on_down(event, mode, geometry),
            TouchPhase::Move => self.on_move(event),
            TouchPhase::Up => self.on_up(event, screen),
            TouchPhase::Cancel => self.on_cancel(screen),
        }
    }

    fn on_down(&mut self, event: &TouchEvent, mode: EditMode, geometry: PixelRect) -> GestureEffect {
        match &mut self.state {
            GestureState::Idle => {}
            GestureState::Pressed { pointers } => {
                pointers.insert(event.pointer);
                return GestureEffect::Consumed;
            }
            _ => return GestureEffect::Ignored,
        }

        let (state, effect) = match mode {
            EditMode::Normal => (
                GestureState::Pressed {
                    pointers: BTreeSet::from([event.pointer]),
                },
                GestureEffect::Emit(GestureOutput::Press),
            ),
            EditMode::AddMove => (
                GestureState::TrackingMove(GestureSession::begin(event, geometry)),
                GestureEffect::Consumed,
            ),
            EditMode::Resize if self.hits_resize_handle(event.local, geometry) => (
                GestureState::TrackingResize(GestureSession::begin(event, geometry)),
                GestureEffect::Consumed,
            ),
            EditMode::Resize => (
                GestureState::Inert {
                    pointer: event.pointer,
                },
                GestureEffect::Consumed,
            ),
            EditMode::AssignKey | EditMode::Delete => (
                GestureState::Tap {
                    mode,
                    pointer: event.pointer,
                },
                GestureEffect::Consumed,
            ),
        };
        self.state = state;
        effect
    }

    fn on_move(&mut self, event: &TouchEvent) -> GestureEffect {
        let min_size = self.config.min_size_px;
        match &mut self.state {
            GestureState::TrackingMove(session) if session.pointer == event.pointer => {
                let (dx, dy) = session.delta(event.raw);
                session.current = PixelRect {
                    x: session.initial.x + dx,
                    y: session.initial.y + dy,
                    ..session.initial
                };
                session.moved = true;
                GestureEffect::Preview(session.current)
            }
            GestureState::TrackingResize(session) if session.pointer == event.pointer => {
                let (dx, dy) = session.delta(event.raw);
                session.current = PixelRect {
                    width: (session.initial.width + dx).max(min_size),
                    height: (session.initial.height + dy).max(min_size),
                    ..session.initial
                };
                session.moved = true;
                GestureEffect::Preview(session.current)
            }
            GestureState::Idle => GestureEffect::Ignored,
            _ => GestureEffect::Consumed,
        }
    }

    fn on_up(&mut self, event: &TouchEvent, screen: ScreenMetrics) -> GestureEffect {
        let pointer = event.pointer;
        match &mut self.state {
            GestureState::Idle => GestureEffect::Ignored,
            GestureState::Pressed { pointers } => {
                if !pointers.remove(&pointer) {
                    return GestureEffect::Ignored;
                }
                if !pointers.is_empty() {
                    return GestureEffect::Consumed;
                }
                self.state = GestureState::Idle;
                GestureEffect::Emit(GestureOutput::Release)
            }
            GestureState::Tap { mode, pointer: owner } if *owner == pointer => {
                let output = if *mode == EditMode::AssignKey {
                    GestureOutput::AssignKeyRequested
                } else {
                    GestureOutput::DeleteRequested
                };
                self.state = GestureState::Idle;
                GestureEffect::Emit(output)
            }
            GestureState::TrackingMove(session) if session.pointer == pointer => {
                let output = moved_to(session.current, screen);
                self.state = GestureState::Idle;
                GestureEffect::Emit(output)
            }
            GestureState::TrackingResize(session) if session.pointer == pointer => {
                let output = resized_to(session.current, self.config.min_size_px, screen);
                self.state = GestureState::Idle;
                GestureEffect::Emit(output)
            }
            GestureState::Inert { pointer: owner } if *owner == pointer => {
                self.state = GestureState::Idle;
                GestureEffect::Consumed
            }
            _ => GestureEffect::Ignored,
        }
    }

    /// The host revoked the whole gesture. Presses are released; a drag or resize
    /// commits its last previewed geometry if it ever moved; taps are dropped.
    fn on_cancel(&mut self, screen: ScreenMetrics) -> GestureEffect {
        let state = std::mem::replace(&mut self.state, GestureState::Idle);
        match state {
            GestureState::Idle => GestureEffect::Ignored,
            GestureState::Pressed { .. } => GestureEffect::Emit(GestureOutput::Release),
            GestureState::TrackingMove(session) if session.moved => {
                GestureEffect::Emit(moved_to(session.current, screen))
            }
            GestureState::TrackingResize(session) if session.moved => {
                GestureEffect::Emit(resized_to(session.current, self.config.min_size_px, screen))
            }
            _ => GestureEffect::Consumed,
        }
    }

    fn hits_resize_handle(&self, local: Point, geometry: PixelRect) -> bool {
        let handle_w = self.config.resize_handle_px.min(geometry.width);
        let handle_h = self.config.resize_handle_px.min(geometry.height);
        let handle = PixelRect::new(
            geometry.width - handle_w,
            geometry.height - handle_h,
            handle_w,
            handle_h,
        );
        handle.contains(local)
    }
}

impl Default for GestureInterpreter {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

fn moved_to(rect: PixelRect, screen: ScreenMetrics) -> GestureOutput {
    GestureOutput::MovedTo {
        x_percent: screen.x_percent(rect.x),
        y_percent: screen.y_percent(rect.y),
    }
}

/// Committed sizes are floored at `min_size` pixels and never exceed the screen.
fn resized_to(rect: PixelRect, min_size: f32, screen: ScreenMetrics) -> GestureOutput {
    GestureOutput::ResizedTo {
        width_percent: screen.x_percent(rect.width.max(min_size)).min(1.0),
        height_percent: screen.y_percent(rect.height.max(min_size)).min(1.0),
    }
}

#[cfg(test)]
#[path = "tests/gesture_tests.rs"]
mod tests;
