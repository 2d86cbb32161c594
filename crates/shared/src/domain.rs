use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(pub Uuid);

impl ControlId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ControlId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Global interaction mode deciding how touches on controls are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    #[default]
    Normal,
    AddMove,
    Resize,
    AssignKey,
    Delete,
}

impl EditMode {
    pub const ALL: [EditMode; 5] = [
        EditMode::Normal,
        EditMode::AddMove,
        EditMode::Resize,
        EditMode::AssignKey,
        EditMode::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EditMode::Normal => "normal",
            EditMode::AddMove => "add_move",
            EditMode::Resize => "resize",
            EditMode::AssignKey => "assign_key",
            EditMode::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
    }

    pub fn control_tint(self) -> ControlTint {
        match self {
            EditMode::Normal => ControlTint::IDLE,
            EditMode::AddMove => ControlTint::editing(TintColor::Cyan),
            EditMode::Resize => ControlTint::editing(TintColor::Green),
            EditMode::AssignKey => ControlTint::editing(TintColor::Yellow),
            EditMode::Delete => ControlTint::editing(TintColor::Red),
        }
    }
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TintColor {
    Cyan,
    Green,
    Yellow,
    Red,
}

/// Visual affordance of a control: opacity plus an optional colour multiplied over it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlTint {
    pub opacity: f32,
    pub color: Option<TintColor>,
}

impl ControlTint {
    pub const IDLE: ControlTint = ControlTint {
        opacity: 1.0,
        color: None,
    };

    pub const PRESSED: ControlTint = ControlTint {
        opacity: 0.5,
        color: None,
    };

    const EDIT_OPACITY: f32 = 0.7;

    pub fn editing(color: TintColor) -> Self {
        Self {
            opacity: Self::EDIT_OPACITY,
            color: Some(color),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Inclusive hit test in the rect's own coordinate space.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

/// Current screen size in pixels. Both dimensions are at least one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenMetrics {
    width_px: u32,
    height_px: u32,
}

impl ScreenMetrics {
    pub const fn new(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px: if width_px == 0 { 1 } else { width_px },
            height_px: if height_px == 0 { 1 } else { height_px },
        }
    }

    pub fn width_px(&self) -> u32 {
        self.width_px
    }

    pub fn height_px(&self) -> u32 {
        self.height_px
    }

    pub fn rotated(&self) -> Self {
        Self {
            width_px: self.height_px,
            height_px: self.width_px,
        }
    }

    pub fn x_percent(&self, px: f32) -> f32 {
        px / self.width_px as f32
    }

    pub fn y_percent(&self, px: f32) -> f32 {
        px / self.height_px as f32
    }

    pub fn x_px(&self, percent: f32) -> f32 {
        percent * self.width_px as f32
    }

    pub fn y_px(&self, percent: f32) -> f32 {
        percent * self.height_px as f32
    }
}

pub const PLACEHOLDER_KEY_NAME: &str = "UNASSIGNED";

/// One on-screen control. Geometry is stored as fractions of the current screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonConfig {
    #[serde(default)]
    pub id: ControlId,
    pub label: String,
    #[serde(rename = "keyName")]
    pub key_name: String,
    #[serde(rename = "xPositionPercent")]
    pub x_percent: f32,
    #[serde(rename = "yPositionPercent")]
    pub y_percent: f32,
    #[serde(rename = "widthPercent")]
    pub width_percent: f32,
    #[serde(rename = "heightPercent")]
    pub height_percent: f32,
}

impl ButtonConfig {
    pub fn new(
        label: impl Into<String>,
        key_name: impl Into<String>,
        x_percent: f32,
        y_percent: f32,
        width_percent: f32,
        height_percent: f32,
    ) -> Self {
        Self {
            id: ControlId::new(),
            label: label.into(),
            key_name: key_name.into(),
            x_percent,
            y_percent,
            width_percent,
            height_percent,
        }
    }

    pub fn pixel_rect(&self, screen: ScreenMetrics) -> PixelRect {
        PixelRect {
            x: screen.x_px(self.x_percent),
            y: screen.y_px(self.y_percent),
            width: screen.x_px(self.width_percent),
            height: screen.y_px(self.height_percent),
        }
    }

    pub fn set_position_percent(&mut self, x_percent: f32, y_percent: f32) {
        self.x_percent = x_percent;
        self.y_percent = y_percent;
    }

    pub fn set_size_percent(&mut self, width_percent: f32, height_percent: f32) {
        self.width_percent = width_percent;
        self.height_percent = height_percent;
    }

    /// Key assignment renames the control after the key it now sends.
    pub fn assign_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.label = key.clone();
        self.key_name = key;
    }
}
