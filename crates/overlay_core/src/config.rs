use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

use crate::{
    channel::{ReconnectPolicy, DEFAULT_RECONNECT_INITIAL_DELAY, DEFAULT_RECONNECT_MAX_DELAY},
    dispatcher::{RepeatConfig, DEFAULT_REPEAT_INITIAL_DELAY, DEFAULT_REPEAT_INTERVAL},
    gesture::{GestureConfig, DEFAULT_MIN_CONTROL_SIZE_PX, DEFAULT_RESIZE_HANDLE_PX},
};

pub const DEFAULT_SETTINGS_FILE: &str = "overlay.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySettings {
    pub relay_url: String,
    pub database_url: String,
    pub repeat_initial_delay_ms: u64,
    pub repeat_interval_ms: u64,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub resize_handle_px: f32,
    pub min_control_size_px: f32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:8079".into(),
            database_url: "sqlite://./data/overlay.db".into(),
            repeat_initial_delay_ms: DEFAULT_REPEAT_INITIAL_DELAY.as_millis() as u64,
            repeat_interval_ms: DEFAULT_REPEAT_INTERVAL.as_millis() as u64,
            reconnect_initial_delay_ms: DEFAULT_RECONNECT_INITIAL_DELAY.as_millis() as u64,
            reconnect_max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY.as_millis() as u64,
            resize_handle_px: DEFAULT_RESIZE_HANDLE_PX,
            min_control_size_px: DEFAULT_MIN_CONTROL_SIZE_PX,
        }
    }
}

impl OverlaySettings {
    pub fn repeat(&self) -> RepeatConfig {
        RepeatConfig {
            initial_delay: Duration::from_millis(self.repeat_initial_delay_ms),
            interval: Duration::from_millis(self.repeat_interval_ms.max(1)),
        }
    }

    pub fn reconnect(&self) -> ReconnectPolicy {
        let initial_delay = Duration::from_millis(self.reconnect_initial_delay_ms.max(1));
        ReconnectPolicy {
            initial_delay,
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms).max(initial_delay),
        }
    }

    pub fn gesture(&self) -> GestureConfig {
        GestureConfig {
            resize_handle_px: self.resize_handle_px.max(1.0),
            min_size_px: self.min_control_size_px.max(1.0),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    relay_url: Option<String>,
    database_url: Option<String>,
    repeat_initial_delay_ms: Option<u64>,
    repeat_interval_ms: Option<u64>,
    reconnect_initial_delay_ms: Option<u64>,
    reconnect_max_delay_ms: Option<u64>,
    resize_handle_px: Option<f32>,
    min_control_size_px: Option<f32>,
}

/// Defaults, then `overlay.toml` in the working directory, then environment.
pub fn load_settings() -> OverlaySettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |name| std::env::var(name).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> OverlaySettings {
    let mut settings = OverlaySettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), %err, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("OVERLAY_RELAY_URL") {
        settings.relay_url = v;
    }
    if let Some(v) = env("APP__RELAY_URL") {
        settings.relay_url = v;
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(parsed) = env("APP__REPEAT_INITIAL_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.repeat_initial_delay_ms = parsed;
    }
    if let Some(parsed) = env("APP__REPEAT_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        settings.repeat_interval_ms = parsed;
    }
    if let Some(parsed) = env("APP__RECONNECT_INITIAL_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.reconnect_initial_delay_ms = parsed;
    }
    if let Some(parsed) = env("APP__RECONNECT_MAX_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.reconnect_max_delay_ms = parsed;
    }

    settings
}

fn apply_file(settings: &mut OverlaySettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.relay_url {
        settings.relay_url = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.repeat_initial_delay_ms {
        settings.repeat_initial_delay_ms = v;
    }
    if let Some(v) = file_cfg.repeat_interval_ms {
        settings.repeat_interval_ms = v;
    }
    if let Some(v) = file_cfg.reconnect_initial_delay_ms {
        settings.reconnect_initial_delay_ms = v;
    }
    if let Some(v) = file_cfg.reconnect_max_delay_ms {
        settings.reconnect_max_delay_ms = v;
    }
    if let Some(v) = file_cfg.resize_handle_px {
        settings.resize_handle_px = v;
    }
    if let Some(v) = file_cfg.min_control_size_px {
        settings.min_control_size_px = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
