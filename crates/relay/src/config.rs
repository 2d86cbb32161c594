use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use shared::protocol::InputMode;
use tracing::warn;

use crate::app_state::RelayOptions;

pub(crate) const DEFAULT_SETTINGS_FILE: &str = "relay.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind_addr: String,
    pub key_press_release_delay_ms: u64,
    pub default_input_mode: InputMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8079".into(),
            key_press_release_delay_ms: 50,
            default_input_mode: InputMode::Game,
        }
    }
}

impl Settings {
    pub(crate) fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            key_press_release_delay: Duration::from_millis(self.key_press_release_delay_ms),
            default_mode: self.default_input_mode,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    key_press_release_delay_ms: Option<u64>,
    default_input_mode: Option<InputMode>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |name| std::env::var(name).ok())
}

pub(crate) fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.bind_addr {
                    settings.bind_addr = v;
                }
                if let Some(v) = file_cfg.key_press_release_delay_ms {
                    settings.key_press_release_delay_ms = v;
                }
                if let Some(v) = file_cfg.default_input_mode {
                    settings.default_input_mode = v;
                }
            }
            Err(err) => warn!(path = %path.display(), %err, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("RELAY_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.bind_addr = v;
    }

    if let Some(parsed) = env("APP__KEY_PRESS_RELEASE_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.key_press_release_delay_ms = parsed;
    }

    if let Some(v) = env("APP__DEFAULT_INPUT_MODE") {
        match v.trim().to_ascii_lowercase().as_str() {
            "game" => settings.default_input_mode = InputMode::Game,
            "desktop" => settings.default_input_mode = InputMode::Desktop,
            other => warn!(mode = other, "unknown input mode; keeping default"),
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
