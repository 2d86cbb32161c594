//! Line-oriented commands read from stdin, standing in for the touch layer
//! and the overlay's notification actions.

use std::fmt::Write as _;

use overlay_core::{
    ControlEdit, EditRejected, LifecycleRequest, OverlayEvent, PointerId, TouchEvent, TouchPhase,
};
use shared::domain::{ButtonConfig, EditMode, Point, ScreenMetrics};
use thiserror::Error;

use crate::surface::ControlDirectory;

pub const HELP: &str = "\
commands:
  start | stop | show | hide | toggle
  mode <normal|add_move|resize|assign_key|delete>
  add
  list
  edit <index> <label> <KEY_NAME> <x> <y> <width> <height>
  remove <index>
  screen <width> <height>
  tap <control>
  touch <control> <down|move|up|cancel> <x> <y> [pointer]
  key <control> <KEY_NAME>
  help
<control> is a control id or any unique prefix of it
<index> is the position shown by 'list'; geometry is in fractions of the screen";

#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Lifecycle(LifecycleRequest),
    Mode(EditMode),
    Add,
    List,
    Edit { index: usize, edit: ControlEdit },
    Remove { index: usize },
    Screen { width: u32, height: u32 },
    Tap { control: String },
    Touch {
        control: String,
        phase: TouchPhase,
        x: f32,
        y: f32,
        pointer: u32,
    },
    Key { control: String, key: String },
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown mode '{0}'")]
    InvalidMode(String),
    #[error("'{0}' is not a number")]
    InvalidNumber(String),
    #[error("no control matches '{0}'")]
    UnknownControl(String),
    #[error(transparent)]
    InvalidEdit(#[from] EditRejected),
}

pub fn parse_command(line: &str) -> Result<HostCommand, CommandError> {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Err(CommandError::Empty);
    };
    let args: Vec<&str> = parts.collect();

    let command = match (name.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("start", []) => HostCommand::Lifecycle(LifecycleRequest::Start),
        ("stop" | "quit" | "exit", []) => HostCommand::Lifecycle(LifecycleRequest::Stop),
        ("show", []) => HostCommand::Lifecycle(LifecycleRequest::Show),
        ("hide", []) => HostCommand::Lifecycle(LifecycleRequest::Hide),
        ("toggle", []) => HostCommand::Lifecycle(LifecycleRequest::Toggle),
        ("add", []) => HostCommand::Add,
        ("list", []) => HostCommand::List,
        ("help", _) => HostCommand::Help,
        ("mode", [mode]) => HostCommand::Mode(
            EditMode::parse(mode).ok_or_else(|| CommandError::InvalidMode(mode.to_string()))?,
        ),
        ("mode", _) => return Err(CommandError::Usage("mode <name>")),
        ("edit", [index, label, key, x, y, width, height]) => HostCommand::Edit {
            index: number(index)?,
            edit: ControlEdit::new(
                label,
                key,
                number(x)?,
                number(y)?,
                number(width)?,
                number(height)?,
            )?,
        },
        ("edit", _) => {
            return Err(CommandError::Usage(
                "edit <index> <label> <KEY_NAME> <x> <y> <width> <height>",
            ))
        }
        ("remove", [index]) => HostCommand::Remove {
            index: number(index)?,
        },
        ("remove", _) => return Err(CommandError::Usage("remove <index>")),
        ("screen", [width, height]) => HostCommand::Screen {
            width: number(width)?,
            height: number(height)?,
        },
        ("screen", _) => return Err(CommandError::Usage("screen <width> <height>")),
        ("tap", [control]) => HostCommand::Tap {
            control: control.to_string(),
        },
        ("tap", _) => return Err(CommandError::Usage("tap <control>")),
        ("touch", [control, phase, x, y, rest @ ..]) if rest.len() <= 1 => HostCommand::Touch {
            control: control.to_string(),
            phase: parse_phase(phase)?,
            x: number(x)?,
            y: number(y)?,
            pointer: rest.first().map(|p| number(p)).transpose()?.unwrap_or(0),
        },
        ("touch", _) => {
            return Err(CommandError::Usage(
                "touch <control> <down|move|up|cancel> <x> <y> [pointer]",
            ))
        }
        ("key", [control, key]) => HostCommand::Key {
            control: control.to_string(),
            key: key.to_string(),
        },
        ("key", _) => return Err(CommandError::Usage("key <control> <KEY_NAME>")),
        ("start" | "stop" | "quit" | "exit" | "show" | "hide" | "toggle" | "add" | "list", _) => {
            return Err(CommandError::Usage("this command takes no arguments"))
        }
        (other, _) => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(command)
}

/// Expands a command into the events the coordinator consumes. Screen
/// coordinates are converted to control-local ones using the last rendered
/// geometry.
pub fn to_events(
    command: HostCommand,
    directory: &ControlDirectory,
) -> Result<Vec<OverlayEvent>, CommandError> {
    let events = match command {
        HostCommand::Lifecycle(request) => vec![OverlayEvent::Lifecycle(request)],
        HostCommand::Mode(mode) => vec![OverlayEvent::SetMode(mode)],
        HostCommand::Add => vec![OverlayEvent::NewControlRequested],
        HostCommand::Edit { index, edit } => vec![OverlayEvent::EditControl { index, edit }],
        HostCommand::Remove { index } => vec![OverlayEvent::RemoveControl { index }],
        HostCommand::Screen { width, height } => {
            vec![OverlayEvent::ScreenChanged(ScreenMetrics::new(width, height))]
        }
        HostCommand::Tap { control } => {
            let (id, rect) = directory
                .resolve(&control)
                .ok_or(CommandError::UnknownControl(control))?;
            let center = Point::new(rect.x + rect.width / 2.0, rect.y + rect.height / 2.0);
            let local = Point::new(rect.width / 2.0, rect.height / 2.0);
            [TouchPhase::Down, TouchPhase::Up]
                .into_iter()
                .map(|phase| OverlayEvent::Touch {
                    control: id,
                    event: TouchEvent::new(PointerId(0), phase, center, local),
                })
                .collect()
        }
        HostCommand::Touch {
            control,
            phase,
            x,
            y,
            pointer,
        } => {
            let (id, rect) = directory
                .resolve(&control)
                .ok_or(CommandError::UnknownControl(control))?;
            vec![OverlayEvent::Touch {
                control: id,
                event: TouchEvent::new(
                    PointerId(pointer),
                    phase,
                    Point::new(x, y),
                    Point::new(x - rect.x, y - rect.y),
                ),
            }]
        }
        HostCommand::Key { control, key } => {
            let (id, _) = directory
                .resolve(&control)
                .ok_or(CommandError::UnknownControl(control))?;
            vec![OverlayEvent::KeyCaptured {
                control: id,
                new_key: key,
            }]
        }
        HostCommand::Help | HostCommand::List => Vec::new(),
    };
    Ok(events)
}

/// One line per control, in layout order, prefixed with its index.
pub fn format_layout(configs: &[ButtonConfig]) -> String {
    if configs.is_empty() {
        return "no controls".to_string();
    }
    let mut out = String::new();
    for (index, config) in configs.iter().enumerate() {
        let _ = writeln!(
            out,
            "{index}: {} [{}] x={:.3} y={:.3} w={:.3} h={:.3} id={}",
            config.label,
            config.key_name,
            config.x_percent,
            config.y_percent,
            config.width_percent,
            config.height_percent,
            config.id,
        );
    }
    out.truncate(out.trim_end().len());
    out
}

fn parse_phase(raw: &str) -> Result<TouchPhase, CommandError> {
    match raw.to_ascii_lowercase().as_str() {
        "down" => Ok(TouchPhase::Down),
        "move" => Ok(TouchPhase::Move),
        "up" => Ok(TouchPhase::Up),
        "cancel" => Ok(TouchPhase::Cancel),
        _ => Err(CommandError::Usage("phase must be down, move, up or cancel")),
    }
}

fn number<T: std::str::FromStr>(raw: &str) -> Result<T, CommandError> {
    raw.parse()
        .map_err(|_| CommandError::InvalidNumber(raw.to_string()))
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
