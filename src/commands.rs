// Command handlers
// Text commands calling into the controller, replying like the chat bot did
use std::str::FromStr;

use crate::error::CommandError;
use crate::metadata::format_time;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Join,
    Leave,
    Play(String),
    Pause,
    Resume,
    Stop,
    Loop,
    Normalize,
    Seek(f64),
    Dir(String),
    List,
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim().trim_start_matches('!');
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (line, ""),
        };
        let required = |command: &'static str| {
            if arg.is_empty() {
                Err(CommandError::MissingArgument(command))
            } else {
                Ok(arg.to_string())
            }
        };

        match name.to_lowercase().as_str() {
            "join" => Ok(Self::Join),
            "leave" | "disconnect" => Ok(Self::Leave),
            "play" => required("play").map(Self::Play),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            "loop" => Ok(Self::Loop),
            "normalize" | "norm" => Ok(Self::Normalize),
            "seek" => {
                let arg = required("seek")?;
                parse_position(&arg).map(Self::Seek)
            }
            "dir" | "cd" => required("dir").map(Self::Dir),
            "list" | "ls" => Ok(Self::List),
            "status" => Ok(Self::Status),
            "help" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Seconds, either plain (`75`, `75.5`) or `MM:SS`
fn parse_position(text: &str) -> Result<f64, CommandError> {
    let invalid = || CommandError::InvalidNumber(text.to_string());
    let seconds = match text.split_once(':') {
        Some((mins, secs)) => {
            let mins: f64 = mins.parse().map_err(|_| invalid())?;
            let secs: f64 = secs.parse().map_err(|_| invalid())?;
            mins * 60.0 + secs
        }
        None => text.parse().map_err(|_| invalid())?,
    };
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(seconds)
    } else {
        Err(invalid())
    }
}

pub const HELP: &str = "\
join | leave | play <file> | pause | resume | stop | loop | normalize
seek <seconds|MM:SS> | dir <folder> | list | status | help | quit";

/// Run a command and return the reply text
pub async fn execute(app: &AppState, command: Command) -> String {
    let controller = &app.controller;
    match command {
        Command::Join => {
            if controller.is_connected() {
                "Already connected.".to_string()
            } else {
                controller.join(app.sink.clone());
                "Joined. Phonograph Controller is ready!".to_string()
            }
        }
        Command::Leave => {
            if controller.leave_blocking().await {
                "Disconnected.".to_string()
            } else {
                "I'm not connected.".to_string()
            }
        }
        Command::Play(name) => {
            let path = app.resolve_track(&name);
            if !path.is_file() {
                return format!("No such file: {}", path.display());
            }
            if !controller.is_connected() {
                controller.join(app.sink.clone());
            }
            controller.play(path.clone(), 0.0).await;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(name);
            format!("Now playing (Stereo): {}", filename)
        }
        Command::Pause => {
            if controller.pause() {
                "Paused.".to_string()
            } else {
                "Nothing is playing.".to_string()
            }
        }
        Command::Resume => {
            if controller.resume() {
                "Resumed.".to_string()
            } else {
                "Audio is not paused.".to_string()
            }
        }
        Command::Stop => {
            if controller.stop_blocking().await {
                "Stopped playback.".to_string()
            } else {
                "Nothing is playing.".to_string()
            }
        }
        Command::Loop => {
            let status = if controller.toggle_looping() { "enabled" } else { "disabled" };
            format!("Looping is now {}.", status)
        }
        Command::Normalize => {
            let status = if controller.toggle_normalization() { "enabled" } else { "disabled" };
            format!("Normalization is now {}.", status)
        }
        Command::Seek(seconds) => {
            if controller.state().current_track().is_none() {
                return "Nothing is playing.".to_string();
            }
            controller.seek(seconds).await;
            format!("Seeked to {}.", format_time(seconds))
        }
        Command::Dir(dir) => {
            let path = std::path::PathBuf::from(dir);
            match app.open_directory(&path) {
                Ok(count) => format!("Opened {} ({} tracks).", path.display(), count),
                Err(e) => {
                    tracing::warn!("Invalid Path: {}", e);
                    format!("Invalid Path: {}", path.display())
                }
            }
        }
        Command::List => {
            let progress = app.tick();
            let library = app.library.lock();
            if library.entries().is_empty() {
                return format!("No audio files in {}", library.directory().display());
            }
            library
                .entries()
                .iter()
                .map(|(name, status)| {
                    let marker = match &progress.track {
                        Some(track) if track.file_name().is_some_and(|f| f == name.as_str()) => "> ",
                        _ => "  ",
                    };
                    format!("{}{}   ({})", marker, name, status.label())
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::Status => {
            let progress = app.tick();
            let track = progress
                .track
                .as_ref()
                .and_then(|t| t.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "-".to_string());
            let state = if progress.is_paused {
                "paused"
            } else if progress.is_playing {
                "playing"
            } else {
                "idle"
            };
            format!(
                "{} [{}] {}  loop: {}  normalized: {}",
                track,
                state,
                progress.label(),
                on_off(progress.is_looping),
                on_off(progress.is_normalized)
            )
        }
        Command::Help => HELP.to_string(),
        Command::Quit => "Bye.".to_string(),
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
