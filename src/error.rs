// Error types shared across the crate
use std::path::PathBuf;

/// Failures raised by an audio sink when starting playback
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("no audio output device available")]
    NoOutputDevice,
    #[error("audio output error: {0}")]
    Output(String),
    #[error("failed to start decoder {binary}: {source}")]
    DecoderSpawn {
        binary: PathBuf,
        source: std::io::Error,
    },
}

/// Failures while loading or saving settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors surfaced to the command front end
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("missing argument for {0}")]
    MissingArgument(&'static str),
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    #[error("not a folder: {}", .0.display())]
    InvalidPath(PathBuf),
}
