// External encoder invocation
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Target format of cache artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingSettings {
    pub codec: String,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub channels: u8,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            codec: "libopus".to_string(),
            bitrate_kbps: 128,
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

/// Produces a cache artifact from a source file.
/// Failures are reported as `false`, never raised.
pub trait Encoder: Send + Sync {
    fn transcode(&self, source: &Path, target: &Path) -> bool;
}

/// Runs ffmpeg as a black box
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
    settings: EncodingSettings,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>, settings: EncodingSettings) -> Self {
        Self {
            binary: binary.into(),
            settings,
        }
    }

    fn args(&self, source: &Path, target: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-nostdin".to_string(),
            "-i".to_string(),
            source.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-c:a".to_string(),
            self.settings.codec.clone(),
            "-b:a".to_string(),
            format!("{}k", self.settings.bitrate_kbps),
            "-ar".to_string(),
            self.settings.sample_rate.to_string(),
            "-ac".to_string(),
            self.settings.channels.to_string(),
            target.to_string_lossy().into_owned(),
        ]
    }
}

/// Sibling path the encoder writes to before the artifact is renamed into
/// place. Keeps the real extension so ffmpeg still picks the container.
fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".partial-{}", name))
}

impl Encoder for FfmpegEncoder {
    fn transcode(&self, source: &Path, target: &Path) -> bool {
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        let partial = partial_path(target);

        let output = Command::new(&self.binary)
            .args(self.args(source, &partial))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();

        let result = match output {
            Ok(output) if output.status.success() => {
                fs::rename(&partial, target).map_err(|e| format!("Failed to move artifact into place: {}", e))
            }
            Ok(output) => Err(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )),
            Err(e) => Err(format!("Failed to run {}: {}", self.binary.display(), e)),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Transcoding error for {}: {}", filename, e);
                let _ = fs::remove_file(&partial);
                false
            }
        }
    }
}
