// Track duration probing and time formatting
use lofty::prelude::AudioFile;
use lofty::probe::Probe;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Probes media duration, reading container properties with lofty and
/// falling back to ffprobe for anything lofty can't parse.
#[derive(Debug, Clone)]
pub struct DurationProbe {
    ffprobe: PathBuf,
}

impl Default for DurationProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl DurationProbe {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }

    /// Duration of `path` in seconds, or 0.0 when it can't be determined.
    pub fn probe(&self, path: &Path) -> f64 {
        match Self::from_tags(path) {
            Ok(seconds) if seconds > 0.0 => return seconds,
            Ok(_) => {}
            Err(e) => tracing::debug!("lofty could not read {}: {}", path.display(), e),
        }

        match self.from_ffprobe(path) {
            Ok(seconds) => seconds,
            Err(e) => {
                tracing::warn!("Error getting duration for {}: {}", path.display(), e);
                0.0
            }
        }
    }

    fn from_tags(path: &Path) -> Result<f64, lofty::error::LoftyError> {
        let tagged_file = Probe::open(path)?.guess_file_type()?.read()?;
        Ok(tagged_file.properties().duration().as_secs_f64())
    }

    fn from_ffprobe(&self, path: &Path) -> anyhow::Result<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            anyhow::bail!("ffprobe exited with {}", output.status);
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let seconds: f64 = text.trim().parse()?;
        Ok(seconds.max(0.0))
    }
}

/// Format seconds as MM:SS (minutes are not wrapped at the hour)
pub fn format_time(seconds: f64) -> String {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "00:00");
        assert_eq!(format_time(59.9), "00:59");
        assert_eq!(format_time(61.0), "01:01");
        assert_eq!(format_time(3725.0), "62:05");
        assert_eq!(format_time(-3.0), "00:00");
        assert_eq!(format_time(f64::NAN), "00:00");
    }

    #[test]
    fn test_probe_missing_file_is_zero() {
        let probe = DurationProbe::new("phonograph-test-no-such-ffprobe");
        assert_eq!(probe.probe(Path::new("/definitely/not/here.mp3")), 0.0);
    }
}
