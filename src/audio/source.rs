// Playback sources handed to an audio sink
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// EBU R128 loudness normalization target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessTarget {
    /// Integrated loudness in LUFS
    pub integrated_lufs: f64,
    /// True peak in dBTP
    pub true_peak_db: f64,
    /// Loudness range in LU
    pub loudness_range: f64,
}

impl Default for LoudnessTarget {
    fn default() -> Self {
        Self {
            integrated_lufs: -16.0,
            true_peak_db: -1.5,
            loudness_range: 11.0,
        }
    }
}

impl LoudnessTarget {
    /// The ffmpeg `loudnorm` filter expression for this target
    pub fn filter(&self) -> String {
        format!(
            "loudnorm=I={}:TP={}:LRA={}",
            self.integrated_lufs, self.true_peak_db, self.loudness_range
        )
    }
}

/// What the sink should decode, and how.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackSource {
    /// Fresh cached artifact, played without re-encoding
    Cached { artifact: PathBuf, start_seconds: f64 },
    /// Raw source file re-encoded on the fly
    Transcoded { source: PathBuf, start_seconds: f64 },
    /// Best available input run through the loudness filter
    Normalized {
        input: PathBuf,
        start_seconds: f64,
        target: LoudnessTarget,
    },
}

impl PlaybackSource {
    pub fn input(&self) -> &Path {
        match self {
            Self::Cached { artifact, .. } => artifact,
            Self::Transcoded { source, .. } => source,
            Self::Normalized { input, .. } => input,
        }
    }

    pub fn start_seconds(&self) -> f64 {
        match self {
            Self::Cached { start_seconds, .. }
            | Self::Transcoded { start_seconds, .. }
            | Self::Normalized { start_seconds, .. } => *start_seconds,
        }
    }

    pub fn audio_filter(&self) -> Option<String> {
        match self {
            Self::Normalized { target, .. } => Some(target.filter()),
            _ => None,
        }
    }

    /// ffmpeg arguments decoding this source to interleaved stereo f32 PCM
    /// on stdout at `sample_rate`.
    ///
    /// The start offset goes before `-i` so the seek happens at the
    /// container level.
    pub fn decode_args(&self, sample_rate: u32) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let start = self.start_seconds();
        if start > 0.0 {
            args.push("-ss".to_string());
            args.push(format!("{:.3}", start));
        }

        args.push("-i".to_string());
        args.push(self.input().to_string_lossy().into_owned());

        if let Some(filter) = self.audio_filter() {
            args.push("-af".to_string());
            args.push(filter);
        }

        args.extend(
            [
                "-ac".to_string(),
                "2".to_string(),
                "-ar".to_string(),
                sample_rate.to_string(),
                "-f".to_string(),
                "f32le".to_string(),
                "pipe:1".to_string(),
            ]
            .into_iter(),
        );
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loudnorm_filter() {
        assert_eq!(
            LoudnessTarget::default().filter(),
            "loudnorm=I=-16:TP=-1.5:LRA=11"
        );
    }

    #[test]
    fn test_decode_args_seek_before_input() {
        let source = PlaybackSource::Cached {
            artifact: PathBuf::from("/cache/abc_song.mp3.opus"),
            start_seconds: 12.5,
        };
        let args = source.decode_args(44_100);
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args[ss + 1], "12.500");
        assert!(!args.contains(&"-af".to_string()));
        assert_eq!(args.last().unwrap(), "pipe:1");
        assert!(args.windows(2).any(|w| w[0] == "-ar" && w[1] == "44100"));
    }

    #[test]
    fn test_decode_args_normalized() {
        let source = PlaybackSource::Normalized {
            input: PathBuf::from("/music/song.mp3"),
            start_seconds: 0.0,
            target: LoudnessTarget::default(),
        };
        let args = source.decode_args(48_000);
        assert!(!args.contains(&"-ss".to_string()));
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-af" && w[1].starts_with("loudnorm=")));
        assert!(args.windows(2).any(|w| w[0] == "-ac" && w[1] == "2"));
    }
}
