// Settings management and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::source::LoudnessTarget;
use crate::cache::CacheLayout;
use crate::error::SettingsError;
use crate::transcode::encoder::EncodingSettings;

/// External tool locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub looping: bool,
    pub normalized: bool,
    pub loudness: LoudnessTarget,
    pub volume: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            looping: false,
            normalized: false,
            loudness: LoudnessTarget::default(),
            volume: 1.0,
        }
    }
}

/// Interface settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceSettings {
    pub tick_interval_ms: u64,
}

impl Default for InterfaceSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub version: i32, // Settings schema version for future migrations
    pub music_directory: Option<PathBuf>,
    pub cache_directory: Option<PathBuf>,
    pub tools: ToolSettings,
    pub encoding: EncodingSettings,
    pub playback: PlaybackSettings,
    pub interface: InterfaceSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: 1,
            music_directory: None,
            cache_directory: None,
            tools: ToolSettings::default(),
            encoding: EncodingSettings::default(),
            playback: PlaybackSettings::default(),
            interface: InterfaceSettings::default(),
        }
    }
}

impl AppSettings {
    /// Get the settings file path
    pub fn get_settings_path(app_dir: &Path) -> PathBuf {
        app_dir.join("settings.json")
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(app_dir: &Path) -> Result<Self, SettingsError> {
        let path = Self::get_settings_path(app_dir);

        if !path.exists() {
            tracing::info!("[Settings] No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .map_err(|source| SettingsError::Read { path: path.clone(), source })?;

        let settings: AppSettings = serde_json::from_str(&content)?;

        tracing::info!("[Settings] Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &Path) -> Result<(), SettingsError> {
        let path = Self::get_settings_path(app_dir);

        // Ensure directory exists
        fs::create_dir_all(app_dir)
            .map_err(|source| SettingsError::Write { path: path.clone(), source })?;

        let content = serde_json::to_string_pretty(self)?;

        fs::write(&path, content)
            .map_err(|source| SettingsError::Write { path: path.clone(), source })?;

        tracing::info!("[Settings] Saved settings to {:?}", path);
        Ok(())
    }

    /// Cache location, defaulting to the hidden folder in `app_dir`
    pub fn cache_layout(&self, app_dir: &Path) -> CacheLayout {
        match &self.cache_directory {
            Some(dir) => CacheLayout::new(dir.clone()),
            None => CacheLayout::in_app_dir(app_dir),
        }
    }

    /// Folder opened at startup
    pub fn music_directory(&self) -> PathBuf {
        self.music_directory
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
