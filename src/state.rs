// Application state management
//
// Built once at startup and shared by the command loop and the UI ticker
// for the life of the process.
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::audio::sink::AudioSink;
use crate::error::{CommandError, SettingsError};
use crate::library::DirectoryScanner;
use crate::metadata::DurationProbe;
use crate::playback::{Clock, PlaybackController, PlaybackProgress, SharedPlayback};
use crate::settings::AppSettings;
use crate::transcode::{Encoder, OptimizationWorker, StatusBoard};

pub struct AppState {
    pub controller: PlaybackController,
    pub optimizer: OptimizationWorker,
    pub library: Mutex<StatusBoard>,
    /// Connection handed to the controller on `join`
    pub sink: Arc<dyn AudioSink>,
    pub settings: Mutex<AppSettings>,
    pub app_dir: PathBuf,
}

impl AppState {
    pub fn new(
        settings: AppSettings,
        app_dir: PathBuf,
        sink: Arc<dyn AudioSink>,
        encoder: Arc<dyn Encoder>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> Self {
        let cache = settings.cache_layout(&app_dir);
        let playback = SharedPlayback::new(cache.root());
        playback.set_looping(settings.playback.looping);
        playback.set_normalized(settings.playback.normalized);

        let controller = PlaybackController::new(
            playback.clone(),
            cache.clone(),
            DurationProbe::new(settings.tools.ffprobe.clone()),
            settings.playback.loudness,
            clock,
            runtime,
        );
        let optimizer = OptimizationWorker::new(playback, cache, encoder);

        Self {
            controller,
            optimizer,
            library: Mutex::new(StatusBoard::new(settings.music_directory())),
            sink,
            settings: Mutex::new(settings),
            app_dir,
        }
    }

    pub fn current_directory(&self) -> PathBuf {
        self.library.lock().directory().to_path_buf()
    }

    /// Show `directory` and start optimizing it. Returns the file count.
    pub fn open_directory(&self, directory: &Path) -> Result<usize, CommandError> {
        if !directory.is_dir() {
            return Err(CommandError::InvalidPath(directory.to_path_buf()));
        }

        let files = DirectoryScanner::scan(directory);
        let count = files.len();
        let listener = {
            let mut library = self.library.lock();
            library.show(directory, files);
            library.listener()
        };

        // Sweeps run detached; a newer sweep supersedes this one
        let _ = self.optimizer.start_optimization(directory, listener);
        self.settings.lock().music_directory = Some(directory.to_path_buf());
        Ok(count)
    }

    /// Resolve a track argument against the current folder
    pub fn resolve_track(&self, name: &str) -> PathBuf {
        let path = PathBuf::from(name);
        if path.is_absolute() {
            path
        } else {
            self.current_directory().join(path)
        }
    }

    /// One UI tick: apply sweep results, then read progress
    pub fn tick(&self) -> PlaybackProgress {
        let applied = self.library.lock().drain();
        if applied > 0 {
            tracing::debug!("Applied {} optimization updates", applied);
        }
        self.controller.progress()
    }

    /// Persist settings along with the current toggles
    pub fn save_settings(&self) -> Result<(), SettingsError> {
        let mut settings = self.settings.lock();
        settings.playback.looping = self.controller.state().is_looping();
        settings.playback.normalized = self.controller.state().is_normalized();
        settings.save(&self.app_dir)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::test_app;
    use crate::playback::OptimizationStatus;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_directory_and_tick() {
        let t = test_app(&["one.mp3", "two.wav", "readme.txt"]);
        assert_eq!(t.app.open_directory(&t.music_dir()).unwrap(), 2);

        for _ in 0..200 {
            t.app.tick();
            let done = t
                .app
                .library
                .lock()
                .entries()
                .iter()
                .all(|(_, status)| *status == OptimizationStatus::Optimized);
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let library = t.app.library.lock();
        assert_eq!(library.entries().len(), 2);
        assert!(library
            .entries()
            .iter()
            .all(|(_, status)| *status == OptimizationStatus::Optimized));
    }

    #[tokio::test]
    async fn test_open_invalid_directory_keeps_current() {
        let t = test_app(&[]);
        let before = t.app.current_directory();
        assert!(t.app.open_directory(&t.dir.path().join("missing")).is_err());
        assert_eq!(t.app.current_directory(), before);
    }

    #[tokio::test]
    async fn test_resolve_track() {
        let t = test_app(&[]);
        assert_eq!(t.app.resolve_track("a.mp3"), t.music_dir().join("a.mp3"));
        assert_eq!(
            t.app.resolve_track("/abs/b.mp3"),
            std::path::PathBuf::from("/abs/b.mp3")
        );
    }

    #[tokio::test]
    async fn test_save_settings_records_toggles() {
        let t = test_app(&[]);
        t.app.controller.set_looping(true);
        t.app.save_settings().unwrap();

        let saved = crate::settings::AppSettings::load(&t.app.app_dir).unwrap();
        assert!(saved.playback.looping);
        assert!(!saved.playback.normalized);
    }
}
