// Hand-off of sweep results to the UI tick
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::playback::state::OptimizationStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub directory: PathBuf,
    pub filename: String,
    pub optimized: bool,
}

/// The file list as the UI shows it.
///
/// Sweep threads only push events into the channel; the owner applies them
/// on its own tick with `drain`.
pub struct StatusBoard {
    directory: PathBuf,
    entries: Vec<(String, OptimizationStatus)>,
    tx: UnboundedSender<StatusEvent>,
    rx: UnboundedReceiver<StatusEvent>,
}

impl StatusBoard {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            directory: directory.into(),
            entries: Vec::new(),
            tx,
            rx,
        }
    }

    /// Switch to `directory`, listing `files` as pending
    pub fn show(&mut self, directory: impl Into<PathBuf>, files: Vec<String>) {
        self.directory = directory.into();
        self.entries = files
            .into_iter()
            .map(|name| (name, OptimizationStatus::Pending))
            .collect();
    }

    /// Callback for `OptimizationWorker::start_optimization`, tagged with
    /// the directory currently shown
    pub fn listener(&self) -> impl Fn(&str, bool) + Send + 'static {
        let tx = self.tx.clone();
        let directory = self.directory.clone();
        move |filename: &str, optimized: bool| {
            let _ = tx.send(StatusEvent {
                directory: directory.clone(),
                filename: filename.to_string(),
                optimized,
            });
        }
    }

    /// Apply queued events. Events for another folder or unknown files
    /// are dropped. Returns how many were applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.rx.try_recv() {
            if event.directory != self.directory {
                continue;
            }
            if let Some(entry) = self.entries.iter_mut().find(|(name, _)| *name == event.filename) {
                entry.1 = event.optimized.into();
                applied += 1;
            }
        }
        applied
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn entries(&self) -> &[(String, OptimizationStatus)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_applies_current_folder_only() {
        let mut board = StatusBoard::new("/music/old");
        board.show("/music/old", vec!["a.mp3".to_string()]);
        let stale = board.listener();

        board.show("/music/new", vec!["a.mp3".to_string(), "b.mp3".to_string()]);
        let current = board.listener();

        stale("a.mp3", true);
        current("b.mp3", false);
        current("b.mp3", true);
        current("zzz.mp3", true);

        assert_eq!(board.drain(), 2);
        assert_eq!(
            board.entries(),
            &[
                ("a.mp3".to_string(), OptimizationStatus::Pending),
                ("b.mp3".to_string(), OptimizationStatus::Optimized),
            ]
        );
        assert_eq!(board.drain(), 0);
    }

    #[test]
    fn test_listener_is_usable_from_another_thread() {
        let mut board = StatusBoard::new("/music");
        board.show("/music", vec!["a.mp3".to_string()]);
        let listener = board.listener();
        std::thread::spawn(move || listener("a.mp3", true)).join().unwrap();
        assert_eq!(board.drain(), 1);
        assert_eq!(board.entries()[0].1, OptimizationStatus::Optimized);
    }
}
