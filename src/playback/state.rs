// Shared playback state
//
// One instance per process, created at startup and handed to everything
// that needs it. The command runtime, the UI ticker, sweep threads and sink
// completion callbacks all go through the accessors below.
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audio::sink::AudioSink;

/// Cache state of a file in the current folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OptimizationStatus {
    Pending,
    NotOptimized,
    Optimized,
}

impl From<bool> for OptimizationStatus {
    fn from(optimized: bool) -> Self {
        if optimized {
            Self::Optimized
        } else {
            Self::NotOptimized
        }
    }
}

impl OptimizationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Optimized => "[Optimised]",
            Self::Pending | Self::NotOptimized => "[Pending]",
        }
    }
}

pub struct PlaybackState {
    active_sink: Option<Arc<dyn AudioSink>>,
    is_looping: bool,
    current_track: Option<PathBuf>,
    total_duration: f64,
    playback_started_at: f64,
    elapsed_offset: f64,
    is_seeking: bool,
    frozen_elapsed: f64,
    suppress_next_completion: bool,
    /// Bumped by every track start and every stop
    playback_epoch: u64,
    is_normalized: bool,
    optimization_status: HashMap<String, OptimizationStatus>,
    optimization_generation: u64,
    cache_dir: PathBuf,
}

impl PlaybackState {
    fn new(cache_dir: PathBuf) -> Self {
        Self {
            active_sink: None,
            is_looping: false,
            current_track: None,
            total_duration: 0.0,
            playback_started_at: 0.0,
            elapsed_offset: 0.0,
            is_seeking: false,
            frozen_elapsed: 0.0,
            suppress_next_completion: false,
            playback_epoch: 0,
            is_normalized: false,
            optimization_status: HashMap::new(),
            optimization_generation: 0,
            cache_dir,
        }
    }
}

/// Values the controller needs after registering a new track
pub(crate) struct TrackStart {
    pub normalized: bool,
}

/// Cloneable handle to the process-wide playback state
#[derive(Clone)]
pub struct SharedPlayback {
    inner: Arc<Mutex<PlaybackState>>,
}

impl SharedPlayback {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlaybackState::new(cache_dir.into()))),
        }
    }

    // ===== Connection =====

    pub fn sink(&self) -> Option<Arc<dyn AudioSink>> {
        self.inner.lock().active_sink.clone()
    }

    pub fn set_sink(&self, sink: Option<Arc<dyn AudioSink>>) {
        self.inner.lock().active_sink = sink;
    }

    // ===== Toggles =====

    pub fn is_looping(&self) -> bool {
        self.inner.lock().is_looping
    }

    pub fn set_looping(&self, looping: bool) {
        self.inner.lock().is_looping = looping;
    }

    pub fn is_normalized(&self) -> bool {
        self.inner.lock().is_normalized
    }

    pub fn set_normalized(&self, normalized: bool) {
        self.inner.lock().is_normalized = normalized;
    }

    // ===== Track and timing =====

    pub fn current_track(&self) -> Option<PathBuf> {
        self.inner.lock().current_track.clone()
    }

    pub fn total_duration(&self) -> f64 {
        self.inner.lock().total_duration
    }

    pub fn elapsed_offset(&self) -> f64 {
        self.inner.lock().elapsed_offset
    }

    pub fn playback_started_at(&self) -> f64 {
        self.inner.lock().playback_started_at
    }

    pub fn playback_epoch(&self) -> u64 {
        self.inner.lock().playback_epoch
    }

    /// Register `track` as current, arming the suppress flag when the sink
    /// still holds an older source that is about to be stopped.
    ///
    /// With `expected_epoch` set this is a loop restart: it is dropped
    /// (returns `None`) if anything started or stopped since it was scheduled.
    pub(crate) fn begin_track(
        &self,
        track: &Path,
        duration: f64,
        seek_seconds: f64,
        interrupting: bool,
        expected_epoch: Option<u64>,
    ) -> Option<TrackStart> {
        let mut state = self.inner.lock();
        if let Some(epoch) = expected_epoch {
            if state.playback_epoch != epoch || state.current_track.as_deref() != Some(track) {
                return None;
            }
        }
        state.playback_epoch += 1;
        state.current_track = Some(track.to_path_buf());
        state.total_duration = duration;
        state.elapsed_offset = seek_seconds;
        if interrupting {
            state.suppress_next_completion = true;
        }
        Some(TrackStart {
            normalized: state.is_normalized,
        })
    }

    /// A new play request arrived; loop restarts scheduled before it are stale
    pub(crate) fn bump_epoch(&self) {
        self.inner.lock().playback_epoch += 1;
    }

    pub(crate) fn mark_started(&self, now: f64) {
        self.inner.lock().playback_started_at = now;
    }

    /// Freeze elapsed time at a pause
    pub(crate) fn fold_elapsed(&self, now: f64) {
        let mut state = self.inner.lock();
        state.elapsed_offset += now - state.playback_started_at;
    }

    pub(crate) fn clear_track(&self) {
        let mut state = self.inner.lock();
        state.playback_epoch += 1;
        state.current_track = None;
        state.total_duration = 0.0;
        state.elapsed_offset = 0.0;
    }

    /// Played seconds given whether the sink is currently playing
    pub fn elapsed(&self, now: f64, playing: bool) -> f64 {
        let state = self.inner.lock();
        if state.is_seeking {
            state.frozen_elapsed
        } else if playing {
            state.elapsed_offset + (now - state.playback_started_at)
        } else {
            state.elapsed_offset
        }
    }

    // ===== Seeking =====

    pub fn is_seeking(&self) -> bool {
        self.inner.lock().is_seeking
    }

    pub(crate) fn set_seeking(&self, seeking: bool, frozen_elapsed: f64) {
        let mut state = self.inner.lock();
        state.is_seeking = seeking;
        state.frozen_elapsed = frozen_elapsed;
    }

    // ===== Completion suppression =====

    pub fn suppress_next_completion(&self) -> bool {
        self.inner.lock().suppress_next_completion
    }

    /// Consume the suppress flag, returning whether it was set
    pub(crate) fn take_suppress(&self) -> bool {
        std::mem::take(&mut self.inner.lock().suppress_next_completion)
    }

    /// Track to restart after a natural end, if looping, with the epoch
    /// the restart has to match
    pub(crate) fn loop_restart(&self) -> Option<(PathBuf, u64)> {
        let state = self.inner.lock();
        if !state.is_looping {
            return None;
        }
        state
            .current_track
            .clone()
            .map(|track| (track, state.playback_epoch))
    }

    // ===== Optimization status =====

    pub fn cache_dir(&self) -> PathBuf {
        self.inner.lock().cache_dir.clone()
    }

    pub fn optimization_generation(&self) -> u64 {
        self.inner.lock().optimization_generation
    }

    /// Start a new sweep generation and forget the previous folder
    pub(crate) fn reset_optimization(&self, generation: u64) {
        let mut state = self.inner.lock();
        state.optimization_generation = generation;
        state.optimization_status.clear();
    }

    /// Record a status if `generation` is still current.
    /// Returns false for superseded sweeps.
    pub(crate) fn record_optimization(
        &self,
        generation: u64,
        filename: &str,
        status: OptimizationStatus,
    ) -> bool {
        let mut state = self.inner.lock();
        if state.optimization_generation != generation {
            return false;
        }
        state.optimization_status.insert(filename.to_string(), status);
        true
    }

    /// Status of a file; files never seen by the current sweep are pending
    pub fn optimization_status(&self, filename: &str) -> OptimizationStatus {
        self.inner
            .lock()
            .optimization_status
            .get(filename)
            .copied()
            .unwrap_or(OptimizationStatus::Pending)
    }

    pub fn optimization_snapshot(&self) -> HashMap<String, OptimizationStatus> {
        self.inner.lock().optimization_status.clone()
    }
}
