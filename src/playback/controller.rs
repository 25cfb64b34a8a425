// Playback controller
// Start/stop/pause/resume/seek against the shared state and the active sink
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::audio::sink::{AudioSink, CompletionHandler};
use crate::audio::source::LoudnessTarget;
use crate::cache::CacheLayout;
use crate::metadata::{format_time, DurationProbe};
use crate::playback::clock::Clock;
use crate::playback::source::select_source;
use crate::playback::state::SharedPlayback;

/// Snapshot of playback for progress displays
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackProgress {
    pub track: Option<PathBuf>,
    pub elapsed: f64,
    pub total: f64,
    pub is_playing: bool,
    pub is_paused: bool,
    pub is_looping: bool,
    pub is_normalized: bool,
    pub is_seeking: bool,
}

impl PlaybackProgress {
    /// `MM:SS / MM:SS`
    pub fn label(&self) -> String {
        format!("{} / {}", format_time(self.elapsed), format_time(self.total))
    }
}

#[derive(Clone)]
pub struct PlaybackController {
    state: SharedPlayback,
    cache: CacheLayout,
    probe: DurationProbe,
    loudness: LoudnessTarget,
    clock: Arc<dyn Clock>,
    runtime: Handle,
}

impl PlaybackController {
    /// `runtime` is where looping restarts are scheduled; completion
    /// callbacks can fire on any thread.
    pub fn new(
        state: SharedPlayback,
        cache: CacheLayout,
        probe: DurationProbe,
        loudness: LoudnessTarget,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> Self {
        Self {
            state,
            cache,
            probe,
            loudness,
            clock,
            runtime,
        }
    }

    pub fn state(&self) -> &SharedPlayback {
        &self.state
    }

    pub fn cache(&self) -> &CacheLayout {
        &self.cache
    }

    // ===== Connection =====

    pub fn join(&self, sink: Arc<dyn AudioSink>) {
        self.state.set_sink(Some(sink));
    }

    /// Stop playback and drop the connection. Returns false if not connected.
    pub fn leave(&self) -> bool {
        if self.state.sink().is_none() {
            return false;
        }
        self.stop();
        self.state.set_sink(None);
        true
    }

    /// `leave` from async code; stopping a sink joins its threads
    pub async fn leave_blocking(&self) -> bool {
        let controller = self.clone();
        off_runtime(move || controller.leave()).await.unwrap_or(false)
    }

    pub fn is_connected(&self) -> bool {
        self.state.sink().is_some()
    }

    // ===== Transport =====

    /// Play `track` from `seek_seconds`, replacing whatever is playing.
    /// Does nothing without a connection.
    pub async fn play(&self, track: impl Into<PathBuf>, seek_seconds: f64) {
        self.start(track.into(), seek_seconds, None).await;
    }

    /// Loop restart scheduled by a completion handler. Dropped when a stop
    /// or another play happened after `epoch` was read.
    async fn play_if_current(&self, track: PathBuf, epoch: u64) {
        self.start(track, 0.0, Some(epoch)).await;
    }

    async fn start(&self, track: PathBuf, seek_seconds: f64, expected_epoch: Option<u64>) {
        let Some(sink) = self.state.sink() else {
            tracing::debug!("No connection, ignoring play for {}", track.display());
            return;
        };
        if expected_epoch.is_none() {
            self.state.bump_epoch();
        }
        let seek_seconds = seek_seconds.max(0.0);

        let duration = {
            let probe = self.probe.clone();
            let path = track.clone();
            off_runtime(move || probe.probe(&path)).await.unwrap_or(0.0)
        };

        let interrupting = sink.is_active();
        let begun = self
            .state
            .begin_track(&track, duration, seek_seconds, interrupting, expected_epoch);
        let Some(start) = begun else {
            tracing::debug!("Playback changed, dropping loop restart of {}", track.display());
            return;
        };
        if interrupting {
            let old = Arc::clone(&sink);
            off_runtime(move || old.stop()).await;
            // stop() has run the old handler; a flag still set was never consumed
            self.state.take_suppress();
        }

        let normalization = start.normalized.then_some(self.loudness);
        let source = select_source(&self.cache, &track, normalization, seek_seconds);
        tracing::info!(
            "Playing {} via {:?} from {:.1}s",
            track.display(),
            source.input(),
            seek_seconds
        );

        let on_complete = self.completion_handler();
        match off_runtime(move || sink.play(source, on_complete)).await {
            Some(Ok(())) => self.state.mark_started(self.clock.now()),
            Some(Err(e)) => tracing::error!("Playback error for {}: {}", track.display(), e),
            None => {}
        }
    }

    /// Handler run once when the started source ends or is stopped
    fn completion_handler(&self) -> CompletionHandler {
        let controller = self.clone();
        Box::new(move |error| {
            if let Some(error) = error {
                tracing::warn!("Player error: {}", error);
            }

            // Operator switched tracks or stopped
            if controller.state.take_suppress() {
                tracing::debug!("Completion suppressed");
                return;
            }

            if let Some((track, epoch)) = controller.state.loop_restart() {
                tracing::debug!("Looping {}", track.display());
                let runtime = controller.runtime.clone();
                runtime.spawn(async move {
                    controller.play_if_current(track, epoch).await;
                });
            }
        })
    }

    /// Pause if playing. Returns whether anything was paused.
    pub fn pause(&self) -> bool {
        let Some(sink) = self.state.sink() else {
            return false;
        };
        if !sink.is_playing() {
            return false;
        }
        self.state.fold_elapsed(self.clock.now());
        sink.pause();
        true
    }

    /// Resume if paused. Returns whether anything was resumed.
    pub fn resume(&self) -> bool {
        let Some(sink) = self.state.sink() else {
            return false;
        };
        if !sink.is_paused() {
            return false;
        }
        self.state.mark_started(self.clock.now());
        sink.resume();
        true
    }

    /// Clear the current track and stop the sink.
    /// Returns whether something was playing or paused.
    pub fn stop(&self) -> bool {
        // Cleared first so the completion handler has nothing to loop
        self.state.clear_track();
        match self.state.sink() {
            Some(sink) => {
                let was_active = sink.is_active();
                sink.stop();
                was_active
            }
            None => false,
        }
    }

    /// `stop` from async code; stopping a sink joins its threads
    pub async fn stop_blocking(&self) -> bool {
        let controller = self.clone();
        off_runtime(move || controller.stop()).await.unwrap_or(false)
    }

    /// Restart the current track at `seconds`
    pub async fn seek(&self, seconds: f64) {
        match self.state.current_track() {
            Some(track) => self.play(track, seconds).await,
            None => tracing::debug!("Seek with no current track"),
        }
    }

    /// Freeze reported progress while the user scrubs
    pub fn begin_seek(&self) {
        let elapsed = self.progress().elapsed;
        self.state.set_seeking(true, elapsed);
    }

    /// Seek to where the scrub ended and unfreeze progress
    pub async fn finish_seek(&self, seconds: f64) {
        self.seek(seconds).await;
        self.state.set_seeking(false, 0.0);
    }

    // ===== Toggles =====

    pub fn set_looping(&self, looping: bool) {
        self.state.set_looping(looping);
    }

    pub fn toggle_looping(&self) -> bool {
        let looping = !self.state.is_looping();
        self.state.set_looping(looping);
        looping
    }

    pub fn set_normalization(&self, normalized: bool) {
        self.state.set_normalized(normalized);
    }

    pub fn toggle_normalization(&self) -> bool {
        let normalized = !self.state.is_normalized();
        self.state.set_normalized(normalized);
        normalized
    }

    // ===== Progress =====

    pub fn progress(&self) -> PlaybackProgress {
        let (is_playing, is_paused) = self
            .state
            .sink()
            .map(|sink| (sink.is_playing(), sink.is_paused()))
            .unwrap_or((false, false));
        let now = self.clock.now();

        PlaybackProgress {
            track: self.state.current_track(),
            elapsed: self.state.elapsed(now, is_playing),
            total: self.state.total_duration(),
            is_playing,
            is_paused,
            is_looping: self.state.is_looping(),
            is_normalized: self.state.is_normalized(),
            is_seeking: self.state.is_seeking(),
        }
    }
}

/// Run blocking sink or probe work on the blocking pool.
/// `None` if the task panicked.
async fn off_runtime<T, F>(work: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!("Blocking playback task failed: {}", e);
            None
        }
    }
}
