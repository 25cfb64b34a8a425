// Sink-capable connection abstraction
use crate::audio::source::PlaybackSource;
use crate::error::SinkError;

/// Called once when a started source finishes naturally or is stopped.
/// Receives the playback error, if any. May run on any thread.
pub type CompletionHandler = Box<dyn FnOnce(Option<String>) + Send + 'static>;

/// Destination that consumes decoded audio.
///
/// `stop` is synchronous: when it returns, the completion handler of the
/// stopped source has already run.
pub trait AudioSink: Send + Sync {
    fn is_playing(&self) -> bool;
    fn is_paused(&self) -> bool;
    fn play(&self, source: PlaybackSource, on_complete: CompletionHandler) -> Result<(), SinkError>;
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);

    /// Playing or paused
    fn is_active(&self) -> bool {
        self.is_playing() || self.is_paused()
    }
}
