// Audio playback module
// ffmpeg decodes to PCM, cpal plays it

pub mod output;
pub mod player;
pub mod sink;
pub mod source;

pub use output::{PcmOutput, SampleQueue};
pub use player::LocalSink;
pub use sink::{AudioSink, CompletionHandler};
pub use source::{LoudnessTarget, PlaybackSource};
