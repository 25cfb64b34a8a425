// Transcode module
// Background sweeps that fill the cache, and the status hand-off to the UI

pub mod encoder;
pub mod status;
pub mod worker;

pub use encoder::{Encoder, EncodingSettings, FfmpegEncoder};
pub use status::{StatusBoard, StatusEvent};
pub use worker::{OptimizationWorker, SweepHandle};
