// Playback module
// Shared state, source selection and the controller driving the sink

pub mod clock;
pub mod controller;
pub mod source;
pub mod state;

pub use clock::{Clock, SystemClock};
pub use controller::{PlaybackController, PlaybackProgress};
pub use source::select_source;
pub use state::{OptimizationStatus, SharedPlayback};
