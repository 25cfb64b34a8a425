// Metadata module
// Duration probing for the progress display

pub mod duration;

pub use duration::{format_time, DurationProbe};
