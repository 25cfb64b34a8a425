// Transcode cache addressing
// Artifacts are never deleted here; stale ones are simply re-encoded

pub mod layout;

pub use layout::{CacheLayout, ARTIFACT_EXTENSION, CACHE_DIR_NAME};
