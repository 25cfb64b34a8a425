// Playback source selection
use std::path::Path;

use crate::audio::source::{LoudnessTarget, PlaybackSource};
use crate::cache::CacheLayout;

/// Pick what to hand the sink for `track`.
///
/// 1. No normalization and a fresh artifact: play the artifact directly.
/// 2. No normalization, nothing fresh: re-encode the raw file.
/// 3. Normalization: filter the fresh artifact if there is one, else the raw file.
pub fn select_source(
    cache: &CacheLayout,
    track: &Path,
    normalization: Option<LoudnessTarget>,
    start_seconds: f64,
) -> PlaybackSource {
    let fresh = cache.is_optimized(track);

    match normalization {
        None if fresh => PlaybackSource::Cached {
            artifact: cache.cache_path_for(track),
            start_seconds,
        },
        None => PlaybackSource::Transcoded {
            source: track.to_path_buf(),
            start_seconds,
        },
        Some(target) => PlaybackSource::Normalized {
            input: if fresh {
                cache.cache_path_for(track)
            } else {
                track.to_path_buf()
            },
            start_seconds,
            target,
        },
    }
}
