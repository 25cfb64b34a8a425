// Phonograph - local audio playback controller
// Module declarations
pub mod app_dirs;
pub mod audio;
pub mod cache;
pub mod commands;
pub mod console;
pub mod error;
pub mod library;
pub mod logging;
pub mod metadata;
pub mod playback;
pub mod settings;
pub mod state;
pub mod transcode;

use anyhow::Context;
use std::sync::Arc;

use audio::output::AudioOutput;
use audio::LocalSink;
use playback::SystemClock;
use settings::AppSettings;
use state::AppState;
use transcode::FfmpegEncoder;

pub fn run() -> anyhow::Result<()> {
    let app_dir = app_dirs::app_root()?;
    if let Err(e) = logging::init(&app_dirs::logs_dir(&app_dir)) {
        eprintln!("Logging unavailable: {}", e);
    }

    let settings = AppSettings::load(&app_dir).unwrap_or_else(|e| {
        tracing::warn!("[Settings] {}; using defaults", e);
        AppSettings::default()
    });

    // Without an output device there is nothing to play into
    let output = AudioOutput::new().context("No usable audio output")?;
    let sink = LocalSink::new(Arc::new(output), settings.tools.ffmpeg.clone());
    sink.set_volume(settings.playback.volume);

    let encoder = FfmpegEncoder::new(settings.tools.ffmpeg.clone(), settings.encoding.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("phonograph-rt")
        .build()
        .context("Failed to start async runtime")?;

    let app = Arc::new(AppState::new(
        settings,
        app_dir,
        Arc::new(sink),
        Arc::new(encoder),
        Arc::new(SystemClock),
        runtime.handle().clone(),
    ));

    runtime.block_on(console::run(app))
}
