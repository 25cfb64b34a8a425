// Console front end
// Reads commands from stdin and runs the UI ticker alongside
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::commands::{self, Command, HELP};
use crate::state::AppState;

const MIN_TICK_MS: u64 = 50;

pub async fn run(app: Arc<AppState>) -> anyhow::Result<()> {
    let directory = app.current_directory();
    match app.open_directory(&directory) {
        Ok(count) => println!(
            "Phonograph ready in {} ({} tracks). Type `help` for commands.",
            directory.display(),
            count
        ),
        Err(e) => {
            tracing::warn!("Could not open {}: {}", directory.display(), e);
            println!("Phonograph ready. Use `dir <folder>` to pick a music folder.");
        }
    }

    let ticker = spawn_ticker(Arc::clone(&app));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => println!("{}", commands::execute(&app, command).await),
            Err(e) => println!("{}\n{}", e, HELP),
        }
    }

    ticker.abort();
    app.controller.leave_blocking().await;
    if let Err(e) = app.save_settings() {
        tracing::warn!("Failed to save settings: {}", e);
    }
    Ok(())
}

/// UI timer: applies sweep results and refreshes progress at a fixed cadence
fn spawn_ticker(app: Arc<AppState>) -> JoinHandle<()> {
    let tick_ms = app.settings.lock().interface.tick_interval_ms.max(MIN_TICK_MS);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_track = None;

        loop {
            interval.tick().await;
            let progress = app.tick();

            if progress.track != last_track {
                if let Some(track) = &progress.track {
                    tracing::info!("Now playing {}", track.display());
                }
                last_track = progress.track.clone();
            }
            if progress.is_playing && !progress.is_seeking {
                tracing::trace!("{}", progress.label());
            }
        }
    })
}
