// Background optimization sweeps
//
// A sweep walks one folder, reports which files already have a fresh
// artifact, then encodes the rest. Each sweep gets a generation number; only
// the newest generation may write status or call its listener.
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::cache::CacheLayout;
use crate::library::DirectoryScanner;
use crate::playback::state::{OptimizationStatus, SharedPlayback};
use crate::transcode::encoder::Encoder;

/// Handle to a running sweep
pub struct SweepHandle {
    generation: u64,
    thread: Option<JoinHandle<()>>,
}

impl SweepHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the sweep thread to finish
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Optimization sweep {} panicked", self.generation);
            }
        }
    }
}

#[derive(Default)]
struct SweepRegistry {
    last_generation: u64,
    running: HashMap<u64, PathBuf>,
}

#[derive(Clone)]
pub struct OptimizationWorker {
    state: SharedPlayback,
    cache: CacheLayout,
    encoder: Arc<dyn Encoder>,
    sweeps: Arc<Mutex<SweepRegistry>>,
}

impl OptimizationWorker {
    pub fn new(state: SharedPlayback, cache: CacheLayout, encoder: Arc<dyn Encoder>) -> Self {
        Self {
            state,
            cache,
            encoder,
            sweeps: Arc::new(Mutex::new(SweepRegistry::default())),
        }
    }

    /// Start a sweep over `directory` on its own thread and return at once.
    ///
    /// Clears the status map and supersedes any earlier sweep.
    /// `on_file_status` runs on the sweep thread.
    pub fn start_optimization<F>(&self, directory: impl Into<PathBuf>, on_file_status: F) -> SweepHandle
    where
        F: Fn(&str, bool) + Send + 'static,
    {
        let directory = directory.into();
        let key = sweep_key(&directory);
        let generation = {
            let mut sweeps = self.sweeps.lock();
            sweeps.last_generation += 1;
            let generation = sweeps.last_generation;
            self.state.reset_optimization(generation);
            sweeps.running.insert(generation, key);
            generation
        };

        let worker = self.clone();
        let sweep_dir = directory.clone();
        let spawned = thread::Builder::new()
            .name(format!("optimizer-{}", generation))
            .spawn(move || {
                worker.run_sweep(generation, &sweep_dir, &on_file_status);
                worker.sweeps.lock().running.remove(&generation);
            });

        match spawned {
            Ok(thread) => SweepHandle {
                generation,
                thread: Some(thread),
            },
            Err(e) => {
                tracing::error!("Failed to start optimization for {}: {}", directory.display(), e);
                self.sweeps.lock().running.remove(&generation);
                SweepHandle {
                    generation,
                    thread: None,
                }
            }
        }
    }

    /// Generation allowed to report status
    pub fn current_generation(&self) -> u64 {
        self.state.optimization_generation()
    }

    /// Whether a sweep over `directory` is still running, however the
    /// path was spelled
    pub fn is_sweep_running(&self, directory: &Path) -> bool {
        let key = sweep_key(directory);
        self.sweeps.lock().running.values().any(|dir| *dir == key)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.optimization_generation() == generation
    }

    fn run_sweep(&self, generation: u64, directory: &Path, on_file_status: &dyn Fn(&str, bool)) {
        let files = DirectoryScanner::scan(directory);
        tracing::info!(
            "Optimization sweep {} over {} files in {}",
            generation,
            files.len(),
            directory.display()
        );

        // First pass: report what is already cached
        let mut pending = Vec::new();
        for filename in &files {
            let optimized = self.cache.is_optimized(&directory.join(filename));
            if !self.state.record_optimization(generation, filename, optimized.into()) {
                tracing::debug!("Sweep {} superseded during status pass", generation);
                return;
            }
            on_file_status(filename, optimized);
            if !optimized {
                pending.push(filename);
            }
        }

        // Second pass: encode the rest
        for filename in pending {
            if !self.is_current(generation) {
                tracing::debug!("Sweep {} superseded, stopping", generation);
                return;
            }

            let source = directory.join(filename);
            tracing::info!("Optimizing: {}", filename);

            let success = match self.cache.ensure_cache_directory() {
                Ok(_) => self.encoder.transcode(&source, &self.cache.cache_path_for(&source)),
                Err(e) => {
                    tracing::warn!("Cannot create cache directory for {}: {}", filename, e);
                    false
                }
            };

            if !success {
                tracing::warn!("Leaving {} unoptimized", filename);
                continue;
            }

            if self
                .state
                .record_optimization(generation, filename, OptimizationStatus::Optimized)
            {
                on_file_status(filename, true);
            }
        }

        tracing::info!("Optimization complete for {}", directory.display());
    }
}

fn sweep_key(directory: &Path) -> PathBuf {
    std::path::absolute(directory).unwrap_or_else(|_| directory.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::{Duration, SystemTime};

    /// Writes a dummy artifact unless the file name is in `fail`
    #[derive(Default)]
    struct FakeEncoder {
        fail: Vec<String>,
        calls: AtomicUsize,
        gate: Option<(Barrier, Barrier)>,
        gated: AtomicBool,
    }

    impl FakeEncoder {
        fn failing(names: &[&str]) -> Self {
            Self {
                fail: names.iter().map(|n| n.to_string()).collect(),
                ..Default::default()
            }
        }

        /// First call blocks until the test releases it
        fn gated() -> Self {
            Self {
                gate: Some((Barrier::new(2), Barrier::new(2))),
                ..Default::default()
            }
        }
    }

    impl Encoder for FakeEncoder {
        fn transcode(&self, source: &Path, target: &Path) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((entered, release)) = &self.gate {
                if !self.gated.swap(true, Ordering::SeqCst) {
                    entered.wait();
                    release.wait();
                }
            }
            let name = source.file_name().unwrap().to_string_lossy().to_string();
            if self.fail.contains(&name) {
                return false;
            }
            fs::write(target, b"opus").is_ok()
        }
    }

    type Events = Arc<Mutex<Vec<(String, bool)>>>;

    fn recorder() -> (Events, impl Fn(&str, bool) + Send + 'static) {
        let events: Events = Arc::default();
        let sink = Arc::clone(&events);
        (events, move |name: &str, optimized: bool| {
            sink.lock().push((name.to_string(), optimized));
        })
    }

    fn setup(encoder: Arc<FakeEncoder>) -> (tempfile::TempDir, OptimizationWorker, SharedPlayback) {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheLayout::new(dir.path().join("cache"));
        let state = SharedPlayback::new(cache.root());
        let worker = OptimizationWorker::new(state.clone(), cache, encoder);
        (dir, worker, state)
    }

    fn event(name: &str, optimized: bool) -> (String, bool) {
        (name.to_string(), optimized)
    }

    #[test]
    fn test_partial_batch_failure_continues() {
        let encoder = Arc::new(FakeEncoder::failing(&["2.mp3"]));
        let (dir, worker, state) = setup(encoder.clone());
        let music = dir.path().join("music");
        fs::create_dir(&music).unwrap();
        for name in ["1.mp3", "2.mp3", "3.mp3"] {
            fs::write(music.join(name), b"audio").unwrap();
        }

        let (events, listener) = recorder();
        worker.start_optimization(&music, listener).join();

        assert_eq!(
            *events.lock(),
            vec![
                event("1.mp3", false),
                event("2.mp3", false),
                event("3.mp3", false),
                event("1.mp3", true),
                event("3.mp3", true),
            ]
        );
        assert_eq!(state.optimization_status("1.mp3"), OptimizationStatus::Optimized);
        assert_eq!(state.optimization_status("2.mp3"), OptimizationStatus::NotOptimized);
        assert_eq!(state.optimization_status("3.mp3"), OptimizationStatus::Optimized);
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_end_to_end_optimize_then_stale() {
        let encoder = Arc::new(FakeEncoder::default());
        let (dir, worker, _state) = setup(encoder.clone());
        let music = dir.path().join("music");
        fs::create_dir(&music).unwrap();
        let track = music.join("track.mp3");
        fs::write(&track, b"audio").unwrap();

        let (events, listener) = recorder();
        worker.start_optimization(&music, listener).join();
        assert_eq!(
            *events.lock(),
            vec![event("track.mp3", false), event("track.mp3", true)]
        );

        let cache = CacheLayout::new(dir.path().join("cache"));
        assert!(cache.is_optimized(&track));

        // Already fresh: a second sweep reports it and encodes nothing
        let (events, listener) = recorder();
        worker.start_optimization(&music, listener).join();
        assert_eq!(*events.lock(), vec![event("track.mp3", true)]);
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 1);

        // Editing the source makes the artifact stale
        File::options()
            .write(true)
            .open(&track)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        assert!(!cache.is_optimized(&track));
    }

    #[test]
    fn test_superseded_sweep_is_discarded() {
        let encoder = Arc::new(FakeEncoder::gated());
        let (dir, worker, state) = setup(encoder.clone());
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        fs::create_dir(&first).unwrap();
        fs::create_dir(&second).unwrap();
        fs::write(first.join("a.mp3"), b"audio").unwrap();
        fs::write(first.join("b.mp3"), b"audio").unwrap();

        let (old_events, old_listener) = recorder();
        let old = worker.start_optimization(&first, old_listener);

        let (entered, release) = encoder.gate.as_ref().unwrap();
        entered.wait();
        assert!(worker.is_sweep_running(&first));

        let (new_events, new_listener) = recorder();
        let new = worker.start_optimization(&second, new_listener);
        assert_eq!(worker.current_generation(), new.generation());
        new.join();

        release.wait();
        old.join();

        // Only the status pass of the old sweep got through
        assert_eq!(
            *old_events.lock(),
            vec![event("a.mp3", false), event("b.mp3", false)]
        );
        assert!(new_events.lock().is_empty());
        assert!(state.optimization_snapshot().is_empty());
        // The old sweep stopped before encoding its second file
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 1);
        assert!(!worker.is_sweep_running(&first));
    }

    #[test]
    fn test_missing_directory_reports_nothing() {
        let (dir, worker, _state) = setup(Arc::new(FakeEncoder::default()));
        let (events, listener) = recorder();
        worker
            .start_optimization(dir.path().join("nope"), listener)
            .join();
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_sweep_lookup_ignores_path_spelling() {
        let encoder = Arc::new(FakeEncoder::gated());
        let (_dir, worker, _state) = setup(encoder.clone());

        // Relative to the working directory on purpose
        let music = tempfile::Builder::new()
            .prefix("sweep-lookup")
            .tempdir_in(".")
            .unwrap();
        fs::write(music.path().join("a.mp3"), b"audio").unwrap();
        let name = music.path().file_name().unwrap().to_owned();

        let sweep = worker.start_optimization(Path::new(".").join(&name), |_: &str, _: bool| {});
        let (entered, release) = encoder.gate.as_ref().unwrap();
        entered.wait();

        let absolute = std::env::current_dir().unwrap().join(&name);
        assert!(worker.is_sweep_running(&absolute));
        assert!(worker.is_sweep_running(Path::new(&name)));
        assert!(worker.is_sweep_running(&PathBuf::from(format!("{}/", name.to_string_lossy()))));
        assert!(!worker.is_sweep_running(Path::new("elsewhere")));

        release.wait();
        sweep.join();
        assert!(!worker.is_sweep_running(&absolute));
    }
}
