// Local audio sink
// ffmpeg decodes the selected source to PCM, a feeder thread pushes it into
// the cpal ring buffer.
use parking_lot::Mutex;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::output::{remix_stereo, PcmOutput};
use crate::audio::sink::{AudioSink, CompletionHandler};
use crate::audio::source::PlaybackSource;
use crate::error::SinkError;

/// Bytes in one interleaved stereo f32 frame
const FRAME_BYTES: usize = 2 * 4;

const READ_CHUNK: usize = 16 * 1024;

struct ActivePlayback {
    interrupt: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    decoder: Arc<Mutex<Child>>,
    feeder: Option<JoinHandle<()>>,
}

pub struct LocalSink {
    output: Arc<dyn PcmOutput>,
    ffmpeg: PathBuf,
    current: Mutex<Option<ActivePlayback>>,
}

impl LocalSink {
    pub fn new(output: Arc<dyn PcmOutput>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            output,
            ffmpeg: ffmpeg.into(),
            current: Mutex::new(None),
        }
    }

    pub fn set_volume(&self, volume: f32) {
        self.output.set_volume(volume);
    }

    fn is_running(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map(|active| !active.finished.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn spawn_decoder(&self, source: &PlaybackSource) -> Result<(Child, ChildStdout), SinkError> {
        let mut child = Command::new(&self.ffmpeg)
            .args(source.decode_args(self.output.sample_rate()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SinkError::DecoderSpawn {
                binary: self.ffmpeg.clone(),
                source,
            })?;

        match child.stdout.take() {
            Some(stdout) => Ok((child, stdout)),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(SinkError::Output("Decoder has no stdout".to_string()))
            }
        }
    }
}

impl AudioSink for LocalSink {
    fn is_playing(&self) -> bool {
        self.is_running() && !self.output.is_paused()
    }

    fn is_paused(&self) -> bool {
        self.is_running() && self.output.is_paused()
    }

    fn play(&self, source: PlaybackSource, on_complete: CompletionHandler) -> Result<(), SinkError> {
        // Stop current playback if any
        self.stop();

        let (child, stdout) = self.spawn_decoder(&source)?;
        let decoder = Arc::new(Mutex::new(child));
        let interrupt = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let output = Arc::clone(&self.output);
        let feeder_decoder = Arc::clone(&decoder);
        let feeder_interrupt = Arc::clone(&interrupt);
        let feeder_finished = Arc::clone(&finished);
        let input = source.input().display().to_string();

        self.output.set_paused(false);
        let feeder = thread::Builder::new()
            .name("sink-feeder".to_string())
            .spawn(move || {
                let mut error = feed(output.as_ref(), stdout, &feeder_interrupt);
                let interrupted = feeder_interrupt.load(Ordering::SeqCst);

                if !interrupted && error.is_none() {
                    // Let the tail of the track play out
                    while output.buffered() > 0 && !feeder_interrupt.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(10));
                    }
                }

                let mut child = feeder_decoder.lock();
                if interrupted {
                    let _ = child.kill();
                }
                match child.wait() {
                    Ok(status) if !status.success() && !interrupted && error.is_none() => {
                        error = Some(format!("decoder exited with {} for {}", status, input));
                    }
                    Err(e) if error.is_none() => error = Some(e.to_string()),
                    _ => {}
                }
                drop(child);

                feeder_finished.store(true, Ordering::SeqCst);
                on_complete(error);
            });

        let feeder = match feeder {
            Ok(handle) => handle,
            Err(e) => {
                let mut child = decoder.lock();
                let _ = child.kill();
                let _ = child.wait();
                return Err(SinkError::Output(format!("Failed to spawn feeder thread: {}", e)));
            }
        };

        *self.current.lock() = Some(ActivePlayback {
            interrupt,
            finished,
            decoder,
            feeder: Some(feeder),
        });

        Ok(())
    }

    fn pause(&self) {
        if self.is_playing() {
            self.output.set_paused(true);
        }
    }

    fn resume(&self) {
        if self.is_paused() {
            self.output.set_paused(false);
        }
    }

    fn stop(&self) {
        let active = self.current.lock().take();
        let Some(mut active) = active else {
            return;
        };

        active.interrupt.store(true, Ordering::SeqCst);
        if let Some(mut child) = active.decoder.try_lock() {
            let _ = child.kill();
        }

        // A handler calling stop() runs on the feeder itself
        if let Some(feeder) = active.feeder.take() {
            if feeder.thread().id() != thread::current().id() {
                let _ = feeder.join();
            }
        }

        // The feeder is gone, so this drops only the stopped source's tail
        self.output.clear();
        self.output.set_paused(false);
    }
}

/// Pump decoded PCM from ffmpeg into the output until EOF or interrupt.
/// Returns the read error, if any.
fn feed(output: &dyn PcmOutput, mut stdout: ChildStdout, interrupt: &AtomicBool) -> Option<String> {
    let channels = output.channels();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut pending: Vec<u8> = Vec::with_capacity(READ_CHUNK + FRAME_BYTES);

    loop {
        if interrupt.load(Ordering::SeqCst) {
            return None;
        }

        let n = match stdout.read(&mut buf) {
            Ok(0) => return None,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Some(format!("Failed to read decoder output: {}", e)),
        };

        pending.extend_from_slice(&buf[..n]);
        let usable = pending.len() / FRAME_BYTES * FRAME_BYTES;
        let samples: Vec<f32> = pending[..usable]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        pending.drain(..usable);

        let samples = remix_stereo(&samples, channels);
        if !output.write_blocking(&samples, interrupt) {
            return None;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Output that plays everything the moment it is written
    #[derive(Default)]
    struct InstantOutput {
        written: AtomicUsize,
        clears: AtomicUsize,
        paused: AtomicBool,
    }

    impl PcmOutput for InstantOutput {
        fn sample_rate(&self) -> u32 {
            48000
        }

        fn channels(&self) -> u16 {
            2
        }

        fn write(&self, samples: &[f32]) -> usize {
            self.written.fetch_add(samples.len(), Ordering::SeqCst);
            samples.len()
        }

        fn buffered(&self) -> usize {
            0
        }

        fn clear(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }

        fn set_paused(&self, paused: bool) {
            self.paused.store(paused, Ordering::SeqCst);
        }

        fn is_paused(&self) -> bool {
            self.paused.load(Ordering::SeqCst)
        }

        fn set_volume(&self, _volume: f32) {}
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        output: Arc<InstantOutput>,
        sink: Arc<LocalSink>,
    }

    /// Sink whose decoder is a shell script with `body`
    fn fixture(body: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ffmpeg");
        fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let output = Arc::new(InstantOutput::default());
        let sink = Arc::new(LocalSink::new(output.clone(), script));
        Fixture {
            _dir: dir,
            output,
            sink,
        }
    }

    fn source() -> PlaybackSource {
        PlaybackSource::Transcoded {
            source: PathBuf::from("/music/a.mp3"),
            start_seconds: 0.0,
        }
    }

    /// Handler counting its calls and keeping the last error
    fn counting_handler() -> (CompletionHandler, Arc<AtomicUsize>, Arc<Mutex<Option<String>>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let last_error = Arc::new(Mutex::new(None));
        let handler_calls = Arc::clone(&calls);
        let handler_error = Arc::clone(&last_error);
        let handler: CompletionHandler = Box::new(move |error| {
            *handler_error.lock() = error;
            handler_calls.fetch_add(1, Ordering::SeqCst);
        });
        (handler, calls, last_error)
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn test_stop_runs_handler_before_returning() {
        // 4 KB of silence, then hold the pipe open
        let f = fixture("head -c 4096 /dev/zero\nexec sleep 30");
        let (handler, calls, last_error) = counting_handler();

        f.sink.play(source(), handler).unwrap();
        assert!(wait_until(|| f.output.written.load(Ordering::SeqCst) == 1024));
        assert!(f.sink.is_playing());

        f.sink.stop();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*last_error.lock(), None);
        assert!(!f.sink.is_active());
        assert!(f.output.clears.load(Ordering::SeqCst) >= 1);

        // Nothing left to stop
        f.sink.stop();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_natural_end_fires_handler_once() {
        let f = fixture("head -c 4096 /dev/zero");
        let (handler, calls, last_error) = counting_handler();

        f.sink.play(source(), handler).unwrap();
        assert!(wait_until(|| calls.load(Ordering::SeqCst) == 1));
        assert_eq!(*last_error.lock(), None);
        assert_eq!(f.output.written.load(Ordering::SeqCst), 1024);
        assert!(!f.sink.is_active());

        f.sink.stop();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_decoder_failure_is_reported() {
        let f = fixture("exit 3");
        let (handler, calls, last_error) = counting_handler();

        f.sink.play(source(), handler).unwrap();
        assert!(wait_until(|| calls.load(Ordering::SeqCst) == 1));
        let error = last_error.lock().clone().unwrap();
        assert!(error.contains("/music/a.mp3"), "{}", error);
    }

    #[test]
    fn test_spawn_failure_drops_handler() {
        let output = Arc::new(InstantOutput::default());
        let sink = LocalSink::new(output, Path::new("/no/such/phonograph-ffmpeg"));
        let (handler, calls, _) = counting_handler();

        let result = sink.play(source(), handler);
        assert!(matches!(result, Err(SinkError::DecoderSpawn { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!sink.is_active());
    }

    #[test]
    fn test_play_replaces_running_source() {
        let f = fixture("head -c 4096 /dev/zero\nexec sleep 30");
        let (first, first_calls, _) = counting_handler();
        let (second, second_calls, _) = counting_handler();

        f.sink.play(source(), first).unwrap();
        f.sink.play(source(), second).unwrap();
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert!(f.sink.is_playing());

        f.sink.stop();
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_from_handler_does_not_deadlock() {
        let f = fixture("head -c 4096 /dev/zero");
        let done = Arc::new(AtomicBool::new(false));

        let sink = Arc::clone(&f.sink);
        let handler_done = Arc::clone(&done);
        f.sink
            .play(
                source(),
                Box::new(move |_| {
                    // Runs on the feeder thread
                    sink.stop();
                    handler_done.store(true, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(wait_until(|| done.load(Ordering::SeqCst)));
        assert!(!f.sink.is_active());
    }

    #[test]
    fn test_pause_and_resume() {
        let f = fixture("head -c 4096 /dev/zero\nexec sleep 30");
        let (handler, _, _) = counting_handler();
        f.sink.play(source(), handler).unwrap();

        f.sink.pause();
        assert!(f.sink.is_paused());
        assert!(!f.sink.is_playing());
        f.sink.resume();
        assert!(f.sink.is_playing());

        f.sink.pause();
        f.sink.stop();
        assert!(!f.output.is_paused());
    }
}
