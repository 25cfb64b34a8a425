// Audio output using cpal
// Handles cross-platform audio output with a ring buffer. The cpal stream
// lives on its own thread; this handle only touches the shared buffer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{HeapRb, traits::{Consumer, Observer, Producer, Split}};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::SinkError;

const RING_BUFFER_SIZE: usize = 48000 * 2 / 4; // ~250ms of stereo audio at 48kHz

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// Where a sink's feeder thread delivers interleaved PCM
pub trait PcmOutput: Send + Sync {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;

    /// Queue as many samples as fit. Returns how many were taken.
    fn write(&self, samples: &[f32]) -> usize;

    /// Samples queued but not yet played
    fn buffered(&self) -> usize;

    /// Drop everything queued. Samples written afterwards are kept.
    fn clear(&self);

    fn set_paused(&self, paused: bool);
    fn is_paused(&self) -> bool;
    fn set_volume(&self, volume: f32);

    /// Write samples, blocking until all are written or `interrupt` is set.
    /// Returns false when interrupted.
    fn write_blocking(&self, samples: &[f32], interrupt: &AtomicBool) -> bool {
        let mut remaining = samples;

        while !remaining.is_empty() {
            if interrupt.load(Ordering::SeqCst) {
                return false;
            }
            let written = self.write(remaining);
            if written > 0 {
                remaining = &remaining[written..];
            } else {
                // Buffer full (or paused), wait a bit
                thread::sleep(Duration::from_millis(2));
            }
        }

        true
    }
}

/// Ring buffer shared by the feeder and the audio callback
#[derive(Clone)]
pub struct SampleQueue {
    producer: Arc<Mutex<RingProducer>>,
    consumer: Arc<Mutex<RingConsumer>>,
}

impl SampleQueue {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        Self {
            producer: Arc::new(Mutex::new(producer)),
            consumer: Arc::new(Mutex::new(consumer)),
        }
    }

    pub fn write(&self, samples: &[f32]) -> usize {
        let mut producer = self.producer.lock();
        let mut written = 0;

        for &sample in samples {
            if producer.try_push(sample).is_ok() {
                written += 1;
            } else {
                break;
            }
        }

        written
    }

    pub fn buffered(&self) -> usize {
        self.producer.lock().occupied_len()
    }

    /// Drain on the caller's thread, so nothing written after this returns
    /// can be lost to a later drain in the callback
    pub fn clear(&self) {
        let mut consumer = self.consumer.lock();
        while consumer.try_pop().is_some() {}
    }

    /// Fill `data` from the queue, padding with silence
    pub fn fill<T: cpal::SizedSample + cpal::FromSample<f32>>(&self, data: &mut [T], volume: f32) {
        let mut consumer = self.consumer.lock();
        for sample in data.iter_mut() {
            let value = consumer.try_pop().unwrap_or(0.0) * volume;
            *sample = T::from_sample(value);
        }
    }
}

/// Flags shared between the handle and the audio callback
#[derive(Clone)]
struct CallbackControl {
    volume: Arc<Mutex<f32>>,
    paused: Arc<AtomicBool>,
}

pub struct AudioOutput {
    queue: SampleQueue,
    sample_rate: u32,
    channels: u16,
    control: CallbackControl,
    // Dropping the sender ends the stream thread
    _shutdown: oneshot::Sender<()>,
}

impl AudioOutput {
    /// Open the default output device.
    ///
    /// Blocks until the stream thread reports the device configuration, so
    /// call it outside of async contexts.
    pub fn new() -> Result<Self, SinkError> {
        let queue = SampleQueue::new(RING_BUFFER_SIZE);
        let control = CallbackControl {
            volume: Arc::new(Mutex::new(1.0f32)),
            paused: Arc::new(AtomicBool::new(false)),
        };

        let (ready_tx, ready_rx) = oneshot::channel::<Result<(u32, u16), SinkError>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let stream_queue = queue.clone();
        let stream_control = control.clone();

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match Self::open_stream(stream_queue, stream_control) {
                    Ok((stream, sample_rate, channels)) => {
                        let _ = ready_tx.send(Ok((sample_rate, channels)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Park until the handle is dropped
                let _ = shutdown_rx.blocking_recv();
                drop(stream);
                tracing::debug!("Audio output stream closed");
            })
            .map_err(|e| SinkError::Output(format!("Failed to spawn output thread: {}", e)))?;

        let (sample_rate, channels) = ready_rx
            .blocking_recv()
            .map_err(|_| SinkError::Output("Output thread exited during setup".to_string()))??;

        tracing::info!("Audio output ready: {} Hz, {} channels", sample_rate, channels);

        Ok(Self {
            queue,
            sample_rate,
            channels,
            control,
            _shutdown: shutdown_tx,
        })
    }

    fn open_stream(
        queue: SampleQueue,
        control: CallbackControl,
    ) -> Result<(Stream, u32, u16), SinkError> {
        let host = cpal::default_host();

        let device = host.default_output_device()
            .ok_or(SinkError::NoOutputDevice)?;

        let config = device.default_output_config()
            .map_err(|e| SinkError::Output(format!("Failed to get default output config: {}", e)))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(&device, &config.into(), queue, control)?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &config.into(), queue, control)?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(&device, &config.into(), queue, control)?,
            format => {
                return Err(SinkError::Output(format!("Unsupported sample format: {:?}", format)))
            }
        };

        stream.play()
            .map_err(|e| SinkError::Output(format!("Failed to start stream: {}", e)))?;

        Ok((stream, sample_rate, channels))
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        queue: SampleQueue,
        control: CallbackControl,
    ) -> Result<Stream, SinkError> {
        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if control.paused.load(Ordering::SeqCst) {
                    for sample in data.iter_mut() {
                        *sample = T::from_sample(0.0);
                    }
                    return;
                }
                let volume = *control.volume.lock();
                queue.fill(data, volume);
            },
            move |err| {
                tracing::error!("Audio output error: {}", err);
            },
            None,
        ).map_err(|e| SinkError::Output(format!("Failed to build output stream: {}", e)))?;

        Ok(stream)
    }
}

impl PcmOutput for AudioOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn write(&self, samples: &[f32]) -> usize {
        self.queue.write(samples)
    }

    fn buffered(&self) -> usize {
        self.queue.buffered()
    }

    fn clear(&self) {
        self.queue.clear();
    }

    fn set_paused(&self, paused: bool) {
        self.control.paused.store(paused, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.control.paused.load(Ordering::SeqCst)
    }

    /// 0.0 to 1.0
    fn set_volume(&self, volume: f32) {
        *self.control.volume.lock() = volume.clamp(0.0, 1.0);
    }
}

/// Map interleaved stereo frames onto a device with `channels` channels.
/// Mono devices get the average; extra channels stay silent.
pub fn remix_stereo(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        2 => samples.to_vec(),
        0 => Vec::new(),
        1 => samples
            .chunks_exact(2)
            .map(|frame| (frame[0] + frame[1]) * 0.5)
            .collect(),
        n => {
            let n = n as usize;
            let mut out = Vec::with_capacity(samples.len() / 2 * n);
            for frame in samples.chunks_exact(2) {
                out.push(frame[0]);
                out.push(frame[1]);
                out.extend(std::iter::repeat(0.0).take(n - 2));
            }
            out
        }
    }
}
