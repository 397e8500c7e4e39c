// Audio output using cpal
// The device callback pulls from a ring buffer that decode workers fill
// through an OutputSink. Master volume is applied in the callback. While
// held, the callback plays silence and leaves queued audio in place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use tracing::{error, info};

use crate::error::BackendError;

const RING_BUFFER_SIZE: usize = 48000 * 2 / 4; // ~250ms of stereo audio at 48kHz

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// Writer half of the output, safe to hand to worker threads
#[derive(Clone)]
pub struct OutputSink {
    producer: Arc<Mutex<RingProducer>>,
    clear_flag: Arc<AtomicBool>,
    hold_flag: Arc<AtomicBool>,
    sample_rate: u32,
    channels: usize,
}

impl OutputSink {
    /// Push as many samples as fit, returns how many were taken
    pub fn write(&self, samples: &[f32]) -> usize {
        self.producer.lock().push_slice(samples)
    }

    pub fn vacant(&self) -> usize {
        self.producer.lock().vacant_len()
    }

    /// Samples written but not yet played. Zero once a clear is pending.
    pub fn queued(&self) -> usize {
        if self.clear_flag.load(Ordering::SeqCst) {
            return 0;
        }
        self.producer.lock().occupied_len()
    }

    /// Drop queued audio on the next callback
    pub fn clear(&self) {
        self.clear_flag.store(true, Ordering::SeqCst);
    }

    /// Stop or restart consuming queued audio
    pub fn set_held(&self, held: bool) {
        self.hold_flag.store(held, Ordering::SeqCst);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
impl OutputSink {
    /// Sink with no device behind it. The caller drains the returned
    /// consumer to stand in for the device callback.
    pub(crate) fn detached(sample_rate: u32, channels: usize, capacity: usize) -> (Self, RingConsumer) {
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let sink = Self {
            producer: Arc::new(Mutex::new(producer)),
            clear_flag: Arc::new(AtomicBool::new(false)),
            hold_flag: Arc::new(AtomicBool::new(false)),
            sample_rate,
            channels,
        };
        (sink, consumer)
    }
}

pub struct AudioOutput {
    _stream: Stream,
    sink: OutputSink,
    volume: Arc<Mutex<f32>>,
}

impl AudioOutput {
    /// Open and start the default output device
    pub fn new() -> Result<Self, BackendError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| BackendError::Output("no output device available".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| BackendError::Output(format!("default output config: {}", e)))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let (producer, consumer) = HeapRb::<f32>::new(RING_BUFFER_SIZE).split();
        let consumer = Arc::new(Mutex::new(consumer));
        let volume = Arc::new(Mutex::new(1.0f32));
        let clear_flag = Arc::new(AtomicBool::new(false));
        let hold_flag = Arc::new(AtomicBool::new(false));

        let stream_config: StreamConfig = config.config();
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &stream_config,
                consumer,
                volume.clone(),
                clear_flag.clone(),
                hold_flag.clone(),
            )?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &stream_config,
                consumer,
                volume.clone(),
                clear_flag.clone(),
                hold_flag.clone(),
            )?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &stream_config,
                consumer,
                volume.clone(),
                clear_flag.clone(),
                hold_flag.clone(),
            )?,
            format => {
                return Err(BackendError::Output(format!(
                    "unsupported sample format: {:?}",
                    format
                )))
            }
        };

        stream
            .play()
            .map_err(|e| BackendError::Output(format!("failed to start stream: {}", e)))?;

        info!(
            "Audio output on {:?}: {} Hz, {} channels",
            device.name().unwrap_or_default(),
            sample_rate,
            channels
        );

        Ok(Self {
            _stream: stream,
            sink: OutputSink {
                producer: Arc::new(Mutex::new(producer)),
                clear_flag,
                hold_flag,
                sample_rate,
                channels,
            },
            volume,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        consumer: Arc<Mutex<RingConsumer>>,
        volume: Arc<Mutex<f32>>,
        clear_flag: Arc<AtomicBool>,
        hold_flag: Arc<AtomicBool>,
    ) -> Result<Stream, BackendError> {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut consumer = consumer.lock();
                    let vol = *volume.lock();

                    if clear_flag.swap(false, Ordering::SeqCst) {
                        consumer.clear();
                    }

                    if hold_flag.load(Ordering::SeqCst) {
                        data.fill(T::EQUILIBRIUM);
                        return;
                    }

                    for sample in data.iter_mut() {
                        let value = consumer.try_pop().unwrap_or(0.0) * vol;
                        *sample = T::from_sample(value);
                    }
                },
                move |err| {
                    error!("Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| BackendError::Output(format!("failed to build output stream: {}", e)))
    }

    pub fn sink(&self) -> OutputSink {
        self.sink.clone()
    }

    pub fn set_volume(&self, vol: f32) {
        *self.volume.lock() = vol.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }
}
