// Backend driving the system output device
// One worker thread per tempo stream: decode -> stretch -> resample -> remix
// -> ring buffer. Only one DeviceBackend may exist per process.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{Activity, AudioBackend, BackendResult, DecodeHandle, StreamHandle};
use crate::audio::decoder::{AudioDecoder, StreamSpec};
use crate::audio::format::DecoderKind;
use crate::audio::output::{AudioOutput, OutputSink};
use crate::audio::resampler::{remix, StreamResampler};
use crate::audio::tempo::TempoStretcher;
use crate::audio::timing::{bytes_to_frames, frames_to_bytes};
use crate::error::BackendError;

static BACKEND_LIVE: AtomicBool = AtomicBool::new(false);

const IDLE_WAIT: Duration = Duration::from_millis(5);

struct ChannelState {
    decoder: AudioDecoder,
    spec: StreamSpec,
    stretcher: TempoStretcher,
    resampler: Option<StreamResampler>,
    activity: Activity,
    /// Source frames handed to the stretcher so far
    fed_frames: u64,
    /// Device-ready samples not yet accepted by the ring buffer
    pending: Vec<f32>,
    ended: bool,
}

impl ChannelState {
    /// Source frames decoded but not heard yet: the stretcher backlog plus
    /// device samples waiting in `pending` and in the ring buffer.
    fn backlog_frames(&self, sink: &OutputSink) -> u64 {
        let device_samples = self.pending.len() + sink.queued();
        let device_frames = device_samples as f64 / sink.channels().max(1) as f64;
        let rate = self.spec.sample_rate as f64 / sink.sample_rate().max(1) as f64;
        let queued = (device_frames * rate * self.stretcher.ratio()).round() as u64;
        queued + self.stretcher.buffered_frames() as u64
    }

    /// Position of the audio currently coming out of the device
    fn position_frames(&self, sink: &OutputSink) -> u64 {
        let pos = self.fed_frames.saturating_sub(self.backlog_frames(sink));
        if self.spec.total_frames > 0 {
            pos.min(self.spec.total_frames)
        } else {
            pos
        }
    }

    fn seek_frames(&mut self, frames: u64, sink: &OutputSink) -> BackendResult<()> {
        let seconds = frames as f64 / self.spec.sample_rate as f64;
        self.fed_frames = self.decoder.seek(seconds)?;
        self.stretcher.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        self.pending.clear();
        self.ended = false;
        sink.clear();
        Ok(())
    }

    /// Resample and remix stretched audio for the device
    fn for_device(&mut self, samples: Vec<f32>, sink: &OutputSink) -> BackendResult<Vec<f32>> {
        let samples = match self.resampler.as_mut() {
            Some(resampler) => resampler.process(&samples)?,
            None => samples,
        };
        Ok(remix(&samples, self.spec.channels, sink.channels()))
    }

    /// One unit of work. Returns true when there was nothing to do.
    fn pump(&mut self, sink: &OutputSink) -> bool {
        if self.activity != Activity::Playing {
            return true;
        }

        if !self.pending.is_empty() {
            // Whole frames only, so a later clear never splits a frame
            let ch = sink.channels().max(1);
            let room = sink.vacant() / ch * ch;
            let n = room.min(self.pending.len());
            if n == 0 {
                return true;
            }
            let written = sink.write(&self.pending[..n]);
            self.pending.drain(..written);
            return false;
        }

        if self.ended {
            // Stopped only once the device has played the tail
            if sink.queued() == 0 {
                self.activity = Activity::Stopped;
            }
            return true;
        }

        let result = match self.decoder.decode_next() {
            Ok(Some(samples)) => {
                self.fed_frames += (samples.len() / self.spec.channels.max(1)) as u64;
                let stretched = self.stretcher.process(&samples);
                self.for_device(stretched, sink)
            }
            Ok(None) => {
                self.ended = true;
                let rest = self.stretcher.flush();
                self.for_device(rest, sink).and_then(|mut out| {
                    if let Some(resampler) = self.resampler.as_mut() {
                        out.extend(remix(&resampler.flush()?, self.spec.channels, sink.channels()));
                    }
                    Ok(out)
                })
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(out) => self.pending = out,
            Err(e) => {
                warn!("Stream stopped after backend failure: {}", e);
                self.ended = true;
            }
        }
        false
    }
}

struct Channel {
    state: Arc<Mutex<ChannelState>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

fn run_worker(state: Arc<Mutex<ChannelState>>, sink: OutputSink, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Acquire) {
        let idle = state.lock().pump(&sink);
        if idle {
            thread::sleep(IDLE_WAIT);
        }
    }
}

pub struct DeviceBackend {
    output: AudioOutput,
    next_id: AtomicU32,
    sources: Mutex<HashMap<u32, AudioDecoder>>,
    channels: Mutex<HashMap<u32, Channel>>,
}

impl DeviceBackend {
    /// Open the default output device. Fails if another DeviceBackend is
    /// alive in this process.
    pub fn init() -> BackendResult<Self> {
        if BACKEND_LIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BackendError::AlreadyInitialized);
        }

        match AudioOutput::new() {
            Ok(output) => Ok(Self {
                output,
                next_id: AtomicU32::new(1),
                sources: Mutex::new(HashMap::new()),
                channels: Mutex::new(HashMap::new()),
            }),
            Err(e) => {
                BACKEND_LIVE.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn with_state<T>(
        &self,
        stream: &StreamHandle,
        f: impl FnOnce(&mut ChannelState) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let state = self
            .channels
            .lock()
            .get(&stream.id())
            .map(|c| c.state.clone())
            .ok_or(BackendError::InvalidHandle(stream.id()))?;
        let mut guard = state.lock();
        f(&mut guard)
    }

    fn shutdown_channel(id: u32, mut channel: Channel) -> BackendResult<()> {
        channel.shutdown.store(true, Ordering::Release);
        if let Some(worker) = channel.worker.take() {
            worker
                .join()
                .map_err(|_| BackendError::Output(format!("worker for stream {} panicked", id)))?;
        }
        Ok(())
    }
}

impl Drop for DeviceBackend {
    fn drop(&mut self) {
        let channels: Vec<(u32, Channel)> = self.channels.lock().drain().collect();
        for (id, channel) in channels {
            if let Err(e) = Self::shutdown_channel(id, channel) {
                warn!("Leaked stream {} at shutdown: {}", id, e);
            }
        }
        BACKEND_LIVE.store(false, Ordering::Release);
        info!("Audio backend shut down");
    }
}

impl AudioBackend for DeviceBackend {
    fn create_stream(&self, path: &Path, decoder: DecoderKind) -> BackendResult<DecodeHandle> {
        let decoder = AudioDecoder::open(path, decoder)?;
        let id = self.next_id();
        self.sources.lock().insert(id, decoder);
        Ok(DecodeHandle::new(id))
    }

    fn create_tempo_stream(&self, source: DecodeHandle) -> BackendResult<StreamHandle> {
        let decoder = self
            .sources
            .lock()
            .remove(&source.id())
            .ok_or(BackendError::InvalidHandle(source.id()))?;
        let spec = decoder.spec();
        let sink = self.output.sink();
        let resampler = StreamResampler::new(spec.sample_rate, sink.sample_rate(), spec.channels)?;

        let state = Arc::new(Mutex::new(ChannelState {
            decoder,
            spec,
            stretcher: TempoStretcher::new(spec.sample_rate, spec.channels),
            resampler,
            activity: Activity::Stopped,
            fed_frames: 0,
            pending: Vec::new(),
            ended: false,
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let id = self.next_id();
        let worker = {
            let state = state.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name(format!("scribe-stream-{}", id))
                .spawn(move || run_worker(state, sink, shutdown))
                .map_err(|e| BackendError::Output(format!("failed to spawn worker: {}", e)))?
        };

        self.channels.lock().insert(
            id,
            Channel {
                state,
                shutdown,
                worker: Some(worker),
            },
        );
        debug!("Tempo stream {} wraps decode stream {}", id, source.id());
        Ok(StreamHandle::new(id))
    }

    fn free_stream(&self, stream: StreamHandle) -> BackendResult<()> {
        let channel = self
            .channels
            .lock()
            .remove(&stream.id())
            .ok_or(BackendError::InvalidHandle(stream.id()))?;
        let sink = self.output.sink();
        if channel.state.lock().activity != Activity::Stopped {
            sink.clear();
        }
        sink.set_held(false);
        Self::shutdown_channel(stream.id(), channel)
    }

    fn play(&self, stream: &StreamHandle, restart: bool) -> BackendResult<()> {
        let sink = self.output.sink();
        self.with_state(stream, |s| {
            let at_end = s.ended && s.pending.is_empty();
            if restart || at_end {
                s.seek_frames(0, &sink)?;
            }
            s.activity = Activity::Playing;
            sink.set_held(false);
            Ok(())
        })
    }

    fn pause(&self, stream: &StreamHandle) -> BackendResult<()> {
        let sink = self.output.sink();
        self.with_state(stream, |s| {
            if s.activity == Activity::Playing {
                // Queued audio stays in the ring and resumes where it left off
                s.activity = Activity::Paused;
                sink.set_held(true);
            }
            Ok(())
        })
    }

    fn stop(&self, stream: &StreamHandle) -> BackendResult<()> {
        let sink = self.output.sink();
        self.with_state(stream, |s| {
            // Rewind the decoder to what was heard, since the queue is dropped
            let heard = s.position_frames(&sink);
            s.activity = Activity::Stopped;
            sink.set_held(false);
            if let Err(e) = s.seek_frames(heard, &sink) {
                warn!("Could not keep position {} on stop: {}", heard, e);
                s.pending.clear();
                sink.clear();
            }
            Ok(())
        })
    }

    fn activity(&self, stream: &StreamHandle) -> BackendResult<Activity> {
        self.with_state(stream, |s| Ok(s.activity))
    }

    fn length_bytes(&self, stream: &StreamHandle) -> BackendResult<u64> {
        self.with_state(stream, |s| {
            Ok(frames_to_bytes(s.spec.total_frames, s.spec.channels))
        })
    }

    fn position_bytes(&self, stream: &StreamHandle) -> BackendResult<u64> {
        let sink = self.output.sink();
        self.with_state(stream, |s| {
            Ok(frames_to_bytes(s.position_frames(&sink), s.spec.channels))
        })
    }

    fn set_position_bytes(&self, stream: &StreamHandle, bytes: u64) -> BackendResult<()> {
        let sink = self.output.sink();
        self.with_state(stream, |s| {
            let mut frames = bytes_to_frames(bytes, s.spec.channels);
            if s.spec.total_frames > 0 {
                frames = frames.min(s.spec.total_frames);
            }
            s.seek_frames(frames, &sink)
        })
    }

    fn bytes_to_seconds(&self, stream: &StreamHandle, bytes: u64) -> BackendResult<f64> {
        self.with_state(stream, |s| {
            Ok(bytes_to_frames(bytes, s.spec.channels) as f64 / s.spec.sample_rate as f64)
        })
    }

    fn seconds_to_bytes(&self, stream: &StreamHandle, seconds: f64) -> BackendResult<u64> {
        self.with_state(stream, |s| {
            let frames = (seconds.max(0.0) * s.spec.sample_rate as f64).round() as u64;
            Ok(frames_to_bytes(frames, s.spec.channels))
        })
    }

    fn set_tempo(&self, stream: &StreamHandle, percent: i32) -> BackendResult<()> {
        self.with_state(stream, |s| s.stretcher.set_tempo(percent))
    }

    fn volume(&self) -> BackendResult<f32> {
        Ok(self.output.volume())
    }

    fn set_volume(&self, volume: f32) -> BackendResult<()> {
        self.output.set_volume(volume);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Consumer;

    const RATE: u32 = 8000;

    fn channel_for(seconds: u32, dir: &tempfile::TempDir) -> ChannelState {
        let path = dir.path().join("memo.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..RATE * seconds {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let decoder = AudioDecoder::open(&path, DecoderKind::Wav).unwrap();
        let spec = decoder.spec();
        ChannelState {
            decoder,
            spec,
            stretcher: TempoStretcher::new(spec.sample_rate, spec.channels),
            resampler: None,
            activity: Activity::Playing,
            fed_frames: 0,
            pending: Vec::new(),
            ended: false,
        }
    }

    #[test]
    fn position_trails_audio_still_queued_for_the_device() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = channel_for(2, &dir);
        let (sink, mut device) = OutputSink::detached(RATE, 1, 4000);

        for _ in 0..1000 {
            if state.pump(&sink) {
                break;
            }
        }
        assert_eq!(sink.queued(), 4000);
        let unheard = (state.pending.len() + sink.queued()) as u64;
        let before = state.position_frames(&sink);
        assert_eq!(before, state.fed_frames - unheard);

        assert_eq!(device.skip(1000), 1000);
        assert_eq!(state.position_frames(&sink), before + 1000);
    }

    #[test]
    fn stream_stops_only_after_the_tail_is_played() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = channel_for(1, &dir);
        let (sink, mut device) = OutputSink::detached(RATE, 1, 2 * RATE as usize);

        for _ in 0..1000 {
            state.pump(&sink);
            if state.ended && state.pending.is_empty() {
                break;
            }
        }
        state.pump(&sink);
        assert_eq!(state.activity, Activity::Playing);
        assert_eq!(state.position_frames(&sink), 0);

        device.clear();
        state.pump(&sink);
        assert_eq!(state.activity, Activity::Stopped);
        assert_eq!(state.position_frames(&sink), state.spec.total_frames);
    }
}
