// Backend without an output device
// Streams are probed with the real decoder so format failures behave the
// same, but playback only moves a position counter against a Clock.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::{Activity, AudioBackend, BackendResult, Clock, DecodeHandle, StreamHandle};
use crate::audio::decoder::{AudioDecoder, StreamSpec};
use crate::audio::format::DecoderKind;
use crate::audio::tempo::{check_tempo, tempo_ratio};
use crate::audio::timing::{bytes_to_frames, frames_to_bytes};
use crate::error::BackendError;

/// Backend calls that can be forced to fail, for tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Play,
    Pause,
    Stop,
    Free,
    Seek,
    Tempo,
    Volume,
}

struct VirtualStream {
    spec: StreamSpec,
    activity: Activity,
    position: f64,
    anchor: Duration,
    tempo: i32,
}

impl VirtualStream {
    /// Bring the position up to `now`
    fn settle(&mut self, now: Duration) {
        if self.activity == Activity::Playing {
            let elapsed = now.saturating_sub(self.anchor).as_secs_f64();
            self.position += elapsed * self.spec.sample_rate as f64 * tempo_ratio(self.tempo);
            let end = self.spec.total_frames as f64;
            if self.position >= end {
                self.position = end;
                self.activity = Activity::Stopped;
            }
        }
        self.anchor = now;
    }
}

#[derive(Default)]
struct VirtualState {
    next_id: u32,
    sources: HashMap<u32, StreamSpec>,
    streams: HashMap<u32, VirtualStream>,
    faults: HashSet<Fault>,
    freed: usize,
}

pub struct VirtualBackend {
    clock: Arc<dyn Clock>,
    state: Mutex<VirtualState>,
    volume: Mutex<f32>,
}

impl VirtualBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(VirtualState::default()),
            volume: Mutex::new(1.0),
        }
    }

    fn check(state: &VirtualState, fault: Fault) -> BackendResult<()> {
        if state.faults.contains(&fault) {
            return Err(BackendError::Output(format!("injected {:?} failure", fault)));
        }
        Ok(())
    }

    fn with_stream<T>(
        &self,
        stream: &StreamHandle,
        fault: Option<Fault>,
        f: impl FnOnce(&mut VirtualStream) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if let Some(fault) = fault {
            Self::check(&state, fault)?;
        }
        let entry = state
            .streams
            .get_mut(&stream.id())
            .ok_or(BackendError::InvalidHandle(stream.id()))?;
        entry.settle(now);
        f(entry)
    }
}

/// Test hooks for injecting failures and inspecting stream bookkeeping.
/// Playback never calls them, so `--no-audio` runs have no faults set.
impl VirtualBackend {
    /// Make every following call of this kind fail until `heal`
    pub fn fail_on(&self, fault: Fault) {
        self.state.lock().faults.insert(fault);
    }

    /// Clear every injected fault
    pub fn heal(&self) {
        self.state.lock().faults.clear();
    }

    /// Tempo streams currently allocated
    pub fn live_streams(&self) -> usize {
        self.state.lock().streams.len()
    }

    /// Number of successful `free_stream` calls
    pub fn freed_streams(&self) -> usize {
        self.state.lock().freed
    }

    /// Tempo currently applied to a stream
    pub fn applied_tempo(&self, stream: &StreamHandle) -> Option<i32> {
        self.state.lock().streams.get(&stream.id()).map(|s| s.tempo)
    }
}

impl AudioBackend for VirtualBackend {
    fn create_stream(&self, path: &Path, decoder: DecoderKind) -> BackendResult<DecodeHandle> {
        let spec = AudioDecoder::open(path, decoder)?.spec();
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.sources.insert(id, spec);
        debug!("Virtual decode stream {} for {:?}", id, path);
        Ok(DecodeHandle::new(id))
    }

    fn create_tempo_stream(&self, source: DecodeHandle) -> BackendResult<StreamHandle> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let spec = state
            .sources
            .remove(&source.id())
            .ok_or(BackendError::InvalidHandle(source.id()))?;
        state.next_id += 1;
        let id = state.next_id;
        state.streams.insert(
            id,
            VirtualStream {
                spec,
                activity: Activity::Stopped,
                position: 0.0,
                anchor: now,
                tempo: 0,
            },
        );
        Ok(StreamHandle::new(id))
    }

    fn free_stream(&self, stream: StreamHandle) -> BackendResult<()> {
        let mut state = self.state.lock();
        Self::check(&state, Fault::Free)?;
        state
            .streams
            .remove(&stream.id())
            .ok_or(BackendError::InvalidHandle(stream.id()))?;
        state.freed += 1;
        Ok(())
    }

    fn play(&self, stream: &StreamHandle, restart: bool) -> BackendResult<()> {
        self.with_stream(stream, Some(Fault::Play), |s| {
            if restart || s.position >= s.spec.total_frames as f64 {
                s.position = 0.0;
            }
            s.activity = Activity::Playing;
            Ok(())
        })
    }

    fn pause(&self, stream: &StreamHandle) -> BackendResult<()> {
        self.with_stream(stream, Some(Fault::Pause), |s| {
            if s.activity == Activity::Playing {
                s.activity = Activity::Paused;
            }
            Ok(())
        })
    }

    fn stop(&self, stream: &StreamHandle) -> BackendResult<()> {
        self.with_stream(stream, Some(Fault::Stop), |s| {
            s.activity = Activity::Stopped;
            Ok(())
        })
    }

    fn activity(&self, stream: &StreamHandle) -> BackendResult<Activity> {
        self.with_stream(stream, None, |s| Ok(s.activity))
    }

    fn length_bytes(&self, stream: &StreamHandle) -> BackendResult<u64> {
        self.with_stream(stream, None, |s| {
            Ok(frames_to_bytes(s.spec.total_frames, s.spec.channels))
        })
    }

    fn position_bytes(&self, stream: &StreamHandle) -> BackendResult<u64> {
        self.with_stream(stream, None, |s| {
            Ok(frames_to_bytes(s.position as u64, s.spec.channels))
        })
    }

    fn set_position_bytes(&self, stream: &StreamHandle, bytes: u64) -> BackendResult<()> {
        self.with_stream(stream, Some(Fault::Seek), |s| {
            let frames = bytes_to_frames(bytes, s.spec.channels).min(s.spec.total_frames);
            s.position = frames as f64;
            Ok(())
        })
    }

    fn bytes_to_seconds(&self, stream: &StreamHandle, bytes: u64) -> BackendResult<f64> {
        self.with_stream(stream, None, |s| {
            let frames = bytes_to_frames(bytes, s.spec.channels);
            Ok(frames as f64 / s.spec.sample_rate as f64)
        })
    }

    fn seconds_to_bytes(&self, stream: &StreamHandle, seconds: f64) -> BackendResult<u64> {
        self.with_stream(stream, None, |s| {
            let frames = (seconds.max(0.0) * s.spec.sample_rate as f64).round() as u64;
            Ok(frames_to_bytes(frames, s.spec.channels))
        })
    }

    fn set_tempo(&self, stream: &StreamHandle, percent: i32) -> BackendResult<()> {
        self.with_stream(stream, Some(Fault::Tempo), |s| {
            check_tempo(percent)?;
            s.tempo = percent;
            Ok(())
        })
    }

    fn volume(&self) -> BackendResult<f32> {
        Self::check(&self.state.lock(), Fault::Volume)?;
        Ok(*self.volume.lock())
    }

    fn set_volume(&self, volume: f32) -> BackendResult<()> {
        Self::check(&self.state.lock(), Fault::Volume)?;
        *self.volume.lock() = volume.clamp(0.0, 1.0);
        Ok(())
    }
}
