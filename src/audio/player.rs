// Playback engine
// Owns at most one tempo-wrapped stream and the transport state machine.
// Every backend failure is logged here and returned as a PlayerError.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::backend::{Activity, AudioBackend, StreamHandle};
use crate::audio::format::{self, DecoderKind};
use crate::audio::timing::{format_clock, BYTE_SEEK_SCALE};
use crate::error::{BackendError, PlayerError, Result};

/// Smallest relative seek still worth issuing once halving kicks in
const MIN_SEEK_DELTA: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Uninitialized,
    Ready,
    Playing,
    Paused,
    Stopped,
    Errored,
}

/// How relative seeks behave near either end of the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekPolicy {
    /// Halve the delta until the target fits
    #[default]
    Halving,
    /// Stop at the nearest end
    Clamp,
}

/// Engine tunables taken from the playback settings
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub seek_policy: SeekPolicy,
    pub volume_step: f32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            seek_policy: SeekPolicy::Halving,
            volume_step: 0.05,
        }
    }
}

pub struct Stream {
    handle: StreamHandle,
    path: PathBuf,
    kind: DecoderKind,
    duration: f64,
}

impl Stream {
    pub fn handle(&self) -> &StreamHandle {
        &self.handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> DecoderKind {
        self.kind
    }
}

/// Read-only view for the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    pub state: TransportState,
    pub path: Option<PathBuf>,
    pub position: f64,
    pub duration: f64,
    pub remaining: f64,
    pub tempo: i32,
    pub volume: f32,
}

impl Telemetry {
    /// Played fraction in `[0, 1]`
    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 {
            (self.position / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

pub struct PlaybackEngine {
    backend: Arc<dyn AudioBackend>,
    options: EngineOptions,
    stream: Option<Stream>,
    state: TransportState,
    tempo: i32,
    torn_down: bool,
}

impl PlaybackEngine {
    pub fn new(backend: Arc<dyn AudioBackend>, options: EngineOptions) -> Self {
        Self {
            backend,
            options,
            stream: None,
            state: TransportState::Uninitialized,
            tempo: 0,
            torn_down: false,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn tempo(&self) -> i32 {
        self.tempo
    }

    pub fn stream(&self) -> Option<&Stream> {
        self.stream.as_ref()
    }

    fn handle(&self) -> Result<&StreamHandle> {
        self.stream
            .as_ref()
            .map(|s| &s.handle)
            .ok_or(PlayerError::NoStream)
    }

    /// Log a backend failure and turn it into a PlayerError
    fn reported<T>(op: &str, result: std::result::Result<T, BackendError>) -> Result<T> {
        result.map_err(|e| {
            warn!("{} failed: {}", op, e);
            PlayerError::from(e)
        })
    }

    // ===== Stream lifecycle =====

    /// Load `path`, replacing the current stream
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if path.is_dir() {
            warn!("Refusing to open directory {:?}", path);
            return Err(PlayerError::NotAFile(path.to_path_buf()));
        }

        self.close();

        match self.load(path) {
            Ok(stream) => {
                info!("Opened {:?} ({:?}, {:.2}s)", path, stream.kind, stream.duration);
                self.stream = Some(stream);
                self.state = TransportState::Ready;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to open {:?}: {}", path, e);
                self.state = TransportState::Errored;
                Err(e)
            }
        }
    }

    fn load(&mut self, path: &Path) -> Result<Stream> {
        let kind = format::resolve(path)?;
        let source = self.backend.create_stream(path, kind)?;
        let handle = self.backend.create_tempo_stream(source)?;

        self.tempo = 0;
        let applied = self.backend.set_tempo(&handle, 0);
        let duration = self
            .backend
            .length_bytes(&handle)
            .and_then(|len| self.backend.bytes_to_seconds(&handle, len));

        match applied.and(duration) {
            Ok(duration) => Ok(Stream {
                handle,
                path: path.to_path_buf(),
                kind,
                duration,
            }),
            Err(e) => {
                if let Err(free_err) = self.backend.free_stream(handle) {
                    warn!("Failed to free half-opened stream: {}", free_err);
                }
                Err(e.into())
            }
        }
    }

    /// Release the current stream. Always ends Uninitialized.
    pub fn close(&mut self) {
        let Some(stream) = self.stream.take() else {
            self.state = TransportState::Uninitialized;
            return;
        };

        if matches!(self.state, TransportState::Playing | TransportState::Paused) {
            if let Err(e) = self.backend.stop(&stream.handle) {
                warn!("Stop before close failed: {}", e);
            }
        }
        if let Err(e) = self.backend.free_stream(stream.handle) {
            warn!("Freeing {:?} failed: {}", stream.path, e);
        }

        info!("Closed {:?}", stream.path);
        self.state = TransportState::Uninitialized;
        self.tempo = 0;
    }

    /// Close once for good; later calls do nothing
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.close();
    }

    // ===== Transport =====

    pub fn play(&mut self, restart: bool) -> Result<()> {
        let handle = self.handle()?;
        if self.state == TransportState::Playing && !restart {
            return Ok(());
        }
        match Self::reported("play", self.backend.play(handle, restart)) {
            Ok(()) => {
                debug!("{:?} -> Playing", self.state);
                self.state = TransportState::Playing;
                Ok(())
            }
            Err(e) => {
                self.state = TransportState::Errored;
                Err(e)
            }
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        let handle = self.handle()?;
        if self.state != TransportState::Playing {
            return Ok(());
        }
        match Self::reported("pause", self.backend.pause(handle)) {
            Ok(()) => {
                self.state = TransportState::Paused;
                Ok(())
            }
            Err(e) => {
                self.state = TransportState::Errored;
                Err(e)
            }
        }
    }

    pub fn stop(&mut self) -> Result<()> {
        let handle = self.handle()?;
        if !matches!(self.state, TransportState::Playing | TransportState::Paused) {
            return Ok(());
        }
        match Self::reported("stop", self.backend.stop(handle)) {
            Ok(()) => {
                self.state = TransportState::Stopped;
                Ok(())
            }
            Err(e) => {
                self.state = TransportState::Errored;
                Err(e)
            }
        }
    }

    /// Resume when paused, pause when playing, otherwise nothing
    pub fn toggle_play_pause(&mut self) -> Result<()> {
        let activity = Self::reported("activity", self.backend.activity(self.handle()?))?;
        match activity {
            Activity::Paused => self.play(false),
            Activity::Playing => self.pause(),
            Activity::Stopped => Ok(()),
        }
    }

    /// Pick up state changes the backend made on its own (end of stream)
    pub fn tick(&mut self) {
        if self.state != TransportState::Playing {
            return;
        }
        let Ok(handle) = self.handle() else {
            return;
        };
        if let Ok(Activity::Stopped) = self.backend.activity(handle) {
            debug!("Stream ended");
            self.state = TransportState::Stopped;
        }
    }

    /// True once the position has reached the end of a loaded stream
    pub fn is_finished(&self) -> bool {
        match (self.position(), self.duration()) {
            (Ok(pos), Ok(dur)) => dur > 0.0 && pos >= dur,
            _ => false,
        }
    }

    // ===== Timing =====

    pub fn duration(&self) -> Result<f64> {
        self.stream
            .as_ref()
            .map(|s| s.duration)
            .ok_or(PlayerError::NoStream)
    }

    pub fn position(&self) -> Result<f64> {
        let handle = self.handle()?;
        let bytes = Self::reported("position", self.backend.position_bytes(handle))?;
        let seconds = Self::reported("bytes to seconds", self.backend.bytes_to_seconds(handle, bytes))?;
        Ok(seconds.clamp(0.0, self.duration()?))
    }

    pub fn remaining(&self) -> Result<f64> {
        Ok((self.duration()? - self.position()?).max(0.0))
    }

    pub fn position_bytes(&self) -> Result<u64> {
        Self::reported("position", self.backend.position_bytes(self.handle()?))
    }

    pub fn position_time(&self) -> String {
        format_clock(self.position().unwrap_or(0.0))
    }

    pub fn duration_time(&self) -> String {
        format_clock(self.duration().unwrap_or(0.0))
    }

    pub fn remaining_time(&self) -> String {
        format_clock(self.remaining().unwrap_or(0.0))
    }

    // ===== Seeking =====

    /// Jump to `seconds`, clamped to the stream
    pub fn seek_absolute(&mut self, seconds: f64) -> Result<()> {
        if seconds.is_nan() {
            warn!("Ignoring seek to NaN");
            return Err(PlayerError::InvalidSeek(seconds));
        }
        let target = seconds.clamp(0.0, self.duration()?);
        let handle = self.handle()?;
        let bytes = Self::reported("seconds to bytes", self.backend.seconds_to_bytes(handle, target))?;
        Self::reported("seek", self.backend.set_position_bytes(handle, bytes))?;
        debug!("Seeked to {:.2}s", target);
        Ok(())
    }

    /// Move by `delta` seconds using the configured edge policy
    pub fn seek_relative(&mut self, delta: f64) -> Result<()> {
        if !delta.is_finite() {
            warn!("Ignoring relative seek by {}", delta);
            return Err(PlayerError::InvalidSeek(delta));
        }
        let position = self.position()?;
        let duration = self.duration()?;
        let target = match self.options.seek_policy {
            SeekPolicy::Clamp => (position + delta).clamp(0.0, duration),
            SeekPolicy::Halving => match halve_into_range(position, delta, duration) {
                Some(target) => target,
                None => return Ok(()),
            },
        };
        self.seek_absolute(target)
    }

    /// Byte-unit seek kept for compatibility; `units * BYTE_SEEK_SCALE` bytes
    pub fn seek_bytes(&mut self, units: i64) -> Result<()> {
        let handle = self.handle()?;
        let current = Self::reported("position", self.backend.position_bytes(handle))? as i64;
        let length = Self::reported("length", self.backend.length_bytes(handle))? as i64;
        let target = (current + units * BYTE_SEEK_SCALE).clamp(0, length);
        Self::reported("seek", self.backend.set_position_bytes(handle, target as u64))
    }

    // ===== Tempo =====

    /// Add `delta` percent. A rejected value leaves the previous tempo in place.
    pub fn change_tempo(&mut self, delta: i32) -> Result<()> {
        let next = self.tempo.saturating_add(delta);
        Self::reported("tempo", self.backend.set_tempo(self.handle()?, next))?;
        self.tempo = next;
        debug!("Tempo {}%", next);
        Ok(())
    }

    pub fn restore_tempo(&mut self) -> Result<()> {
        Self::reported("tempo", self.backend.set_tempo(self.handle()?, 0))?;
        self.tempo = 0;
        Ok(())
    }

    // ===== Volume (process-wide) =====

    pub fn volume(&self) -> Result<f32> {
        Self::reported("volume", self.backend.volume())
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        Self::reported("volume", self.backend.set_volume(volume.clamp(0.0, 1.0)))
    }

    pub fn increase_volume(&mut self) -> Result<()> {
        let current = self.volume()?;
        self.set_volume(current + self.options.volume_step)
    }

    pub fn decrease_volume(&mut self) -> Result<()> {
        let current = self.volume()?;
        self.set_volume(current - self.options.volume_step)
    }

    // ===== Telemetry =====

    pub fn snapshot(&self) -> Telemetry {
        let position = self.position().unwrap_or(0.0);
        let duration = self.duration().unwrap_or(0.0);
        Telemetry {
            state: self.state,
            path: self.stream.as_ref().map(|s| s.path.clone()),
            position,
            duration,
            remaining: (duration - position).max(0.0),
            tempo: self.tempo,
            volume: self.volume().unwrap_or(0.0),
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Halve `delta` until `position + delta` lands in `[0, duration]`.
/// `None` once the delta has shrunk below the smallest useful step, or when
/// any input is not finite.
fn halve_into_range(position: f64, delta: f64, duration: f64) -> Option<f64> {
    if !(position.is_finite() && delta.is_finite() && duration.is_finite()) {
        return None;
    }
    let mut delta = delta;
    loop {
        let target = position + delta;
        if (0.0..=duration).contains(&target) {
            return Some(target);
        }
        delta /= 2.0;
        if delta.abs() < MIN_SEEK_DELTA {
            return None;
        }
    }
}
