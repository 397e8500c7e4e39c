// Native audio backend boundary
// Handle-based API: a decode stream has to be wrapped in a tempo stream
// before any transport call can be made on it.

pub mod clock;
pub mod device;
pub mod virtual_device;

use std::path::Path;

use crate::audio::format::DecoderKind;
use crate::error::BackendError;

pub use clock::{Clock, ManualClock, SystemClock};
pub use device::DeviceBackend;
pub use virtual_device::VirtualBackend;

pub type BackendResult<T> = Result<T, BackendError>;

/// Decode-only stream. Consumed when wrapped by the tempo effect.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodeHandle(u32);

/// Tempo-wrapped stream, the only handle transport calls accept.
/// Not `Copy`: freeing it consumes the handle.
#[derive(Debug, PartialEq, Eq)]
pub struct StreamHandle(u32);

impl DecodeHandle {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

impl StreamHandle {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

/// The backend's own view of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Stopped,
    Playing,
    Paused,
}

pub trait AudioBackend {
    /// Open `path` for decoding with the resolved decoder
    fn create_stream(&self, path: &Path, decoder: DecoderKind) -> BackendResult<DecodeHandle>;

    /// Wrap a decode stream in the tempo effect. The source is owned (and
    /// eventually freed) by the returned stream.
    fn create_tempo_stream(&self, source: DecodeHandle) -> BackendResult<StreamHandle>;

    fn free_stream(&self, stream: StreamHandle) -> BackendResult<()>;

    fn play(&self, stream: &StreamHandle, restart: bool) -> BackendResult<()>;
    fn pause(&self, stream: &StreamHandle) -> BackendResult<()>;
    fn stop(&self, stream: &StreamHandle) -> BackendResult<()>;
    fn activity(&self, stream: &StreamHandle) -> BackendResult<Activity>;

    fn length_bytes(&self, stream: &StreamHandle) -> BackendResult<u64>;
    fn position_bytes(&self, stream: &StreamHandle) -> BackendResult<u64>;
    /// Reposition; values past the end are clamped to the end
    fn set_position_bytes(&self, stream: &StreamHandle, bytes: u64) -> BackendResult<()>;
    fn bytes_to_seconds(&self, stream: &StreamHandle, bytes: u64) -> BackendResult<f64>;
    fn seconds_to_bytes(&self, stream: &StreamHandle, seconds: f64) -> BackendResult<u64>;

    /// Tempo attribute, percent offset from natural speed
    fn set_tempo(&self, stream: &StreamHandle, percent: i32) -> BackendResult<()>;

    /// Process-wide master volume in `[0, 1]`
    fn volume(&self) -> BackendResult<f32>;
    fn set_volume(&self, volume: f32) -> BackendResult<()>;
}
