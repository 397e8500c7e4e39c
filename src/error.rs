// Error types for the backend and the playback engine
use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by an audio backend implementation
#[derive(Error, Debug)]
pub enum BackendError {
    /// A backend already owns the process-wide audio state
    #[error("audio backend already initialized")]
    AlreadyInitialized,

    /// Audio output device could not be opened or started
    #[error("audio output error: {0}")]
    Output(String),

    /// Container probing or packet decoding failed
    #[error("decode error: {0}")]
    Decode(String),

    /// The handle does not name a live stream
    #[error("invalid stream handle {0}")]
    InvalidHandle(u32),

    /// Tempo attribute outside the range the stretcher accepts
    #[error("tempo {0}% is out of range")]
    TempoOutOfRange(i32),

    /// Seek or conversion could not be performed
    #[error("seek failed: {0}")]
    Seek(String),
}

/// Failures surfaced by the playback engine and format resolution
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("{} is a directory", .0.display())]
    NotAFile(PathBuf),

    #[error("{extension} files are not supported ({content_type})")]
    UnsupportedFormat {
        extension: String,
        content_type: String,
    },

    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transport or timing call made before a stream was opened
    #[error("no stream loaded")]
    NoStream,

    /// Seek target or offset that is NaN or infinite
    #[error("seek offset {0} is not a finite number of seconds")]
    InvalidSeek(f64),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, PlayerError>;

/// Display-only error value handed back to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub message: String,
}

impl From<&PlayerError> for ErrorInfo {
    fn from(err: &PlayerError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
