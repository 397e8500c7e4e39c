// Audio playback module
// Symphonia decodes, the WSOLA stretcher changes tempo and cpal plays

pub mod backend;
pub mod decoder;
pub mod format;
pub mod output;
pub mod player;
pub mod resampler;
pub mod tempo;
pub mod timing;

pub use player::{PlaybackEngine, TransportState};
