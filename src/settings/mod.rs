// Settings module
// Persisted player settings (settings.json under the config directory)

pub mod settings;

pub use settings::{InterfaceSettings, PlaybackSettings, PlayerSettings};
