// Settings management and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::audio::player::{EngineOptions, SeekPolicy};

/// Seek distances and tempo/volume steps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub seek_policy: SeekPolicy,
    pub coarse_seek_secs: f64, // F3 / F6
    pub fine_seek_secs: f64,   // F7
    pub quick_back_secs: f64,  // F9
    pub nudge_secs: f64,       // arrow keys
    pub tempo_step: i32,       // percent per F2 / F11
    pub volume_step: f32,
    pub initial_volume: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            seek_policy: SeekPolicy::Halving,
            coarse_seek_secs: 10.0,
            fine_seek_secs: 2.0,
            quick_back_secs: 4.0,
            nudge_secs: 3.0,
            tempo_step: 4,
            volume_step: 0.05,
            initial_volume: 1.0,
        }
    }
}

impl PlaybackSettings {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            seek_policy: self.seek_policy,
            volume_step: self.volume_step,
        }
    }
}

/// Terminal front-end settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceSettings {
    pub refresh_interval_ms: u64,
    pub start_dir: Option<PathBuf>,
    pub show_hidden: bool,
}

impl Default for InterfaceSettings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 100,
            start_dir: None,
            show_hidden: false,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub version: i32, // Settings schema version for future migrations
    pub playback: PlaybackSettings,
    pub interface: InterfaceSettings,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            version: 1,
            playback: PlaybackSettings::default(),
            interface: InterfaceSettings::default(),
        }
    }
}

impl PlayerSettings {
    /// Default settings file under the user config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("scribe").join("settings.json"))
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read settings file {:?}: {}", path, e))?;
        let settings: PlayerSettings = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse settings {:?}: {}", path, e))?;

        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        info!("Saved settings to {:?}", path);
        Ok(())
    }
}
