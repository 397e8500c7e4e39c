// Command dispatch
// Maps discrete player commands onto PlaybackEngine calls.
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::audio::player::{PlaybackEngine, TransportState};
use crate::error::{ErrorInfo, PlayerError};
use crate::library::FileSelection;
use crate::settings::PlaybackSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TempoUp,
    SeekBackCoarse,
    Pause,
    TempoReset,
    SeekForwardCoarse,
    SeekBackFine,
    Resume,
    QuickBack,
    TempoDown,
    VolumeUp,
    VolumeDown,
    TogglePlayPause,
    NudgeForward,
    NudgeBack,
    Stop,
}

pub struct Connector {
    engine: Arc<Mutex<PlaybackEngine>>,
    browser: Option<Arc<Mutex<dyn FileSelection>>>,
    settings: PlaybackSettings,
    armed: bool,
}

impl Connector {
    pub fn new(engine: Arc<Mutex<PlaybackEngine>>, settings: PlaybackSettings) -> Self {
        Self {
            engine,
            browser: None,
            settings,
            armed: false,
        }
    }

    pub fn set_browser(&mut self, browser: Arc<Mutex<dyn FileSelection>>) {
        self.browser = Some(browser);
    }

    pub fn engine(&self) -> &Arc<Mutex<PlaybackEngine>> {
        &self.engine
    }

    /// Whether hot-key commands are currently accepted
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Open `path` and start playing it. On failure nothing is started and
    /// the error comes back for display.
    pub fn play_selection(&mut self, path: &Path) -> Option<ErrorInfo> {
        let mut engine = self.engine.lock();
        if let Err(e) = engine.open(path) {
            return Some(ErrorInfo::from(&e));
        }

        self.armed = true;
        info!("Listening for commands on {:?}", path);
        match engine.play(false) {
            Ok(()) => None,
            Err(e) => Some(ErrorInfo::from(&e)),
        }
    }

    /// Play whatever the browser has selected
    pub fn play_selected(&mut self) -> Option<ErrorInfo> {
        let selected = self.browser.as_ref().and_then(|b| b.lock().selected_path());
        match selected {
            Some(path) => self.play_selection(&path),
            None => Some(ErrorInfo {
                message: "no file selected".to_string(),
            }),
        }
    }

    pub fn dispatch(&mut self, command: Command) -> Result<(), ErrorInfo> {
        if !self.armed {
            debug!("Ignoring {:?}, listener not started", command);
            return Ok(());
        }

        let s = &self.settings;
        let mut engine = self.engine.lock();
        let result = match command {
            Command::TempoUp => engine.change_tempo(s.tempo_step),
            Command::TempoDown => engine.change_tempo(-s.tempo_step),
            Command::TempoReset => engine.restore_tempo(),
            Command::SeekBackCoarse => engine.seek_relative(-s.coarse_seek_secs),
            Command::SeekForwardCoarse => engine.seek_relative(s.coarse_seek_secs),
            Command::SeekBackFine => engine.seek_relative(-s.fine_seek_secs),
            Command::Pause => engine.pause(),
            Command::Resume => engine.play(false),
            Command::QuickBack => {
                if engine.state() == TransportState::Paused {
                    Ok(())
                } else {
                    engine
                        .pause()
                        .and_then(|_| engine.seek_relative(-s.quick_back_secs))
                }
            }
            Command::VolumeUp => engine.increase_volume(),
            Command::VolumeDown => engine.decrease_volume(),
            Command::TogglePlayPause => engine.toggle_play_pause(),
            Command::NudgeForward => engine
                .position()
                .and_then(|pos| engine.seek_absolute(pos + s.nudge_secs)),
            Command::NudgeBack => engine
                .position()
                .and_then(|pos| engine.seek_absolute(pos - s.nudge_secs)),
            Command::Stop => {
                engine.close();
                self.armed = false;
                Ok(())
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(PlayerError::NoStream) => {
                debug!("{:?} without a stream, nothing to do", command);
                Ok(())
            }
            Err(e) => {
                warn!("{:?} failed: {}", command, e);
                Err(ErrorInfo::from(&e))
            }
        }
    }
}
