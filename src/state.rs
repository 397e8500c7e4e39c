// Application state for the terminal front-end
use std::path::Path;
use std::sync::Arc;

use crossterm::event::{KeyEvent, KeyEventKind};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::audio::player::{PlaybackEngine, Telemetry, TransportState};
use crate::commands::{Command, Connector};
use crate::library::{DirectoryBrowser, Selection};
use crate::metadata::TrackTags;
use crate::settings::PlayerSettings;
use crate::ui::keys::{self, BrowserAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Browser,
    Progress,
}

pub struct AppState {
    pub screen: Screen,
    pub browser: Arc<Mutex<DirectoryBrowser>>,
    pub connector: Connector,
    pub now_playing: Option<TrackTags>,
    pub status_line: String,
    pub should_quit: bool,
    pub settings: PlayerSettings,
}

impl AppState {
    pub fn new(engine: PlaybackEngine, browser: DirectoryBrowser, settings: PlayerSettings) -> Self {
        let browser = Arc::new(Mutex::new(browser));
        let mut connector = Connector::new(Arc::new(Mutex::new(engine)), settings.playback.clone());
        connector.set_browser(browser.clone());

        Self {
            screen: Screen::Browser,
            browser,
            connector,
            now_playing: None,
            status_line: String::new(),
            should_quit: false,
            settings,
        }
    }

    pub fn telemetry(&self) -> Telemetry {
        self.connector.engine().lock().snapshot()
    }

    /// Open a file given on the command line
    pub fn start_with(&mut self, path: &Path) {
        match self.connector.play_selection(path) {
            None => self.enter_progress(path),
            Some(err) => self.status_line = err.message,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        match self.screen {
            Screen::Browser => self.handle_browser_key(key),
            Screen::Progress => self.handle_progress_key(key),
        }
    }

    fn handle_browser_key(&mut self, key: KeyEvent) {
        let Some(action) = keys::browser_action(&key) else {
            return;
        };

        let result = {
            let mut browser = self.browser.lock();
            match action {
                BrowserAction::Up => {
                    browser.up();
                    Ok(Selection::Nothing)
                }
                BrowserAction::Down => {
                    browser.down();
                    Ok(Selection::Nothing)
                }
                BrowserAction::PageUp => {
                    browser.page_up();
                    Ok(Selection::Nothing)
                }
                BrowserAction::PageDown => {
                    browser.page_down();
                    Ok(Selection::Nothing)
                }
                BrowserAction::Parent => browser.parent().map(|_| Selection::Nothing),
                BrowserAction::Enter => browser.enter(),
                BrowserAction::Quit => {
                    self.should_quit = true;
                    Ok(Selection::Nothing)
                }
            }
        };

        match result {
            Ok(Selection::File(path)) => self.play_selected(&path),
            Ok(_) => {}
            Err(e) => {
                warn!("Browser action {:?} failed: {:#}", action, e);
                self.status_line = format!("{:#}", e);
            }
        }
    }

    fn play_selected(&mut self, path: &Path) {
        match self.connector.play_selected() {
            None => self.enter_progress(path),
            Some(err) => self.status_line = err.message,
        }
    }

    fn enter_progress(&mut self, path: &Path) {
        let tags = TrackTags::read(path);
        self.status_line = format!("Playing {}", tags.display());
        self.now_playing = Some(tags);
        self.screen = Screen::Progress;
    }

    fn handle_progress_key(&mut self, key: KeyEvent) {
        let Some(command) = keys::progress_command(&key) else {
            return;
        };
        match self.connector.dispatch(command) {
            Ok(()) => {
                if command == Command::Stop {
                    self.leave_progress("Stopped");
                }
            }
            Err(err) => self.status_line = err.message,
        }
    }

    fn leave_progress(&mut self, status: &str) {
        self.now_playing = None;
        self.status_line = status.to_string();
        self.screen = Screen::Browser;
    }

    /// Refresh-tick housekeeping: notice the end of the track
    pub fn on_tick(&mut self) {
        if self.screen != Screen::Progress {
            return;
        }
        let finished = {
            let mut engine = self.connector.engine().lock();
            engine.tick();
            engine.state() == TransportState::Stopped || engine.is_finished()
        };
        if finished {
            debug!("Track finished, back to the browser");
            if let Err(err) = self.connector.dispatch(Command::Stop) {
                self.status_line = err.message;
            }
            self.leave_progress("Finished");
        }
    }
}
