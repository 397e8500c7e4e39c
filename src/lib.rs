// Scribe - terminal audio player for transcription work
// Module declarations
pub mod audio;
pub mod cli;
pub mod commands;
pub mod error;
pub mod library;
pub mod metadata;
pub mod settings;
pub mod state;
pub mod ui;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use audio::backend::{AudioBackend, DeviceBackend, SystemClock, VirtualBackend};
use audio::player::PlaybackEngine;
use cli::Cli;
use library::DirectoryBrowser;
use settings::PlayerSettings;
use state::AppState;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = match cli.config.clone() {
        Some(path) => path,
        None => PlayerSettings::default_path()
            .ok_or_else(|| anyhow!("failed to resolve config directory"))?,
    };
    let settings = PlayerSettings::load(&settings_path)?;

    let log_path = resolve_log_path(&cli)?;
    init_tracing_to_file(&log_path)?;
    info!("Scribe starting, settings from {:?}", settings_path);

    let backend: Arc<dyn AudioBackend> = if cli.no_audio {
        info!("Running without an audio device");
        Arc::new(VirtualBackend::new(Arc::new(SystemClock::new())))
    } else {
        match DeviceBackend::init() {
            Ok(backend) => Arc::new(backend),
            Err(e) => {
                error!("Audio backend initialization failed: {}", e);
                eprintln!("scribe: audio backend initialization failed: {}", e);
                return Err(e.into());
            }
        }
    };

    let mut engine = PlaybackEngine::new(backend, settings.playback.engine_options());
    if let Err(e) = engine.set_volume(settings.playback.initial_volume) {
        eprintln!("scribe: could not set initial volume: {}", e);
    }

    let start_dir = start_directory(&cli, &settings)?;
    let browser = DirectoryBrowser::new(&start_dir, settings.interface.show_hidden)
        .with_context(|| format!("open directory {}", start_dir.display()))?;

    let mut app = AppState::new(engine, browser, settings);
    if let Some(file) = cli.file.as_deref() {
        app.start_with(file);
    }

    let mut terminal = init_terminal()?;
    let run_result = run_app_loop(&mut terminal, &mut app).await;
    let restore_result = restore_terminal(&mut terminal);

    app.connector.engine().lock().teardown();
    info!("Scribe exiting");
    restore_result?;
    run_result
}

fn resolve_log_path(cli: &Cli) -> Result<PathBuf> {
    let path = match cli.log_file.clone() {
        Some(path) => path,
        None => dirs::data_dir()
            .ok_or_else(|| anyhow!("failed to resolve data directory"))?
            .join("scribe")
            .join("scribe.log"),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    Ok(path)
}

fn start_directory(cli: &Cli, settings: &PlayerSettings) -> Result<PathBuf> {
    if let Some(dir) = cli.dir.clone().or_else(|| settings.interface.start_dir.clone()) {
        return Ok(dir);
    }
    if let Some(parent) = cli.file.as_deref().and_then(Path::parent) {
        if !parent.as_os_str().is_empty() {
            return Ok(parent.to_path_buf());
        }
    }
    dirs::home_dir()
        .or_else(|| std::env::current_dir().ok())
        .ok_or_else(|| anyhow!("failed to resolve a start directory"))
}

fn init_tracing_to_file(log_path: &Path) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("open log file {}", log_path.display()))?;
    let writer = Arc::new(parking_lot::Mutex::new(file));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(move || FileLogWriter::new(Arc::clone(&writer)))
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}

struct FileLogWriter {
    file: Arc<parking_lot::Mutex<std::fs::File>>,
}

impl FileLogWriter {
    fn new(file: Arc<parking_lot::Mutex<std::fs::File>>) -> Self {
        Self { file }
    }
}

impl Write for FileLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

async fn run_app_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
) -> Result<()> {
    let (key_tx, mut key_rx) = unbounded_channel::<KeyEvent>();
    spawn_input_task(key_tx);

    let refresh = Duration::from_millis(app.settings.interface.refresh_interval_ms.max(10));
    let mut ticker = tokio::time::interval(refresh);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        terminal.draw(|frame| ui::render(frame, app))?;
        if app.should_quit {
            break;
        }

        tokio::select! {
            maybe_key = key_rx.recv() => {
                match maybe_key {
                    Some(key) => app.handle_key(key),
                    None => break,
                }
            }
            _ = ticker.tick() => {
                app.on_tick();
            }
        }
    }
    Ok(())
}

fn init_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_task(key_tx: UnboundedSender<KeyEvent>) {
    tokio::task::spawn_blocking(move || loop {
        match event::poll(Duration::from_millis(100)) {
            Ok(true) => match event::read() {
                Ok(CrosstermEvent::Key(key)) => {
                    if key_tx.send(key).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            },
            Ok(false) => {
                if key_tx.is_closed() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}
