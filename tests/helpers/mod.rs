//! Shared fixtures for integration tests
//!
//! WAV files are generated with hound into a temp directory, and the engine
//! runs on the virtual backend driven by a manual clock.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use scribe_lib::audio::backend::{ManualClock, VirtualBackend};
use parking_lot::Mutex;
use scribe_lib::audio::player::{EngineOptions, PlaybackEngine, SeekPolicy};
use scribe_lib::commands::Connector;
use scribe_lib::settings::PlaybackSettings;
use tempfile::TempDir;

pub const SAMPLE_RATE: u32 = 8000;

/// Write a 16-bit 440 Hz sine WAV of `seconds` length
pub fn write_wav(path: &Path, seconds: u32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    let frames = SAMPLE_RATE * seconds;
    for i in 0..frames {
        let t = i as f32 / SAMPLE_RATE as f32;
        let sample = ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 8000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(sample).expect("write sample");
        }
    }
    writer.finalize().expect("finalize wav");
}

pub struct Fixture {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<VirtualBackend>,
    pub engine: PlaybackEngine,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_policy(SeekPolicy::Halving)
    }

    pub fn with_policy(seek_policy: SeekPolicy) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(ManualClock::new());
        let backend = Arc::new(VirtualBackend::new(clock.clone()));
        let options = EngineOptions {
            seek_policy,
            ..EngineOptions::default()
        };
        let engine = PlaybackEngine::new(backend.clone(), options);
        Self {
            dir,
            clock,
            backend,
            engine,
        }
    }

    /// Ten-second mono file, the shape most scenarios use
    pub fn ten_second_wav(&self) -> PathBuf {
        self.wav("ten.wav", 10, 1)
    }

    pub fn wav(&self, name: &str, seconds: u32, channels: u16) -> PathBuf {
        let path = self.dir.path().join(name);
        write_wav(&path, seconds, channels);
        path
    }

    pub fn advance_secs(&self, seconds: f64) {
        self.clock.advance(Duration::from_secs_f64(seconds));
    }

    /// Hand the engine to a Connector, keeping the rest of the fixture
    pub fn connect(self) -> (Connector, Rig) {
        let Fixture {
            dir,
            clock,
            backend,
            engine,
        } = self;
        let connector = Connector::new(Arc::new(Mutex::new(engine)), PlaybackSettings::default());
        (connector, Rig { dir, clock, backend })
    }
}

/// Fixture remains once the engine belongs to a Connector
pub struct Rig {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<VirtualBackend>,
}

impl Rig {
    pub fn advance_secs(&self, seconds: f64) {
        self.clock.advance(Duration::from_secs_f64(seconds));
    }
}
