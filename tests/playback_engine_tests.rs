//! Playback engine behaviour against the virtual backend
//!
//! Covers the transport state machine, timing invariants, the seek edge
//! policies, tempo and volume handling and teardown.

mod helpers;

use helpers::Fixture;
use scribe_lib::audio::backend::virtual_device::Fault;
use scribe_lib::audio::player::{SeekPolicy, TransportState};
use scribe_lib::error::{BackendError, PlayerError};

const EPS: f64 = 1e-6;

#[test]
fn opened_file_reports_duration_and_zero_position() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();

    fx.engine.open(&wav).unwrap();

    assert_eq!(fx.engine.state(), TransportState::Ready);
    assert!((fx.engine.duration().unwrap() - 10.0).abs() < EPS);
    assert_eq!(fx.engine.position().unwrap(), 0.0);
    assert_eq!(fx.engine.position_time(), "00:00");
    assert_eq!(fx.engine.duration_time(), "00:10");
}

#[test]
fn playing_advances_with_the_clock() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();

    fx.engine.play(false).unwrap();
    fx.advance_secs(3.0);

    assert_eq!(fx.engine.state(), TransportState::Playing);
    assert!((fx.engine.position().unwrap() - 3.0).abs() < 1e-3);
    assert_eq!(fx.engine.position_time(), "00:03");
    assert_eq!(fx.engine.remaining_time(), "00:07");
}

#[test]
fn forward_seek_near_the_end_never_passes_duration() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.play(false).unwrap();
    fx.advance_secs(3.0);

    // 3 + 10 is past the end, halving settles on 3 + 5
    fx.engine.seek_relative(10.0).unwrap();
    let position = fx.engine.position().unwrap();
    assert!((position - 8.0).abs() < 1e-3);

    fx.advance_secs(1.5);
    assert!(fx.engine.remaining().unwrap() < 10.0);
    fx.engine.seek_relative(10.0).unwrap();
    let position = fx.engine.position().unwrap();
    assert!(position <= fx.engine.duration().unwrap());
    assert!(position > 9.5);
}

#[test]
fn clamp_policy_stops_at_the_edges() {
    let mut fx = Fixture::with_policy(SeekPolicy::Clamp);
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.seek_absolute(3.0).unwrap();

    fx.engine.seek_relative(10.0).unwrap();
    assert!((fx.engine.position().unwrap() - 10.0).abs() < EPS);

    fx.engine.seek_relative(-25.0).unwrap();
    assert_eq!(fx.engine.position().unwrap(), 0.0);
}

#[test]
fn repeated_relative_seeks_stay_in_range() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();

    for delta in [4.0, 4.0, 4.0, -2.0, 10.0, 10.0, -10.0, -10.0, -10.0, 3.5, 7.25] {
        fx.engine.seek_relative(delta).unwrap();
        let position = fx.engine.position().unwrap();
        let duration = fx.engine.duration().unwrap();
        assert!(
            (0.0..=duration).contains(&position),
            "seek by {} left position at {}",
            delta,
            position
        );
    }
}

#[test]
fn non_finite_seeks_are_rejected_without_moving() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.seek_absolute(4.0).unwrap();

    for delta in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        assert!(matches!(
            fx.engine.seek_relative(delta),
            Err(PlayerError::InvalidSeek(_))
        ));
    }
    assert!(matches!(
        fx.engine.seek_absolute(f64::NAN),
        Err(PlayerError::InvalidSeek(_))
    ));
    assert!((fx.engine.position().unwrap() - 4.0).abs() < 1e-3);
    assert_eq!(fx.engine.state(), TransportState::Ready);
}

#[test]
fn non_finite_seeks_are_rejected_under_clamp_policy() {
    let mut fx = Fixture::with_policy(SeekPolicy::Clamp);
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.seek_absolute(2.0).unwrap();

    assert!(fx.engine.seek_relative(f64::NAN).is_err());
    assert!((fx.engine.position().unwrap() - 2.0).abs() < 1e-3);
}

#[test]
fn directory_open_leaves_the_engine_untouched() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.play(false).unwrap();

    let dir = fx.dir.path().to_path_buf();
    let err = fx.engine.open(&dir).unwrap_err();

    assert!(matches!(err, PlayerError::NotAFile(_)));
    assert_eq!(fx.engine.state(), TransportState::Playing);
    assert_eq!(fx.engine.stream().map(|s| s.path()), Some(wav.as_path()));
    assert_eq!(fx.backend.live_streams(), 1);
}

#[test]
fn tempo_up_then_down_nets_to_zero() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    let applied = |fx: &Fixture| {
        let stream = fx.engine.stream().expect("stream");
        fx.backend.applied_tempo(stream.handle())
    };

    fx.engine.change_tempo(4).unwrap();
    assert_eq!(fx.engine.tempo(), 4);
    assert_eq!(applied(&fx), Some(4));
    fx.engine.change_tempo(-4).unwrap();
    assert_eq!(fx.engine.tempo(), 0);
    assert_eq!(applied(&fx), Some(0));

    // Same end state as an explicit reset
    fx.engine.change_tempo(12).unwrap();
    fx.engine.change_tempo(-3).unwrap();
    assert_eq!(fx.engine.tempo(), 9);
    fx.engine.restore_tempo().unwrap();
    assert_eq!(fx.engine.tempo(), 0);
}

#[test]
fn tempo_changes_playback_rate() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.change_tempo(50).unwrap();
    fx.engine.play(false).unwrap();

    fx.advance_secs(2.0);
    assert!((fx.engine.position().unwrap() - 3.0).abs() < 1e-3);
}

#[test]
fn rejected_tempo_rolls_back() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.change_tempo(8).unwrap();

    let err = fx.engine.change_tempo(600).unwrap_err();
    assert!(matches!(
        err,
        PlayerError::Backend(BackendError::TempoOutOfRange(608))
    ));
    assert_eq!(fx.engine.tempo(), 8);

    fx.backend.fail_on(Fault::Tempo);
    assert!(fx.engine.change_tempo(4).is_err());
    assert_eq!(fx.engine.tempo(), 8);
    assert!(fx.engine.restore_tempo().is_err());
    assert_eq!(fx.engine.tempo(), 8);

    fx.backend.heal();
    fx.engine.restore_tempo().unwrap();
    assert_eq!(fx.engine.tempo(), 0);
}

#[test]
fn unsupported_content_is_rejected_without_a_stream() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();

    let text = fx.dir.path().join("notes.xyz");
    std::fs::write(&text, "plain text, no audio here").unwrap();
    let err = fx.engine.open(&text).unwrap_err();

    match err {
        PlayerError::UnsupportedFormat { extension, .. } => assert_eq!(extension, ".xyz"),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(fx.engine.state(), TransportState::Errored);
    assert!(fx.engine.stream().is_none());
    assert_eq!(fx.backend.live_streams(), 0);
}

#[test]
fn transport_sequences_always_land_in_a_defined_state() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();

    assert_eq!(fx.engine.state(), TransportState::Uninitialized);
    fx.engine.open(&wav).unwrap();
    assert_eq!(fx.engine.state(), TransportState::Ready);
    fx.engine.pause().unwrap();
    assert_eq!(fx.engine.state(), TransportState::Ready);
    fx.engine.play(false).unwrap();
    assert_eq!(fx.engine.state(), TransportState::Playing);
    fx.engine.pause().unwrap();
    fx.engine.pause().unwrap();
    assert_eq!(fx.engine.state(), TransportState::Paused);
    fx.engine.stop().unwrap();
    assert_eq!(fx.engine.state(), TransportState::Stopped);
    fx.engine.stop().unwrap();
    assert_eq!(fx.engine.state(), TransportState::Stopped);
    fx.engine.play(true).unwrap();
    assert_eq!(fx.engine.state(), TransportState::Playing);
    fx.engine.close();
    assert_eq!(fx.engine.state(), TransportState::Uninitialized);
}

#[test]
fn paused_position_holds_still() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.play(false).unwrap();
    fx.advance_secs(2.0);
    fx.engine.pause().unwrap();
    fx.advance_secs(5.0);

    assert!((fx.engine.position().unwrap() - 2.0).abs() < 1e-3);
    fx.engine.toggle_play_pause().unwrap();
    assert_eq!(fx.engine.state(), TransportState::Playing);
    fx.advance_secs(1.0);
    assert!((fx.engine.position().unwrap() - 3.0).abs() < 1e-3);
}

#[test]
fn backend_failure_marks_the_engine_errored() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.play(false).unwrap();

    fx.backend.fail_on(Fault::Pause);
    assert!(fx.engine.pause().is_err());
    assert_eq!(fx.engine.state(), TransportState::Errored);

    fx.backend.heal();
    fx.engine.play(false).unwrap();
    assert_eq!(fx.engine.state(), TransportState::Playing);
}

#[test]
fn close_twice_frees_once() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.play(false).unwrap();

    fx.engine.close();
    fx.engine.close();

    assert_eq!(fx.engine.state(), TransportState::Uninitialized);
    assert_eq!(fx.backend.freed_streams(), 1);
    assert_eq!(fx.backend.live_streams(), 0);
}

#[test]
fn teardown_closes_once_and_drop_does_not_close_again() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.play(false).unwrap();

    fx.engine.teardown();
    assert_eq!(fx.engine.state(), TransportState::Uninitialized);
    assert_eq!(fx.backend.freed_streams(), 1);

    fx.engine.teardown();
    assert_eq!(fx.engine.state(), TransportState::Uninitialized);
    assert_eq!(fx.backend.freed_streams(), 1);

    let backend = fx.backend.clone();
    drop(fx);
    assert_eq!(backend.freed_streams(), 1);
    assert_eq!(backend.live_streams(), 0);
}

#[test]
fn dropping_the_engine_frees_its_stream() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.play(false).unwrap();

    let backend = fx.backend.clone();
    drop(fx);

    assert_eq!(backend.freed_streams(), 1);
    assert_eq!(backend.live_streams(), 0);
}

#[test]
fn stop_keeps_the_position_and_play_resumes_from_it() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.play(false).unwrap();
    fx.advance_secs(4.0);

    fx.engine.stop().unwrap();
    assert_eq!(fx.engine.state(), TransportState::Stopped);
    fx.advance_secs(3.0);
    assert!((fx.engine.position().unwrap() - 4.0).abs() < 1e-3);

    fx.engine.play(false).unwrap();
    fx.advance_secs(1.0);
    assert!((fx.engine.position().unwrap() - 5.0).abs() < 1e-3);

    fx.engine.stop().unwrap();
    fx.engine.play(true).unwrap();
    assert!(fx.engine.position().unwrap() < 1e-3);
}

#[test]
fn reopening_frees_the_previous_stream() {
    let mut fx = Fixture::new();
    let first = fx.ten_second_wav();
    let second = fx.wav("stereo.wav", 4, 2);

    fx.engine.open(&first).unwrap();
    fx.engine.play(false).unwrap();
    fx.engine.change_tempo(20).unwrap();
    fx.engine.open(&second).unwrap();

    assert_eq!(fx.backend.freed_streams(), 1);
    assert_eq!(fx.backend.live_streams(), 1);
    assert_eq!(fx.engine.state(), TransportState::Ready);
    assert_eq!(fx.engine.tempo(), 0);
    assert!((fx.engine.duration().unwrap() - 4.0).abs() < EPS);
}

#[test]
fn failed_free_still_ends_uninitialized() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();

    fx.backend.fail_on(Fault::Free);
    fx.engine.close();

    assert_eq!(fx.engine.state(), TransportState::Uninitialized);
    assert!(fx.engine.stream().is_none());
    assert!(matches!(fx.engine.position(), Err(PlayerError::NoStream)));
}

#[test]
fn calls_without_a_stream_report_no_stream() {
    let mut fx = Fixture::new();

    assert!(matches!(fx.engine.position(), Err(PlayerError::NoStream)));
    assert!(matches!(fx.engine.duration(), Err(PlayerError::NoStream)));
    assert!(matches!(fx.engine.play(false), Err(PlayerError::NoStream)));
    assert!(matches!(fx.engine.seek_relative(2.0), Err(PlayerError::NoStream)));
    assert!(matches!(fx.engine.change_tempo(4), Err(PlayerError::NoStream)));
    assert_eq!(fx.engine.position_time(), "00:00");
    assert_eq!(fx.engine.state(), TransportState::Uninitialized);

    fx.engine.close();
    assert_eq!(fx.engine.state(), TransportState::Uninitialized);
}

#[test]
fn volume_steps_clamp_to_unit_range() {
    let mut fx = Fixture::new();

    fx.engine.set_volume(1.0).unwrap();
    fx.engine.increase_volume().unwrap();
    assert_eq!(fx.engine.volume().unwrap(), 1.0);

    fx.engine.set_volume(0.02).unwrap();
    fx.engine.decrease_volume().unwrap();
    assert_eq!(fx.engine.volume().unwrap(), 0.0);

    fx.engine.set_volume(0.5).unwrap();
    fx.engine.increase_volume().unwrap();
    assert!((fx.engine.volume().unwrap() - 0.55).abs() < 1e-6);

    fx.backend.fail_on(Fault::Volume);
    assert!(fx.engine.increase_volume().is_err());
}

#[test]
fn end_of_stream_is_picked_up_by_tick() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.play(false).unwrap();

    fx.advance_secs(11.0);
    assert_eq!(fx.engine.state(), TransportState::Playing);
    fx.engine.tick();

    assert_eq!(fx.engine.state(), TransportState::Stopped);
    assert!(fx.engine.is_finished());
    assert!((fx.engine.position().unwrap() - 10.0).abs() < EPS);

    // Playing again from the end starts over
    fx.engine.play(false).unwrap();
    assert_eq!(fx.engine.position().unwrap(), 0.0);
}

#[test]
fn byte_unit_seek_moves_by_the_scale() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();

    // 124_000 bytes of mono 16-bit at 8 kHz
    fx.engine.seek_bytes(1).unwrap();
    assert!((fx.engine.position().unwrap() - 7.75).abs() < EPS);
    assert_eq!(fx.engine.position_bytes().unwrap(), 124_000);

    fx.engine.seek_bytes(-3).unwrap();
    assert_eq!(fx.engine.position().unwrap(), 0.0);
}

#[test]
fn snapshot_reflects_the_engine() {
    let mut fx = Fixture::new();
    let wav = fx.ten_second_wav();
    fx.engine.open(&wav).unwrap();
    fx.engine.play(false).unwrap();
    fx.engine.change_tempo(-8).unwrap();
    fx.advance_secs(2.5);

    let snapshot = fx.engine.snapshot();
    assert_eq!(snapshot.state, TransportState::Playing);
    assert_eq!(snapshot.path.as_deref(), Some(wav.as_path()));
    assert_eq!(snapshot.tempo, -8);
    assert!((snapshot.position - 2.3).abs() < 1e-3);
    assert!((snapshot.remaining - 7.7).abs() < 1e-3);
    assert!((snapshot.progress() - 0.23).abs() < 1e-3);
}
