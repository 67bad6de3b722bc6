// SPDX-License-Identifier: MPL-2.0
//! Integration tests for the playback controller
//!
//! These tests drive the controller end to end with the scripted decoder,
//! recording audio sink and recording surface from `vr_playback::testing`.

use approx::assert_abs_diff_eq;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use vr_playback::config::{Config, TickSource};
use vr_playback::domain::video::newtypes::frame_rate_bounds;
use vr_playback::domain::video::{PlaybackState, SeekDirection, StopMode};
use vr_playback::error::Error;
use vr_playback::testing::{
    RecordingSink, RecordingSurfaceFactory, ScriptedClip, ScriptedEngine,
};
use vr_playback::video_player::{PlaybackController, PlaybackEvent, TickOutcome};

const CLIP: &str = "clip.mp4";

struct Harness {
    player: PlaybackController,
    engine: Arc<ScriptedEngine>,
    sink: Arc<RecordingSink>,
    surfaces: RecordingSurfaceFactory,
}

fn external_config() -> Config {
    let mut config = Config::default();
    config.video.tick_source = TickSource::External;
    config
}

fn harness_with(clip: ScriptedClip, sink: RecordingSink, config: Config) -> Harness {
    let engine = Arc::new(ScriptedEngine::new().with_media(CLIP, clip));
    let sink = Arc::new(sink);
    let surfaces = RecordingSurfaceFactory::default();
    let player = PlaybackController::new(
        engine.clone(),
        sink.clone(),
        Arc::new(surfaces.clone()),
        config,
    );
    Harness {
        player,
        engine,
        sink,
        surfaces,
    }
}

fn harness(clip: ScriptedClip) -> Harness {
    harness_with(clip, RecordingSink::new(vec![44_100, 48_000]), external_config())
}

fn drain_events(events: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut seen = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => seen.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => return seen,
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn ten_second_clip_renders_every_frame_then_pauses_once() {
    let clip = ScriptedClip::new(10.0, 30.0, 44_100);
    let expected_size = clip.size();
    let mut h = harness(clip);
    let mut events = h.player.subscribe();

    let info = h.player.open(CLIP).expect("open");
    assert_eq!(info.size, expected_size);
    assert_abs_diff_eq!(info.frame_rate.value(), 30.0);
    assert_abs_diff_eq!(info.frame_interval().as_secs_f64(), 1.0 / 30.0, epsilon = 1e-6);
    assert_eq!(h.player.state(), PlaybackState::Playing);

    for i in 0..300 {
        match h.player.tick().expect("tick") {
            TickOutcome::Rendered { pts_secs } => {
                assert_abs_diff_eq!(pts_secs, f64::from(i) / 30.0, epsilon = 1e-9);
            }
            other => panic!("tick {i} returned {other:?}"),
        }
    }
    assert_eq!(h.player.state(), PlaybackState::Playing);

    assert_eq!(h.player.tick().expect("tick 301"), TickOutcome::EndOfStream);
    assert_eq!(h.player.state(), PlaybackState::Paused);

    // Further ticks are ignored and do not stop the decoder again.
    assert_eq!(h.player.tick().expect("tick 302"), TickOutcome::Skipped);

    let probe = h.engine.last_probe().expect("probe");
    assert_eq!(probe.soft_stops(), 1);

    let surface = h.surfaces.surface();
    assert_eq!(surface.blit_count(), 300);
    assert!(surface
        .blit_lens()
        .iter()
        .all(|&len| len == expected_size.rgb_len()));
    assert!(surface.blit_sizes().iter().all(|&size| size == expected_size));
    assert_eq!(h.player.stats().frames_rendered, 300);

    let end_events = drain_events(&mut events)
        .into_iter()
        .filter(|event| *event == PlaybackEvent::EndOfStream)
        .count();
    assert_eq!(end_events, 1);
}

#[test]
fn nonexistent_path_opens_nothing() {
    let mut h = harness(ScriptedClip::new(1.0, 30.0, 44_100));

    let result = h.player.open(Path::new("/no/such/file.mp4"));

    assert!(matches!(result, Err(Error::Open { ref path }) if path == Path::new("/no/such/file.mp4")));
    assert_eq!(h.player.state(), PlaybackState::Closed);
    assert!(h.sink.opened().is_empty());
    assert!(h.surfaces.specs().is_empty());
    assert!(!h.player.is_audio_running());
    assert!(h.player.media_info().is_none());
    assert!(matches!(
        h.player.tick(),
        Err(Error::InvalidState { .. })
    ));
}

#[test]
fn unsupported_sample_rate_falls_back_to_44100() {
    let mut h = harness(ScriptedClip::new(1.0, 30.0, 22_050));

    let info = h.player.open(CLIP).expect("open");

    assert_eq!(info.reported_sample_rate, 22_050);
    assert_eq!(info.sample_rate.hz(), 44_100);
    let opened = h.sink.opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].sample_rate.hz(), 44_100);
    assert_eq!(opened[0].channels, 2);
}

#[test]
fn supported_sample_rate_is_kept() {
    let mut h = harness(ScriptedClip::new(1.0, 30.0, 48_000));

    let info = h.player.open(CLIP).expect("open");

    assert_eq!(info.sample_rate.hz(), 48_000);
    assert_eq!(h.sink.opened()[0].sample_rate.hz(), 48_000);
}

#[test]
fn seeks_move_position_monotonically() {
    let mut h = harness(ScriptedClip::new(10.0, 30.0, 44_100));
    h.player.open(CLIP).expect("open");
    for _ in 0..60 {
        h.player.tick().expect("tick");
    }

    let before = h.player.position().expect("position");
    let target = h
        .player
        .seek(SeekDirection::Forward, 5.0)
        .expect("forward seek");
    let after_forward = h.player.position().expect("position");
    assert!(target >= before);
    assert!(after_forward >= before);

    let target = h
        .player
        .seek(SeekDirection::Backward, 3.0)
        .expect("backward seek");
    let after_backward = h.player.position().expect("position");
    assert!(target <= after_forward);
    assert!(after_backward <= after_forward);

    // A negative offset is treated as its magnitude.
    let target = h
        .player
        .seek(SeekDirection::Backward, -1.0)
        .expect("backward seek");
    assert!(target <= after_backward);

    // Backward past the start clamps to zero.
    let target = h
        .player
        .seek(SeekDirection::Backward, 60.0)
        .expect("backward seek");
    assert_abs_diff_eq!(target, 0.0);
    assert_abs_diff_eq!(h.player.position().expect("position"), 0.0);
}

#[test]
fn seek_step_uses_configured_step() {
    let mut config = external_config();
    config.seek.step_secs = 2.0;
    let mut h = harness_with(
        ScriptedClip::new(10.0, 30.0, 44_100),
        RecordingSink::new(vec![44_100]),
        config,
    );
    h.player.open(CLIP).expect("open");
    h.player.tick().expect("tick");

    let target = h
        .player
        .seek_step(SeekDirection::Forward)
        .expect("seek step");
    assert_abs_diff_eq!(target, 2.0, epsilon = 1e-9);
}

#[test]
fn refused_seek_reports_error_and_event() {
    let mut h = harness(ScriptedClip::new(10.0, 30.0, 44_100).failing_seeks());
    h.player.open(CLIP).expect("open");
    h.player.tick().expect("tick");
    let mut events = h.player.subscribe();

    let result = h.player.seek(SeekDirection::Forward, 2.0);

    match &result {
        Err(Error::Seek { target_secs }) => assert_abs_diff_eq!(*target_secs, 2.0, epsilon = 1e-9),
        other => panic!("expected seek error, got {other:?}"),
    }
    assert!(result.as_ref().is_err_and(Error::is_recoverable));
    assert!(drain_events(&mut events)
        .iter()
        .any(|event| matches!(event, PlaybackEvent::SeekFailed { .. })));
    assert_eq!(h.player.state(), PlaybackState::Playing);
    assert_eq!(h.engine.last_probe().expect("probe").seeks().len(), 1);
}

#[test]
fn seek_discards_buffered_audio_and_resumes_pumps() {
    let mut h = harness_with(
        ScriptedClip::new(10.0, 30.0, 44_100).with_audio_chunk(256),
        RecordingSink::new(vec![44_100]).with_write_delay(Duration::from_millis(5)),
        external_config(),
    );
    let log = h.sink.log();
    h.player.open(CLIP).expect("open");
    assert!(wait_until(|| log.writes_started() > 0));
    h.player.tick().expect("tick");

    h.player.seek(SeekDirection::Forward, 2.0).expect("seek while playing");
    assert_eq!(log.stops(), 1);
    assert_eq!(h.player.state(), PlaybackState::Playing);
    assert!(h.player.is_audio_running());
    let started = log.writes_started();
    assert!(wait_until(|| log.writes_started() > started));

    h.player.pause().expect("pause");
    h.player.seek(SeekDirection::Backward, 1.0).expect("seek while paused");
    assert_eq!(log.stops(), 2);
    assert_eq!(h.player.state(), PlaybackState::Paused);
    assert!(!h.player.is_audio_running());

    // Landing on end-of-stream pauses instead of restarting the pumps.
    h.player.play().expect("play");
    h.player.seek(SeekDirection::Forward, 60.0).expect("seek to end");
    assert_eq!(log.stops(), 3);
    assert_eq!(h.player.state(), PlaybackState::Paused);
    assert!(!h.player.is_audio_running());
    assert_eq!(log.writes_in_flight(), 0);
}

#[test]
fn pause_and_play_never_overlap_audio_pumps() {
    let mut h = harness_with(
        ScriptedClip::new(10.0, 30.0, 44_100).with_audio_chunk(256),
        RecordingSink::new(vec![44_100]).with_write_delay(Duration::from_millis(20)),
        external_config(),
    );
    let log = h.sink.log();
    h.player.open(CLIP).expect("open");

    for _ in 0..5 {
        assert!(wait_until(|| log.writes_started() > 0));
        assert!(h.player.is_audio_running());

        h.player.pause().expect("pause");
        assert_eq!(h.player.state(), PlaybackState::Paused);
        assert_eq!(log.writes_in_flight(), 0);
        assert!(!h.player.is_audio_running());

        let started = log.writes_started();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(log.writes_started(), started, "paused pump kept writing");

        h.player.play().expect("play");
        assert_eq!(h.player.state(), PlaybackState::Playing);
        assert!(log.writes_in_flight() <= 1);
    }

    h.player.close();
    assert_eq!(log.writes_in_flight(), 0);
    assert!(log.is_closed());
}

#[test]
fn pause_is_idempotent_and_toggle_resumes() {
    let mut h = harness(ScriptedClip::new(2.0, 30.0, 44_100));
    h.player.open(CLIP).expect("open");

    h.player.pause().expect("pause");
    h.player.pause().expect("pause again");
    assert_eq!(h.player.tick().expect("tick"), TickOutcome::Skipped);

    h.player.toggle_pause().expect("toggle");
    assert_eq!(h.player.state(), PlaybackState::Playing);
    assert!(matches!(
        h.player.tick().expect("tick"),
        TickOutcome::Rendered { .. }
    ));

    h.player.toggle_pause().expect("toggle");
    assert_eq!(h.player.state(), PlaybackState::Paused);
}

#[test]
fn play_after_end_of_stream_restarts_from_zero() {
    let mut h = harness(ScriptedClip::new(1.0, 10.0, 44_100));
    h.player.open(CLIP).expect("open");
    for _ in 0..10 {
        h.player.tick().expect("tick");
    }
    assert_eq!(h.player.tick().expect("tick"), TickOutcome::EndOfStream);

    h.player.play().expect("replay");

    assert_eq!(h.player.state(), PlaybackState::Playing);
    let probe = h.engine.last_probe().expect("probe");
    assert_eq!(probe.seeks().last(), Some(&(SeekDirection::Backward, 0.0)));
    assert_eq!(
        h.player.tick().expect("tick"),
        TickOutcome::Rendered { pts_secs: 0.0 }
    );
}

#[test]
fn stop_then_play_rewinds() {
    let mut h = harness(ScriptedClip::new(2.0, 10.0, 44_100));
    let log = h.sink.log();
    h.player.open(CLIP).expect("open");
    for _ in 0..5 {
        h.player.tick().expect("tick");
    }

    h.player.stop().expect("stop");
    assert_eq!(h.player.state(), PlaybackState::Stopped);
    assert_eq!(log.stops(), 1);
    assert_eq!(h.player.tick().expect("tick"), TickOutcome::Skipped);
    assert!(h.player.seek(SeekDirection::Forward, 1.0).is_err());

    h.player.play().expect("play");
    assert_eq!(
        h.player.tick().expect("tick"),
        TickOutcome::Rendered { pts_secs: 0.0 }
    );
}

#[test]
fn audio_device_failure_is_reported_without_stopping_video() {
    let mut h = harness_with(
        ScriptedClip::new(5.0, 30.0, 44_100),
        RecordingSink::new(vec![44_100]).failing_writes_after(2),
        external_config(),
    );
    let mut events = h.player.subscribe();
    h.player.open(CLIP).expect("open");

    assert!(wait_until(|| !h.player.is_audio_running()));

    assert!(matches!(h.player.take_audio_error(), Some(Error::Device(_))));
    assert!(h.player.take_audio_error().is_none());
    assert!(drain_events(&mut events)
        .iter()
        .any(|event| matches!(event, PlaybackEvent::AudioDeviceFailed { .. })));
    assert_eq!(h.player.state(), PlaybackState::Playing);
    assert!(matches!(
        h.player.tick().expect("tick"),
        TickOutcome::Rendered { .. }
    ));
}

#[test]
fn corrupt_frames_are_rejected_not_drawn() {
    let mut h = harness(ScriptedClip::new(1.0, 10.0, 44_100).with_corrupt_frames());
    h.player.open(CLIP).expect("open");

    assert_eq!(h.player.tick().expect("tick"), TickOutcome::Rejected);
    assert_eq!(h.surfaces.surface().blit_count(), 0);
    assert_eq!(h.player.stats().frames_rejected, 1);
    assert_eq!(h.player.state(), PlaybackState::Playing);
}

#[test]
fn reopening_closes_previous_session() {
    let mut h = harness(ScriptedClip::new(1.0, 10.0, 44_100));
    h.player.open(CLIP).expect("first open");
    let first = h.engine.last_probe().expect("first probe");

    h.player.open(CLIP).expect("second open");

    assert!(first.is_closed());
    assert_eq!(first.stops(), vec![StopMode::Hard]);
    assert_eq!(h.engine.probes().len(), 2);
    assert_eq!(h.player.state(), PlaybackState::Playing);
}

#[test]
fn device_open_failure_closes_session() {
    let mut h = harness_with(
        ScriptedClip::new(1.0, 10.0, 44_100),
        RecordingSink::new(vec![44_100]).failing_open(),
        external_config(),
    );

    let result = h.player.open(CLIP);

    assert!(matches!(result, Err(Error::Device(_))));
    assert_eq!(h.player.state(), PlaybackState::Closed);
    assert!(h.engine.last_probe().expect("probe").is_closed());
}

#[tokio::test(start_paused = true)]
async fn internal_ticker_paces_frames_and_pauses_at_end() {
    let engine = Arc::new(
        ScriptedEngine::new().with_media(CLIP, ScriptedClip::new(1.0, 10.0, 44_100).without_audio()),
    );
    let surfaces = RecordingSurfaceFactory::default();
    let mut player = PlaybackController::new(
        engine.clone(),
        Arc::new(RecordingSink::new(vec![44_100])),
        Arc::new(surfaces.clone()),
        Config::default(),
    );
    player.open(CLIP).expect("open");

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(surfaces.surface().blit_count(), 5);
    assert_eq!(player.state(), PlaybackState::Playing);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(surfaces.surface().blit_count(), 10);
    assert_eq!(player.state(), PlaybackState::Paused);
    assert_eq!(engine.last_probe().expect("probe").soft_stops(), 1);

    player.close();
    assert_eq!(player.state(), PlaybackState::Closed);
}

#[tokio::test(start_paused = true)]
async fn absurd_reported_frame_rate_falls_back_before_ticking() {
    let engine = Arc::new(
        ScriptedEngine::new().with_media(CLIP, ScriptedClip::new(1.0, 1e-30, 44_100).without_audio()),
    );
    let mut player = PlaybackController::new(
        engine,
        Arc::new(RecordingSink::new(vec![44_100])),
        Arc::new(RecordingSurfaceFactory::default()),
        Config::default(),
    );

    let info = player.open(CLIP).expect("open");

    assert_abs_diff_eq!(info.frame_rate.value(), 25.0);
    assert_eq!(info.frame_interval(), Duration::from_millis(40));
    tokio::time::sleep(Duration::from_millis(100)).await;
    player.close();
    assert_eq!(player.state(), PlaybackState::Closed);
}

#[tokio::test(start_paused = true)]
async fn absurd_configured_fallback_uses_default_rate() {
    for fallback in [1e-30, 1e12, f64::NAN] {
        let mut config = Config::default();
        config.video.fallback_frame_rate = fallback;
        let engine = Arc::new(
            ScriptedEngine::new().with_media(CLIP, ScriptedClip::new(1.0, 0.0, 44_100).without_audio()),
        );
        let mut player = PlaybackController::new(
            engine,
            Arc::new(RecordingSink::new(vec![44_100])),
            Arc::new(RecordingSurfaceFactory::default()),
            config,
        );

        let info = player.open(CLIP).expect("open");

        assert_abs_diff_eq!(info.frame_rate.value(), frame_rate_bounds::DEFAULT);
        tokio::time::sleep(Duration::from_millis(100)).await;
        player.close();
    }
}
