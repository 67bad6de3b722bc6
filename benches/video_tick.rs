// SPDX-License-Identifier: MPL-2.0
//! Benchmarks for the video pump.
//!
//! Measures the performance of:
//! - One externally driven tick at common resolutions (decode + blit)
//! - The same tick with the vertical flip disabled

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use vr_playback::config::{Config, TickSource};
use vr_playback::domain::video::SeekDirection;
use vr_playback::testing::{RecordingSink, ScriptedClip, ScriptedEngine};
use vr_playback::video_player::{FrameSurfaceFactory, PlaybackController, TickOutcome};

const RESOLUTIONS: &[(u32, u32)] = &[(640, 360), (1280, 720), (1920, 1080)];

fn controller(width: u32, height: u32, flip_vertical: bool) -> PlaybackController {
    let clip = ScriptedClip::new(3_600.0, 30.0, 44_100)
        .with_size(width, height)
        .without_audio();
    let mut config = Config::default();
    config.video.tick_source = TickSource::External;
    config.video.flip_vertical = flip_vertical;

    let mut player = PlaybackController::new(
        Arc::new(ScriptedEngine::new().with_media("bench.mp4", clip)),
        Arc::new(RecordingSink::new(vec![44_100])),
        Arc::new(FrameSurfaceFactory::new()),
        config,
    );
    player.open("bench.mp4").expect("open bench clip");
    player
}

fn tick(player: &mut PlaybackController) {
    match player.tick().expect("tick") {
        TickOutcome::EndOfStream => {
            player.play().expect("replay");
        }
        outcome => {
            black_box(outcome);
        }
    }
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("video_tick");

    for &(width, height) in RESOLUTIONS {
        let label = format!("{width}x{height}");

        let mut flipped = controller(width, height, true);
        group.bench_with_input(BenchmarkId::new("flip", &label), &label, |b, _| {
            b.iter(|| tick(&mut flipped));
        });
        flipped.close();

        let mut upright = controller(width, height, false);
        group.bench_with_input(BenchmarkId::new("no_flip", &label), &label, |b, _| {
            b.iter(|| tick(&mut upright));
        });
        upright.close();
    }

    group.finish();
}

fn bench_seek(c: &mut Criterion) {
    let mut group = c.benchmark_group("seek");
    let mut player = controller(1280, 720, true);

    group.bench_function("seek_and_render", |b| {
        b.iter(|| {
            let target = player
                .seek(SeekDirection::Forward, 1.0)
                .expect("seek forward");
            if target > 3_000.0 {
                player
                    .seek(SeekDirection::Backward, target)
                    .expect("seek back");
            }
            black_box(target);
        });
    });

    player.close();
    group.finish();
}

criterion_group!(benches, bench_tick, bench_seek);
criterion_main!(benches);
