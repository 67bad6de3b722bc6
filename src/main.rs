// SPDX-License-Identifier: MPL-2.0
//! `vr-play`: plays one media file with `FFmpeg` and the default audio output,
//! driven by single-letter commands on stdin.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use vr_playback::config::{self, Config};
use vr_playback::domain::video::SeekDirection;
use vr_playback::error::{Error, Result};
use vr_playback::infrastructure::{CpalSink, FfmpegEngine};
use vr_playback::video_player::{FrameSurfaceFactory, PlaybackController, PlaybackEvent};

const HELP: &str = "\
vr-play - play a media file

USAGE:
  vr-play [OPTIONS] <FILE>

OPTIONS:
  --config <PATH>     Read settings from PATH instead of the user config dir
  --snapshot <PATH>   Save the last displayed frame as PNG on exit
  -h, --help          Print this help

COMMANDS (stdin):
  p  toggle pause     f  seek forward     b  seek backward
  s  stop             i  show position    q  quit
";

struct Args {
    file: PathBuf,
    config: Option<PathBuf>,
    snapshot: Option<PathBuf>,
}

fn parse_args() -> std::result::Result<Option<Args>, pico_args::Error> {
    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(None);
    }

    let config = args.opt_value_from_str("--config")?;
    let snapshot = args.opt_value_from_str("--snapshot")?;
    let file = args.free_from_str()?;
    Ok(Some(Args {
        file,
        config,
        snapshot,
    }))
}

fn load_config(path: Option<&PathBuf>) -> Config {
    let loaded = match path {
        Some(path) => config::load_from_path(path),
        None => config::load(),
    };
    loaded.unwrap_or_else(|err| {
        tracing::warn!("Using default settings: {err}");
        Config::default()
    })
}

/// Forwards stdin lines until EOF.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn print_events(mut events: broadcast::Receiver<PlaybackEvent>) {
    loop {
        match events.recv().await {
            Ok(PlaybackEvent::FrameRendered { .. }) => {}
            Ok(PlaybackEvent::StateChanged { from, to }) => println!("state: {from:?} -> {to:?}"),
            Ok(PlaybackEvent::EndOfStream) => println!("end of stream"),
            Ok(PlaybackEvent::SeekFailed { target_secs }) => {
                println!("seek to {target_secs:.2}s failed");
            }
            Ok(PlaybackEvent::AudioDeviceFailed { message }) => {
                println!("audio stopped: {message}");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn report(result: Result<()>) {
    if let Err(err) = result {
        println!("{err}");
    }
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(args.config.as_ref());
    let surfaces = FrameSurfaceFactory::new();
    let frames = surfaces.frames();

    let mut player = PlaybackController::new(
        Arc::new(FfmpegEngine::new()),
        Arc::new(CpalSink::new(&config.audio)),
        Arc::new(surfaces),
        config,
    );
    let printer = tokio::spawn(print_events(player.subscribe()));

    let info = player.open(&args.file)?;
    println!(
        "{}: {}x{} @ {:.2} fps, audio {} Hz",
        info.path.display(),
        info.size.width,
        info.size.height,
        info.frame_rate.value(),
        info.sample_rate.hz()
    );

    let mut commands = spawn_stdin_reader();
    while let Some(line) = commands.recv().await {
        match line.trim() {
            "p" => report(player.toggle_pause()),
            "f" => report(player.seek_step(SeekDirection::Forward).map(|_| ())),
            "b" => report(player.seek_step(SeekDirection::Backward).map(|_| ())),
            "s" => report(player.stop()),
            "i" => {
                let stats = player.stats();
                let position = player.position().unwrap_or_default();
                println!(
                    "{:?} at {position:.2}s, {} frames, {} audio frames",
                    player.state(),
                    stats.frames_rendered,
                    stats.audio_frames_written
                );
            }
            "q" => break,
            "" => {}
            other => println!("unknown command: {other}"),
        }
    }

    player.close();
    printer.abort();

    if let Some(path) = args.snapshot {
        frames
            .snapshot()
            .save(&path)
            .map_err(|e| Error::Io(format!("Failed to save snapshot: {e}")))?;
        println!("saved {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vr_playback=info")),
        )
        .init();

    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("vr-play: {err}\n\n{HELP}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("vr-play: {err}");
            ExitCode::FAILURE
        }
    }
}
