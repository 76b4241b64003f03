use clap::Parser;
use crossterm::{
    cursor::MoveToColumn,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode},
};
use smf_player::{
    MusicLibrary, MusicService, PlaybackState, PlayerConfig, PlayerStatus, VolumeProvider,
    VolumeSettings,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const VOLUME_STEP: f32 = 0.1;

#[derive(Parser, Debug)]
#[clap(author, about = "Plays Standard MIDI Files on a chiptune synth", long_about = None)]
struct Args {
    /// A MIDI file, or a directory of them
    path: PathBuf,

    /// Play each track once instead of looping it
    #[clap(long, value_parser)]
    once: bool,

    /// Player settings (RON)
    #[clap(short = 'c', long, value_parser)]
    config: Option<PathBuf>,

    /// Master volume, 0.0 to 1.0
    #[clap(short = 'v', long, value_parser, default_value_t = 1.0)]
    volume: f32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };

    let library = load_library(&args.path)?;
    let keys = library.keys();
    if keys.is_empty() {
        return Err(format!("no playable MIDI files in {}", args.path.display()).into());
    }

    let volume = Arc::new(VolumeSettings::new(args.volume, 1.0));
    let service = MusicService::init(config, library, volume.clone());
    service.flush();
    if !service.status().device_available {
        return Err("no audio output device".into());
    }

    enable_raw_mode()?;
    let result = player_loop(&service, &keys, &volume, args.once);
    disable_raw_mode()?;
    println!();

    service.shutdown();
    result.map_err(Into::into)
}

fn load_library(path: &Path) -> Result<MusicLibrary, Box<dyn std::error::Error>> {
    if path.is_dir() {
        return Ok(MusicLibrary::load_dir(path)?);
    }
    let mut library = MusicLibrary::new();
    let track = library.load_file(path)?;
    info!(
        "loaded '{}': {} track(s), {:.1}s",
        track.key,
        track.track_count,
        track.duration()
    );
    Ok(library)
}

fn player_loop(
    service: &MusicService,
    keys: &[String],
    volume: &VolumeSettings,
    once: bool,
) -> io::Result<()> {
    let mut stdout = io::stdout();
    let mut index = 0;
    start_track(service, &keys[index], once);

    loop {
        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
                    KeyCode::Char(' ') => match service.status().state {
                        PlaybackState::Playing => service.pause(),
                        PlaybackState::Paused => service.resume(),
                        _ => start_track(service, &keys[index], once),
                    },
                    KeyCode::Char('n') | KeyCode::Right => {
                        index = (index + 1) % keys.len();
                        start_track(service, &keys[index], once);
                    }
                    KeyCode::Char('p') | KeyCode::Left => {
                        index = (index + keys.len() - 1) % keys.len();
                        start_track(service, &keys[index], once);
                    }
                    KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up => {
                        volume.set_master(volume.master() + VOLUME_STEP);
                        service.update_volumes();
                    }
                    KeyCode::Char('-') | KeyCode::Down => {
                        volume.set_master(volume.master() - VOLUME_STEP);
                        service.update_volumes();
                    }
                    KeyCode::Char('s') => service.stop_music(),
                    _ => {}
                }
            }
        }

        let status = service.status();
        if once && status.state == PlaybackState::Stopped {
            if index + 1 >= keys.len() {
                break;
            }
            index += 1;
            start_track(service, &keys[index], once);
        }
        draw_status(&mut stdout, &keys[index], &status, volume.master())?;
    }
    Ok(())
}

fn start_track(service: &MusicService, key: &str, once: bool) {
    service.play_track(key, !once);
    service.flush();
}

fn draw_status(
    stdout: &mut io::Stdout,
    key: &str,
    status: &PlayerStatus,
    master: f32,
) -> io::Result<()> {
    let state = match status.state {
        PlaybackState::Playing => ">",
        PlaybackState::Paused => "||",
        _ => "[]",
    };
    execute!(stdout, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    write!(
        stdout,
        "{state} {key}  {:>6.1}/{:.1}s  voices {:>2}  vol {:>3.0}%  [space] pause  [n/p] track  [+/-] volume  [q] quit",
        status.position_secs,
        status.duration_secs,
        status.active_voices,
        master * 100.0
    )?;
    stdout.flush()
}
