/// Noir Sim - console player over a simulated audio engine
mod backend;
mod commands;

use backend::{SimulatedBackend, SimulationProfile};
use clap::Parser;
use commands::{Input, HELP};
use noir_transport::{
    Container, ContainerId, ContainerRef, Library, PlaybackState, RepeatMode, SeekPhase,
    ShuffleMode, Track, TrackId, TransportConfig, TransportController, TransportDriver,
    TransportEvent,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "noir-sim")]
#[command(about = "Drive the Noir playback transport from the console", long_about = None)]
struct Cli {
    /// Transport configuration file (TOML)
    #[arg(short, long, env = "NOIR_CONFIG")]
    config: Option<PathBuf>,

    /// Number of generated albums
    #[arg(long, default_value_t = 3)]
    albums: usize,

    /// Tracks per album
    #[arg(long, default_value_t = 5)]
    tracks_per_album: usize,

    /// Length of every generated track, in seconds
    #[arg(long, default_value_t = 30.0)]
    track_seconds: f64,

    /// Seed for shuffle picks
    #[arg(long)]
    seed: Option<u64>,

    /// Upper bound of the simulated command latency, in milliseconds
    #[arg(long, default_value_t = 120)]
    max_latency_ms: u64,

    /// Share of backend commands that fail (0.0 to 1.0)
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,
}

/// What the console shows on `status`
#[derive(Debug, Default)]
struct Status {
    state: PlaybackState,
    track: Option<TrackId>,
    position: f64,
    duration: f64,
    queue: Vec<TrackId>,
    shuffle: ShuffleMode,
    repeat: RepeatMode,
    volume: Option<f32>,
    seek: SeekPhase,
}

impl Status {
    fn line(&self) -> String {
        let track = self.track.as_ref().map_or("-", TrackId::as_str);
        format!(
            "{:?} {} {} / {} | shuffle {:?} repeat {:?} | queue {}{}",
            self.state,
            track,
            clock(self.position),
            clock(self.duration),
            self.shuffle,
            self.repeat,
            self.queue.len(),
            self.volume
                .map(|v| format!(" | volume {:.0}%", v * 100.0))
                .unwrap_or_default(),
        )
    }
}

fn clock(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}

fn build_library(albums: usize, tracks_per_album: usize, seconds: f64) -> Library {
    let containers: Vec<ContainerRef> = (0..albums)
        .map(|a| {
            let id = ContainerId::new(format!("a{a}"));
            let tracks = (0..tracks_per_album)
                .map(|t| {
                    Arc::new(
                        Track::new(format!("a{a}t{t}"), format!("/sim/album-{a}/{t:02}.flac"))
                            .with_title(format!("Album {a} - Track {t}"))
                            .with_duration(seconds)
                            .in_container(id.clone()),
                    )
                })
                .collect();
            Arc::new(Container::new(id, format!("Album {a}"), tracks))
        })
        .collect();
    Library::from_containers(containers)
}

/// Print transport events; positions at most once a second
async fn print_events(mut events: UnboundedReceiver<TransportEvent>, status: Arc<Mutex<Status>>) {
    let mut last_position_print: Option<Instant> = None;

    while let Some(event) = events.recv().await {
        let mut status = status.lock();
        match event {
            TransportEvent::PositionChanged { position, duration } => {
                status.position = position;
                status.duration = duration;
                let due = match last_position_print {
                    Some(at) => at.elapsed() >= Duration::from_secs(1),
                    None => true,
                };
                if due && status.state == PlaybackState::Playing {
                    last_position_print = Some(Instant::now());
                    println!("  {} / {}", clock(position), clock(duration));
                }
            }
            TransportEvent::StateChanged { state } => {
                status.state = state;
                println!("[state] {state:?}");
            }
            TransportEvent::TrackChanged { track_id, context } => {
                status.track = track_id.clone();
                match (track_id, context) {
                    (Some(track), Some(context)) => println!("[track] {track} (from {context})"),
                    (Some(track), None) => println!("[track] {track}"),
                    (None, _) => println!("[track] none"),
                }
            }
            TransportEvent::QueueChanged { tracks } => {
                let shown: Vec<&str> = tracks.iter().map(TrackId::as_str).collect();
                println!("[queue] {}", shown.join(", "));
                status.queue = tracks;
            }
            TransportEvent::ModesChanged { shuffle, repeat } => {
                status.shuffle = shuffle;
                status.repeat = repeat;
                println!("[modes] shuffle {shuffle:?}, repeat {repeat:?}");
            }
            TransportEvent::VolumeChanged { volume } => {
                status.volume = Some(volume);
                println!("[volume] {:.0}%", volume * 100.0);
            }
            TransportEvent::SeekChanged { phase } => {
                status.seek = phase;
                match phase {
                    SeekPhase::Idle => println!("[seek] settled"),
                    SeekPhase::Dragging { preview } => println!("[seek] dragging {}", clock(preview)),
                    SeekPhase::Committed { target, .. } => println!("[seek] to {}", clock(target)),
                }
            }
            TransportEvent::Notification { message } => println!("[!] {message}"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "noir_transport=info,noir_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = TransportConfig::load(cli.config.as_deref())?;
    let library = build_library(cli.albums, cli.tracks_per_album, cli.track_seconds);
    let track_ids: Vec<TrackId> = library.tracks().iter().map(|t| t.id.clone()).collect();
    tracing::info!(tracks = track_ids.len(), "Simulated library ready");

    let (backend_tx, backend_rx) = tokio::sync::mpsc::unbounded_channel();
    let profile = SimulationProfile {
        latency_ms: (5.min(cli.max_latency_ms), cli.max_latency_ms),
        failure_rate: cli.failure_rate,
    };
    let backend = Arc::new(SimulatedBackend::spawn(backend_tx, profile));

    let mut controller = TransportController::new(backend, config)?;
    if let Some(seed) = cli.seed {
        controller = controller.with_rng(seed);
    }
    controller.set_library(library, Instant::now()).await?;

    let (driver, handle, events) = TransportDriver::new(controller, backend_rx);
    let driver_task = tokio::spawn(driver.run());

    let status = Arc::new(Mutex::new(Status::default()));
    let printer = tokio::spawn(print_events(events, status.clone()));

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let dragging = matches!(status.lock().seek, SeekPhase::Dragging { .. });
        let input = match commands::parse(&line, dragging) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match input {
            Input::Transport(command) => handle.send(command).await?,
            Input::ListTracks => {
                for chunk in track_ids.chunks(cli.tracks_per_album.max(1)) {
                    let ids: Vec<&str> = chunk.iter().map(TrackId::as_str).collect();
                    println!("  {}", ids.join("  "));
                }
            }
            Input::Status => println!("{}", status.lock().line()),
            Input::Help => println!("{HELP}"),
            Input::Quit => break,
        }
    }

    drop(handle);
    let controller = driver_task.await?;
    printer.await?;
    tracing::info!(
        played = controller.history_snapshot().len(),
        "Transport shut down"
    );

    Ok(())
}
