//! Deterministic backend for headless tests
//!
//! Records every command, fails on demand, optionally sleeps before answering
//! and can push scripted events after a command succeeds.

use super::{AudioBackend, BackendEnvelope, BackendEvent, BackendResult, BackendSnapshot};
use crate::error::BackendError;
use crate::types::{TrackId, TrackRef};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// A command as the mock received it
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    Play(TrackId),
    PlayAt(TrackId, f64),
    Pause,
    Resume,
    Stop,
    Seek(f64),
    SetVolume(f32),
    PreloadNext(TrackId),
    QueryState,
}

/// Command discriminant, used to key failures and scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Play,
    PlayAt,
    Pause,
    Resume,
    Stop,
    Seek,
    SetVolume,
    PreloadNext,
    QueryState,
}

impl BackendCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Play(_) => CommandKind::Play,
            Self::PlayAt(..) => CommandKind::PlayAt,
            Self::Pause => CommandKind::Pause,
            Self::Resume => CommandKind::Resume,
            Self::Stop => CommandKind::Stop,
            Self::Seek(_) => CommandKind::Seek,
            Self::SetVolume(_) => CommandKind::SetVolume,
            Self::PreloadNext(_) => CommandKind::PreloadNext,
            Self::QueryState => CommandKind::QueryState,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    commands: Vec<BackendCommand>,
    fail_once: HashMap<CommandKind, VecDeque<BackendError>>,
    fail_always: HashMap<CommandKind, BackendError>,
    fail_tracks: HashMap<TrackId, BackendError>,
    scripts: HashMap<CommandKind, Vec<BackendEvent>>,
    latency: Option<Duration>,
    snapshot: BackendSnapshot,
    current: Option<TrackId>,
    events: Option<UnboundedSender<BackendEnvelope>>,
}

/// Scriptable in-memory backend
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route scripted events into `tx`
    pub fn with_events(tx: UnboundedSender<BackendEnvelope>) -> Self {
        let backend = Self::new();
        backend.state.lock().events = Some(tx);
        backend
    }

    /// Fail the next command of `kind` with `error`
    pub fn fail_next(&self, kind: CommandKind, error: BackendError) {
        self.state
            .lock()
            .fail_once
            .entry(kind)
            .or_default()
            .push_back(error);
    }

    /// Fail every command of `kind` until [`MockBackend::clear_failures`]
    pub fn fail_always(&self, kind: CommandKind, error: BackendError) {
        self.state.lock().fail_always.insert(kind, error);
    }

    /// Fail every `play`/`play_at` of this particular track
    pub fn fail_track(&self, track: TrackId, error: BackendError) {
        self.state.lock().fail_tracks.insert(track, error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_once.clear();
        state.fail_always.clear();
        state.fail_tracks.clear();
    }

    /// Push `events` (tagged with the current stream) after each successful `kind`
    pub fn script(&self, kind: CommandKind, events: Vec<BackendEvent>) {
        self.state.lock().scripts.insert(kind, events);
    }

    /// Delay every command answer by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    pub fn set_snapshot(&self, snapshot: BackendSnapshot) {
        self.state.lock().snapshot = snapshot;
    }

    /// Push an event tagged with the current stream
    pub fn emit(&self, event: BackendEvent) {
        let state = self.state.lock();
        if let Some(tx) = &state.events {
            let _ = tx.send(BackendEnvelope {
                track_id: state.current.clone(),
                event,
            });
        }
    }

    /// Everything received so far, oldest first
    pub fn commands(&self) -> Vec<BackendCommand> {
        self.state.lock().commands.clone()
    }

    /// Drain the command log
    pub fn take_commands(&self) -> Vec<BackendCommand> {
        std::mem::take(&mut self.state.lock().commands)
    }

    pub fn count(&self, kind: CommandKind) -> usize {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|c| c.kind() == kind)
            .count()
    }

    /// Track the mock considers to be streaming
    pub fn current(&self) -> Option<TrackId> {
        self.state.lock().current.clone()
    }

    async fn handle(&self, command: BackendCommand) -> BackendResult<()> {
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        let kind = command.kind();
        state.commands.push(command.clone());

        if let Some(err) = state.fail_once.get_mut(&kind).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if let Some(err) = state.fail_always.get(&kind) {
            return Err(err.clone());
        }

        match &command {
            BackendCommand::Play(id) | BackendCommand::PlayAt(id, _) => {
                if let Some(err) = state.fail_tracks.get(id) {
                    return Err(err.clone());
                }
                state.current = Some(id.clone());
                state.snapshot.is_playing = true;
                state.snapshot.position = match command {
                    BackendCommand::PlayAt(_, pos) => pos,
                    _ => 0.0,
                };
            }
            BackendCommand::Pause => state.snapshot.is_playing = false,
            BackendCommand::Resume => state.snapshot.is_playing = true,
            BackendCommand::Stop => {
                state.current = None;
                state.snapshot = BackendSnapshot::default();
            }
            BackendCommand::Seek(pos) => state.snapshot.position = *pos,
            BackendCommand::SetVolume(_)
            | BackendCommand::PreloadNext(_)
            | BackendCommand::QueryState => {}
        }

        if let (Some(events), Some(tx)) = (state.scripts.get(&kind), &state.events) {
            for event in events {
                let _ = tx.send(BackendEnvelope {
                    track_id: state.current.clone(),
                    event: event.clone(),
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl AudioBackend for MockBackend {
    async fn play(&self, track: &TrackRef) -> BackendResult<()> {
        self.handle(BackendCommand::Play(track.id.clone())).await
    }

    async fn play_at(&self, track: &TrackRef, position: f64) -> BackendResult<()> {
        self.handle(BackendCommand::PlayAt(track.id.clone(), position))
            .await
    }

    async fn pause(&self) -> BackendResult<()> {
        self.handle(BackendCommand::Pause).await
    }

    async fn resume(&self) -> BackendResult<()> {
        self.handle(BackendCommand::Resume).await
    }

    async fn stop(&self) -> BackendResult<()> {
        self.handle(BackendCommand::Stop).await
    }

    async fn seek(&self, position: f64) -> BackendResult<()> {
        self.handle(BackendCommand::Seek(position)).await
    }

    async fn set_volume(&self, volume: f32) -> BackendResult<()> {
        self.handle(BackendCommand::SetVolume(volume)).await
    }

    async fn preload_next(&self, track: &TrackRef) -> BackendResult<()> {
        self.handle(BackendCommand::PreloadNext(track.id.clone()))
            .await
    }

    async fn query_state(&self) -> BackendResult<BackendSnapshot> {
        self.handle(BackendCommand::QueryState).await?;
        Ok(self.state.lock().snapshot)
    }
}
