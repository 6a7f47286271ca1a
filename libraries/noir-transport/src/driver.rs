//! Transport event loop
//!
//! One task owns the [`TransportController`] and multiplexes everything that
//! can touch it: UI commands, backend events, the render interval (only
//! while the render loop is registered) and the next timer deadline. Nothing
//! else holds a reference to the controller, so transport state needs no
//! locks.

use crate::backend::BackendEnvelope;
use crate::controller::TransportController;
use crate::error::{Result, TransportError};
use crate::events::{TransportCommand, TransportEvent};
use crate::types::{TrackId, TrackRef};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

const COMMAND_BUFFER: usize = 64;

/// Cloneable sender side of a running driver
#[derive(Debug, Clone)]
pub struct TransportHandle {
    commands: mpsc::Sender<TransportCommand>,
}

impl TransportHandle {
    /// Queue a command; fails once the driver has exited
    pub async fn send(&self, command: TransportCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TransportError::InvalidOperation("transport driver stopped".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Owns the controller and runs its event loop
pub struct TransportDriver {
    controller: TransportController,
    commands: mpsc::Receiver<TransportCommand>,
    backend_events: mpsc::UnboundedReceiver<BackendEnvelope>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

/// Current time on the runtime clock (pausable in tests)
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

impl TransportDriver {
    /// Wrap a controller
    ///
    /// `backend_events` is the stream the backend pushes into. Returns the
    /// driver, a handle for commands and the receiving end of the UI events.
    pub fn new(
        controller: TransportController,
        backend_events: mpsc::UnboundedReceiver<BackendEnvelope>,
    ) -> (
        Self,
        TransportHandle,
        mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let driver = Self {
            controller,
            commands: command_rx,
            backend_events,
            events: event_tx,
        };
        (driver, TransportHandle { commands: command_tx }, event_rx)
    }

    /// Run until every [`TransportHandle`] is dropped
    ///
    /// Returns the controller after cancelling its timers.
    pub async fn run(mut self) -> TransportController {
        info!("Transport driver started");
        let mut render = tokio::time::interval(self.controller.config().render_interval());
        render.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let rendering = self.controller.render_loop_active();
            let deadline = self.controller.next_deadline();
            let sleep_until = deadline.map_or_else(
                || tokio::time::Instant::now() + Duration::from_secs(3600),
                tokio::time::Instant::from_std,
            );

            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    trace!(?command, "Transport command");
                    if let Err(err) = self.dispatch(command, now()).await {
                        debug!(error = %err, "Command failed");
                    }
                }
                Some(envelope) = self.backend_events.recv() => {
                    if let Err(err) = self.controller.handle_backend_event(envelope, now()).await {
                        debug!(error = %err, "Backend event handling failed");
                    }
                }
                _ = render.tick(), if rendering => {
                    self.controller.render_tick(now());
                }
                () = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {
                    self.controller.poll_timers(now());
                }
            }

            self.flush();
        }

        self.controller.shutdown();
        self.flush();
        info!("Transport driver stopped");
        self.controller
    }

    fn flush(&mut self) {
        for event in self.controller.drain_events() {
            // Nobody listening is fine
            let _ = self.events.send(event);
        }
    }

    fn track(&self, id: &TrackId) -> Result<TrackRef> {
        self.controller
            .library()
            .track(id)
            .cloned()
            .ok_or_else(|| TransportError::InvalidOperation(format!("unknown track: {id}")))
    }

    async fn dispatch(&mut self, command: TransportCommand, now: Instant) -> Result<()> {
        match command {
            TransportCommand::Play { track_id } => {
                let track = self.track(&track_id)?;
                self.controller.play(track, now).await
            }
            TransportCommand::PlayAt { track_id, position } => {
                let track = self.track(&track_id)?;
                self.controller.play_at(track, position, now).await
            }
            TransportCommand::Enqueue { track_id } => {
                let track = self.track(&track_id)?;
                self.controller.enqueue(track, now).await
            }
            TransportCommand::EnqueueNext { track_id } => {
                let track = self.track(&track_id)?;
                self.controller.enqueue_next(track, now).await
            }
            TransportCommand::TogglePlayPause => self.controller.toggle_play_pause(now).await,
            TransportCommand::Pause => self.controller.pause(now).await,
            TransportCommand::Resume => self.controller.resume(now).await,
            TransportCommand::Stop => self.controller.stop(now).await,
            TransportCommand::SkipNext => self.controller.skip_next(now).await,
            TransportCommand::SkipPrevious => self.controller.skip_previous(now).await,
            TransportCommand::SetShuffle { mode } => self.controller.set_shuffle(mode, now).await,
            TransportCommand::SetRepeat { mode } => self.controller.set_repeat(mode, now).await,
            TransportCommand::SetVolume { volume } => self.controller.set_volume(volume, now).await,
            TransportCommand::Dequeue { index } => self.controller.dequeue(index, now).await.map(|_| ()),
            TransportCommand::ReorderQueue { from, to } => {
                self.controller.reorder_queue(from, to, now).await
            }
            TransportCommand::ClearQueue => self.controller.clear_queue(now).await,
            TransportCommand::BeginSeekDrag { position } => self.controller.begin_seek_drag(position),
            TransportCommand::UpdateSeekDrag { position } => self.controller.update_seek_drag(position),
            TransportCommand::CommitSeek => self.controller.commit_seek(now).await,
            TransportCommand::SeekTo { position } => self.controller.seek_to(position, now).await,
            TransportCommand::RefreshBackendState => self.controller.refresh_backend_state(now).await,
        }
    }
}
