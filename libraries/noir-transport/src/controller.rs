//! Transport controller - core orchestration
//!
//! Owns what is playing, what plays next and where the play-head is, and
//! keeps that consistent with an audio backend whose commands and events
//! arrive with unpredictable latency and in any order.
//!
//! Every command takes `&mut self`, so commands are serialized by the borrow
//! checker; events are validated on arrival (stream identity, seek staleness)
//! instead of being trusted by order. Time is always passed in so the whole
//! controller can be driven deterministically.

use crate::{
    backend::{AudioBackend, BackendEnvelope, BackendEvent, BackendResult},
    config::TransportConfig,
    error::{BackendError, BackendErrorKind, Result, TransportError},
    events::TransportEvent,
    history::History,
    notify::ErrorCoalescer,
    queue::Queue,
    resolver::{NextSource, NextTrack, Resolution},
    seek::{Commit, SeekCoordinator, SeekPhase, SeekRequest, Verdict},
    sync::PositionSynchronizer,
    timers::{OperationId, TimerHandle, TimerKind, TimerTable},
    types::{
        Library, PlaybackContext, PlaybackState, PositionSample, RepeatMode, ShuffleMode,
        TrackId, TrackRef,
    },
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Hints remembered per load
const MAX_HINTS: usize = 8;

/// A track about to be started
#[derive(Debug, Clone)]
struct Launch {
    track: TrackRef,
    context: Option<PlaybackContext>,
    start_at: Option<f64>,
}

impl Launch {
    fn new(track: TrackRef, context: Option<PlaybackContext>) -> Self {
        Self {
            track,
            context,
            start_at: None,
        }
    }
}

impl From<NextTrack> for Launch {
    fn from(next: NextTrack) -> Self {
        Self {
            track: next.track,
            context: next.context,
            start_at: None,
        }
    }
}

/// A reload of the track that was already current
///
/// Events for the old and new stream carry the same id, so until a sample
/// lands where the new stream can be, nothing tagged with that id is trusted.
#[derive(Debug, Clone, Copy)]
struct ReloadWait {
    start: f64,
    since: Instant,
}

impl ReloadWait {
    fn admits(&self, position: f64, now: Instant, tolerance: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.since).as_secs_f64();
        position >= self.start - tolerance && position <= self.start + elapsed + tolerance
    }
}

/// Everything the controller owns about "what is playing"
///
/// Each field has exactly one writer: the controller method handling the
/// command or event that changes it.
#[derive(Debug)]
struct TransportState {
    playback: PlaybackState,
    current: Option<TrackRef>,
    context: Option<PlaybackContext>,
    queue: Queue,
    history: History,
    library: Library,
    shuffle: ShuffleMode,
    repeat: RepeatMode,
    volume: f32,

    /// What `skip_next` will play, already hinted to the backend
    preloaded: Option<NextTrack>,

    /// Every pick hinted since the last load, oldest first
    ///
    /// The backend may swap to any of them, even one no longer preloaded.
    hinted: Vec<NextTrack>,

    /// Set while a reload of the same track waits for its first sample
    reload: Option<ReloadWait>,

    /// Backend is (re)filling buffers; the clock is frozen meanwhile
    buffering: bool,

    /// Loads that failed in a row
    load_failures: u32,
}

impl TransportState {
    fn resolution(&self) -> Resolution<'_> {
        Resolution {
            current: self.current.as_ref(),
            context: self.context.as_ref(),
            queue: &self.queue,
            library: &self.library,
            shuffle: self.shuffle,
            repeat: self.repeat,
        }
    }
}

/// Playback transport
pub struct TransportController {
    backend: Arc<dyn AudioBackend>,
    config: TransportConfig,
    state: TransportState,
    sync: PositionSynchronizer,
    seek: SeekCoordinator,
    timers: TimerTable,
    notifier: ErrorCoalescer,
    rng: StdRng,

    /// Owner of the render loop, replaced on every track change
    track_op: Option<OperationId>,

    /// Owner of the seek safety timer, replaced on every new request
    seek_op: Option<OperationId>,

    render_loop: Option<TimerHandle>,

    // Event queue for UI synchronization
    pending_events: Vec<TransportEvent>,
}

impl TransportController {
    /// Create a controller around a backend
    ///
    /// Fails with [`TransportError::Config`] when `config` does not validate.
    pub fn new(backend: Arc<dyn AudioBackend>, config: TransportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            state: TransportState {
                playback: PlaybackState::Idle,
                current: None,
                context: None,
                queue: Queue::new(),
                history: History::new(config.history_size),
                library: Library::default(),
                shuffle: config.shuffle,
                repeat: config.repeat,
                volume: config.volume.clamp(0.0, 1.0),
                preloaded: None,
                hinted: Vec::new(),
                reload: None,
                buffering: false,
                load_failures: 0,
            },
            sync: PositionSynchronizer::new(&config),
            seek: SeekCoordinator::new(config.seek_confirm_tolerance, config.seek_dedupe_threshold),
            timers: TimerTable::new(),
            notifier: ErrorCoalescer::new(config.error_coalesce_window()),
            rng: StdRng::from_entropy(),
            track_op: None,
            seek_op: None,
            render_loop: None,
            pending_events: Vec::new(),
            config,
        })
    }

    /// Use a seeded generator for shuffle picks
    #[must_use]
    pub fn with_rng(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    // ===== Playback Control =====

    /// Play a track, taking its container as the playback context
    pub async fn play(&mut self, track: TrackRef, now: Instant) -> Result<()> {
        let context = self.state.library.container_of(&track).cloned();
        self.play_from(track, context, now).await
    }

    /// Play a track with an explicit context (`None` for a bare track)
    pub async fn play_from(
        &mut self,
        track: TrackRef,
        context: Option<PlaybackContext>,
        now: Instant,
    ) -> Result<()> {
        self.record_current();
        self.start(Launch::new(track, context), now).await
    }

    /// Play a track starting at `position` seconds
    pub async fn play_at(&mut self, track: TrackRef, position: f64, now: Instant) -> Result<()> {
        let context = self.state.library.container_of(&track).cloned();
        self.record_current();
        self.start(
            Launch {
                track,
                context,
                start_at: Some(position.max(0.0)),
            },
            now,
        )
        .await
    }

    /// Toggle between playing and paused
    ///
    /// From `Idle`/`Ended` this replays the current track, or starts the
    /// queue when there is none. Ignored while loading.
    pub async fn toggle_play_pause(&mut self, now: Instant) -> Result<()> {
        match self.state.playback {
            PlaybackState::Playing => self.pause(now).await,
            PlaybackState::Paused => self.resume(now).await,
            PlaybackState::Loading => Ok(()),
            PlaybackState::Idle | PlaybackState::Ended => {
                if self.state.current.is_some() {
                    self.replay(None, now).await
                } else if let Some(track) = self.state.queue.pop_front() {
                    self.emit_queue_changed();
                    self.start(Launch::new(track, None), now).await
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Pause playback. No-op unless playing.
    pub async fn pause(&mut self, now: Instant) -> Result<()> {
        if self.state.playback != PlaybackState::Playing {
            return Ok(());
        }

        let backend = self.backend.clone();
        if let Err(err) = backend.pause().await {
            return Err(self.surface(err, now));
        }

        self.stop_render_loop();
        self.sync.hold(now);
        self.set_state(PlaybackState::Paused);
        self.emit_position();
        Ok(())
    }

    /// Resume playback. No-op unless paused; a failure leaves it paused.
    pub async fn resume(&mut self, now: Instant) -> Result<()> {
        if self.state.playback != PlaybackState::Paused {
            return Ok(());
        }

        let backend = self.backend.clone();
        if let Err(err) = backend.resume().await {
            return Err(self.surface(err, now));
        }

        self.sync.hold(now);
        self.set_state(PlaybackState::Playing);
        self.start_render_loop();
        Ok(())
    }

    /// Stop playback and forget the current track (the queue is kept)
    pub async fn stop(&mut self, now: Instant) -> Result<()> {
        info!("Stopping playback");
        self.state.load_failures = 0;
        self.halt(now, true).await;
        Ok(())
    }

    /// Skip to the next track
    ///
    /// Repeat One does not apply here; it only replays a track that ended.
    pub async fn skip_next(&mut self, now: Instant) -> Result<()> {
        let Some(next) = self.take_next() else {
            debug!("Nothing left to play");
            self.halt(now, false).await;
            return Ok(());
        };

        self.record_current();
        self.start(next.into(), now).await
    }

    /// Go back
    ///
    /// Past the restart threshold this restarts the current track. Otherwise
    /// it plays the last history entry with the context it had, falling back
    /// to the previous track in context order.
    pub async fn skip_previous(&mut self, now: Instant) -> Result<()> {
        let restart_threshold = self.config.previous_restart_threshold;
        if self.state.current.is_some() && self.display_position() > restart_threshold {
            return self.restart(now).await;
        }

        if let Some(entry) = self.state.history.pop() {
            return self.start(Launch::new(entry.track, entry.context), now).await;
        }

        let previous = self.state.resolution().previous();
        if let Some(previous) = previous {
            return self.start(previous.into(), now).await;
        }

        if self.state.current.is_some() {
            return self.restart(now).await;
        }
        Ok(())
    }

    async fn restart(&mut self, now: Instant) -> Result<()> {
        match self.state.playback {
            PlaybackState::Playing | PlaybackState::Paused => self.seek_to(0.0, now).await,
            _ => self.replay(None, now).await,
        }
    }

    /// Start the current track again, optionally at an offset
    async fn replay(&mut self, start_at: Option<f64>, now: Instant) -> Result<()> {
        let Some(track) = self.state.current.clone() else {
            return Ok(());
        };
        let launch = Launch {
            track,
            context: self.state.context.clone(),
            start_at,
        };
        self.start(launch, now).await
    }

    // ===== Modes =====

    pub async fn set_shuffle(&mut self, mode: ShuffleMode, now: Instant) -> Result<()> {
        if self.state.shuffle != mode {
            self.state.shuffle = mode;
            self.emit_modes_changed();
            self.refresh_preload(now).await;
        }
        Ok(())
    }

    pub async fn set_repeat(&mut self, mode: RepeatMode, now: Instant) -> Result<()> {
        if self.state.repeat != mode {
            self.state.repeat = mode;
            self.emit_modes_changed();
            self.refresh_preload(now).await;
        }
        Ok(())
    }

    // ===== Volume =====

    /// Set volume (0.0 to 1.0, clamped)
    pub async fn set_volume(&mut self, volume: f32, now: Instant) -> Result<()> {
        if !volume.is_finite() {
            return Err(TransportError::InvalidOperation(format!(
                "volume must be finite, got {volume}"
            )));
        }
        let volume = volume.clamp(0.0, 1.0);

        let backend = self.backend.clone();
        if let Err(err) = backend.set_volume(volume).await {
            return Err(self.surface(err, now));
        }

        self.state.volume = volume;
        self.pending_events
            .push(TransportEvent::VolumeChanged { volume });
        Ok(())
    }

    // ===== Queue Management =====

    /// Add track to the end of the queue
    pub async fn enqueue(&mut self, track: TrackRef, now: Instant) -> Result<()> {
        self.state.queue.enqueue(track);
        self.queue_mutated(now).await;
        Ok(())
    }

    /// Add track to the front of the queue (plays next)
    pub async fn enqueue_next(&mut self, track: TrackRef, now: Instant) -> Result<()> {
        self.state.queue.enqueue_next(track);
        self.queue_mutated(now).await;
        Ok(())
    }

    /// Remove the queued track at `index`
    pub async fn dequeue(&mut self, index: usize, now: Instant) -> Result<TrackRef> {
        let track = self.state.queue.dequeue(index)?;
        self.queue_mutated(now).await;
        Ok(track)
    }

    pub async fn reorder_queue(&mut self, from: usize, to: usize, now: Instant) -> Result<()> {
        self.state.queue.reorder(from, to)?;
        self.queue_mutated(now).await;
        Ok(())
    }

    pub async fn clear_queue(&mut self, now: Instant) -> Result<()> {
        if !self.state.queue.is_empty() {
            self.state.queue.clear();
            self.queue_mutated(now).await;
        }
        Ok(())
    }

    async fn queue_mutated(&mut self, now: Instant) {
        self.emit_queue_changed();
        self.refresh_preload(now).await;
    }

    /// Replace the library snapshot used for global order and library shuffle
    pub async fn set_library(&mut self, library: Library, now: Instant) -> Result<()> {
        info!(tracks = library.len(), "Library updated");
        self.state.library = library;
        self.refresh_preload(now).await;
        Ok(())
    }

    /// Re-read the backend's own view and adopt it
    ///
    /// For use after an ambiguous failure, when local state may have drifted.
    pub async fn refresh_backend_state(&mut self, now: Instant) -> Result<()> {
        let backend = self.backend.clone();
        let snapshot = match backend.query_state().await {
            Ok(snapshot) => snapshot,
            Err(err) => return Err(self.surface(err, now)),
        };
        debug!(?snapshot, "Backend state refreshed");

        if self.state.current.is_none() {
            return Ok(());
        }

        match (self.state.playback, snapshot.is_playing) {
            (PlaybackState::Paused, true) => {
                self.set_state(PlaybackState::Playing);
            }
            (PlaybackState::Playing, false) => {
                self.stop_render_loop();
                self.set_state(PlaybackState::Paused);
            }
            _ => {}
        }

        if !self.seek.is_pending() && !self.seek.is_dragging() {
            self.sync
                .snap(PositionSample::new(snapshot.position, snapshot.duration, now));
            self.emit_position();
        }
        self.start_render_loop();
        Ok(())
    }

    // ===== Seek =====

    /// Start a seek-bar drag; cancels any seek in flight
    pub fn begin_seek_drag(&mut self, position: f64) -> Result<()> {
        if self.state.current.is_none() {
            return Err(TransportError::NoTrackLoaded);
        }

        let position = self.clamp_to_track(position);
        if self.seek.begin_drag(position).is_some() {
            self.release_seek_timer();
        }
        self.stop_render_loop();
        self.emit_seek_changed();
        let duration = self.duration();
        self.pending_events
            .push(TransportEvent::PositionChanged { position, duration });
        Ok(())
    }

    /// Move the drag preview; display only
    pub fn update_seek_drag(&mut self, position: f64) -> Result<()> {
        let position = self.clamp_to_track(position);
        if self.seek.update_drag(position) {
            self.emit_seek_changed();
            let duration = self.duration();
            self.pending_events
                .push(TransportEvent::PositionChanged { position, duration });
        }
        Ok(())
    }

    /// Commit the dragged position. No-op when not dragging.
    pub async fn commit_seek(&mut self, now: Instant) -> Result<()> {
        if matches!(
            self.state.playback,
            PlaybackState::Idle | PlaybackState::Ended
        ) {
            // Nothing streaming to seek; restart at the dragged position
            let Some(target) = self.seek.preview() else {
                return Ok(());
            };
            self.seek.cancel();
            self.emit_seek_changed();
            return self.replay(Some(target), now).await;
        }

        match self.seek.commit(now) {
            Some(commit) => self.dispatch_seek(commit, now).await,
            None => Ok(()),
        }
    }

    /// Seek to `position` seconds
    ///
    /// Targets within the dedupe threshold of the request in flight reuse it.
    /// With nothing loaded in the backend (idle or ended) the current track
    /// is restarted at the target instead.
    pub async fn seek_to(&mut self, position: f64, now: Instant) -> Result<()> {
        if self.state.current.is_none() {
            return Err(TransportError::NoTrackLoaded);
        }

        let target = self.clamp_to_track(position);
        match self.state.playback {
            PlaybackState::Playing | PlaybackState::Paused => {}
            PlaybackState::Loading => {
                return Err(TransportError::InvalidOperation(
                    "cannot seek while loading".to_string(),
                ))
            }
            PlaybackState::Idle | PlaybackState::Ended => {
                return self.replay(Some(target), now).await;
            }
        }

        let commit = if self.seek.is_dragging() {
            self.seek.begin_drag(target);
            self.seek.commit(now)
        } else {
            Some(self.seek.request(target, now))
        };

        match commit {
            Some(commit) => self.dispatch_seek(commit, now).await,
            None => Ok(()),
        }
    }

    async fn dispatch_seek(&mut self, commit: Commit, now: Instant) -> Result<()> {
        let request = match commit {
            Commit::Reused(request) => {
                self.set_optimistic(request.target, now);
                self.emit_seek_changed();
                return Ok(());
            }
            Commit::Issued(request) => request,
        };

        // Previous request's safety timer dies with its operation
        self.release_seek_timer();
        let op = self.timers.begin_operation();
        self.seek_op = Some(op);
        self.timers.schedule(
            op,
            TimerKind::SeekSafety {
                request: request.id,
            },
            now + self.config.seek_timeout(),
        );

        self.stop_render_loop();
        self.set_optimistic(request.target, now);
        self.emit_seek_changed();
        if let Some(wait) = self.state.reload.as_mut() {
            wait.start = request.target;
            wait.since = now;
        }

        let backend = self.backend.clone();
        match backend.seek(request.target).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if self.seek.on_failed(request.id).is_some() {
                    self.release_seek_timer();
                    self.emit_seek_changed();
                    self.start_render_loop();
                }
                Err(self.surface(err, now))
            }
        }
    }

    /// Force the sample to the seek target until the backend catches up
    fn set_optimistic(&mut self, target: f64, now: Instant) {
        let duration = self.duration();
        let duration = if duration > 0.0 { duration } else { target };
        self.sync.snap(PositionSample::new(target, duration, now));
        self.emit_position();
    }

    fn release_seek_timer(&mut self) {
        if let Some(op) = self.seek_op.take() {
            self.timers.cancel_owner(op);
        }
    }

    fn seek_resolved(&mut self, request: &SeekRequest) {
        debug!(request = request.id, state = ?request.state, "Seek resolved");
        self.release_seek_timer();
        self.emit_seek_changed();
        self.start_render_loop();
    }

    // ===== Backend Events =====

    /// Apply one backend event
    ///
    /// Events tagged with a stream other than the current (or a hinted)
    /// track are dropped, as is anything arriving while idle.
    pub async fn handle_backend_event(
        &mut self,
        envelope: BackendEnvelope,
        now: Instant,
    ) -> Result<()> {
        let BackendEnvelope { track_id, event } = envelope;

        if let BackendEvent::Error { code, message } = &event {
            let from_current = match &track_id {
                Some(id) => self.is_current(id),
                None => true,
            };
            if from_current {
                let err = BackendError::new(
                    BackendErrorKind::Other,
                    format!("{message} (code {code})"),
                );
                self.surface(err, now);
            } else {
                trace!(?track_id, code, "Error from stale stream discarded");
            }
            return Ok(());
        }

        let Some(track_id) = track_id else {
            trace!(?event, "Untagged event discarded");
            return Ok(());
        };

        if matches!(
            self.state.playback,
            PlaybackState::Idle | PlaybackState::Loading
        ) {
            trace!(track = %track_id, ?event, "Event while idle discarded");
            return Ok(());
        }

        let mut swapped = false;
        if !self.is_current(&track_id) {
            let hint = self
                .state
                .hinted
                .iter()
                .position(|next| next.track.id == track_id);
            let Some(hint) = hint.filter(|_| matches!(event, BackendEvent::Progress { .. }))
            else {
                trace!(track = %track_id, ?event, "Event from stale stream discarded");
                return Ok(());
            };
            let next = self.state.hinted.remove(hint);
            self.adopt(next);
            swapped = true;
        } else if let Some(wait) = self.state.reload {
            let fresh = match event {
                BackendEvent::Progress { position, .. }
                | BackendEvent::Seeking {
                    target: position,
                } => wait.admits(position, now, self.config.seek_confirm_tolerance),
                _ => false,
            };
            if !fresh {
                trace!(track = %track_id, ?event, "Event from replaced stream discarded");
                return Ok(());
            }
            self.state.reload = None;
        }

        match event {
            BackendEvent::Progress { position, duration } => {
                self.on_progress(PositionSample::new(position, duration, now));
            }
            BackendEvent::Seeking { target } => self.on_seeking(target, now),
            BackendEvent::Paused => {
                if self.state.playback == PlaybackState::Playing {
                    debug!("Backend paused on its own");
                    self.stop_render_loop();
                    self.sync.hold(now);
                    self.set_state(PlaybackState::Paused);
                }
            }
            BackendEvent::Resumed => {
                if self.state.playback == PlaybackState::Paused {
                    debug!("Backend resumed on its own");
                    self.sync.hold(now);
                    self.set_state(PlaybackState::Playing);
                    self.start_render_loop();
                }
            }
            BackendEvent::Loading(loading) => {
                if self.state.buffering != loading {
                    debug!(loading, "Backend buffering");
                    self.state.buffering = loading;
                    self.sync.hold(now);
                    if loading {
                        self.stop_render_loop();
                    } else {
                        self.start_render_loop();
                    }
                }
            }
            BackendEvent::Ended => return self.on_ended(now).await,
            BackendEvent::Error { .. } => {}
        }

        // A swap leaves the preload slot empty
        if swapped
            && matches!(
                self.state.playback,
                PlaybackState::Playing | PlaybackState::Paused
            )
        {
            self.refresh_preload(now).await;
        }
        Ok(())
    }

    fn on_progress(&mut self, sample: PositionSample) {
        match self.seek.observe(sample.position) {
            Verdict::Stale => {}
            Verdict::Confirmed(request) => {
                self.sync.snap(sample);
                self.emit_position();
                self.seek_resolved(&request);
            }
            Verdict::NoSeek => {
                if self.render_loop_active() && self.sync.sample().is_some() {
                    self.sync.on_backend_sample(sample);
                } else {
                    self.sync.snap(sample);
                    if !self.seek.is_dragging() {
                        self.emit_position();
                    }
                }
            }
        }
    }

    fn on_seeking(&mut self, target: f64, now: Instant) {
        let sample = PositionSample::new(target, self.duration().max(target), now);
        match self.seek.observe(target) {
            Verdict::Stale => {}
            Verdict::Confirmed(request) => {
                self.sync.snap(sample);
                self.emit_position();
                self.seek_resolved(&request);
            }
            Verdict::NoSeek => {
                // Seek we did not ask for (media keys, another client)
                debug!(target, "Backend seeking");
                self.sync.snap(sample);
                self.emit_position();
            }
        }
    }

    async fn on_ended(&mut self, now: Instant) -> Result<()> {
        info!(track = ?self.state.current.as_ref().map(|t| &t.id), "Track ended");
        self.stop_render_loop();
        let duration = self.duration();
        self.sync.snap(PositionSample::new(duration, duration, now));
        self.set_state(PlaybackState::Ended);

        if self.state.repeat == RepeatMode::One && self.state.current.is_some() {
            return self.replay(None, now).await;
        }
        self.skip_next(now).await
    }

    /// The backend swapped to a hinted track on its own
    fn adopt(&mut self, next: NextTrack) {
        info!(track = %next.track.id, "Gapless swap");

        if next.source == NextSource::Queue
            && self
                .state
                .queue
                .front()
                .is_some_and(|front| front.id == next.track.id)
        {
            self.state.queue.pop_front();
            self.emit_queue_changed();
        }

        self.record_current();
        self.teardown_track();
        self.track_op = Some(self.timers.begin_operation());
        self.state.current = Some(next.track);
        self.state.context = next.context;
        self.state.load_failures = 0;
        self.emit_track_changed();
        self.set_state(PlaybackState::Playing);
        self.start_render_loop();
    }

    // ===== Rendering & Timers =====

    /// Advance the display one frame; no-op while the render loop is stopped
    pub fn render_tick(&mut self, now: Instant) {
        if !self.render_loop_active() {
            return;
        }
        let position = self.sync.render_tick(now);
        self.pending_events.push(TransportEvent::PositionChanged {
            position,
            duration: self.sync.duration(),
        });
    }

    /// Fire every timer whose deadline has passed
    pub fn poll_timers(&mut self, now: Instant) {
        for (_, kind) in self.timers.take_expired(now) {
            match kind {
                TimerKind::SeekSafety { request } => {
                    if let Some(resolved) = self.seek.on_timeout(request) {
                        self.seek_op = None;
                        // Trust the target and extrapolate from here
                        self.sync.hold(now);
                        self.seek_resolved(&resolved);
                    }
                }
                TimerKind::RenderLoop => {}
            }
        }
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Whether the render loop should be ticking
    pub fn render_loop_active(&self) -> bool {
        self.render_loop.is_some_and(|h| self.timers.is_live(h))
    }

    /// Live timer count across all operations
    pub fn live_timers(&self) -> usize {
        self.timers.len()
    }

    /// Cancel every timer and any seek in flight
    pub fn shutdown(&mut self) {
        self.seek.cancel();
        self.timers.cancel_all();
        self.track_op = None;
        self.seek_op = None;
        self.render_loop = None;
    }

    fn start_render_loop(&mut self) {
        if self.state.playback != PlaybackState::Playing
            || self.state.buffering
            || self.seek.is_pending()
            || self.seek.is_dragging()
            || self.render_loop_active()
        {
            return;
        }
        if let Some(op) = self.track_op {
            self.render_loop = Some(self.timers.register_periodic(op, TimerKind::RenderLoop));
        }
    }

    fn stop_render_loop(&mut self) {
        if let Some(handle) = self.render_loop.take() {
            self.timers.cancel(handle);
        }
    }

    // ===== Events =====

    /// Take all queued UI events
    pub fn drain_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.pending_events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.pending_events.is_empty()
    }

    // ===== Observers =====

    pub fn current_track(&self) -> Option<&TrackRef> {
        self.state.current.as_ref()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state.playback
    }

    /// Position to show: the drag preview while dragging, else the smoothed one
    pub fn display_position(&self) -> f64 {
        self.seek
            .preview()
            .unwrap_or_else(|| self.sync.display_position())
    }

    /// Best known duration of the current track
    pub fn duration(&self) -> f64 {
        let reported = self.sync.duration();
        if reported > 0.0 {
            return reported;
        }
        self.state
            .current
            .as_ref()
            .and_then(|t| t.duration_hint)
            .unwrap_or(0.0)
    }

    pub fn queue_snapshot(&self) -> Vec<TrackRef> {
        self.state.queue.snapshot()
    }

    pub fn shuffle(&self) -> ShuffleMode {
        self.state.shuffle
    }

    pub fn repeat(&self) -> RepeatMode {
        self.state.repeat
    }

    pub fn context(&self) -> Option<&PlaybackContext> {
        self.state.context.as_ref()
    }

    pub fn volume(&self) -> f32 {
        self.state.volume
    }

    pub fn seek_phase(&self) -> SeekPhase {
        self.seek.phase()
    }

    pub fn pending_seek(&self) -> Option<&SeekRequest> {
        self.seek.pending()
    }

    /// Previously played track ids, oldest first
    pub fn history_snapshot(&self) -> Vec<TrackId> {
        self.state.history.ids()
    }

    /// Track hinted to the backend as next
    pub fn preloaded_track(&self) -> Option<&TrackRef> {
        self.state.preloaded.as_ref().map(|next| &next.track)
    }

    pub fn library(&self) -> &Library {
        &self.state.library
    }

    // ===== Internal =====

    /// Resolve the next track, consuming the queue front if that is the pick
    ///
    /// Prefers the preloaded pick so the backend hint and the actual skip agree.
    fn take_next(&mut self) -> Option<NextTrack> {
        let next = match self.state.preloaded.take() {
            Some(next) => next,
            None => self.state.resolution().next(&mut self.rng)?,
        };

        if next.source == NextSource::Queue
            && self
                .state
                .queue
                .front()
                .is_some_and(|front| front.id == next.track.id)
        {
            self.state.queue.pop_front();
            self.emit_queue_changed();
        }
        Some(next)
    }

    fn is_current(&self, id: &TrackId) -> bool {
        self.state.current.as_ref().is_some_and(|t| &t.id == id)
    }

    fn record_current(&mut self) {
        if let Some(track) = self.state.current.clone() {
            self.state.history.push(track, self.state.context.clone());
        }
    }

    fn clamp_to_track(&self, position: f64) -> f64 {
        let position = if position.is_finite() { position } else { 0.0 };
        let duration = self.duration();
        if duration > 0.0 {
            position.clamp(0.0, duration)
        } else {
            position.max(0.0)
        }
    }

    /// Start a track, chaining through `skip_next` resolution on load failure
    ///
    /// Gives up after `max_consecutive_load_failures` so a library of
    /// unreadable files cannot loop forever under Repeat All.
    async fn start(&mut self, first: Launch, now: Instant) -> Result<()> {
        let mut launch = first;
        loop {
            let err = match self.load(&launch, now).await {
                Ok(()) => {
                    self.state.load_failures = 0;
                    return Ok(());
                }
                Err(err) => err,
            };

            warn!(track = %launch.track.id, error = %err, "Failed to load track");
            self.state.load_failures += 1;
            let err = self.surface(err, now);

            if self.state.load_failures >= self.config.max_consecutive_load_failures {
                warn!(
                    failures = self.state.load_failures,
                    "Too many consecutive load failures, stopping"
                );
                self.state.load_failures = 0;
                self.halt(now, false).await;
                return Err(err);
            }

            match self.take_next() {
                Some(next) => launch = next.into(),
                None => {
                    self.state.load_failures = 0;
                    self.halt(now, false).await;
                    return Err(err);
                }
            }
        }
    }

    /// Tear down the previous track and ask the backend for this one
    async fn load(&mut self, launch: &Launch, now: Instant) -> BackendResult<()> {
        let track = launch.track.clone();
        let same_stream = self.is_current(&track.id);

        self.teardown_track();
        self.track_op = Some(self.timers.begin_operation());
        if same_stream {
            self.state.reload = Some(ReloadWait {
                start: launch.start_at.unwrap_or(0.0),
                since: now,
            });
        }
        self.state.current = Some(track.clone());
        self.state.context = launch.context.clone();
        self.set_state(PlaybackState::Loading);
        self.emit_track_changed();

        info!(track = %track.id, context = ?launch.context.as_ref().map(|c| &c.id), "Loading track");
        let backend = self.backend.clone();
        match launch.start_at {
            Some(position) => backend.play_at(&track, position).await?,
            None => backend.play(&track).await?,
        }

        let start = launch.start_at.unwrap_or(0.0);
        let duration = track.duration_hint.unwrap_or(start).max(start);
        self.sync.snap(PositionSample::new(start, duration, now));
        self.emit_position();

        self.set_state(PlaybackState::Playing);
        self.start_render_loop();
        self.refresh_preload(now).await;
        Ok(())
    }

    /// Drop everything tied to the current track: timers, seek, sample, preload
    fn teardown_track(&mut self) {
        if let Some(op) = self.track_op.take() {
            self.timers.cancel_owner(op);
        }
        self.render_loop = None;
        if self.seek.phase() != SeekPhase::Idle {
            self.seek.cancel();
            self.emit_seek_changed();
        }
        self.release_seek_timer();
        self.sync.reset();
        self.state.preloaded = None;
        self.state.hinted.clear();
        self.state.reload = None;
        self.state.buffering = false;
    }

    /// Stop the backend and go idle at position 0
    async fn halt(&mut self, now: Instant, forget_track: bool) {
        self.teardown_track();
        if forget_track {
            self.state.current = None;
            self.state.context = None;
            self.emit_track_changed();
        }
        self.set_state(PlaybackState::Idle);
        self.emit_position();

        let backend = self.backend.clone();
        if let Err(err) = backend.stop().await {
            self.surface(err, now);
        }
    }

    /// Re-resolve the next track and hint it to the backend
    async fn refresh_preload(&mut self, now: Instant) {
        if !matches!(
            self.state.playback,
            PlaybackState::Playing | PlaybackState::Paused
        ) {
            self.state.preloaded = None;
            return;
        }

        let Some(next) = self.state.resolution().next(&mut self.rng) else {
            self.state.preloaded = None;
            return;
        };

        let unchanged = self
            .state
            .preloaded
            .as_ref()
            .is_some_and(|p| p.track.id == next.track.id && p.source == next.source);
        if unchanged {
            return;
        }

        let backend = self.backend.clone();
        if let Err(err) = backend.preload_next(&next.track).await {
            debug!(track = %next.track.id, error = %err, "Preload failed");
            self.state.preloaded = None;
            return;
        }
        trace!(track = %next.track.id, source = ?next.source, at = ?now, "Preloaded next track");
        self.remember_hint(next.clone());
        self.state.preloaded = Some(next);
    }

    fn remember_hint(&mut self, next: NextTrack) {
        let hinted = &mut self.state.hinted;
        hinted.retain(|h| h.track.id != next.track.id);
        if hinted.len() == MAX_HINTS {
            hinted.remove(0);
        }
        hinted.push(next);
    }

    /// Log a backend failure and notify the user, coalescing repeats
    fn surface(&mut self, err: BackendError, now: Instant) -> TransportError {
        warn!(error = %err, "Backend command failed");
        let message = err.to_string();
        if self.notifier.admit(&message, now) {
            self.pending_events
                .push(TransportEvent::Notification { message });
        }
        TransportError::Backend(err)
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state.playback != state {
            debug!(from = ?self.state.playback, to = ?state, "Playback state changed");
            self.state.playback = state;
            self.pending_events
                .push(TransportEvent::StateChanged { state });
        }
    }

    fn emit_track_changed(&mut self) {
        self.pending_events.push(TransportEvent::TrackChanged {
            track_id: self.state.current.as_ref().map(|t| t.id.clone()),
            context: self.state.context.as_ref().map(|c| c.id.clone()),
        });
    }

    fn emit_position(&mut self) {
        let position = self.sync.display_position();
        let duration = self.duration();
        self.pending_events
            .push(TransportEvent::PositionChanged { position, duration });
    }

    fn emit_queue_changed(&mut self) {
        self.pending_events.push(TransportEvent::QueueChanged {
            tracks: self.state.queue.ids(),
        });
    }

    fn emit_modes_changed(&mut self) {
        self.pending_events.push(TransportEvent::ModesChanged {
            shuffle: self.state.shuffle,
            repeat: self.state.repeat,
        });
    }

    fn emit_seek_changed(&mut self) {
        self.pending_events.push(TransportEvent::SeekChanged {
            phase: self.seek.phase(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CommandKind, MockBackend};
    use crate::types::{Container, ContainerId, Track};

    fn album(id: &str, n: usize) -> PlaybackContext {
        let cid = ContainerId::new(id);
        let tracks = (0..n)
            .map(|i| {
                Arc::new(
                    Track::new(format!("{id}{i}"), format!("/music/{id}/{i}.flac"))
                        .in_container(cid.clone())
                        .with_duration(200.0),
                )
            })
            .collect();
        Arc::new(Container::new(cid, id, tracks))
    }

    async fn setup() -> (TransportController, Arc<MockBackend>, PlaybackContext) {
        let backend = Arc::new(MockBackend::new());
        let mut controller =
            TransportController::new(backend.clone(), TransportConfig::default())
                .unwrap()
                .with_rng(1);
        let x = album("x", 3);
        controller
            .set_library(Library::from_containers(vec![x.clone()]), Instant::now())
            .await
            .unwrap();
        (controller, backend, x)
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = TransportConfig {
            seek_confirm_tolerance: f64::NAN,
            ..Default::default()
        };
        let result = TransportController::new(Arc::new(MockBackend::new()), config);
        assert!(matches!(result, Err(TransportError::Config(_))));
    }

    #[tokio::test]
    async fn play_sets_context_and_preloads() {
        let (mut controller, backend, x) = setup().await;
        let now = Instant::now();

        controller.play(x.tracks[0].clone(), now).await.unwrap();

        assert_eq!(controller.playback_state(), PlaybackState::Playing);
        assert!(Arc::ptr_eq(controller.context().unwrap(), &x));
        assert!(controller.render_loop_active());
        assert_eq!(controller.preloaded_track().unwrap().id.as_str(), "x1");
        assert_eq!(backend.count(CommandKind::PreloadNext), 1);
    }

    #[tokio::test]
    async fn failed_pause_changes_nothing() {
        let (mut controller, backend, x) = setup().await;
        let now = Instant::now();
        controller.play(x.tracks[0].clone(), now).await.unwrap();
        controller.drain_events();

        backend.fail_next(CommandKind::Pause, BackendError::disconnected("gone"));
        assert!(controller.pause(now).await.is_err());
        assert_eq!(controller.playback_state(), PlaybackState::Playing);
        assert!(controller.render_loop_active());
    }

    #[tokio::test]
    async fn render_loop_stops_on_pause() {
        let (mut controller, _backend, x) = setup().await;
        let now = Instant::now();
        controller.play(x.tracks[0].clone(), now).await.unwrap();

        controller.pause(now).await.unwrap();
        assert!(!controller.render_loop_active());
        controller.drain_events();
        controller.render_tick(now);
        assert!(!controller.has_pending_events());
    }

    #[tokio::test]
    async fn volume_is_clamped() {
        let (mut controller, backend, _x) = setup().await;
        controller.set_volume(1.7, Instant::now()).await.unwrap();

        assert_eq!(controller.volume(), 1.0);
        assert!(backend
            .commands()
            .contains(&crate::backend::BackendCommand::SetVolume(1.0)));
        assert!(controller.set_volume(f32::NAN, Instant::now()).await.is_err());
    }

    #[tokio::test]
    async fn seek_without_track_is_rejected() {
        let (mut controller, _backend, _x) = setup().await;
        assert!(matches!(
            controller.seek_to(10.0, Instant::now()).await,
            Err(TransportError::NoTrackLoaded)
        ));
        assert!(controller.begin_seek_drag(10.0).is_err());
    }
}
