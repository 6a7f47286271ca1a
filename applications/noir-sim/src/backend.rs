//! Simulated audio engine
//!
//! Plays nothing. A clock task advances the stream position and reports it at
//! ~10 Hz, commands answer after a random delay, and a configurable share of
//! them fail. Together that reproduces the ordering problems a real engine
//! behind a process or thread boundary causes.

use async_trait::async_trait;
use noir_transport::{
    AudioBackend, BackendEnvelope, BackendError, BackendEvent, BackendResult, BackendSnapshot,
    TrackId, TrackRef,
};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

const REPORT_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_DURATION: f64 = 180.0;

#[derive(Debug, Clone)]
struct Stream {
    id: TrackId,
    duration: f64,
}

impl Stream {
    fn of(track: &TrackRef) -> Self {
        Self {
            id: track.id.clone(),
            duration: track.duration_hint.unwrap_or(DEFAULT_DURATION),
        }
    }
}

#[derive(Debug, Default)]
struct Engine {
    current: Option<Stream>,
    next: Option<Stream>,
    position: f64,
    playing: bool,
}

impl Engine {
    fn report(&self, events: &UnboundedSender<BackendEnvelope>) {
        if let Some(stream) = &self.current {
            let _ = events.send(BackendEnvelope::progress(
                stream.id.clone(),
                self.position,
                stream.duration,
            ));
        }
    }

    /// Advance by one report interval
    fn tick(&mut self, events: &UnboundedSender<BackendEnvelope>) {
        if !self.playing {
            return;
        }
        let Some(stream) = self.current.clone() else {
            return;
        };

        self.position += REPORT_INTERVAL.as_secs_f64();
        if self.position < stream.duration {
            self.report(events);
            return;
        }

        match self.next.take() {
            Some(next) => {
                debug!(from = %stream.id, to = %next.id, "Gapless swap");
                self.current = Some(next);
                self.position = 0.0;
                self.report(events);
            }
            None => {
                self.position = stream.duration;
                self.playing = false;
                let _ = events.send(BackendEnvelope::new(stream.id, BackendEvent::Ended));
            }
        }
    }
}

/// Backend tuning
#[derive(Debug, Clone, Copy)]
pub struct SimulationProfile {
    /// Command answer delay range, in milliseconds
    pub latency_ms: (u64, u64),

    /// Probability that a command fails with a busy device
    pub failure_rate: f64,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            latency_ms: (5, 120),
            failure_rate: 0.0,
        }
    }
}

/// Fake engine reporting over an event channel
pub struct SimulatedBackend {
    engine: Arc<Mutex<Engine>>,
    events: UnboundedSender<BackendEnvelope>,
    profile: SimulationProfile,
    clock: JoinHandle<()>,
}

impl SimulatedBackend {
    /// Start the engine clock; must be called inside a tokio runtime
    pub fn spawn(events: UnboundedSender<BackendEnvelope>, profile: SimulationProfile) -> Self {
        let engine = Arc::new(Mutex::new(Engine::default()));

        let clock = {
            let engine = engine.clone();
            let events = events.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(REPORT_INTERVAL);
                loop {
                    interval.tick().await;
                    if events.is_closed() {
                        break;
                    }
                    engine.lock().tick(&events);
                }
            })
        };

        Self {
            engine,
            events,
            profile,
            clock,
        }
    }

    /// Sleep for a random latency, then maybe fail
    async fn answer(&self, command: &str) -> BackendResult<()> {
        let (low, high) = self.profile.latency_ms;
        let delay = rand::thread_rng().gen_range(low..=high.max(low));
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let fail = rand::thread_rng().gen_bool(self.profile.failure_rate.clamp(0.0, 1.0));
        if fail {
            debug!(command, "Simulated failure");
            return Err(BackendError::device_busy(format!(
                "output device busy during {command}"
            )));
        }
        trace!(command, delay_ms = delay, "Simulated command done");
        Ok(())
    }

    fn start(&self, track: &TrackRef, position: f64) {
        let mut engine = self.engine.lock();
        let stream = Stream::of(track);
        engine.position = position.clamp(0.0, stream.duration);
        engine.current = Some(stream);
        engine.next = None;
        engine.playing = true;
        engine.report(&self.events);
    }
}

impl Drop for SimulatedBackend {
    fn drop(&mut self) {
        self.clock.abort();
    }
}

#[async_trait]
impl AudioBackend for SimulatedBackend {
    async fn play(&self, track: &TrackRef) -> BackendResult<()> {
        self.answer("play").await?;
        self.start(track, 0.0);
        Ok(())
    }

    async fn play_at(&self, track: &TrackRef, position: f64) -> BackendResult<()> {
        self.answer("play_at").await?;
        self.start(track, position);
        Ok(())
    }

    async fn pause(&self) -> BackendResult<()> {
        self.answer("pause").await?;
        let mut engine = self.engine.lock();
        if engine.playing {
            engine.playing = false;
            if let Some(stream) = &engine.current {
                let _ = self
                    .events
                    .send(BackendEnvelope::new(stream.id.clone(), BackendEvent::Paused));
            }
        }
        Ok(())
    }

    async fn resume(&self) -> BackendResult<()> {
        self.answer("resume").await?;
        let mut engine = self.engine.lock();
        if !engine.playing && engine.current.is_some() {
            engine.playing = true;
            if let Some(stream) = &engine.current {
                let _ = self
                    .events
                    .send(BackendEnvelope::new(stream.id.clone(), BackendEvent::Resumed));
            }
        }
        Ok(())
    }

    async fn stop(&self) -> BackendResult<()> {
        self.answer("stop").await?;
        *self.engine.lock() = Engine::default();
        Ok(())
    }

    async fn seek(&self, position: f64) -> BackendResult<()> {
        self.answer("seek").await?;
        let mut engine = self.engine.lock();
        let Some(stream) = engine.current.clone() else {
            return Err(BackendError::unreadable("no stream to seek"));
        };
        let target = position.clamp(0.0, stream.duration);
        let _ = self.events.send(BackendEnvelope::new(
            stream.id,
            BackendEvent::Seeking { target },
        ));
        engine.position = target;
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> BackendResult<()> {
        self.answer("set_volume").await?;
        debug!(volume, "Simulated volume");
        Ok(())
    }

    async fn preload_next(&self, track: &TrackRef) -> BackendResult<()> {
        // Hints never fail and never wait
        self.engine.lock().next = Some(Stream::of(track));
        Ok(())
    }

    async fn query_state(&self) -> BackendResult<BackendSnapshot> {
        self.answer("query_state").await?;
        let engine = self.engine.lock();
        Ok(BackendSnapshot {
            is_playing: engine.playing,
            position: engine.position,
            duration: engine.current.as_ref().map_or(0.0, |s| s.duration),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noir_transport::Track;

    fn quiet() -> SimulationProfile {
        SimulationProfile {
            latency_ms: (0, 0),
            failure_rate: 0.0,
        }
    }

    fn track(id: &str, seconds: f64) -> TrackRef {
        Arc::new(Track::new(id, format!("/sim/{id}.flac")).with_duration(seconds))
    }

    #[tokio::test(start_paused = true)]
    async fn reports_progress_while_playing() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let backend = SimulatedBackend::spawn(tx, quiet());

        backend.play(&track("a", 60.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        let mut last = 0.0;
        while let Ok(envelope) = rx.try_recv() {
            if let BackendEvent::Progress { position, .. } = envelope.event {
                assert_eq!(envelope.track_id, Some(TrackId::new("a")));
                last = position;
            }
        }
        assert!(last > 0.2);
    }

    #[tokio::test(start_paused = true)]
    async fn swaps_to_preloaded_track_at_end() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let backend = SimulatedBackend::spawn(tx, quiet());

        backend.play(&track("a", 0.3)).await.unwrap();
        backend.preload_next(&track("b", 60.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        let mut ids = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            assert_ne!(envelope.event, BackendEvent::Ended);
            ids.extend(envelope.track_id);
        }
        assert_eq!(ids.last(), Some(&TrackId::new("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_profile_rejects_commands() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let backend = SimulatedBackend::spawn(
            tx,
            SimulationProfile {
                latency_ms: (0, 0),
                failure_rate: 1.0,
            },
        );

        assert!(backend.pause().await.is_err());
        assert!(backend.preload_next(&track("a", 10.0)).await.is_ok());
    }
}
