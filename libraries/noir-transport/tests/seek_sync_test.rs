//! Seek lifecycle and position display tests
//!
//! Stale-report rejection, safety timeout, deduplication, drag/commit and
//! the render loop's behavior around them.

use noir_transport::{
    BackendCommand, BackendEnvelope, BackendError, BackendEvent, CommandKind, Container,
    ContainerId, ContainerRef, Library, MockBackend, PlaybackState, SeekPhase, Track, TrackId,
    TransportConfig, TransportController, TransportEvent,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ===== Helpers =====

fn album(id: &str, n: usize) -> ContainerRef {
    let cid = ContainerId::new(id);
    let tracks = (0..n)
        .map(|i| {
            Arc::new(
                Track::new(format!("{id}{i}"), format!("/music/{id}/{i}.flac"))
                    .with_duration(200.0)
                    .in_container(cid.clone()),
            )
        })
        .collect();
    Arc::new(Container::new(cid, id, tracks))
}

/// Controller playing `x0` at time `t0`
async fn playing() -> (TransportController, Arc<MockBackend>, ContainerRef, Instant) {
    let x = album("x", 3);
    let backend = Arc::new(MockBackend::new());
    let mut controller = TransportController::new(backend.clone(), TransportConfig::default()).unwrap();
    let t0 = Instant::now();
    controller
        .set_library(Library::from_containers(vec![x.clone()]), t0)
        .await
        .unwrap();
    controller.play(x.tracks[0].clone(), t0).await.unwrap();
    (controller, backend, x, t0)
}

fn progress(position: f64) -> BackendEnvelope {
    BackendEnvelope::progress(TrackId::new("x0"), position, 200.0)
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// ===== Stale Reports =====

#[tokio::test]
async fn stale_progress_is_ignored_until_confirmed() {
    let (mut controller, backend, _x, t0) = playing().await;
    controller.handle_backend_event(progress(40.0), t0).await.unwrap();

    controller.seek_to(120.0, t0 + ms(10)).await.unwrap();
    assert_eq!(backend.commands().last(), Some(&BackendCommand::Seek(120.0)));
    assert_eq!(controller.display_position(), 120.0);
    assert!(!controller.render_loop_active());

    // Pre-seek report still in flight
    controller
        .handle_backend_event(progress(45.0), t0 + ms(50))
        .await
        .unwrap();
    assert_eq!(controller.display_position(), 120.0);
    assert!(controller.pending_seek().is_some());

    controller
        .handle_backend_event(progress(120.3), t0 + ms(150))
        .await
        .unwrap();
    assert_eq!(controller.display_position(), 120.3);
    assert!(controller.pending_seek().is_none());
    assert!(controller.render_loop_active());
    assert_eq!(controller.live_timers(), 1);
}

#[tokio::test]
async fn seeking_event_confirms_request() {
    let (mut controller, _backend, _x, t0) = playing().await;

    controller.seek_to(75.0, t0).await.unwrap();
    controller
        .handle_backend_event(
            BackendEnvelope::new(TrackId::new("x0"), BackendEvent::Seeking { target: 75.0 }),
            t0 + ms(20),
        )
        .await
        .unwrap();

    assert!(controller.pending_seek().is_none());
    assert_eq!(controller.seek_phase(), SeekPhase::Idle);
}

#[tokio::test]
async fn unsolicited_seek_moves_display() {
    let (mut controller, _backend, _x, t0) = playing().await;

    controller
        .handle_backend_event(
            BackendEnvelope::new(TrackId::new("x0"), BackendEvent::Seeking { target: 33.0 }),
            t0,
        )
        .await
        .unwrap();

    assert_eq!(controller.display_position(), 33.0);
}

// ===== Timeout =====

#[tokio::test]
async fn unconfirmed_seek_times_out_at_target() {
    let (mut controller, _backend, _x, t0) = playing().await;

    controller.seek_to(90.0, t0).await.unwrap();
    controller
        .handle_backend_event(progress(10.0), t0 + ms(100))
        .await
        .unwrap();
    assert_eq!(controller.display_position(), 90.0);

    // Nothing fires before the deadline
    controller.poll_timers(t0 + ms(1900));
    assert!(controller.pending_seek().is_some());

    controller.poll_timers(t0 + ms(2100));
    assert!(controller.pending_seek().is_none());
    assert!((controller.display_position() - 90.0).abs() < 0.2);
    assert!(controller.render_loop_active());
    assert_eq!(controller.live_timers(), 1);

    // Display resumes from the target, not from the stale report
    for i in 1..=10 {
        controller.render_tick(t0 + ms(2100 + 16 * i));
    }
    let shown = controller.display_position();
    assert!(shown >= 90.0 && shown < 90.5);
}

#[tokio::test]
async fn timeout_after_confirmation_is_a_no_op() {
    let (mut controller, _backend, _x, t0) = playing().await;

    controller.seek_to(60.0, t0).await.unwrap();
    controller
        .handle_backend_event(progress(60.1), t0 + ms(50))
        .await
        .unwrap();
    controller.drain_events();

    controller.poll_timers(t0 + ms(5000));
    assert_eq!(controller.live_timers(), 1);
    assert!(!controller
        .drain_events()
        .iter()
        .any(|e| matches!(e, TransportEvent::SeekChanged { .. })));
}

// ===== Coalescing =====

#[tokio::test]
async fn rapid_seeks_leave_one_live_request() {
    let (mut controller, backend, _x, t0) = playing().await;

    controller.seek_to(30.0, t0).await.unwrap();
    controller.seek_to(150.0, t0 + ms(5)).await.unwrap();

    let pending = controller.pending_seek().unwrap();
    assert_eq!(pending.target, 150.0);
    assert_eq!(backend.count(CommandKind::Seek), 2);
    // Only the latest safety timer survives; render loop is off
    assert_eq!(controller.live_timers(), 1);

    // Confirmation for the abandoned target is stale
    controller
        .handle_backend_event(progress(30.1), t0 + ms(40))
        .await
        .unwrap();
    assert_eq!(controller.display_position(), 150.0);

    controller
        .handle_backend_event(progress(150.2), t0 + ms(80))
        .await
        .unwrap();
    assert!(controller.pending_seek().is_none());
}

#[tokio::test]
async fn near_identical_seeks_are_deduplicated() {
    let (mut controller, backend, _x, t0) = playing().await;

    controller.seek_to(60.0, t0).await.unwrap();
    let first = controller.pending_seek().unwrap().id;
    controller.seek_to(60.05, t0 + ms(5)).await.unwrap();

    assert_eq!(backend.count(CommandKind::Seek), 1);
    let pending = controller.pending_seek().unwrap();
    assert_eq!(pending.id, first);
    assert_eq!(pending.target, 60.05);
}

#[tokio::test]
async fn seek_target_is_clamped_to_duration() {
    let (mut controller, backend, _x, t0) = playing().await;

    controller.seek_to(500.0, t0).await.unwrap();
    assert_eq!(backend.commands().last(), Some(&BackendCommand::Seek(200.0)));

    controller.seek_to(-3.0, t0 + ms(5)).await.unwrap();
    assert_eq!(backend.commands().last(), Some(&BackendCommand::Seek(0.0)));
}

// ===== Drag =====

#[tokio::test]
async fn drag_previews_then_commits() {
    let (mut controller, backend, _x, t0) = playing().await;

    controller.begin_seek_drag(50.0).unwrap();
    assert!(!controller.render_loop_active());
    assert_eq!(controller.display_position(), 50.0);

    controller.update_seek_drag(70.0).unwrap();
    // Reports during a drag never move the preview
    controller
        .handle_backend_event(progress(12.0), t0 + ms(100))
        .await
        .unwrap();
    assert_eq!(controller.display_position(), 70.0);
    assert_eq!(controller.seek_phase(), SeekPhase::Dragging { preview: 70.0 });
    assert_eq!(backend.count(CommandKind::Seek), 0);

    controller.commit_seek(t0 + ms(200)).await.unwrap();
    assert_eq!(backend.commands().last(), Some(&BackendCommand::Seek(70.0)));
    assert_eq!(controller.display_position(), 70.0);
    assert!(controller.pending_seek().is_some());
}

#[tokio::test]
async fn drag_cancels_seek_in_flight() {
    let (mut controller, _backend, _x, t0) = playing().await;

    controller.seek_to(100.0, t0).await.unwrap();
    controller.begin_seek_drag(20.0).unwrap();

    assert!(controller.pending_seek().is_none());
    assert_eq!(controller.live_timers(), 0);

    // A late confirmation of the cancelled seek changes nothing
    controller
        .handle_backend_event(progress(100.0), t0 + ms(30))
        .await
        .unwrap();
    assert_eq!(controller.display_position(), 20.0);
}

#[tokio::test]
async fn commit_without_drag_is_ignored() {
    let (mut controller, backend, _x, t0) = playing().await;

    controller.commit_seek(t0).await.unwrap();
    assert_eq!(backend.count(CommandKind::Seek), 0);
}

// ===== Failures & States =====

#[tokio::test]
async fn failed_seek_resolves_immediately() {
    let (mut controller, backend, _x, t0) = playing().await;
    controller.drain_events();

    backend.fail_next(CommandKind::Seek, BackendError::disconnected("pipe closed"));
    assert!(controller.seek_to(80.0, t0).await.is_err());

    assert!(controller.pending_seek().is_none());
    assert!(controller.render_loop_active());
    assert_eq!(controller.live_timers(), 1);
    let notifications = controller
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, TransportEvent::Notification { .. }))
        .count();
    assert_eq!(notifications, 1);
}

#[tokio::test]
async fn seek_after_end_restarts_track_at_target() {
    let (mut controller, backend, x, t0) = playing().await;
    controller.play(x.tracks[2].clone(), t0).await.unwrap();
    controller.skip_next(t0).await.unwrap();
    assert_eq!(controller.playback_state(), PlaybackState::Idle);

    controller.seek_to(40.0, t0).await.unwrap();

    assert_eq!(
        backend.commands().last().map(BackendCommand::kind),
        Some(CommandKind::PlayAt)
    );
    assert!(backend
        .commands()
        .contains(&BackendCommand::PlayAt(TrackId::new("x2"), 40.0)));
    assert_eq!(controller.playback_state(), PlaybackState::Playing);
}

#[tokio::test]
async fn seek_while_paused_stays_paused() {
    let (mut controller, _backend, _x, t0) = playing().await;
    controller.pause(t0).await.unwrap();

    controller.seek_to(55.0, t0).await.unwrap();
    controller
        .handle_backend_event(progress(55.0), t0 + ms(30))
        .await
        .unwrap();

    assert_eq!(controller.playback_state(), PlaybackState::Paused);
    assert_eq!(controller.display_position(), 55.0);
    assert!(!controller.render_loop_active());
}

// ===== Display =====

#[tokio::test]
async fn display_is_capped_when_backend_goes_silent() {
    let (mut controller, _backend, _x, t0) = playing().await;
    controller.handle_backend_event(progress(10.0), t0).await.unwrap();

    // Five seconds of frames with no new report
    let mut shown = 0.0;
    for i in 1..=300 {
        controller.render_tick(t0 + ms(16 * i));
        shown = controller.display_position();
    }
    assert!(shown <= 10.15 + 1e-9);
}

#[tokio::test]
async fn buffering_freezes_render_loop() {
    let (mut controller, _backend, _x, t0) = playing().await;

    controller
        .handle_backend_event(
            BackendEnvelope::new(TrackId::new("x0"), BackendEvent::Loading(true)),
            t0,
        )
        .await
        .unwrap();
    assert!(!controller.render_loop_active());
    controller.drain_events();
    controller.render_tick(t0 + ms(16));
    assert!(!controller.has_pending_events());

    controller
        .handle_backend_event(
            BackendEnvelope::new(TrackId::new("x0"), BackendEvent::Loading(false)),
            t0 + ms(500),
        )
        .await
        .unwrap();
    assert!(controller.render_loop_active());
}

#[tokio::test]
async fn render_ticks_emit_positions_only_while_playing() {
    let (mut controller, _backend, _x, t0) = playing().await;
    controller.drain_events();

    controller.render_tick(t0 + ms(16));
    assert!(matches!(
        controller.drain_events().as_slice(),
        [TransportEvent::PositionChanged { .. }]
    ));

    controller.pause(t0 + ms(20)).await.unwrap();
    controller.drain_events();
    controller.render_tick(t0 + ms(32));
    assert!(controller.drain_events().is_empty());
}
