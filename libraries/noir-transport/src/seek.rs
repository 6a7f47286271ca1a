//! Seek lifecycle
//!
//! ```text
//! Idle ──begin_drag──▶ Dragging ──commit──▶ Committed ──confirm──▶ Idle
//!  ▲                      ▲                    │  └──timeout/fail──▶ Idle
//!  └──────cancel──────────┴─────begin_drag─────┘
//! ```
//!
//! While a request is committed the backend keeps reporting positions from
//! before the seek landed. Those are stale: only a report within the confirm
//! tolerance of the target is accepted. The coordinator only decides; the
//! controller owns the backend call, the safety timer and the position sample.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, trace};

/// Lifecycle of a committed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Pending,
    Confirmed,
    TimedOut,
}

/// One committed seek
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekRequest {
    pub id: u64,
    pub target: f64,
    pub issued_at: Instant,
    pub state: RequestState,
}

/// What the UI sees of the seek lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SeekPhase {
    #[default]
    Idle,
    Dragging { preview: f64 },
    Committed { request: u64, target: f64 },
}

/// Result of committing a target
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Commit {
    /// New request; the caller issues the backend seek and arms the timer
    Issued(SeekRequest),

    /// Close enough to the live request that no new backend command is needed
    Reused(SeekRequest),
}

/// How a backend position relates to the pending seek
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// No seek committed; the event is authoritative
    NoSeek,

    /// From before the seek landed; discard it
    Stale,

    /// The backend arrived; the request is resolved
    Confirmed(SeekRequest),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Dragging(f64),
    Committed(SeekRequest),
}

/// At most one seek in flight
#[derive(Debug, Clone)]
pub struct SeekCoordinator {
    phase: Phase,
    next_id: u64,
    confirm_tolerance: f64,
    dedupe_threshold: f64,
}

impl SeekCoordinator {
    pub fn new(confirm_tolerance: f64, dedupe_threshold: f64) -> Self {
        Self {
            phase: Phase::Idle,
            next_id: 0,
            confirm_tolerance,
            dedupe_threshold,
        }
    }

    pub fn phase(&self) -> SeekPhase {
        match self.phase {
            Phase::Idle => SeekPhase::Idle,
            Phase::Dragging(preview) => SeekPhase::Dragging { preview },
            Phase::Committed(req) => SeekPhase::Committed {
                request: req.id,
                target: req.target,
            },
        }
    }

    /// The live request, if one is committed
    pub fn pending(&self) -> Option<&SeekRequest> {
        match &self.phase {
            Phase::Committed(req) => Some(req),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.phase, Phase::Committed(_))
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, Phase::Dragging(_))
    }

    /// Preview position while dragging
    pub fn preview(&self) -> Option<f64> {
        match self.phase {
            Phase::Dragging(pos) => Some(pos),
            _ => None,
        }
    }

    /// Start dragging, abandoning any committed request
    ///
    /// Returns the request that was cancelled.
    pub fn begin_drag(&mut self, position: f64) -> Option<SeekRequest> {
        let cancelled = self.pending().copied();
        if let Some(req) = &cancelled {
            debug!(request = req.id, "Seek superseded by drag");
        }
        self.phase = Phase::Dragging(position.max(0.0));
        cancelled
    }

    /// Move the drag preview. Returns false when not dragging.
    pub fn update_drag(&mut self, position: f64) -> bool {
        match &mut self.phase {
            Phase::Dragging(preview) => {
                *preview = position.max(0.0);
                true
            }
            _ => false,
        }
    }

    /// Commit the drag preview
    pub fn commit(&mut self, now: Instant) -> Option<Commit> {
        let Phase::Dragging(target) = self.phase else {
            return None;
        };
        Some(self.issue(target, now))
    }

    /// Programmatic seek, deduplicated against the live request
    pub fn request(&mut self, target: f64, now: Instant) -> Commit {
        let target = target.max(0.0);
        if let Phase::Committed(req) = &mut self.phase {
            if (req.target - target).abs() < self.dedupe_threshold {
                req.target = target;
                trace!(request = req.id, target, "Seek deduplicated");
                return Commit::Reused(*req);
            }
        }
        self.issue(target, now)
    }

    fn issue(&mut self, target: f64, now: Instant) -> Commit {
        self.next_id += 1;
        let req = SeekRequest {
            id: self.next_id,
            target,
            issued_at: now,
            state: RequestState::Pending,
        };
        debug!(request = req.id, target, "Seek committed");
        self.phase = Phase::Committed(req);
        Commit::Issued(req)
    }

    /// Judge a backend position report
    pub fn observe(&mut self, position: f64) -> Verdict {
        let Phase::Committed(req) = self.phase else {
            return Verdict::NoSeek;
        };

        if (position - req.target).abs() < self.confirm_tolerance {
            debug!(request = req.id, position, "Seek confirmed");
            self.phase = Phase::Idle;
            Verdict::Confirmed(SeekRequest {
                state: RequestState::Confirmed,
                ..req
            })
        } else {
            trace!(request = req.id, position, target = req.target, "Stale position discarded");
            Verdict::Stale
        }
    }

    /// Safety timer fired for `request`; ignored if it is no longer live
    pub fn on_timeout(&mut self, request: u64) -> Option<SeekRequest> {
        match self.phase {
            Phase::Committed(req) if req.id == request => {
                debug!(request, target = req.target, "Seek timed out, trusting target");
                self.phase = Phase::Idle;
                Some(SeekRequest {
                    state: RequestState::TimedOut,
                    ..req
                })
            }
            _ => None,
        }
    }

    /// The backend rejected the seek command for `request`
    pub fn on_failed(&mut self, request: u64) -> Option<SeekRequest> {
        match self.phase {
            Phase::Committed(req) if req.id == request => {
                self.phase = Phase::Idle;
                Some(req)
            }
            _ => None,
        }
    }

    /// Drop any drag or request (track change, stop)
    pub fn cancel(&mut self) -> Option<SeekRequest> {
        let cancelled = self.pending().copied();
        self.phase = Phase::Idle;
        cancelled
    }
}
