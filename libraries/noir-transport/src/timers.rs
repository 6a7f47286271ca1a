//! Scoped timer handles
//!
//! Every timer belongs to the operation that created it (a track load, a
//! seek). When that operation exits, by completion, supersession or teardown,
//! its owner cancels everything registered under the operation id in one call.
//! Nothing here sleeps: the driver asks for the next deadline and feeds the
//! current time back in.

use std::collections::BTreeMap;
use std::time::Instant;

/// Identifies the operation that owns a set of timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

/// Handle to a single registered timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// What a timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Per-frame position rendering; periodic, has no deadline
    RenderLoop,

    /// Seek confirmation safety net for the given request
    SeekSafety { request: u64 },
}

#[derive(Debug, Clone)]
struct TimerEntry {
    owner: OperationId,
    kind: TimerKind,
    deadline: Option<Instant>,
}

/// Arena of live timers keyed by handle
#[derive(Debug, Default)]
pub struct TimerTable {
    next_handle: u64,
    next_operation: u64,
    entries: BTreeMap<TimerHandle, TimerEntry>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh operation id
    pub fn begin_operation(&mut self) -> OperationId {
        self.next_operation += 1;
        OperationId(self.next_operation)
    }

    /// Register a one-shot timer that fires at `deadline`
    pub fn schedule(&mut self, owner: OperationId, kind: TimerKind, deadline: Instant) -> TimerHandle {
        self.insert(owner, kind, Some(deadline))
    }

    /// Register a periodic timer; it stays live until cancelled
    pub fn register_periodic(&mut self, owner: OperationId, kind: TimerKind) -> TimerHandle {
        self.insert(owner, kind, None)
    }

    fn insert(&mut self, owner: OperationId, kind: TimerKind, deadline: Option<Instant>) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.entries.insert(
            handle,
            TimerEntry {
                owner,
                kind,
                deadline,
            },
        );
        handle
    }

    /// Cancel one timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.entries.remove(&handle).is_some()
    }

    /// Cancel every timer owned by `owner`, returning how many were live
    pub fn cancel_owner(&mut self, owner: OperationId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.owner != owner);
        before - self.entries.len()
    }

    /// Cancel everything (stop, teardown)
    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn is_live(&self, handle: TimerHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Remove and return every one-shot timer whose deadline has passed
    pub fn take_expired(&mut self, now: Instant) -> Vec<(TimerHandle, TimerKind)> {
        let expired: Vec<TimerHandle> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline.is_some_and(|d| d <= now))
            .map(|(h, _)| *h)
            .collect();

        expired
            .into_iter()
            .filter_map(|h| self.entries.remove(&h).map(|e| (h, e.kind)))
            .collect()
    }

    /// Earliest one-shot deadline, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().filter_map(|e| e.deadline).min()
    }

    /// Whether any periodic timer of this kind is registered
    pub fn has_periodic(&self, kind: TimerKind) -> bool {
        self.entries
            .values()
            .any(|e| e.deadline.is_none() && e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
