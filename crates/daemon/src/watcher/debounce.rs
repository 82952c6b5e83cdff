// Trailing debounce for document edits.
//
// Each path is Idle (absent), Pending(deadline) or Fired (returned by
// `drain_ready` and back to Idle). Every create/modify on a pending path
// pushes its deadline out to now + window, so a burst of saves yields a
// single update once the path has been quiet for a full window.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{FsEventKind, RawFsEvent};

/// Default debounce window in seconds.
pub const DEFAULT_DEBOUNCE_SECS: f64 = 1.0;
/// Longest window accepted from configuration.
const MAX_DEBOUNCE_SECS: f64 = 3600.0;

/// Configuration for the debouncer.
#[derive(Debug, Clone, PartialEq)]
pub struct DebounceConfig {
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window: Duration::from_secs_f64(DEFAULT_DEBOUNCE_SECS) }
    }
}

impl DebounceConfig {
    /// Window of `secs` seconds, capped at one hour. Negative or non-finite
    /// values fall back to the default.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs < 0.0 {
            return Self::default();
        }
        Self { window: Duration::from_secs_f64(secs.min(MAX_DEBOUNCE_SECS)) }
    }

    pub fn with_millis(ms: u64) -> Self {
        Self { window: Duration::from_millis(ms) }
    }
}

struct PendingEvent {
    kind: FsEventKind,
    deadline: Instant,
}

/// Coalesces rapid events on the same path.
///
/// Call `push()` for each incoming event, then `drain_ready()` periodically
/// to collect paths whose quiet period has elapsed.
pub struct Debouncer {
    config: DebounceConfig,
    pending: HashMap<PathBuf, PendingEvent>,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config, pending: HashMap::new() }
    }

    pub fn window(&self) -> Duration {
        self.config.window
    }

    /// Record an event. A pending path has its deadline reset; the last
    /// event kind wins.
    pub fn push(&mut self, event: RawFsEvent) {
        self.push_at(event, Instant::now());
    }

    /// Like `push` but with a specific timestamp.
    pub fn push_at(&mut self, event: RawFsEvent, now: Instant) {
        let deadline = now + self.config.window;
        self.pending.insert(event.path, PendingEvent { kind: event.kind, deadline });
    }

    /// Drop the pending entry for `path`. Returns whether one existed.
    pub fn cancel(&mut self, path: &Path) -> bool {
        self.pending.remove(path).is_some()
    }

    /// Drop pending entries for `dir` and everything below it.
    pub fn cancel_under(&mut self, dir: &Path) -> usize {
        let before = self.pending.len();
        self.pending.retain(|path, _| !path.starts_with(dir));
        before - self.pending.len()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.contains_key(path)
    }

    /// Drain all events whose deadline has passed, ordered by path.
    pub fn drain_ready(&mut self) -> Vec<RawFsEvent> {
        self.drain_ready_at(Instant::now())
    }

    /// Like `drain_ready` but with a specific timestamp.
    pub fn drain_ready_at(&mut self, now: Instant) -> Vec<RawFsEvent> {
        let mut ready = Vec::new();
        self.pending.retain(|path, pending| {
            if now >= pending.deadline {
                ready.push(RawFsEvent { kind: pending.kind.clone(), path: path.clone() });
                false
            } else {
                true
            }
        });
        ready.sort_by(|a, b| a.path.cmp(&b.path));
        ready
    }

    /// Drain everything regardless of deadline (used on shutdown).
    pub fn drain_all(&mut self) -> Vec<RawFsEvent> {
        let mut all: Vec<_> =
            self.pending.drain().map(|(path, pending)| RawFsEvent { kind: pending.kind, path }).collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }

    /// Number of events still waiting in the debounce window.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Earliest pending deadline, or None if empty.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }
}
