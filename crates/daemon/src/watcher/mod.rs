// File watcher: OS notifications → typed events → debounce → indexer.
// This module handles the first stage: raw event translation and the
// event-source seam.

pub mod debounce;
pub mod pipeline;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::error::{IndexError, IndexResult};
use folio_common::path::is_markdown;

/// What happened to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEventKind {
    /// Path appeared (created, or moved in from outside the workspace).
    Create,
    /// File content changed.
    Modify,
    /// Path vanished (deleted, or moved out of the workspace).
    Remove,
    /// Path was moved within the workspace; `path` is the destination.
    Rename { from: PathBuf },
}

/// A filesystem event for a path under the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

impl RawFsEvent {
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self { kind, path: path.into() }
    }
}

/// Capacity for the internal event channel.
const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Something that can deliver filesystem events for a directory tree.
pub trait EventSource {
    /// Start watching `root` recursively. Events arrive on the returned
    /// channel until the source is dropped.
    fn subscribe(&mut self, root: &Path) -> IndexResult<mpsc::Receiver<RawFsEvent>>;
}

/// OS-native notifications (inotify on Linux, FSEvents on macOS).
#[derive(Default)]
pub struct NotifySource {
    watcher: Option<RecommendedWatcher>,
}

impl NotifySource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSource for NotifySource {
    fn subscribe(&mut self, root: &Path) -> IndexResult<mpsc::Receiver<RawFsEvent>> {
        let root = root
            .canonicalize()
            .map_err(|e| IndexError::WatchSubsystemUnavailable(notify::Error::io(e)))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let root_for_filter = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for raw in translate_event(&event, &root_for_filter) {
                    if tx.blocking_send(raw).is_err() {
                        debug!("event channel closed, stopping event dispatch");
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "file watcher error");
            }
        })
        .map_err(IndexError::WatchSubsystemUnavailable)?;

        watcher.watch(&root, RecursiveMode::Recursive).map_err(IndexError::WatchSubsystemUnavailable)?;

        debug!(path = %root.display(), "file watcher started");
        self.watcher = Some(watcher);
        Ok(rx)
    }
}

/// Events injected by hand. Used by tests and embedders that already have
/// their own notification stream.
pub struct ChannelSource {
    rx: Option<mpsc::Receiver<RawFsEvent>>,
}

impl ChannelSource {
    /// Create a source and the sender feeding it.
    pub fn new() -> (Self, mpsc::Sender<RawFsEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self { rx: Some(rx) }, tx)
    }
}

impl EventSource for ChannelSource {
    fn subscribe(&mut self, _root: &Path) -> IndexResult<mpsc::Receiver<RawFsEvent>> {
        self.rx.take().ok_or_else(|| {
            IndexError::WatchSubsystemUnavailable(notify::Error::generic("channel source already subscribed"))
        })
    }
}

/// Returns true if the path is inside the watched root (guards against symlink escapes).
fn is_inside_root(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Paths worth forwarding: Markdown files and anything that may be a directory.
fn is_candidate(path: &Path) -> bool {
    is_markdown(path) || path.extension().is_none() || path.is_dir()
}

/// A removed path no longer exists, so a directory named `v1.0` looks like a
/// file. Every removal is forwarded and the session decides.
fn is_candidate_for(kind: &FsEventKind, path: &Path) -> bool {
    matches!(kind, FsEventKind::Remove) || is_candidate(path)
}

/// Translate a `notify::Event` into zero or more `RawFsEvent`s.
pub(crate) fn translate_event(event: &Event, root: &Path) -> Vec<RawFsEvent> {
    let kind = match &event.kind {
        EventKind::Create(_) => FsEventKind::Create,
        EventKind::Remove(_) => FsEventKind::Remove,
        EventKind::Modify(ModifyKind::Name(mode)) => return translate_rename(*mode, &event.paths, root),
        EventKind::Modify(ModifyKind::Metadata(_)) => {
            trace!("skipping metadata-only modify event");
            return Vec::new();
        }
        EventKind::Modify(_) => FsEventKind::Modify,
        _ => {
            trace!(kind = ?event.kind, "skipping non-content event");
            return Vec::new();
        }
    };

    event
        .paths
        .iter()
        .filter(|p| is_candidate_for(&kind, p))
        .filter(|p| inside_or_warn(p, root))
        .map(|p| RawFsEvent::new(kind.clone(), p.clone()))
        .collect()
}

fn translate_rename(mode: RenameMode, paths: &[PathBuf], root: &Path) -> Vec<RawFsEvent> {
    match (mode, paths) {
        (RenameMode::Both, [from, to]) => {
            let from_inside = is_inside_root(from, root);
            let to_inside = is_inside_root(to, root);
            let event = match (from_inside, to_inside) {
                (true, true) => RawFsEvent::new(FsEventKind::Rename { from: from.clone() }, to.clone()),
                (false, true) => RawFsEvent::new(FsEventKind::Create, to.clone()),
                (true, false) => RawFsEvent::new(FsEventKind::Remove, from.clone()),
                (false, false) => return Vec::new(),
            };
            let relevant = match &event.kind {
                FsEventKind::Rename { from } => is_candidate(from) || is_candidate(&event.path),
                kind => is_candidate_for(kind, &event.path),
            };
            if relevant {
                vec![event]
            } else {
                Vec::new()
            }
        }
        (RenameMode::From, _) => single_kind(FsEventKind::Remove, paths, root),
        (RenameMode::To, _) => single_kind(FsEventKind::Create, paths, root),
        // Backends that cannot pair the two halves report each path on its
        // own; whether it still exists tells which half this is.
        _ => paths
            .iter()
            .filter_map(|p| {
                let kind = if p.exists() { FsEventKind::Create } else { FsEventKind::Remove };
                (is_candidate_for(&kind, p) && inside_or_warn(p, root)).then(|| RawFsEvent::new(kind, p.clone()))
            })
            .collect(),
    }
}

fn single_kind(kind: FsEventKind, paths: &[PathBuf], root: &Path) -> Vec<RawFsEvent> {
    paths
        .iter()
        .filter(|p| is_candidate_for(&kind, p) && inside_or_warn(p, root))
        .map(|p| RawFsEvent::new(kind.clone(), p.clone()))
        .collect()
}

fn inside_or_warn(path: &Path, root: &Path) -> bool {
    if is_inside_root(path, root) {
        true
    } else {
        warn!(path = %path.display(), "ignoring event outside watch root (possible symlink escape)");
        false
    }
}
