// Watch pipeline: FS event → classify → debounce → indexer → index file.
//
// All mutable watch state lives in one `WatchSession` owned by a single
// task, so event handling and debounce expiry never interleave.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use folio_common::path::is_markdown;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::error::IndexResult;
use crate::indexer::{ensure_identifier, IndexOutcome};
use crate::store::index::PathIndex;
use crate::workspace::Workspace;

use super::debounce::{DebounceConfig, Debouncer};
use super::{FsEventKind, RawFsEvent};

/// Events produced by the pipeline for upstream consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A debounced document was (re)indexed.
    Indexed { path: String, outcome: IndexOutcome },
    /// A document or directory moved; `identifiers` now point at `to`.
    Moved { from: String, to: String, identifiers: Vec<String> },
    /// Index entries were dropped because their documents went away.
    Removed { path: String, identifiers: Vec<String> },
    /// An error occurred processing a file event.
    Error { path: PathBuf, error: String },
}

/// Counters for one watch session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub events_received: u64,
    pub updates_applied: u64,
    pub moves_applied: u64,
    pub removals_applied: u64,
    pub errors: u64,
}

/// Configuration for the watcher pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub debounce: DebounceConfig,
    /// How often to check the debouncer for expired deadlines.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { debounce: DebounceConfig::default(), poll_interval: Duration::from_millis(50) }
    }
}

/// Explicit watch state passed to every handler.
pub struct WatchSession {
    workspace: Workspace,
    index: PathIndex,
    debouncer: Debouncer,
    stats: SessionStats,
}

impl WatchSession {
    pub fn new(workspace: Workspace, index: PathIndex, debounce: DebounceConfig) -> Self {
        Self { workspace, index, debouncer: Debouncer::new(debounce), stats: SessionStats::default() }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn pending_count(&self) -> usize {
        self.debouncer.pending_count()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.debouncer.is_pending(path)
    }

    pub fn handle_event(&mut self, event: RawFsEvent) -> Vec<PipelineEvent> {
        self.handle_event_at(event, Instant::now())
    }

    /// Classify one raw event. Creates and modifications go to the
    /// debouncer; moves and deletions are applied immediately.
    pub fn handle_event_at(&mut self, event: RawFsEvent, now: Instant) -> Vec<PipelineEvent> {
        self.stats.events_received += 1;
        trace!(path = %event.path.display(), kind = ?event.kind, "raw event received");

        let path = event.path.clone();
        let result = match event.kind {
            FsEventKind::Create => {
                self.schedule(&event.path, true, now);
                Ok(Vec::new())
            }
            FsEventKind::Modify => {
                self.schedule(&event.path, false, now);
                Ok(Vec::new())
            }
            FsEventKind::Remove => self.apply_remove(&event.path),
            FsEventKind::Rename { from } => self.apply_rename(&from, &event.path, now),
        };
        self.finish(path, result)
    }

    pub fn flush_ready(&mut self) -> Vec<PipelineEvent> {
        self.flush_ready_at(Instant::now())
    }

    /// Index every path whose debounce deadline has passed.
    pub fn flush_ready_at(&mut self, now: Instant) -> Vec<PipelineEvent> {
        let ready = self.debouncer.drain_ready_at(now);
        self.fire(ready)
    }

    /// Index everything still pending, ignoring deadlines.
    pub fn flush_all(&mut self) -> Vec<PipelineEvent> {
        let pending = self.debouncer.drain_all();
        self.fire(pending)
    }

    pub fn into_index(self) -> PathIndex {
        self.index
    }

    fn fire(&mut self, ready: Vec<RawFsEvent>) -> Vec<PipelineEvent> {
        let mut out = Vec::new();
        for event in ready {
            if !event.path.is_file() {
                trace!(path = %event.path.display(), "debounced path vanished before firing");
                continue;
            }
            self.stats.updates_applied += 1;
            let result = self.index_document(&event.path);
            out.extend(self.finish(event.path, result));
        }
        out
    }

    fn index_document(&mut self, path: &Path) -> IndexResult<Vec<PipelineEvent>> {
        let outcome = ensure_identifier(&self.workspace, &mut self.index, path)?;
        self.index.save_if_dirty()?;
        Ok(vec![PipelineEvent::Indexed { path: self.workspace.relative(path)?, outcome }])
    }

    fn schedule(&mut self, path: &Path, created: bool, now: Instant) {
        if created && path.is_dir() {
            if self.workspace.is_excluded(path) {
                return;
            }
            for file in self.workspace.markdown_files(path) {
                self.debouncer.push_at(RawFsEvent::new(FsEventKind::Create, file), now);
            }
            return;
        }
        if !self.workspace.accepts(path) {
            trace!(path = %path.display(), "ignoring event for unmanaged path");
            return;
        }
        let kind = if created { FsEventKind::Create } else { FsEventKind::Modify };
        self.debouncer.push_at(RawFsEvent::new(kind, path), now);
    }

    fn apply_remove(&mut self, path: &Path) -> IndexResult<Vec<PipelineEvent>> {
        self.debouncer.cancel_under(path);
        let relative = self.workspace.relative(path)?;
        let identifiers = if is_markdown(path) {
            self.index.remove_path(&relative)
        } else {
            self.index.remove_under(&relative)
        };
        if identifiers.is_empty() {
            return Ok(Vec::new());
        }

        self.index.save_if_dirty()?;
        self.stats.removals_applied += 1;
        info!(path = %relative, count = identifiers.len(), "removed deleted documents from index");
        Ok(vec![PipelineEvent::Removed { path: relative, identifiers }])
    }

    fn apply_rename(&mut self, from: &Path, to: &Path, now: Instant) -> IndexResult<Vec<PipelineEvent>> {
        self.debouncer.cancel_under(from);
        self.debouncer.cancel_under(to);

        if to.is_dir() {
            return self.apply_directory_move(from, to);
        }
        if !self.workspace.accepts(to) {
            debug!(from = %from.display(), to = %to.display(), "moved to unmanaged path");
            return self.apply_remove(from);
        }
        if !(is_markdown(from) && self.workspace.accepts(from)) {
            // A temp or scratch file replaced the document: an ordinary edit.
            self.debouncer.push_at(RawFsEvent::new(FsEventKind::Modify, to), now);
            return Ok(Vec::new());
        }

        let from_relative = self.workspace.relative(from)?;
        let to_relative = self.workspace.relative(to)?;
        let outcome = ensure_identifier(&self.workspace, &mut self.index, to)?;
        self.index.remove_path(&from_relative);
        self.index.save_if_dirty()?;
        self.stats.moves_applied += 1;

        info!(from = %from_relative, to = %to_relative, identifier = %outcome.identifier(), "document moved");
        Ok(vec![PipelineEvent::Moved {
            from: from_relative,
            to: to_relative,
            identifiers: vec![outcome.identifier().to_string()],
        }])
    }

    fn apply_directory_move(&mut self, from: &Path, to: &Path) -> IndexResult<Vec<PipelineEvent>> {
        let from_relative = self.workspace.relative(from)?;
        let to_relative = self.workspace.relative(to)?;
        self.index.remove_under(&from_relative);

        let mut events = Vec::new();
        let mut identifiers = Vec::new();
        if !self.workspace.is_excluded(to) {
            for file in self.workspace.markdown_files(to) {
                match ensure_identifier(&self.workspace, &mut self.index, &file) {
                    Ok(outcome) => identifiers.push(outcome.identifier().to_string()),
                    Err(error) => {
                        warn!(path = %file.display(), %error, "failed to re-index moved document");
                        self.stats.errors += 1;
                        events.push(PipelineEvent::Error { path: file, error: error.to_string() });
                    }
                }
            }
        }
        self.index.save_if_dirty()?;
        self.stats.moves_applied += 1;

        info!(from = %from_relative, to = %to_relative, documents = identifiers.len(), "directory moved");
        events.insert(0, PipelineEvent::Moved { from: from_relative, to: to_relative, identifiers });
        Ok(events)
    }

    fn finish(&mut self, path: PathBuf, result: IndexResult<Vec<PipelineEvent>>) -> Vec<PipelineEvent> {
        match result {
            Ok(events) => events,
            Err(error) => {
                warn!(path = %path.display(), %error, "pipeline error");
                self.stats.errors += 1;
                vec![PipelineEvent::Error { path, error: error.to_string() }]
            }
        }
    }
}

/// Runs the watch pipeline as an async loop.
///
/// Consumes raw FS events, debounces edits, and applies them to the index.
/// Emits `PipelineEvent`s to `event_tx` when a consumer is attached.
///
/// Exits when `raw_rx` closes or `shutdown` fires; still-pending edits are
/// flushed first. Returns the session so callers can inspect final state.
pub async fn run_pipeline(
    mut raw_rx: mpsc::Receiver<RawFsEvent>,
    mut event_tx: Option<mpsc::Sender<PipelineEvent>>,
    workspace: Workspace,
    index: PathIndex,
    config: PipelineConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> WatchSession {
    let mut session = WatchSession::new(workspace, index, config.debounce);

    info!(root = %session.workspace().root().display(), "watcher pipeline started");

    loop {
        let handled = tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!("watcher pipeline shutting down");
                break;
            }

            maybe_event = raw_rx.recv() => {
                match maybe_event {
                    Some(event) => session.handle_event(event),
                    None => {
                        info!("raw event channel closed, pipeline exiting");
                        break;
                    }
                }
            }

            _ = tokio::time::sleep(config.poll_interval) => Vec::new(),
        };

        emit(&mut event_tx, handled).await;
        let ready = session.flush_ready();
        emit(&mut event_tx, ready).await;
    }

    let remaining = session.flush_all();
    emit(&mut event_tx, remaining).await;
    if let Err(error) = session.index.save_if_dirty() {
        warn!(%error, "failed to save index on shutdown");
    }

    let stats = session.stats();
    info!(
        events = stats.events_received,
        updates = stats.updates_applied,
        moves = stats.moves_applied,
        removals = stats.removals_applied,
        errors = stats.errors,
        "watcher pipeline stopped"
    );
    session
}

async fn emit(event_tx: &mut Option<mpsc::Sender<PipelineEvent>>, events: Vec<PipelineEvent>) {
    for event in events {
        let Some(tx) = event_tx.as_ref() else {
            return;
        };
        if tx.send(event).await.is_err() {
            debug!("pipeline event channel closed, continuing without consumer");
            *event_tx = None;
        }
    }
}
