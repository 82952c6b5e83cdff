// Watcher runtime: subscribe, verify the index, then run the pipeline until
// shutdown.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::config::WatchConfig;
use crate::error::IndexError;
use crate::reconcile::verify_index;
use crate::startup::{DaemonPaths, PidFileGuard};
use crate::store::index::PathIndex;
use crate::watcher::debounce::DebounceConfig;
use crate::watcher::pipeline::{run_pipeline, PipelineConfig, PipelineEvent, WatchSession};
use crate::watcher::{EventSource, NotifySource};
use crate::workspace::Workspace;

/// Runtime knobs, resolved from config and command-line flags.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub debounce: DebounceConfig,
    pub poll_interval: Duration,
    pub verify_on_startup: bool,
    pub rebuild_on_corrupt_index: bool,
}

impl WatchOptions {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            debounce: DebounceConfig::from_secs_f64(config.debounce_delay_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            verify_on_startup: config.verify_on_startup,
            rebuild_on_corrupt_index: config.rebuild_on_corrupt_index,
        }
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from_config(&WatchConfig::default())
    }
}

/// Watch `workspace` until `shutdown` fires or `source` closes.
///
/// The source is subscribed before the startup pass so that changes made
/// during reconciliation queue up instead of being lost.
pub async fn run_watcher<S: EventSource>(
    workspace: Workspace,
    options: WatchOptions,
    source: &mut S,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    shutdown: broadcast::Receiver<()>,
) -> Result<WatchSession> {
    let raw_rx = source.subscribe(workspace.root()).context("failed to start filesystem watcher")?;
    let index = startup_index(&workspace, &options)?;

    let config = PipelineConfig { debounce: options.debounce, poll_interval: options.poll_interval };
    Ok(run_pipeline(raw_rx, event_tx, workspace, index, config, shutdown).await)
}

fn startup_index(workspace: &Workspace, options: &WatchOptions) -> Result<PathIndex> {
    if options.verify_on_startup {
        let (index, report) = verify_index(workspace, options.rebuild_on_corrupt_index)
            .context("startup verification failed")?;
        if !report.duplicates.is_empty() {
            warn!(count = report.duplicates.len(), "workspace contains duplicate identifiers");
        }
        return Ok(index);
    }

    match PathIndex::load(workspace.index_path()) {
        Ok(index) => Ok(index),
        Err(error @ IndexError::CorruptIndex { .. }) if options.rebuild_on_corrupt_index => {
            warn!(%error, "index is corrupt, starting from an empty index");
            Ok(PathIndex::empty(workspace.index_path()))
        }
        Err(error) => Err(error).context("failed to load index"),
    }
}

/// Foreground/daemon entry point: PID file, OS notifications, signal
/// handling.
pub async fn run_standalone(workspace: Workspace, options: WatchOptions, paths: &DaemonPaths) -> Result<()> {
    let _pid_guard = PidFileGuard::acquire(&paths.pid_path, workspace.root())?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(());
    });

    info!(root = %workspace.root().display(), pid = std::process::id(), "watcher started");
    let mut source = NotifySource::new();
    let session = run_watcher(workspace, options, &mut source, None, shutdown_rx).await?;
    info!(documents = session.index().len(), "watcher stopped");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received Ctrl-C"),
                    _ = term.recv() => info!("received SIGTERM"),
                }
            }
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl-C");
    }
}
