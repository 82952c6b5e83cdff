// Process lifecycle: PID file, liveness probes, stop/status, detaching.

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config;

/// PID file: ~/.folio/watch.pid
const PID_FILE_NAME: &str = "watch.pid";
/// Log directory: ~/.folio/logs/
const LOGS_DIR_NAME: &str = "logs";

/// How long `stop_daemon` waits for the process to exit.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Hidden flag the detached child is launched with.
pub const DETACHED_FLAG: &str = "--detached";

/// Resolved paths for watcher runtime files.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub base_dir: PathBuf,
    pub pid_path: PathBuf,
    pub logs_dir: PathBuf,
}

impl DaemonPaths {
    /// Resolve paths under `$FOLIO_HOME` or `~/.folio/`.
    pub fn resolve() -> Result<Self> {
        let base = config::global_dir().context("could not determine home directory")?;
        Ok(Self::under(base))
    }

    pub fn under(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            pid_path: base_dir.join(PID_FILE_NAME),
            logs_dir: base_dir.join(LOGS_DIR_NAME),
            base_dir,
        }
    }

    /// Create the state and log directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.logs_dir)
            .with_context(|| format!("failed to create {}", self.logs_dir.display()))
    }
}

// ── PID file ───────────────────────────────────────────────────────

/// Contents of the PID file: the watcher's PID and the workspace it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidRecord {
    pub pid: u32,
    pub workspace: PathBuf,
}

impl PidRecord {
    pub fn current(workspace: &Path) -> Self {
        Self { pid: std::process::id(), workspace: workspace.to_path_buf() }
    }

    fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines().map(str::trim).filter(|line| !line.is_empty());
        let pid_str = lines.next().context("PID file is empty")?;
        let pid = pid_str.parse::<u32>().with_context(|| format!("invalid PID in PID file: {pid_str}"))?;
        let workspace = lines.next().map(PathBuf::from).unwrap_or_default();
        Ok(Self { pid, workspace })
    }
}

/// Write `record` to `path` (first line PID, second line workspace root).
pub fn write_pid_file(path: &Path, record: &PidRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let contents = format!("{}\n{}\n", record.pid, record.workspace.display());
    fs::write(path, contents).context("failed to write PID file")?;
    info!(pid = record.pid, path = %path.display(), "wrote PID file");
    Ok(())
}

/// Read the PID file. A missing file is `Ok(None)`.
pub fn read_pid_file(path: &Path) -> Result<Option<PidRecord>> {
    match fs::read_to_string(path) {
        Ok(raw) => PidRecord::parse(&raw).map(Some),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Remove the PID file on shutdown.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, "failed to remove PID file");
        }
    }
}

/// Removes the PID file when dropped, but only if it still names this
/// process.
pub struct PidFileGuard {
    path: PathBuf,
    pid: u32,
}

impl PidFileGuard {
    pub fn acquire(path: &Path, workspace: &Path) -> Result<Self> {
        let record = PidRecord::current(workspace);
        write_pid_file(path, &record)?;
        Ok(Self { path: path.to_path_buf(), pid: record.pid })
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        match read_pid_file(&self.path) {
            Ok(Some(record)) if record.pid == self.pid => remove_pid_file(&self.path),
            Ok(_) => debug!(path = %self.path.display(), "PID file no longer ours, leaving it"),
            Err(error) => warn!(%error, "failed to inspect PID file on shutdown"),
        }
    }
}

// ── Process control ────────────────────────────────────────────────

/// Probe a process with `kill -0`.
pub fn process_alive(pid: u32) -> bool {
    if cfg!(windows) {
        return false;
    }
    Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Send SIGTERM with `kill -TERM`.
pub fn send_terminate(pid: u32) -> Result<()> {
    let status = Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .stderr(Stdio::null())
        .status()
        .context("failed to send SIGTERM with `kill -TERM`")?;
    if !status.success() && process_alive(pid) {
        bail!("`kill -TERM {pid}` failed and process is still alive");
    }
    Ok(())
}

/// What the PID file says about the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonStatus {
    Running(PidRecord),
    /// The PID file named a dead process; it has been removed.
    Stale(PidRecord),
    Stopped,
}

pub fn daemon_status(pid_path: &Path) -> Result<DaemonStatus> {
    let Some(record) = read_pid_file(pid_path)? else {
        return Ok(DaemonStatus::Stopped);
    };
    if process_alive(record.pid) {
        return Ok(DaemonStatus::Running(record));
    }
    info!(pid = record.pid, "removing stale PID file");
    remove_pid_file(pid_path);
    Ok(DaemonStatus::Stale(record))
}

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped(PidRecord),
    NotRunning,
}

/// Send SIGTERM to the recorded watcher and wait for it to exit.
pub fn stop_daemon(pid_path: &Path, timeout: Duration) -> Result<StopOutcome> {
    let record = match daemon_status(pid_path)? {
        DaemonStatus::Running(record) => record,
        DaemonStatus::Stale(_) | DaemonStatus::Stopped => return Ok(StopOutcome::NotRunning),
    };

    info!(pid = record.pid, "stopping watcher");
    send_terminate(record.pid)?;

    let started = Instant::now();
    while process_alive(record.pid) {
        if started.elapsed() >= timeout {
            bail!("watcher (PID {}) did not exit within {}s", record.pid, timeout.as_secs());
        }
        std::thread::sleep(STOP_POLL_INTERVAL);
    }
    remove_pid_file(pid_path);
    Ok(StopOutcome::Stopped(record))
}

/// Re-launch the current executable in the background with `args` plus
/// the hidden detached flag. Returns the child PID.
#[cfg(unix)]
pub fn spawn_detached(args: &[OsString]) -> Result<u32> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().context("failed to locate current executable")?;
    let child = Command::new(exe)
        .args(args)
        .arg(DETACHED_FLAG)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .context("failed to spawn detached watcher")?;
    info!(pid = child.id(), "watcher detached");
    Ok(child.id())
}

#[cfg(not(unix))]
pub fn spawn_detached(_args: &[OsString]) -> Result<u32> {
    bail!("daemon mode is only supported on Unix")
}
