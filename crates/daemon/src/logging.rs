// Tracing setup for the watcher: env filter, optional console layer and a
// daily-rolling log file, plus retention pruning for old log files.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// File name prefix; the appender adds `.YYYY-MM-DD`.
pub const LOG_FILE_PREFIX: &str = "watch.log";

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Write daily-rolling files here when set.
    pub logs_dir: Option<PathBuf>,
    /// Also log to stderr.
    pub console: bool,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { logs_dir: None, console: true, default_filter: "info".to_string() }
    }
}

/// Keeps the non-blocking file writer flushing until dropped.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init(options: &LogOptions) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.default_filter))
        .context("invalid log filter")?;

    let console = options.console.then(|| fmt::layer().with_writer(io::stderr));

    let (file, guard) = match &options.logs_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, LOG_FILE_PREFIX));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(LogGuard { _file: guard })
}

// ── Retention ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub deleted: usize,
    pub freed_bytes: u64,
}

/// Date suffix of a rolled log file name, if it is one of ours.
fn log_file_date(name: &str) -> Option<NaiveDate> {
    let suffix = name.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    NaiveDate::parse_from_str(suffix, "%Y-%m-%d").ok()
}

/// Delete log files dated more than `retention_days` before `today`.
/// A missing directory is not an error.
pub fn prune_logs(dir: &Path, retention_days: u32, today: NaiveDate) -> io::Result<PruneStats> {
    let mut stats = PruneStats::default();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(stats),
        Err(err) => return Err(err),
    };
    let cutoff = today.checked_sub_days(Days::new(u64::from(retention_days))).unwrap_or(NaiveDate::MIN);

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(date) = log_file_date(&name.to_string_lossy()) else {
            continue;
        };
        if date >= cutoff {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(file = %name.to_string_lossy(), "deleted old log file");
                stats.deleted += 1;
                stats.freed_bytes += size;
            }
            Err(error) => warn!(file = %name.to_string_lossy(), %error, "failed to delete old log file"),
        }
    }

    if stats.deleted > 0 {
        info!(deleted = stats.deleted, freed_bytes = stats.freed_bytes, "pruned old log files");
    }
    Ok(stats)
}
