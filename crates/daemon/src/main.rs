// folio-watch: keep a workspace's identifier index current as files change.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{error, info};

use folio_daemon::config::GlobalConfig;
use folio_daemon::logging::{self, LogOptions};
use folio_daemon::reconcile::{verify_index, ReconcileReport};
use folio_daemon::runtime::{run_standalone, WatchOptions};
use folio_daemon::startup::{self, DaemonPaths, DaemonStatus, StopOutcome, STOP_TIMEOUT};
use folio_daemon::watcher::debounce::DebounceConfig;
use folio_daemon::workspace::Workspace;

#[derive(Debug, Parser)]
#[command(name = "folio-watch", version, about = "Watch a Markdown workspace and keep its identifier index current")]
struct Args {
    /// Workspace root (defaults to $FOLIO_WORKSPACE).
    #[arg(short, long, value_name = "PATH")]
    workspace: Option<PathBuf>,

    /// Run in the background.
    #[arg(short, long)]
    daemon: bool,

    /// Stop the background watcher.
    #[arg(long, conflicts_with_all = ["status", "daemon"])]
    stop: bool,

    /// Show whether a watcher is running.
    #[arg(long, conflicts_with = "daemon")]
    status: bool,

    /// Quiet period before a changed document is re-indexed.
    #[arg(long, value_name = "SECONDS")]
    debounce_delay: Option<f64>,

    /// Reconcile the index with the workspace tree, then exit.
    #[arg(long)]
    verify_index: bool,

    /// Delete log files past retention, then exit.
    #[arg(long)]
    clean_logs: bool,

    /// Days of log files to keep.
    #[arg(long, value_name = "DAYS")]
    log_retention: Option<u32>,

    /// Log to the console only (foreground runs; a background watcher
    /// always keeps its log file).
    #[arg(long, conflicts_with_all = ["daemon", "detached"])]
    no_log_file: bool,

    #[arg(long = "detached", hide = true)]
    detached: bool,
}

impl Args {
    /// True when this invocation ends up running the watch loop in-process.
    fn runs_watcher(&self) -> bool {
        !(self.stop || self.status || self.clean_logs || self.verify_index || (self.daemon && !self.detached))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "folio-watch failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = GlobalConfig::load();
    let paths = DaemonPaths::resolve()?;
    let log_to_file = args.runs_watcher() && (args.detached || (config.logs.log_to_file && !args.no_log_file));

    let _log_guard = logging::init(&LogOptions {
        logs_dir: log_to_file.then(|| paths.logs_dir.clone()),
        console: !args.detached,
        default_filter: if args.runs_watcher() || args.verify_index { "info" } else { "warn" }.to_string(),
    })?;

    if args.stop {
        return stop(&paths);
    }
    if args.status {
        return status(&paths);
    }

    let workspace = Workspace::resolve(args.workspace.as_deref())?;
    let retention_days = args.log_retention.unwrap_or(config.logs.retention_days);

    if args.clean_logs {
        let stats = logging::prune_logs(&paths.logs_dir, retention_days, Local::now().date_naive())
            .with_context(|| format!("failed to clean {}", paths.logs_dir.display()))?;
        println!(
            "deleted {} log file(s), freed {:.1} KB (retention {retention_days} days, {})",
            stats.deleted,
            stats.freed_bytes as f64 / 1024.0,
            paths.logs_dir.display()
        );
        return Ok(());
    }

    if args.verify_index {
        let (_, report) = verify_index(&workspace, config.watch.rebuild_on_corrupt_index)?;
        print_report(&report);
        return Ok(());
    }

    if let DaemonStatus::Running(record) = startup::daemon_status(&paths.pid_path)? {
        bail!("watcher already running (PID {}); stop it first with --stop", record.pid);
    }

    if args.daemon && !args.detached {
        let pid = startup::spawn_detached(&forwarded_args(&args, &workspace))?;
        println!("watcher started in background (PID {pid})");
        println!("logs: {}", paths.logs_dir.display());
        return Ok(());
    }

    paths.ensure_dirs()?;
    if log_to_file {
        logging::prune_logs(&paths.logs_dir, retention_days, Local::now().date_naive())
            .with_context(|| format!("failed to prune {}", paths.logs_dir.display()))?;
    }

    let mut options = WatchOptions::from_config(&config.watch);
    if let Some(secs) = args.debounce_delay {
        options.debounce = DebounceConfig::from_secs_f64(secs);
    }
    info!(
        root = %workspace.root().display(),
        debounce_ms = options.debounce.window.as_millis() as u64,
        retention_days,
        log_to_file,
        "starting watcher"
    );
    run_standalone(workspace, options, &paths).await
}

fn stop(paths: &DaemonPaths) -> Result<()> {
    match startup::stop_daemon(&paths.pid_path, STOP_TIMEOUT)? {
        StopOutcome::Stopped(record) => println!("stopped watcher (PID {})", record.pid),
        StopOutcome::NotRunning => println!("watcher is not running"),
    }
    Ok(())
}

fn status(paths: &DaemonPaths) -> Result<()> {
    match startup::daemon_status(&paths.pid_path)? {
        DaemonStatus::Running(record) => {
            println!("watcher running (PID {})", record.pid);
            println!("workspace: {}", record.workspace.display());
        }
        DaemonStatus::Stale(record) => println!("watcher not running (removed stale PID file for {})", record.pid),
        DaemonStatus::Stopped => println!("watcher not running"),
    }
    Ok(())
}

/// Arguments for the detached child: everything that shapes the run, with
/// the workspace made explicit.
fn forwarded_args(args: &Args, workspace: &Workspace) -> Vec<OsString> {
    let mut forwarded: Vec<OsString> = vec!["--workspace".into(), workspace.root().as_os_str().to_owned()];
    if let Some(secs) = args.debounce_delay {
        forwarded.extend(["--debounce-delay".into(), secs.to_string().into()]);
    }
    if let Some(days) = args.log_retention {
        forwarded.extend(["--log-retention".into(), days.to_string().into()]);
    }
    forwarded
}

fn print_report(report: &ReconcileReport) {
    println!("verified: {}", report.verified);
    println!("repaired: {}", report.repaired);
    println!("removed:  {}", report.removed);
    println!("added:    {}", report.added);
    if report.rebuilt {
        println!("index was corrupt and has been rebuilt");
    }
    for dup in &report.duplicates {
        println!("duplicate {}: kept {}, skipped {}", dup.identifier, dup.kept, dup.duplicate);
    }
    for failure in &report.failures {
        println!("failed {}: {}", failure.path, failure.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn stop_conflicts_with_daemon() {
        assert!(Args::try_parse_from(["folio-watch", "--stop", "-d"]).is_err());
    }

    #[test]
    fn background_watcher_cannot_drop_its_log_file() {
        assert!(Args::try_parse_from(["folio-watch", "-d", "--no-log-file"]).is_err());
        assert!(Args::try_parse_from(["folio-watch", "--detached", "--no-log-file"]).is_err());
        assert!(Args::try_parse_from(["folio-watch", "--no-log-file"]).is_ok());
    }

    #[test]
    fn only_watch_runs_start_the_loop() {
        let parse = |argv: &[&str]| Args::try_parse_from(argv).unwrap();
        assert!(parse(&["folio-watch", "-w", "/ws"]).runs_watcher());
        assert!(parse(&["folio-watch", "-d", "--detached"]).runs_watcher());
        assert!(!parse(&["folio-watch", "-d"]).runs_watcher());
        assert!(!parse(&["folio-watch", "--verify-index"]).runs_watcher());
        assert!(!parse(&["folio-watch", "--clean-logs", "--log-retention", "7"]).runs_watcher());
    }
}
