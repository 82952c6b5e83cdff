// `folio index`: assign identifiers and update the path index.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use folio_daemon::indexer::{index_paths, BatchReport, IndexOutcome};
use folio_daemon::store::index::PathIndex;
use tracing::info;

use super::resolve_workspace;
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Files or directories to index (defaults to the whole workspace).
    #[arg(value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Workspace root (defaults to $FOLIO_WORKSPACE).
    #[arg(short, long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: IndexArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let ws = resolve_workspace(args.workspace.as_deref())?;

    let mut index = PathIndex::load(ws.index_path())
        .with_context(|| format!("failed to load index for {}", ws.root().display()))?;

    let targets = if args.paths.is_empty() {
        vec![ws.root().to_path_buf()]
    } else {
        args.paths.iter().map(|p| absolutize(p)).collect::<anyhow::Result<Vec<_>>>()?
    };

    let report = index_paths(&ws, &mut index, &targets);
    if index.is_dirty() || !index.file_path().exists() {
        index.save().with_context(|| format!("failed to write {}", index.file_path().display()))?;
    }
    info!(
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        failed = report.failures.len(),
        "index run finished"
    );

    output::print_output(format, &report, format_human)?;
    output::print_failures(format, &report.failures);
    Ok(ExitCode::for_failures(report.failures.len()))
}

fn absolutize(path: &std::path::Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(cwd.join(path))
}

fn format_human(report: &BatchReport) -> String {
    let mut lines = Vec::new();
    for doc in &report.documents {
        let verb = match &doc.outcome {
            IndexOutcome::Created(_) => "created",
            IndexOutcome::Updated(_) => "updated",
            IndexOutcome::Unchanged(_) => continue,
        };
        lines.push(format!("  {verb:<8} {}  {}", doc.outcome.identifier(), doc.path));
    }
    lines.push(format!(
        "{} created, {} updated, {} unchanged, {} failed",
        report.created,
        report.updated,
        report.unchanged,
        report.failures.len()
    ));
    lines.join("\n")
}
