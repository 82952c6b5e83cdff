// `folio migrate-assets`: move legacy per-document images under the
// identifier-bucketed assets directory.

use std::path::PathBuf;

use clap::Args;
use folio_daemon::assets::{migrate_assets, MigrationReport};

use super::resolve_workspace;
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct MigrateAssetsArgs {
    /// Workspace root (defaults to $FOLIO_WORKSPACE).
    #[arg(short, long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    /// Report what would move without touching any file.
    #[arg(long)]
    pub dry_run: bool,

    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: MigrateAssetsArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let ws = resolve_workspace(args.workspace.as_deref())?;

    let report = migrate_assets(&ws, args.dry_run);
    output::print_output(format, &report, format_human)?;
    output::print_failures(format, &report.failures);
    Ok(ExitCode::for_failures(report.failures.len()))
}

fn format_human(report: &MigrationReport) -> String {
    let verb = if report.dry_run { "would move" } else { "moved" };
    let mut lines = Vec::new();
    for doc in &report.documents {
        lines.push(format!("{}: {} image(s), {} link(s)", doc.path, doc.moved.len(), doc.links_rewritten));
        for asset in &doc.moved {
            lines.push(format!("  {verb} {} -> {}", asset.from.display(), asset.to.display()));
        }
    }
    lines.push(format!(
        "{verb} {} image(s) across {} document(s); {} skipped, {} failed",
        report.images_moved(),
        report.documents.len(),
        report.skipped,
        report.failures.len()
    ));
    lines.join("\n")
}
