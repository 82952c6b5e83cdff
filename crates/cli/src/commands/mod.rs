// CLI subcommand dispatch.

use std::path::Path;

use clap::Subcommand;
use folio_daemon::workspace::Workspace;

use crate::exit_code::{ExitCode, UsageError};
use crate::output::{self, OutputFormat};

pub mod index;
pub mod migrate_assets;

#[derive(Subcommand)]
pub enum Command {
    /// Give documents identifiers and record them in the workspace index
    Index(index::IndexArgs),
    /// Move images out of legacy per-document asset folders
    MigrateAssets(migrate_assets::MigrateAssetsArgs),
}

impl Command {
    fn json(&self) -> bool {
        match self {
            Command::Index(args) => args.json,
            Command::MigrateAssets(args) => args.json,
        }
    }
}

pub fn run(cmd: Command) -> ExitCode {
    let format = OutputFormat::detect(cmd.json());
    let result = match cmd {
        Command::Index(args) => index::run(args),
        Command::MigrateAssets(args) => migrate_assets::run(args),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            output::print_anyhow_error(format, &err);
            ExitCode::from_error(&err)
        }
    }
}

/// Resolve the workspace from `--workspace` or the environment. Any failure
/// here is the caller's to fix, so it surfaces as a usage error.
pub(crate) fn resolve_workspace(explicit: Option<&Path>) -> anyhow::Result<Workspace> {
    Workspace::resolve(explicit).map_err(|err| anyhow::Error::new(UsageError(format!("{err:#}"))))
}
