// folio-common: pure helpers shared by the indexer, the watcher and the CLI.

pub mod header;
pub mod identifier;
pub mod path;
