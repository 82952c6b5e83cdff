// folio-daemon library: indexing, reconciliation and the workspace watcher.

pub mod assets;
pub mod config;
pub mod error;
pub mod indexer;
pub mod logging;
pub mod reconcile;
pub mod runtime;
pub mod startup;
pub mod store;
pub mod watcher;
pub mod workspace;
