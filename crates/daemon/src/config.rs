// Configuration files.
//
// Global config: `~/.folio/config.toml` (or `$FOLIO_HOME/config.toml`)
// Workspace config: `<workspace>/.index/workspace.toml`

use serde::Deserialize;
use std::path::{Path, PathBuf};

use folio_common::header::HeaderKeys;
use tracing::warn;

/// Environment variable overriding the per-user state directory.
pub const HOME_ENV: &str = "FOLIO_HOME";

/// Directory inside a workspace holding the index and workspace config.
pub const INDEX_DIR: &str = ".index";

/// Root directory for per-user state: `$FOLIO_HOME` or `~/.folio/`.
pub fn global_dir() -> Option<PathBuf> {
    match std::env::var_os(HOME_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::home_dir().map(|h| h.join(".folio")),
    }
}

/// Path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Path to the workspace config file: `<root>/.index/workspace.toml`.
pub fn workspace_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(INDEX_DIR).join("workspace.toml")
}

// ── Global config ──────────────────────────────────────────────────

/// Per-user watcher configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GlobalConfig {
    pub watch: WatchConfig,
    pub logs: LogsConfig,
}

impl GlobalConfig {
    /// Load from the global config path. Returns defaults if the file
    /// doesn't exist; logs and falls back to defaults if it can't be parsed.
    pub fn load() -> Self {
        global_config_path().map(|p| load_or_default(&p, Self::load_from)).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period after the last change before a document is re-indexed.
    pub debounce_delay_secs: f64,
    /// Run a reconciliation pass before watching.
    pub verify_on_startup: bool,
    /// Start from an empty index when the index file cannot be parsed.
    pub rebuild_on_corrupt_index: bool,
    /// How often the watch loop checks for expired debounce deadlines.
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_delay_secs: 1.0,
            verify_on_startup: true,
            rebuild_on_corrupt_index: true,
            poll_interval_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogsConfig {
    /// Log files older than this many days are deleted.
    pub retention_days: u32,
    /// Write logs to the rotating file in addition to the console.
    pub log_to_file: bool,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self { retention_days: 30, log_to_file: true }
    }
}

// ── Workspace config ───────────────────────────────────────────────

/// Per-workspace configuration at `<root>/.index/workspace.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub filter: FilterConfig,
    pub header: HeaderConfig,
}

impl WorkspaceConfig {
    /// Load from `<root>/.index/workspace.toml`. Returns defaults if the
    /// file doesn't exist.
    pub fn load(workspace_root: &Path) -> Self {
        load_or_default(&workspace_config_path(workspace_root), Self::load_from)
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }
}

/// Which files the indexer and watcher consider.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    /// Directory names pruned anywhere in the tree.
    pub exclude_dirs: Vec<String>,
    /// File names starting with any of these are skipped (editor scratch files).
    pub ignore_prefixes: Vec<String>,
    /// File names ending with any of these are skipped (backup files).
    pub ignore_suffixes: Vec<String>,
    /// File names containing any of these are skipped (sync conflict copies).
    pub ignore_substrings: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            exclude_dirs: strings(&[
                ".git",
                ".svn",
                ".hg",
                "node_modules",
                INDEX_DIR,
                ".assets",
                ".obsidian",
                ".trash",
            ]),
            ignore_prefixes: strings(&["Untitled"]),
            ignore_suffixes: strings(&["~.md"]),
            ignore_substrings: strings(&["冲突文件", "conflicted copy"]),
        }
    }
}

/// Header keys and asset layout.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeaderConfig {
    pub identifier_key: String,
    pub root_marker_key: String,
    pub asset_target_key: String,
    /// Asset directory name at the workspace root.
    pub assets_dir: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        let keys = HeaderKeys::default();
        Self {
            identifier_key: keys.identifier,
            root_marker_key: keys.root_marker,
            asset_target_key: keys.asset_target,
            assets_dir: ".assets".into(),
        }
    }
}

impl HeaderConfig {
    pub fn keys(&self) -> HeaderKeys {
        HeaderKeys {
            identifier: self.identifier_key.clone(),
            root_marker: self.root_marker_key.clone(),
            asset_target: self.asset_target_key.clone(),
        }
    }
}

fn load_or_default<T: Default>(path: &Path, load: impl FnOnce(&Path) -> Result<T, ConfigError>) -> T {
    match load(path) {
        Ok(config) => config,
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring unusable config file");
            T::default()
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
