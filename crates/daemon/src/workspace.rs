// Workspace handle: canonical root, loaded configuration, path mapping and
// the deterministic Markdown walk shared by indexing and reconciliation.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use folio_common::header::HeaderKeys;
use folio_common::path::{self as fpath, workspace_relative};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::{WorkspaceConfig, INDEX_DIR};
use crate::error::{IndexError, IndexResult};

/// Environment variable naming the workspace when `--workspace` is absent.
pub const WORKSPACE_ENV: &str = "FOLIO_WORKSPACE";

/// File name of the identifier index inside [`INDEX_DIR`].
pub const INDEX_FILE: &str = "path_index.json";

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    config: WorkspaceConfig,
    keys: HeaderKeys,
}

impl Workspace {
    /// Open the workspace rooted at `root`, loading its config file.
    pub fn open(root: &Path) -> Result<Self> {
        let root = canonical_dir(root)?;
        let config = WorkspaceConfig::load(&root);
        Ok(Self::from_parts(root, config))
    }

    /// Open with an explicit config instead of reading the workspace file.
    pub fn with_config(root: &Path, config: WorkspaceConfig) -> Result<Self> {
        Ok(Self::from_parts(canonical_dir(root)?, config))
    }

    /// Resolve the workspace from a command-line value, falling back to
    /// `$FOLIO_WORKSPACE`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(root) = explicit {
            return Self::open(root);
        }
        match std::env::var_os(WORKSPACE_ENV) {
            Some(root) if !root.is_empty() => Self::open(Path::new(&root))
                .with_context(|| format!("invalid {WORKSPACE_ENV}")),
            _ => bail!("no workspace given: pass --workspace or set {WORKSPACE_ENV}"),
        }
    }

    fn from_parts(root: PathBuf, config: WorkspaceConfig) -> Self {
        let keys = config.header.keys();
        Self { root, config, keys }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn keys(&self) -> &HeaderKeys {
        &self.keys
    }

    pub fn assets_dir(&self) -> &str {
        &self.config.header.assets_dir
    }

    /// `<root>/.index/path_index.json`
    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_DIR).join(INDEX_FILE)
    }

    /// Index form (`/notes/a.md`) of a path inside the workspace.
    ///
    /// Paths already below the canonical root are mapped lexically so that
    /// deleted files still resolve; anything else is canonicalized first
    /// (through its parent when the file itself is gone).
    pub fn relative(&self, path: &Path) -> IndexResult<String> {
        if path.is_absolute() && path.starts_with(&self.root) {
            return Ok(workspace_relative(&self.root, path)?);
        }
        let canonical = match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(source) => {
                let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
                    return Err(IndexError::unreadable(path, source));
                };
                let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
                parent.canonicalize().map_err(|e| IndexError::unreadable(path, e))?.join(name)
            }
        };
        Ok(workspace_relative(&self.root, &canonical)?)
    }

    /// Absolute path for an index value.
    pub fn absolute(&self, relative: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(relative.split('/').filter(|part| !part.is_empty()));
        path
    }

    /// True when any component below the root is an excluded directory name.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let rest = path.strip_prefix(&self.root).unwrap_or(path);
        rest.components().any(|component| match component {
            Component::Normal(part) => self.is_excluded_dir_name(&part.to_string_lossy()),
            _ => false,
        })
    }

    fn is_excluded_dir_name(&self, name: &str) -> bool {
        self.config.filter.exclude_dirs.iter().any(|dir| dir == name)
    }

    /// Editor scratch files, backups and sync-conflict copies.
    pub fn is_ignored_name(&self, name: &str) -> bool {
        let filter = &self.config.filter;
        filter.ignore_prefixes.iter().any(|p| name.starts_with(p.as_str()))
            || filter.ignore_suffixes.iter().any(|s| name.ends_with(s.as_str()))
            || filter.ignore_substrings.iter().any(|s| name.contains(s.as_str()))
    }

    /// Whether `path` is a Markdown document this workspace manages.
    pub fn accepts(&self, path: &Path) -> bool {
        fpath::is_markdown(path)
            && !self.is_excluded(path)
            && path.file_name().is_some_and(|name| !self.is_ignored_name(&name.to_string_lossy()))
    }

    /// Every managed Markdown file under `dir`, in lexicographic order by
    /// file name at every level. Excluded directories are pruned.
    pub fn markdown_files(&self, dir: &Path) -> Vec<PathBuf> {
        let walker = WalkDir::new(dir).sort_by_file_name().into_iter().filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !self.is_excluded_dir_name(&entry.file_name().to_string_lossy())
        });

        let mut files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() && self.accepts(entry.path()) => {
                    files.push(entry.into_path());
                }
                Ok(_) => {}
                Err(error) => warn!(%error, "skipping unreadable directory entry"),
            }
        }
        files
    }
}

fn canonical_dir(root: &Path) -> Result<PathBuf> {
    let root = root
        .canonicalize()
        .with_context(|| format!("workspace `{}` not found", root.display()))?;
    if !root.is_dir() {
        bail!("workspace `{}` is not a directory", root.display());
    }
    Ok(root)
}
