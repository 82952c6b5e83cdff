// The workspace identifier index: `identifier -> /relative/path.md`, stored
// as one pretty-printed JSON object at `<root>/.index/path_index.json`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use folio_common::path::{is_under, normalize_index_path};
use tracing::{debug, warn};

use super::atomic::write_atomic;
use crate::error::{IndexError, IndexResult};

/// In-memory copy of the index file. Loaded whole, saved whole.
#[derive(Debug, Clone)]
pub struct PathIndex {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl PathIndex {
    /// An empty index that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), entries: BTreeMap::new(), dirty: false }
    }

    /// Load the index at `path`.
    ///
    /// A missing (or blank) file is an empty index. Content that is not a
    /// JSON object of strings is [`IndexError::CorruptIndex`]. Stored paths
    /// are normalized; entries with unusable paths are dropped.
    pub fn load(path: impl Into<PathBuf>) -> IndexResult<Self> {
        let path = path.into();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::empty(path)),
            Err(e) => return Err(IndexError::unreadable(path, e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::empty(path));
        }

        let raw: BTreeMap<String, String> = serde_json::from_slice(&bytes)
            .map_err(|source| IndexError::CorruptIndex { path: path.clone(), source })?;

        let mut index = Self::empty(path);
        for (id, stored) in raw {
            match normalize_index_path(&stored) {
                Ok(normalized) => {
                    index.dirty |= normalized != stored;
                    index.entries.insert(id, normalized);
                }
                Err(error) => {
                    warn!(identifier = %id, path = %stored, %error, "dropping index entry with unusable path");
                    index.dirty = true;
                }
            }
        }
        debug!(path = %index.path.display(), entries = index.entries.len(), "loaded index");
        Ok(index)
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert or update an entry. Returns true when the index changed.
    pub fn upsert(&mut self, id: &str, relative: &str) -> bool {
        if self.get(id) == Some(relative) {
            return false;
        }
        self.entries.insert(id.to_string(), relative.to_string());
        self.dirty = true;
        true
    }

    /// Remove an entry, returning the path it pointed at.
    pub fn remove(&mut self, id: &str) -> Option<String> {
        let removed = self.entries.remove(id);
        self.dirty |= removed.is_some();
        removed
    }

    /// Identifiers currently mapped to `relative`.
    pub fn identifiers_for_path(&self, relative: &str) -> Vec<String> {
        self.entries.iter().filter(|(_, p)| p.as_str() == relative).map(|(id, _)| id.clone()).collect()
    }

    /// Drop every entry pointing at `relative`. Returns the removed identifiers.
    pub fn remove_path(&mut self, relative: &str) -> Vec<String> {
        self.remove_matching(|p| p == relative)
    }

    /// Drop every entry at or below the directory `dir`.
    pub fn remove_under(&mut self, dir: &str) -> Vec<String> {
        self.remove_matching(|p| is_under(p, dir))
    }

    fn remove_matching(&mut self, matches: impl Fn(&str) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|id, path| {
            if matches(path) {
                removed.push(id.clone());
                false
            } else {
                true
            }
        });
        self.dirty |= !removed.is_empty();
        removed
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(id, path)| (id.as_str(), path.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Serialize the whole mapping and atomically replace the file.
    pub fn save(&mut self) -> IndexResult<()> {
        let mut json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| IndexError::write_failed(&self.path, io::Error::other(e)))?;
        json.push('\n');
        write_atomic(&self.path, json.as_bytes())?;
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "saved index");
        Ok(())
    }

    /// Save only when something changed since the last load or save.
    pub fn save_if_dirty(&mut self) -> IndexResult<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }
}
