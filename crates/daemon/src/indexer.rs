// Front-matter manager: give each Markdown document a stable identifier,
// keep its root marker and asset target in step with its location, and
// record it in the index.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use folio_common::header::{self, IndexFields};
use folio_common::identifier;
use folio_common::path::{asset_target, is_markdown, root_marker};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{IndexError, IndexResult};
use crate::store::atomic::write_atomic;
use crate::store::index::PathIndex;
use crate::workspace::Workspace;

/// What [`ensure_identifier`] did to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "identifier", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// A new identifier was generated and written.
    Created(String),
    /// The identifier was kept; the header or the index entry changed.
    Updated(String),
    /// Header and index were already correct.
    Unchanged(String),
}

impl IndexOutcome {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Created(id) | Self::Updated(id) | Self::Unchanged(id) => id,
        }
    }
}

/// Make sure the document at `path` carries an identifier and correct
/// location fields, and that the index maps the identifier to it.
///
/// The file is only rewritten when its header actually changes, and the
/// rewrite is atomic. On error neither file nor index is modified.
pub fn ensure_identifier(
    ws: &Workspace,
    index: &mut PathIndex,
    path: &Path,
) -> IndexResult<IndexOutcome> {
    if !is_markdown(path) {
        return Err(IndexError::NotMarkdown(path.to_path_buf()));
    }
    let relative = ws.relative(path)?;
    let file = ws.absolute(&relative);
    let content = read_document(&file)?;

    let existing = header::read_identifier(&content, ws.keys())
        .map_err(|_| IndexError::MalformedHeader(file.clone()))?;
    let (id, created) = match existing {
        Some(id) => {
            check_duplicate(ws, index, &id, &relative)?;
            (id, false)
        }
        None => (identifier::generate_unique(|candidate| index.contains(candidate)), true),
    };

    let marker = root_marker(&relative);
    let fields = IndexFields {
        asset_target: asset_target(&marker, &id, ws.assets_dir()),
        root_marker: marker,
        identifier: id.clone(),
    };
    let rewritten = header::apply_fields(&content, ws.keys(), &fields)
        .map_err(|_| IndexError::MalformedHeader(file.clone()))?;
    if let Some(new_content) = &rewritten {
        write_atomic(&file, new_content.as_bytes())?;
    }

    let mut index_changed = index.upsert(&id, &relative);
    for stale in index.identifiers_for_path(&relative) {
        if stale != id {
            debug!(identifier = %stale, path = %relative, "dropping stale index entry");
            index.remove(&stale);
            index_changed = true;
        }
    }

    let outcome = if created {
        info!(identifier = %id, path = %relative, "assigned identifier");
        IndexOutcome::Created(id)
    } else if rewritten.is_some() || index_changed {
        info!(identifier = %id, path = %relative, "updated document");
        IndexOutcome::Updated(id)
    } else {
        IndexOutcome::Unchanged(id)
    };
    Ok(outcome)
}

/// Root marker for the document's current location.
pub fn recompute_root_marker(ws: &Workspace, path: &Path) -> IndexResult<String> {
    Ok(root_marker(&ws.relative(path)?))
}

/// Drop the index entries of a document that no longer exists at `path`.
pub fn remove_document(ws: &Workspace, index: &mut PathIndex, path: &Path) -> IndexResult<Vec<String>> {
    let relative = ws.relative(path)?;
    let removed = index.remove_path(&relative);
    for id in &removed {
        info!(identifier = %id, path = %relative, "removed from index");
    }
    Ok(removed)
}

/// Read a document as UTF-8.
pub(crate) fn read_document(path: &Path) -> IndexResult<String> {
    let bytes = fs::read(path).map_err(|e| IndexError::unreadable(path, e))?;
    String::from_utf8(bytes)
        .map_err(|e| IndexError::unreadable(path, io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Refuse to claim `id` for `relative` while another live file holds it.
fn check_duplicate(ws: &Workspace, index: &PathIndex, id: &str, relative: &str) -> IndexResult<()> {
    let Some(existing) = index.get(id) else {
        return Ok(());
    };
    if existing == relative {
        return Ok(());
    }
    let still_held = read_document(&ws.absolute(existing))
        .ok()
        .and_then(|content| header::read_identifier(&content, ws.keys()).ok().flatten())
        .is_some_and(|held| held == id);
    if still_held {
        return Err(IndexError::DuplicateIdentifier {
            identifier: id.to_string(),
            existing: existing.to_string(),
            duplicate: relative.to_string(),
        });
    }
    Ok(())
}

// ── Batch indexing ─────────────────────────────────────────────────

/// One file the batch could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub code: String,
    pub message: String,
}

impl FileFailure {
    pub fn new(path: &Path, error: &IndexError) -> Self {
        Self { path: path.display().to_string(), code: error.code().into(), message: error.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedDocument {
    pub path: String,
    #[serde(flatten)]
    pub outcome: IndexOutcome,
}

/// Result of indexing a set of files and directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub documents: Vec<IndexedDocument>,
    pub failures: Vec<FileFailure>,
}

impl BatchReport {
    fn record(&mut self, path: String, outcome: IndexOutcome) {
        match outcome {
            IndexOutcome::Created(_) => self.created += 1,
            IndexOutcome::Updated(_) => self.updated += 1,
            IndexOutcome::Unchanged(_) => self.unchanged += 1,
        }
        self.documents.push(IndexedDocument { path, outcome });
    }
}

/// Index every Markdown file named by `paths`, walking directories.
///
/// Failures are isolated per file: each one is logged and reported and the
/// run continues.
pub fn index_paths(ws: &Workspace, index: &mut PathIndex, paths: &[PathBuf]) -> BatchReport {
    let mut report = BatchReport::default();
    let mut files = Vec::new();

    for path in paths {
        match collect_target(ws, path) {
            Ok(found) => files.extend(found),
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping path");
                report.failures.push(FileFailure::new(path, &error));
            }
        }
    }
    files.sort();
    files.dedup();

    for file in files {
        match ensure_identifier(ws, index, &file) {
            Ok(outcome) => {
                let relative = ws.relative(&file).unwrap_or_else(|_| file.display().to_string());
                report.record(relative, outcome);
            }
            Err(error) => {
                warn!(path = %file.display(), %error, "failed to index document");
                report.failures.push(FileFailure::new(&file, &error));
            }
        }
    }
    report
}

/// Expand one command-line path into the files it designates.
fn collect_target(ws: &Workspace, path: &Path) -> IndexResult<Vec<PathBuf>> {
    let canonical = path.canonicalize().map_err(|e| IndexError::unreadable(path, e))?;
    if canonical.is_dir() {
        if canonical != ws.root() {
            ws.relative(&canonical)?;
        }
        return Ok(ws.markdown_files(&canonical));
    }
    ws.relative(&canonical)?;
    Ok(vec![canonical])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        ws: Workspace,
        index: PathIndex,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let ws = Workspace::open(tmp.path()).unwrap();
            let index = PathIndex::load(ws.index_path()).unwrap();
            Self { _tmp: tmp, ws, index }
        }

        fn write(&self, relative: &str, content: &str) -> PathBuf {
            let path = self.ws.absolute(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }

        fn read(&self, relative: &str) -> String {
            fs::read_to_string(self.ws.absolute(relative)).unwrap()
        }

        fn ensure(&mut self, relative: &str) -> IndexResult<IndexOutcome> {
            let path = self.ws.absolute(relative);
            ensure_identifier(&self.ws, &mut self.index, &path)
        }
    }

    // ── ensure_identifier ──────────────────────────────────────────

    #[test]
    fn new_document_gets_header_and_index_entry() {
        let mut fx = Fixture::new();
        fx.write("/notes/a.md", "# A\n");

        let outcome = fx.ensure("/notes/a.md").unwrap();
        let IndexOutcome::Created(id) = outcome.clone() else { panic!("expected Created, got {outcome:?}") };

        assert_eq!(id.len(), 8);
        assert_eq!(
            fx.read("/notes/a.md"),
            format!(
                "---\nserial: {id}\ntypora-root-url: ../\ntypora-copy-images-to: ../.assets/{}/{id}\n---\n\n# A\n",
                &id[..1]
            )
        );
        assert_eq!(fx.index.get(&id), Some("/notes/a.md"));
    }

    #[test]
    fn second_run_is_byte_identical() {
        let mut fx = Fixture::new();
        fx.write("/a.md", "---\ntitle: x\n---\nbody\n");
        let id = fx.ensure("/a.md").unwrap().identifier().to_string();
        let first = fx.read("/a.md");

        let outcome = fx.ensure("/a.md").unwrap();
        assert_eq!(outcome, IndexOutcome::Unchanged(id));
        assert_eq!(fx.read("/a.md"), first);
    }

    #[test]
    fn existing_identifier_is_kept_and_location_fixed() {
        let mut fx = Fixture::new();
        fx.write("/x/y/a.md", "---\nserial: legacy01\ntypora-root-url: ../\n---\nbody");

        let outcome = fx.ensure("/x/y/a.md").unwrap();
        assert_eq!(outcome, IndexOutcome::Updated("legacy01".into()));
        assert_eq!(
            fx.read("/x/y/a.md"),
            "---\nserial: legacy01\ntypora-root-url: ../../\ntypora-copy-images-to: ../../.assets/l/legacy01\n---\nbody"
        );
        assert_eq!(fx.index.get("legacy01"), Some("/x/y/a.md"));
    }

    #[test]
    fn correct_file_missing_from_index_is_updated_without_rewrite() {
        let mut fx = Fixture::new();
        let content = "---\nserial: abcd1234\ntypora-root-url:\ntypora-copy-images-to: .assets/a/abcd1234\n---\n";
        fx.write("/a.md", content);

        assert_eq!(fx.ensure("/a.md").unwrap(), IndexOutcome::Updated("abcd1234".into()));
        assert_eq!(fx.read("/a.md"), content);
    }

    #[test]
    fn moved_document_takes_over_its_entry() {
        let mut fx = Fixture::new();
        fx.index.upsert("abcd1234", "/old.md");
        fx.write("/new/a.md", "---\nserial: abcd1234\n---\n");

        fx.ensure("/new/a.md").unwrap();
        assert_eq!(fx.index.get("abcd1234"), Some("/new/a.md"));
    }

    #[test]
    fn stale_entries_for_the_same_path_are_dropped() {
        let mut fx = Fixture::new();
        fx.index.upsert("oldid000", "/a.md");
        fx.write("/a.md", "body");

        let id = fx.ensure("/a.md").unwrap().identifier().to_string();
        assert!(!fx.index.contains("oldid000"));
        assert_eq!(fx.index.identifiers_for_path("/a.md"), vec![id]);
    }

    #[test]
    fn duplicate_of_live_document_is_refused() {
        let mut fx = Fixture::new();
        fx.write("/a.md", "---\nserial: abcd1234\n---\n");
        fx.ensure("/a.md").unwrap();
        let copy = "---\nserial: abcd1234\n---\ncopy\n";
        fx.write("/b.md", copy);

        let err = fx.ensure("/b.md").unwrap_err();
        assert!(matches!(err, IndexError::DuplicateIdentifier { ref existing, .. } if existing == "/a.md"));
        assert_eq!(fx.read("/b.md"), copy);
        assert_eq!(fx.index.get("abcd1234"), Some("/a.md"));
    }

    #[test]
    fn non_markdown_is_rejected() {
        let mut fx = Fixture::new();
        let path = fx.write("/a.txt", "x");
        let err = ensure_identifier(&fx.ws, &mut fx.index, &path).unwrap_err();
        assert!(matches!(err, IndexError::NotMarkdown(_)));
    }

    #[test]
    fn non_utf8_is_unreadable_and_untouched() {
        let mut fx = Fixture::new();
        let path = fx.ws.absolute("/bin.md");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let err = fx.ensure("/bin.md").unwrap_err();
        assert!(matches!(err, IndexError::UnreadableFile { .. }));
        assert_eq!(fs::read(&path).unwrap(), vec![0xff, 0xfe, 0x00]);
        assert_eq!(fx.index.len(), 0);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let mut fx = Fixture::new();
        assert!(matches!(fx.ensure("/gone.md"), Err(IndexError::UnreadableFile { .. })));
    }

    #[test]
    fn unterminated_header_is_malformed() {
        let mut fx = Fixture::new();
        fx.write("/a.md", "---\ntitle: x\n");
        assert!(matches!(fx.ensure("/a.md"), Err(IndexError::MalformedHeader(_))));
        assert_eq!(fx.read("/a.md"), "---\ntitle: x\n");
    }

    #[test]
    fn root_marker_follows_depth() {
        let fx = Fixture::new();
        assert_eq!(recompute_root_marker(&fx.ws, &fx.ws.absolute("/a.md")).unwrap(), "");
        assert_eq!(recompute_root_marker(&fx.ws, &fx.ws.absolute("/a/b/c.md")).unwrap(), "../../");
    }

    #[test]
    fn remove_document_drops_matching_entries() {
        let mut fx = Fixture::new();
        fx.index.upsert("abcd1234", "/a.md");
        let removed = remove_document(&fx.ws, &mut fx.index, &fx.ws.absolute("/a.md")).unwrap();
        assert_eq!(removed, vec!["abcd1234".to_string()]);
        assert_eq!(fx.index.len(), 0);
    }

    // ── index_paths ────────────────────────────────────────────────

    #[test]
    fn batch_walks_directories_and_isolates_failures() {
        let mut fx = Fixture::new();
        fx.write("/a.md", "a");
        fx.write("/notes/b.md", "b");
        fx.write("/notes/broken.md", "---\nno close\n");
        fx.write("/notes/skip.txt", "x");
        let root = fx.ws.root().to_path_buf();
        let notes = fx.ws.absolute("/notes");

        let report = index_paths(&fx.ws, &mut fx.index, &[root, notes]);

        assert_eq!(report.created, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].code, "MALFORMED_HEADER");
        let paths: Vec<_> = report.documents.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.md", "/notes/b.md"]);
        assert_eq!(fx.index.len(), 2);
    }

    #[test]
    fn batch_reports_missing_and_outside_paths() {
        let mut fx = Fixture::new();
        let outside = TempDir::new().unwrap();
        let stray = outside.path().join("x.md");
        fs::write(&stray, "x").unwrap();
        let missing = fx.ws.absolute("/missing.md");

        let report = index_paths(&fx.ws, &mut fx.index, &[missing, stray]);

        let codes: Vec<_> = report.failures.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["UNREADABLE_FILE", "OUTSIDE_WORKSPACE"]);
        assert_eq!(fs::read_to_string(outside.path().join("x.md")).unwrap(), "x");
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let doc = IndexedDocument { path: "/a.md".into(), outcome: IndexOutcome::Created("ab".into()) };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json, serde_json::json!({"path": "/a.md", "outcome": "created", "identifier": "ab"}));
    }
}
