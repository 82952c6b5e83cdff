// Legacy asset migration: move images out of the per-document folder
// `<doc dir>/.assets/<doc stem>/` into the document's asset target and
// rewrite the links that pointed at the old folder.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use folio_common::header::FrontMatter;
use folio_common::identifier;
use folio_common::path::PathError;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{IndexError, IndexResult};
use crate::indexer::{read_document, FileFailure};
use crate::store::atomic::write_atomic;
use crate::workspace::Workspace;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "svg", "webp", "ico"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedAsset {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigratedDocument {
    pub path: String,
    pub moved: Vec<MovedAsset>,
    pub links_rewritten: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub documents: Vec<MigratedDocument>,
    /// Documents without identifier, asset target or legacy images.
    pub skipped: usize,
    pub failures: Vec<FileFailure>,
}

impl MigrationReport {
    pub fn images_moved(&self) -> usize {
        self.documents.iter().map(|doc| doc.moved.len()).sum()
    }
}

/// Migrate every managed document in the workspace. With `dry_run` the
/// plan is reported but nothing on disk changes.
pub fn migrate_assets(ws: &Workspace, dry_run: bool) -> MigrationReport {
    let mut report = MigrationReport { dry_run, ..Default::default() };
    for file in ws.markdown_files(ws.root()) {
        match migrate_document(ws, &file, dry_run) {
            Ok(Some(document)) => report.documents.push(document),
            Ok(None) => report.skipped += 1,
            Err(error) => {
                warn!(path = %file.display(), %error, "asset migration failed");
                report.failures.push(FileFailure::new(&file, &error));
            }
        }
    }
    info!(
        dry_run,
        documents = report.documents.len(),
        images = report.images_moved(),
        skipped = report.skipped,
        failures = report.failures.len(),
        "asset migration finished"
    );
    report
}

/// Migrate one document. `Ok(None)` when there is nothing to do.
pub fn migrate_document(ws: &Workspace, path: &Path, dry_run: bool) -> IndexResult<Option<MigratedDocument>> {
    migrate_document_with(ws, path, dry_run, |from, to| fs::rename(from, to))
}

/// [`migrate_document`] with the file move supplied by the caller.
///
/// If a move fails, links to the images already moved are still rewritten
/// before the error is returned, so the document never points at files that
/// left the legacy folder.
fn migrate_document_with<F>(ws: &Workspace, path: &Path, dry_run: bool, mut move_file: F) -> IndexResult<Option<MigratedDocument>>
where
    F: FnMut(&Path, &Path) -> io::Result<()>,
{
    let relative = ws.relative(path)?;
    let content = read_document(path)?;
    let doc = FrontMatter::parse(&content).map_err(|_| IndexError::MalformedHeader(path.to_path_buf()))?;

    let keys = ws.keys();
    let (Some(id), Some(target)) = (doc.get(&keys.identifier), doc.get(&keys.asset_target)) else {
        debug!(path = %relative, "skipping document without identifier or asset target");
        return Ok(None);
    };
    if id.is_empty() || target.is_empty() {
        return Ok(None);
    }
    let (Some(doc_dir), Some(stem)) = (path.parent(), path.file_stem().and_then(|s| s.to_str())) else {
        return Ok(None);
    };

    let legacy_dir = doc_dir.join(ws.assets_dir()).join(stem);
    let images = legacy_images(&legacy_dir)?;
    if images.is_empty() {
        return Ok(None);
    }

    let target_dir = lexical_join(doc_dir, target);
    if !target_dir.starts_with(ws.root()) {
        warn!(path = %relative, target = %target, "asset target points outside the workspace");
        return Err(PathError::OutsideWorkspace(target_dir.display().to_string()).into());
    }
    if !dry_run {
        fs::create_dir_all(&target_dir).map_err(|e| IndexError::write_failed(&target_dir, e))?;
    }

    let mut planned = HashSet::new();
    let mut moved = Vec::with_capacity(images.len());
    let mut failure = None;
    for image in images {
        let to = free_target(&target_dir, &image, &mut planned);
        if !dry_run {
            if let Err(e) = move_file(&image, &to) {
                failure = Some(IndexError::write_failed(&to, e));
                break;
            }
        }
        debug!(from = %image.display(), to = %to.display(), dry_run, "moved asset");
        moved.push(MovedAsset { from: image, to });
    }

    if !dry_run {
        remove_if_empty(&legacy_dir);
        if let Some(parent) = legacy_dir.parent() {
            remove_if_empty(parent);
        }
    }

    let new_prefix = format!("/{}/{}/{id}/", ws.assets_dir(), identifier::bucket(id));
    let renames: HashMap<String, String> = moved
        .iter()
        .filter_map(|asset| Some((file_name(&asset.from)?, file_name(&asset.to)?)))
        .collect();
    let (rewritten, links_rewritten) = rewrite_links(&content, ws.assets_dir(), stem, &new_prefix, &renames);
    if links_rewritten > 0 && !dry_run {
        write_atomic(path, rewritten.as_bytes())?;
    }

    if let Some(error) = failure {
        warn!(path = %relative, moved = moved.len(), links = links_rewritten, %error, "asset migration stopped partway");
        return Err(error);
    }

    info!(path = %relative, images = moved.len(), links = links_rewritten, dry_run, "migrated legacy assets");
    Ok(Some(MigratedDocument { path: relative, moved, links_rewritten }))
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Image files directly inside `dir`, sorted by name. A missing directory
/// has none.
fn legacy_images(dir: &Path) -> IndexResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(IndexError::unreadable(dir, err)),
    };
    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IndexError::unreadable(dir, e))?;
        let path = entry.path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// First of `name.ext`, `name_1.ext`, `name_2.ext`, ... that neither exists
/// in `dir` nor was already handed out.
fn free_target(dir: &Path, image: &Path, planned: &mut HashSet<PathBuf>) -> PathBuf {
    let file_name = image.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = image.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = image.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();

    let mut candidate = dir.join(&file_name);
    let mut counter = 1;
    while candidate.exists() || planned.contains(&candidate) {
        candidate = dir.join(format!("{stem}_{counter}{ext}"));
        counter += 1;
    }
    planned.insert(candidate.clone());
    candidate
}

fn remove_if_empty(dir: &Path) {
    let empty = fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    if !empty {
        return;
    }
    match fs::remove_dir(dir) {
        Ok(()) => debug!(dir = %dir.display(), "removed empty legacy asset directory"),
        Err(error) => warn!(dir = %dir.display(), %error, "failed to remove legacy asset directory"),
    }
}

/// Rewrite links `./<assets>/<stem>/<name>` and `<assets>/<stem>/<name>` to
/// `<new_prefix><renamed>` for every `name` in `renames`, in one pass.
/// Links to files that did not move, and occurrences glued to a longer path
/// (`../.assets/...`, `x.assets/...`), are left alone. Returns the new text
/// and the number of replacements.
fn rewrite_links(
    content: &str,
    assets_dir: &str,
    stem: &str,
    new_prefix: &str,
    renames: &HashMap<String, String>,
) -> (String, usize) {
    let needle = format!("{assets_dir}/{stem}/");
    let mut out = String::with_capacity(content.len());
    let mut count = 0;
    let mut rest = content;
    while let Some(pos) = rest.find(&needle) {
        let head = &rest[..pos];
        let end = pos + needle.len();
        let name_len = rest[end..].find(is_link_end).unwrap_or(rest.len() - end);
        let name = &rest[end..end + name_len];
        let dot_slash = head.ends_with("./") && !head.ends_with("../");
        let glued = head.chars().last().is_some_and(|c| c.is_alphanumeric() || matches!(c, '/' | '.' | '_' | '-'));

        match renames.get(name) {
            Some(renamed) if dot_slash || !glued => {
                out.push_str(if dot_slash { &head[..head.len() - 2] } else { head });
                out.push_str(new_prefix);
                out.push_str(renamed);
                count += 1;
            }
            _ => out.push_str(&rest[..end + name_len]),
        }
        rest = &rest[end + name_len..];
    }
    out.push_str(rest);
    (out, count)
}

fn is_link_end(c: char) -> bool {
    c.is_whitespace() || matches!(c, ')' | '"' | '\'' | '>' | ']' | '?' | '#')
}

/// Join `relative` onto `base`, folding `..` and `.` lexically.
fn lexical_join(base: &Path, relative: &str) -> PathBuf {
    let mut joined = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::ParentDir => {
                joined.pop();
            }
            Component::CurDir => {}
            other => joined.push(other),
        }
    }
    joined
}
