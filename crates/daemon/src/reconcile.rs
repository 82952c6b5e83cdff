// Reconciliation: compare the index with the documents on disk and repair
// whatever drifted while nobody was watching.

use std::collections::BTreeMap;
use std::path::PathBuf;

use folio_common::header;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{IndexError, IndexResult};
use crate::indexer::{ensure_identifier, read_document, FileFailure};
use crate::store::index::PathIndex;
use crate::workspace::Workspace;

/// A file carrying an identifier that another file already owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateEntry {
    pub identifier: String,
    pub kept: String,
    pub duplicate: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Entries whose recorded file still carries the identifier.
    pub verified: usize,
    /// Entries pointed at a new location after the document moved.
    pub repaired: usize,
    /// Entries whose document no longer exists.
    pub removed: usize,
    /// Documents newly recorded, with or without a pre-existing identifier.
    pub added: usize,
    /// The index file was unreadable and rebuilt from scratch.
    pub rebuilt: bool,
    pub duplicates: Vec<DuplicateEntry>,
    pub failures: Vec<FileFailure>,
}

/// Documents found on disk, grouped by the identifier in their header.
#[derive(Default)]
struct TreeScan {
    holders: BTreeMap<String, Vec<String>>,
    unidentified: Vec<PathBuf>,
}

/// Bring `index` in line with the workspace tree.
///
/// The walk is lexicographic, so when several files carry the same
/// identifier the outcome is repeatable: the file already recorded in the
/// index keeps the slot if it is one of them, otherwise the first file in
/// walk order does. The others are reported as duplicates and left alone.
pub fn reconcile(ws: &Workspace, index: &mut PathIndex) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let scan = scan_tree(ws, &mut report);

    let recorded: Vec<(String, String)> =
        index.entries().map(|(id, path)| (id.to_string(), path.to_string())).collect();
    for (id, recorded_path) in recorded {
        // Repairs earlier in this pass can drop entries that shared a path.
        if !index.contains(&id) {
            continue;
        }
        match scan.holders.get(&id) {
            Some(paths) if paths.contains(&recorded_path) => report.verified += 1,
            Some(paths) => {
                let target = &paths[0];
                info!(identifier = %id, from = %recorded_path, to = %target, "repairing moved document");
                index.upsert(&id, target);
                refresh(ws, index, target, &mut report);
                report.repaired += 1;
            }
            None => {
                info!(identifier = %id, path = %recorded_path, "removing entry for missing document");
                index.remove(&id);
                report.removed += 1;
            }
        }
    }

    for (id, paths) in &scan.holders {
        if !index.contains(id) {
            info!(identifier = %id, path = %paths[0], "adopting identified document");
            if refresh(ws, index, &paths[0], &mut report) {
                report.added += 1;
            }
        }
    }

    for file in &scan.unidentified {
        match ensure_identifier(ws, index, file) {
            Ok(_) => report.added += 1,
            Err(error) => fail(&mut report, file, &error),
        }
    }

    for (id, paths) in scan.holders.iter().filter(|(_, paths)| paths.len() > 1) {
        let kept = index.get(id).unwrap_or(&paths[0]).to_string();
        for path in paths.iter().filter(|p| **p != kept) {
            warn!(identifier = %id, kept = %kept, duplicate = %path, "duplicate identifier");
            report.duplicates.push(DuplicateEntry {
                identifier: id.clone(),
                kept: kept.clone(),
                duplicate: path.clone(),
            });
        }
    }

    info!(
        verified = report.verified,
        repaired = report.repaired,
        removed = report.removed,
        added = report.added,
        duplicates = report.duplicates.len(),
        failures = report.failures.len(),
        "reconciliation finished"
    );
    report
}

/// Load the workspace index, reconcile it and save it.
///
/// When the index file is corrupt and `rebuild_on_corrupt` is set, the pass
/// starts from an empty index; otherwise the corruption error is returned.
pub fn verify_index(ws: &Workspace, rebuild_on_corrupt: bool) -> IndexResult<(PathIndex, ReconcileReport)> {
    let (mut index, rebuilt) = match PathIndex::load(ws.index_path()) {
        Ok(index) => (index, false),
        Err(error @ IndexError::CorruptIndex { .. }) if rebuild_on_corrupt => {
            warn!(%error, "index is corrupt, rebuilding from the workspace tree");
            (PathIndex::empty(ws.index_path()), true)
        }
        Err(error) => return Err(error),
    };

    let mut report = reconcile(ws, &mut index);
    report.rebuilt = rebuilt;
    if rebuilt || index.is_dirty() || !ws.index_path().exists() {
        index.save()?;
    }
    Ok((index, report))
}

fn scan_tree(ws: &Workspace, report: &mut ReconcileReport) -> TreeScan {
    let mut scan = TreeScan::default();
    for file in ws.markdown_files(ws.root()) {
        let identifier = ws.relative(&file).and_then(|relative| {
            let content = read_document(&file)?;
            let id = header::read_identifier(&content, ws.keys())
                .map_err(|_| IndexError::MalformedHeader(file.clone()))?;
            Ok((relative, id))
        });
        match identifier {
            Ok((relative, Some(id))) => scan.holders.entry(id).or_default().push(relative),
            Ok((_, None)) => scan.unidentified.push(file),
            Err(error) => fail(report, &file, &error),
        }
    }
    scan
}

/// Rewrite the location fields of an identified document. Returns success.
fn refresh(ws: &Workspace, index: &mut PathIndex, relative: &str, report: &mut ReconcileReport) -> bool {
    let file = ws.absolute(relative);
    match ensure_identifier(ws, index, &file) {
        Ok(_) => true,
        Err(error) => {
            fail(report, &file, &error);
            false
        }
    }
}

fn fail(report: &mut ReconcileReport, file: &std::path::Path, error: &IndexError) {
    warn!(path = %file.display(), %error, "reconciliation skipped document");
    report.failures.push(FileFailure::new(file, error));
}
