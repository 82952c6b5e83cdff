// Path helpers shared by the indexer and the watcher.

pub mod normalize;

use std::path::Path;

pub use normalize::{normalize_index_path, workspace_relative, PathError};

use crate::identifier;

/// Number of directories between the workspace root and the document.
pub fn depth(relative: &str) -> usize {
    relative.trim_start_matches('/').matches('/').count()
}

/// Prefix that climbs from the document's directory back to the workspace
/// root: `""` at the top level, `"../"` one level down, and so on.
pub fn root_marker(relative: &str) -> String {
    "../".repeat(depth(relative))
}

/// Directory (relative to the document) where the editor should copy pasted
/// assets: `{root_marker}{assets_dir}/{bucket}/{id}`.
pub fn asset_target(root_marker: &str, id: &str, assets_dir: &str) -> String {
    format!("{root_marker}{assets_dir}/{}/{id}", identifier::bucket(id))
}

/// Returns true if the path has an `.md` extension (case-insensitive).
pub fn is_markdown(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

/// True when `relative` is `dir` itself or lies below it.
pub fn is_under(relative: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    relative == dir || relative.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}
