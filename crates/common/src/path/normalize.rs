// Workspace-relative path strings as stored in the index: `/`-separated,
// rooted at the workspace (`/notes/a.md`), no `.` or `..` components.

use std::path::{Component, Path};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path `{0}` is outside the workspace")]
    OutsideWorkspace(String),

    #[error("path `{0}` is not valid UTF-8")]
    NonUtf8(String),

    #[error("path contains directory traversal component: {0}")]
    Traversal(String),

    #[error("path contains null byte")]
    NullByte,
}

/// Express `file` relative to `root` in index form.
///
/// Both paths must already be absolute and canonical; this is pure path
/// arithmetic and never touches the filesystem.
pub fn workspace_relative(root: &Path, file: &Path) -> Result<String, PathError> {
    let rest = file
        .strip_prefix(root)
        .map_err(|_| PathError::OutsideWorkspace(file.display().to_string()))?;

    let mut out = String::new();
    for component in rest.components() {
        match component {
            Component::Normal(part) => {
                let part =
                    part.to_str().ok_or_else(|| PathError::NonUtf8(file.display().to_string()))?;
                out.push('/');
                out.push_str(part);
            }
            Component::CurDir => {}
            _ => return Err(PathError::OutsideWorkspace(file.display().to_string())),
        }
    }

    if out.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(out)
}

/// Normalize an index path written by hand or by another tool.
///
/// Rules:
/// - Convert `\` separators to `/`
/// - Collapse consecutive `/` into one
/// - Ensure exactly one leading `/` and no trailing `/`
/// - Reject `.` and `..` components, null bytes and empty paths
pub fn normalize_index_path(input: &str) -> Result<String, PathError> {
    if input.contains('\0') {
        return Err(PathError::NullByte);
    }

    let unified = input.replace('\\', "/");
    let components: Vec<&str> = unified.split('/').filter(|s| !s.is_empty()).collect();
    if components.is_empty() {
        return Err(PathError::Empty);
    }

    for component in &components {
        if *component == "." || *component == ".." {
            return Err(PathError::Traversal((*component).to_string()));
        }
    }

    Ok(format!("/{}", components.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    // ── workspace_relative ─────────────────────────────────────────

    #[test]
    fn nested_file_is_rooted_with_slash() {
        let root = PathBuf::from("/ws");
        assert_eq!(
            workspace_relative(&root, &root.join("notes").join("a.md")).unwrap(),
            "/notes/a.md"
        );
    }

    #[test]
    fn top_level_file() {
        let root = PathBuf::from("/ws");
        assert_eq!(workspace_relative(&root, &root.join("a.md")).unwrap(), "/a.md");
    }

    #[test]
    fn file_outside_root_is_rejected() {
        let err = workspace_relative(Path::new("/ws"), Path::new("/other/a.md")).unwrap_err();
        assert!(matches!(err, PathError::OutsideWorkspace(_)));
    }

    #[test]
    fn sibling_with_common_prefix_is_outside() {
        let err = workspace_relative(Path::new("/ws"), Path::new("/ws2/a.md")).unwrap_err();
        assert!(matches!(err, PathError::OutsideWorkspace(_)));
    }

    #[test]
    fn root_itself_is_empty() {
        assert_eq!(workspace_relative(Path::new("/ws"), Path::new("/ws")), Err(PathError::Empty));
    }

    #[test]
    fn parent_components_are_rejected() {
        let err = workspace_relative(Path::new("/ws"), Path::new("/ws/../etc/a.md")).unwrap_err();
        assert!(matches!(err, PathError::OutsideWorkspace(_)));
    }

    #[test]
    fn non_ascii_names_pass_through() {
        let root = PathBuf::from("/ws");
        assert_eq!(
            workspace_relative(&root, &root.join("笔记").join("日记.md")).unwrap(),
            "/笔记/日记.md"
        );
    }

    // ── normalize_index_path ───────────────────────────────────────

    #[test]
    fn adds_leading_slash() {
        assert_eq!(normalize_index_path("notes/a.md").unwrap(), "/notes/a.md");
    }

    #[test]
    fn backslashes_and_duplicates_collapse() {
        assert_eq!(normalize_index_path("\\notes\\\\sub//a.md").unwrap(), "/notes/sub/a.md");
    }

    #[test]
    fn trailing_slash_is_stripped() {
        assert_eq!(normalize_index_path("/notes/").unwrap(), "/notes");
    }

    #[test]
    fn traversal_is_rejected() {
        assert_eq!(normalize_index_path("/a/../b.md"), Err(PathError::Traversal("..".into())));
        assert_eq!(normalize_index_path("./b.md"), Err(PathError::Traversal(".".into())));
    }

    #[test]
    fn empty_forms_are_rejected() {
        assert_eq!(normalize_index_path(""), Err(PathError::Empty));
        assert_eq!(normalize_index_path("///"), Err(PathError::Empty));
    }

    #[test]
    fn null_byte_is_rejected() {
        assert_eq!(normalize_index_path("/a\0.md"), Err(PathError::NullByte));
    }

    #[test]
    fn dotfiles_and_triple_dots_are_allowed() {
        assert_eq!(normalize_index_path(".config/x.md").unwrap(), "/.config/x.md");
        assert_eq!(normalize_index_path("notes/...").unwrap(), "/notes/...");
    }
}
