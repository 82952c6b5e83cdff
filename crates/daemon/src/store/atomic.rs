// All-or-nothing file replacement: write a sibling temp file, fsync, rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{IndexError, IndexResult};

/// Replace `path` with `bytes` atomically.
///
/// The temp file lives in the same directory so the rename never crosses a
/// filesystem. An existing file's permissions are carried over. On any
/// failure the temp file is removed and the original is left untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> IndexResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| IndexError::write_failed(path, e))?;

    let tmp_path = temp_path_for(dir, path);
    let result = write_then_rename(&tmp_path, path, bytes);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result.map_err(|e| IndexError::write_failed(path, e))
}

fn write_then_rename(tmp_path: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp_path)?;
    file.write_all(bytes)?;
    file.sync_data()?;
    drop(file);

    if let Ok(meta) = fs::metadata(target) {
        fs::set_permissions(tmp_path, meta.permissions())?;
    }
    fs::rename(tmp_path, target)
}

fn temp_path_for(dir: &Path, target: &Path) -> PathBuf {
    let name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let nonce = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
    dir.join(format!(".{name}.{}.{nonce}.tmp", std::process::id()))
}
