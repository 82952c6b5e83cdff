// Integration test: the `folio` binary's exit codes and JSON output.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn folio(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_folio"))
        .args(args)
        .env_remove("FOLIO_WORKSPACE")
        .env_remove("RUST_LOG")
        .output()
        .expect("folio binary should run")
}

fn workspace_with(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (relative, content) in files {
        let path = tmp.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    tmp
}

fn root(tmp: &TempDir) -> &str {
    tmp.path().to_str().unwrap()
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be one JSON object")
}

// ── index ────────────────────────────────────────────────────────────

#[test]
fn index_without_workspace_is_a_usage_error() {
    let output = folio(&["index", "--json"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("\"USAGE\""), "stderr: {stderr}");
}

#[test]
fn index_whole_workspace_writes_index_file() {
    let tmp = workspace_with(&[("notes/a.md", "# A\n"), ("b.md", "# B\n")]);
    let output = folio(&["index", "-w", root(&tmp), "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let report = stdout_json(&output);
    assert_eq!(report["created"], 2);
    assert_eq!(report["failures"].as_array().unwrap().len(), 0);

    let index: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join(".index/path_index.json")).unwrap()).unwrap();
    let mut paths: Vec<_> = index.as_object().unwrap().values().map(|v| v.as_str().unwrap().to_string()).collect();
    paths.sort();
    assert_eq!(paths, vec!["/b.md", "/notes/a.md"]);
}

#[test]
fn index_empty_workspace_still_creates_index() {
    let tmp = workspace_with(&[]);
    let output = folio(&["index", "-w", root(&tmp), "--json"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(tmp.path().join(".index/path_index.json").exists());
}

#[test]
fn index_reports_partial_failure() {
    let tmp = workspace_with(&[("good.md", "fine"), ("bad.md", "---\nserial: x\n")]);
    let output = folio(&["index", "-w", root(&tmp), "--json"]);
    assert_eq!(output.status.code(), Some(4));

    let report = stdout_json(&output);
    assert_eq!(report["created"], 1);
    assert_eq!(report["failures"][0]["code"], "MALFORMED_HEADER");
    assert_eq!(fs::read_to_string(tmp.path().join("bad.md")).unwrap(), "---\nserial: x\n");
}

#[test]
fn index_refuses_corrupt_index_file() {
    let tmp = workspace_with(&[("a.md", "# A\n"), (".index/path_index.json", "{not json")]);
    let output = folio(&["index", "-w", root(&tmp), "--json"]);
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(fs::read_to_string(tmp.path().join("a.md")).unwrap(), "# A\n");
}

#[test]
fn index_single_path_relative_to_workspace_root() {
    let tmp = workspace_with(&[("notes/a.md", "# A\n"), ("notes/b.md", "# B\n")]);
    let target = tmp.path().join("notes/a.md");
    let output = folio(&["index", target.to_str().unwrap(), "-w", root(&tmp), "--json"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["created"], 1);
    assert_eq!(fs::read_to_string(tmp.path().join("notes/b.md")).unwrap(), "# B\n");
}

// ── migrate-assets ───────────────────────────────────────────────────

fn indexed_document(tmp: &TempDir) -> String {
    let output = folio(&["index", "-w", root(&tmp), "--json"]);
    assert_eq!(output.status.code(), Some(0));
    stdout_json(&output)["documents"][0]["identifier"].as_str().unwrap().to_string()
}

fn exists(root: &Path, relative: &str) -> bool {
    root.join(relative).exists()
}

#[test]
fn migrate_assets_dry_run_changes_nothing() {
    let tmp = workspace_with(&[("notes/a.md", "![x](.assets/a/x.png)\n"), ("notes/.assets/a/x.png", "png")]);
    let id = indexed_document(&tmp);

    let output = folio(&["migrate-assets", "-w", root(&tmp), "--dry-run", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let report = stdout_json(&output);
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["documents"][0]["moved"].as_array().unwrap().len(), 1);

    assert!(exists(tmp.path(), "notes/.assets/a/x.png"));
    assert!(!exists(tmp.path(), &format!(".assets/{}/{id}/x.png", &id[..1])));
}

#[test]
fn migrate_assets_moves_images_and_rewrites_links() {
    let tmp = workspace_with(&[("notes/a.md", "![x](.assets/a/x.png)\n"), ("notes/.assets/a/x.png", "png")]);
    let id = indexed_document(&tmp);

    let output = folio(&["migrate-assets", "-w", root(&tmp), "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let bucket = &id[..1];
    assert!(exists(tmp.path(), &format!(".assets/{bucket}/{id}/x.png")));
    assert!(!exists(tmp.path(), "notes/.assets/a"));
    let content = fs::read_to_string(tmp.path().join("notes/a.md")).unwrap();
    assert!(content.contains(&format!("![x](/.assets/{bucket}/{id}/x.png)")));
}
