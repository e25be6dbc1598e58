//! Shared test infrastructure for dirmirror.
//!
//! Provides:
//! - `CmdResult` + `run_cli_case()` — integration test CLI runner
//! - `TestEnvironment` — directory tree builder with controlled mtimes

// Not every test binary uses every item; suppress dead-code warnings for the
// shared module.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// ──────────────────── CLI test runner ────────────────────

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_dirmirror") {
        let p = PathBuf::from(path);
        if p.exists() {
            return p;
        }
    }

    let exe_name = if cfg!(windows) {
        "dirmirror.exe"
    } else {
        "dirmirror"
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!(
            "unable to resolve dirmirror binary path for integration test (checked CARGO_BIN_EXE_dirmirror and debug sibling path)"
        ),
    }
}

/// Run the compiled binary with `args`, capturing output and writing a log
/// file so failures are debuggable after the fact.
pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("dirmirror-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute dirmirror command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

// ──────────────────── TestEnvironment ────────────────────

/// Builder for directory trees with controlled file ages and sizes.
pub struct TestEnvironment {
    root: tempfile::TempDir,
}

impl TestEnvironment {
    /// Create a new empty test environment.
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("create test tempdir"),
        }
    }

    /// Root directory path.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Create a file with specified content and age.
    pub fn create_file(&self, rel_path: &str, content: &[u8], age: Duration) -> PathBuf {
        let path = self.root.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, content).expect("write test file");

        let mtime = SystemTime::now() - age;
        let _ = filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(mtime));

        path
    }

    /// Create an empty directory.
    pub fn create_dir(&self, rel_path: &str) -> PathBuf {
        let path = self.root.path().join(rel_path);
        fs::create_dir_all(&path).expect("create test dir");
        path
    }

    /// Create a file of specified size (filled with zeros).
    pub fn create_sized_file(&self, rel_path: &str, size: usize, age: Duration) -> PathBuf {
        self.create_file(rel_path, &vec![0u8; size], age)
    }

    /// Collect the set of (relative path, is_dir, size) triples under a
    /// directory, for whole-tree equality assertions.
    pub fn tree_manifest(root: &Path) -> Vec<(PathBuf, bool, u64)> {
        let mut manifest = Vec::new();
        collect_manifest(root, root, &mut manifest);
        manifest.sort();
        manifest
    }
}

fn collect_manifest(root: &Path, dir: &Path, out: &mut Vec<(PathBuf, bool, u64)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        let relative = path.strip_prefix(root).unwrap().to_path_buf();
        if meta.is_dir() {
            out.push((relative, true, 0));
            collect_manifest(root, &path, out);
        } else {
            out.push((relative, false, meta.len()));
        }
    }
}
