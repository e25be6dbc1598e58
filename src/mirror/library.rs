//! Persisted snapshot library: `path||mtime_ms||size` lines, pre-order.
//!
//! The library is what makes restarts cheap — instead of re-copying the whole
//! origin tree, the mirror cross-references the stored attributes and only
//! copies what diverged while the process was down.
//!
//! Lines are parsed from the right (`rsplitn`): the final two fields are
//! numeric, so a `||` inside a path never corrupts the file. Stores are
//! atomic via temp-file-and-rename.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::core::errors::{MirrorError, Result};
use crate::mirror::snapshot::Snapshot;

/// Stored attributes for one library line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryEntry {
    pub modified_ms: i64,
    pub size: u64,
}

impl LibraryEntry {
    /// Whether the stored attributes match a live node.
    ///
    /// Directory mtimes drift with every child change, so directories agree
    /// on presence alone; files must match both fields.
    #[must_use]
    pub fn agrees_with(&self, node: &Snapshot) -> bool {
        if node.is_directory() {
            self.size == node.size()
        } else {
            self.size == node.size() && self.modified_ms == node.modified_ms()
        }
    }
}

/// Load a library file into a path → attributes map.
///
/// Malformed lines are skipped; a missing file yields an empty map.
pub fn load(path: &Path) -> Result<HashMap<PathBuf, LibraryEntry>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(MirrorError::io(path, e)),
    };

    let mut entries = HashMap::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| MirrorError::io(path, e))?;
        if let Some((stored_path, entry)) = parse_line(&line) {
            entries.insert(stored_path, entry);
        }
    }
    Ok(entries)
}

/// Parse one `path||mtime||size` line, anchored on the right.
fn parse_line(line: &str) -> Option<(PathBuf, LibraryEntry)> {
    let mut fields = line.rsplitn(3, "||");
    let size = fields.next()?.parse::<u64>().ok()?;
    let modified_ms = fields.next()?.parse::<i64>().ok()?;
    let stored_path = fields.next()?;
    if stored_path.is_empty() {
        return None;
    }
    Some((PathBuf::from(stored_path), LibraryEntry { modified_ms, size }))
}

/// Atomically persist a snapshot tree to `path`.
///
/// Sequence: ensure the parent directory, write `<path>.tmp` fully, delete
/// any previous file, rename the temp file into place. A crash mid-store
/// leaves either the old library or the complete new one.
pub fn store(path: &Path, root: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| MirrorError::io(parent, e))?;
    }

    let temp_path = temp_name(path);
    let file = File::create(&temp_path).map_err(|e| MirrorError::io(&temp_path, e))?;
    let mut writer = BufWriter::new(file);
    root.store(&mut writer)
        .map_err(|e| MirrorError::io(&temp_path, e))?;
    writer.flush().map_err(|e| MirrorError::io(&temp_path, e))?;
    drop(writer);

    if let Err(e) = fs::remove_file(path)
        && e.kind() != ErrorKind::NotFound
    {
        return Err(MirrorError::io(path, e));
    }
    fs::rename(&temp_path, path).map_err(|e| MirrorError::io(path, e))?;
    Ok(())
}

fn temp_name(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_line_splits_from_the_right() {
        let (path, entry) = parse_line("/data/src/a.txt||1650000000123||42").unwrap();
        assert_eq!(path, Path::new("/data/src/a.txt"));
        assert_eq!(entry.modified_ms, 1_650_000_000_123);
        assert_eq!(entry.size, 42);
    }

    #[test]
    fn parse_line_preserves_delimiter_inside_path() {
        let (path, entry) = parse_line("/data/weird||name/file||-5||0").unwrap();
        assert_eq!(path, Path::new("/data/weird||name/file"));
        assert_eq!(entry.modified_ms, -5);
        assert_eq!(entry.size, 0);
    }

    #[test]
    fn parse_line_rejects_garbage() {
        assert!(parse_line("").is_none());
        assert!(parse_line("just a path").is_none());
        assert!(parse_line("/p||notanumber||3").is_none());
        assert!(parse_line("/p||3||notanumber").is_none());
        assert!(parse_line("||1||2").is_none());
    }

    #[test]
    fn load_missing_file_yields_empty_map() {
        let tmp = TempDir::new().unwrap();
        let entries = load(&tmp.path().join("absent.cm")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn load_skips_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lib.cm");
        fs::write(
            &path,
            "/good/a||100||1\nbroken line\n/good/b||200||2\n",
        )
        .unwrap();

        let entries = load(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key(Path::new("/good/a")));
        assert!(entries.contains_key(Path::new("/good/b")));
    }

    #[test]
    fn store_then_load_round_trips_a_real_tree() {
        let tmp = TempDir::new().unwrap();
        let tree = tmp.path().join("tree");
        fs::create_dir_all(tree.join("d1")).unwrap();
        fs::write(tree.join("a.txt"), "0123456789").unwrap();
        fs::write(tree.join("d1/b.txt"), "").unwrap();

        let mut root = Snapshot::new(&tree);
        root.update().unwrap();

        let lib = tmp.path().join("mirrors/lib.cm");
        store(&lib, &root).unwrap();
        let entries = load(&lib).unwrap();

        // root + a.txt + d1 + d1/b.txt
        assert_eq!(entries.len(), 4);
        let mut verified = 0usize;
        root.for_each(&mut |node| {
            let entry = entries.get(node.path()).expect("every node persisted");
            assert!(entry.agrees_with(node));
            verified += 1;
        });
        assert_eq!(verified, 4);
    }

    #[test]
    fn store_replaces_previous_library_and_leaves_no_temp() {
        let tmp = TempDir::new().unwrap();
        let tree = tmp.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("f"), "x").unwrap();

        let mut root = Snapshot::new(&tree);
        root.update().unwrap();

        let lib = tmp.path().join("lib.cm");
        fs::write(&lib, "stale||1||1\n").unwrap();
        store(&lib, &root).unwrap();

        let entries = load(&lib).unwrap();
        assert!(!entries.contains_key(Path::new("stale")));
        assert!(!temp_name(&lib).exists());
    }

    #[test]
    fn directory_entries_agree_despite_mtime_drift() {
        let tmp = TempDir::new().unwrap();
        let tree = tmp.path().join("tree");
        fs::create_dir_all(tree.join("d")).unwrap();

        let mut root = Snapshot::new(&tree);
        root.update().unwrap();
        let node = root.find(&tree.join("d")).unwrap();

        let entry = LibraryEntry {
            modified_ms: node.modified_ms() + 5_000,
            size: 0,
        };
        assert!(entry.agrees_with(node));
    }

    #[test]
    fn file_entries_require_exact_mtime_and_size() {
        let tmp = TempDir::new().unwrap();
        let tree = tmp.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("f"), "abc").unwrap();

        let mut root = Snapshot::new(&tree);
        root.update().unwrap();
        let node = root.find(&tree.join("f")).unwrap();

        let exact = LibraryEntry {
            modified_ms: node.modified_ms(),
            size: node.size(),
        };
        assert!(exact.agrees_with(node));

        let drifted = LibraryEntry {
            modified_ms: node.modified_ms() + 1,
            size: node.size(),
        };
        assert!(!drifted.agrees_with(node));

        let resized = LibraryEntry {
            modified_ms: node.modified_ms(),
            size: node.size() + 1,
        };
        assert!(!resized.agrees_with(node));
    }
}
