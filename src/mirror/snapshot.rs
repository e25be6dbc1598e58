//! In-memory snapshot tree of a directory and its incremental diff engine.
//!
//! Each `Snapshot` mirrors one filesystem entry and owns its children by
//! value. `update()` refreshes the tree from disk and returns the set of
//! added/updated/deleted entries since the previous refresh; `compare_to()`
//! cross-checks two trees without touching the filesystem. Diffs are returned
//! as owned records so callers never hand in out-parameters.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::core::errors::{MirrorError, Result};

// ──────────────────── diff records ────────────────────

/// Owned description of one tree entry at the moment it was diffed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub path: PathBuf,
    pub is_directory: bool,
    pub size: u64,
    pub modified_ms: i64,
}

/// Result of one `update()` pass: what changed on disk since the last pass.
///
/// A deleted or added entry stands for its whole subtree; descendants of a
/// vanished directory are not listed individually. Entries of a newly
/// discovered subtree each appear once in `added`, parent before children.
#[derive(Debug, Default)]
pub struct TreeDiff {
    pub added: Vec<ChangeRecord>,
    pub updated: Vec<ChangeRecord>,
    pub deleted: Vec<ChangeRecord>,
}

impl TreeDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Result of one `compare_to()` pass.
///
/// `missing` holds authoritative-side entries absent or diverged on the
/// target side; `extra` holds target-side entries with no authoritative
/// counterpart. Divergence is reported as "missing" because the consumer
/// repairs it by copying from the authoritative side.
#[derive(Debug, Default)]
pub struct CompareDiff {
    pub missing: Vec<ChangeRecord>,
    pub extra: Vec<ChangeRecord>,
}

impl CompareDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

// ──────────────────── snapshot tree ────────────────────

/// One filesystem entry (file or directory) as last observed.
#[derive(Debug)]
pub struct Snapshot {
    path: PathBuf,
    name: String,
    is_directory: bool,
    size: u64,
    modified_ms: i64,
    children: BTreeMap<String, Snapshot>,
}

impl Snapshot {
    /// Construct a snapshot for `path`, reading current attributes eagerly.
    ///
    /// A path that does not exist yields a non-directory node with zero size
    /// and epoch mtime; the next `update()` reports it as deleted.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut snapshot = Self {
            path,
            name,
            is_directory: false,
            size: 0,
            modified_ms: 0,
            children: BTreeMap::new(),
        };
        if let Ok(meta) = fs::symlink_metadata(&snapshot.path) {
            snapshot.is_directory = meta.is_dir();
            snapshot.size = if meta.is_dir() { 0 } else { meta.len() };
            snapshot.modified_ms = modified_millis(&meta);
        }
        snapshot
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified_ms(&self) -> i64 {
        self.modified_ms
    }

    pub fn children(&self) -> impl Iterator<Item = &Snapshot> {
        self.children.values()
    }

    /// Owned record of this node's current attributes.
    #[must_use]
    pub fn record(&self) -> ChangeRecord {
        ChangeRecord {
            path: self.path.clone(),
            is_directory: self.is_directory,
            size: self.size,
            modified_ms: self.modified_ms,
        }
    }

    // ──────────────────── update ────────────────────

    /// Refresh this node and its subtree from disk.
    ///
    /// Returns the diff against the previous in-memory state. On error the
    /// tree may be partially refreshed; callers discard the diff and retry on
    /// a later tick.
    pub fn update(&mut self) -> Result<TreeDiff> {
        let mut diff = TreeDiff::default();
        self.refresh(&mut diff)?;
        Ok(diff)
    }

    fn refresh(&mut self, diff: &mut TreeDiff) -> Result<()> {
        // Access check: absent, permission-denied, and offline-volume all look
        // the same from here — the entry is gone as far as the mirror goes.
        let Ok(meta) = fs::symlink_metadata(&self.path) else {
            diff.deleted.push(self.record());
            self.children.clear();
            return Ok(());
        };

        let is_directory = meta.is_dir();
        let size = if is_directory { 0 } else { meta.len() };
        let modified_ms = modified_millis(&meta);

        // A directory's own mtime moves whenever a child is created or
        // removed; those events surface through the children, so only a kind
        // flip counts as a change for directories.
        let changed = if is_directory && self.is_directory {
            false
        } else {
            is_directory != self.is_directory
                || size != self.size
                || modified_ms != self.modified_ms
        };

        self.is_directory = is_directory;
        self.size = size;
        self.modified_ms = modified_ms;

        if changed {
            diff.updated.push(self.record());
        }

        if self.is_directory {
            self.refresh_children(diff)?;
        } else if !self.children.is_empty() {
            // Directory replaced by a file of the same name: the subtree is
            // gone. The self transition was recorded above.
            for child in self.children.values() {
                diff.deleted.push(child.record());
            }
            self.children.clear();
        }

        Ok(())
    }

    fn refresh_children(&mut self, diff: &mut TreeDiff) -> Result<()> {
        let mut vanished: BTreeSet<String> = self.children.keys().cloned().collect();

        let reader = fs::read_dir(&self.path).map_err(|e| MirrorError::Refresh {
            path: self.path.clone(),
            details: e.to_string(),
        })?;

        let mut names = Vec::new();
        for entry in reader {
            let entry = entry.map_err(|e| MirrorError::Refresh {
                path: self.path.clone(),
                details: e.to_string(),
            })?;
            // Symlinks are neither followed nor mirrored.
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort_unstable();

        for name in names {
            if let Some(child) = self.children.get_mut(&name) {
                child.refresh(diff)?;
                vanished.remove(&name);
            } else {
                let child = Snapshot::new(self.path.join(&name));
                diff.added.push(child.record());
                self.children
                    .entry(name)
                    .or_insert(child)
                    .refresh(diff)?;
            }
        }

        for name in vanished {
            if let Some(child) = self.children.remove(&name) {
                diff.deleted.push(child.record());
            }
        }

        Ok(())
    }

    // ──────────────────── compare ────────────────────

    /// Cross-check this tree (target side) against an authoritative tree.
    ///
    /// Neither snapshot is mutated.
    #[must_use]
    pub fn compare_to(&self, authoritative: &Snapshot) -> CompareDiff {
        let mut diff = CompareDiff::default();
        self.compare_children(authoritative, &mut diff);
        diff
    }

    fn compare_children(&self, authoritative: &Snapshot, diff: &mut CompareDiff) {
        for (name, theirs) in &authoritative.children {
            match self.children.get(name) {
                Some(mine) => {
                    if mine.is_directory != theirs.is_directory || mine.size != theirs.size {
                        diff.missing.push(theirs.record());
                    }
                    mine.compare_children(theirs, diff);
                }
                // Present only on the authoritative side: the subtree root
                // stands for its descendants.
                None => diff.missing.push(theirs.record()),
            }
        }

        for (name, mine) in &self.children {
            if !authoritative.children.contains_key(name) {
                diff.extra.push(mine.record());
            }
        }
    }

    // ──────────────────── navigation & persistence ────────────────────

    /// Look up the node at an absolute path inside this subtree.
    #[must_use]
    pub fn find(&self, path: &Path) -> Option<&Snapshot> {
        let relative = path.strip_prefix(&self.path).ok()?;
        let mut current = self;
        for component in relative.components() {
            let name = component.as_os_str().to_string_lossy();
            current = current.children.get(name.as_ref())?;
        }
        Some(current)
    }

    /// Visit every node in pre-order, parent before children.
    pub fn for_each<'a>(&'a self, visit: &mut impl FnMut(&'a Snapshot)) {
        visit(self);
        for child in self.children.values() {
            child.for_each(visit);
        }
    }

    /// Write one `path||mtime||size` line per node, pre-order.
    pub fn store<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{}||{}||{}",
            self.path.display(),
            self.modified_ms,
            self.size
        )?;
        for child in self.children.values() {
            child.store(out)?;
        }
        Ok(())
    }
}

/// Modification time as whole milliseconds since the Unix epoch.
///
/// Pre-epoch timestamps map to negative values; an unreadable mtime maps to 0.
fn modified_millis(meta: &fs::Metadata) -> i64 {
    let Ok(modified) = meta.modified() else {
        return 0;
    };
    match modified.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_millis()).map_or(i64::MIN, |v| -v),
    }
}

// ──────────────────── tests ────────────────────
