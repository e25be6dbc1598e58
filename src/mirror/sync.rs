//! The mirror orchestrator: one reconciliation pass ("tick") at a time.
//!
//! Pipeline per tick: refresh origin snapshot -> apply its diff to the mirror
//! -> refresh target snapshot -> cross-compare -> repair divergence ->
//! persist the library. Every destructive operation runs behind the security
//! gate: if either root stops existing mid-tick, the gate returns the fatal
//! `RootUnreachable` error and nothing further is deleted — a disappearing
//! origin volume must never cause the mirror to be wiped.
//!
//! Per-item failures are logged and the tick continues; the next tick's
//! compare pass self-heals anything that was missed. Only whole-tree refresh
//! failures and the security gate abort a tick.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::config::Config;
use crate::core::errors::{MirrorError, Result};
use crate::core::paths::{library_file, map_to_target, mirror_name, resolve_absolute_path};
use crate::logger::{ActivityEvent, ActivityLoggerHandle};
use crate::mirror::library;
use crate::mirror::service::FileService;
use crate::mirror::snapshot::{ChangeRecord, Snapshot};

// ──────────────────── tick results ────────────────────

/// Summary of one completed reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub missing: usize,
    pub extra: usize,
    /// Per-item copy/delete failures that did not abort the tick.
    pub failures: usize,
    pub duration: Duration,
}

/// Outcome of a `check()` call.
#[derive(Debug)]
pub enum TickOutcome {
    Completed(TickReport),
    /// A previous tick still holds the lock; this one was dropped.
    Skipped,
}

// ──────────────────── mirror ────────────────────

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("mirror_name", &self.mirror_name)
            .field("origin_root", &self.origin_root)
            .field("target_root", &self.target_root)
            .finish_non_exhaustive()
    }
}

/// Owns the two snapshot trees and drives reconciliation between them.
pub struct Mirror {
    origin: Snapshot,
    target: Snapshot,
    origin_root: PathBuf,
    target_root: PathBuf,
    service: Box<dyn FileService>,
    buffer_kib: u64,
    max_file_size: u64,
    mirror_name: String,
    library_path: PathBuf,
    busy: Arc<AtomicBool>,
    lock: Arc<Mutex<()>>,
    logger: Option<ActivityLoggerHandle>,
}

impl Mirror {
    /// Build a mirror pair from a validated configuration.
    ///
    /// The target snapshot is always refreshed once so pre-existing mirror
    /// content is indexed. The origin snapshot is only refreshed when a
    /// persisted library exists — otherwise the first tick reports the whole
    /// tree as added, which is exactly a from-scratch sync.
    pub fn new(
        config: &Config,
        service: Box<dyn FileService>,
        logger: Option<ActivityLoggerHandle>,
    ) -> Result<Self> {
        let origin_root = resolve_absolute_path(&config.mirror.origin);
        let target_root = resolve_absolute_path(&config.mirror.target);

        let origin = Snapshot::new(&origin_root);
        let mut target = Snapshot::new(&target_root);

        if !origin.is_directory() {
            return Err(MirrorError::InvalidConfig {
                details: format!("origin {} is not a directory", origin_root.display()),
            });
        }
        if !target.is_directory() {
            return Err(MirrorError::InvalidConfig {
                details: format!("mirror {} is not a directory", target_root.display()),
            });
        }

        target.update()?;

        let name = mirror_name(&origin_root, &target_root);
        let library_path = library_file(&config.paths.library_dir, &name);

        let mut mirror = Self {
            origin,
            target,
            origin_root,
            target_root,
            service,
            buffer_kib: config.mirror.buffer_kib,
            max_file_size: config.mirror.max_file_size,
            mirror_name: name,
            library_path,
            busy: Arc::new(AtomicBool::new(false)),
            lock: Arc::new(Mutex::new(())),
            logger,
        };

        if mirror.library_path.exists() {
            mirror.origin.update()?;
            mirror.load_library()?;
        }

        Ok(mirror)
    }

    /// Stable identifier for this (origin, target) pair.
    #[must_use]
    pub fn mirror_name(&self) -> &str {
        &self.mirror_name
    }

    /// Location of the persisted library file.
    #[must_use]
    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    /// Whether a tick is currently running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }

    // ──────────────────── the tick ────────────────────

    /// Run one reconciliation pass. At-most-one: a call arriving while a
    /// previous tick holds the lock is dropped, not queued.
    pub fn check(&mut self) -> Result<TickOutcome> {
        let lock = Arc::clone(&self.lock);
        let Some(_guard) = lock.try_lock() else {
            self.log(ActivityEvent::TickSkipped);
            return Ok(TickOutcome::Skipped);
        };

        let busy = Arc::clone(&self.busy);
        busy.store(true, Ordering::Relaxed);
        let outcome = self.run_tick();
        busy.store(false, Ordering::Relaxed);

        outcome.map(TickOutcome::Completed)
    }

    fn run_tick(&mut self) -> Result<TickReport> {
        let started = Instant::now();
        let mut report = TickReport::default();

        // 1. Origin diff. A whole-tree refresh failure abandons the tick;
        //    the partial diff is discarded with it.
        let diff = self.origin.update()?;
        report.added = diff.added.len();
        report.updated = diff.updated.len();
        report.deleted = diff.deleted.len();

        // 2. Apply additions, then modifications.
        for record in diff.added.iter().chain(diff.updated.iter()) {
            self.apply_copy(record, &mut report)?;
        }

        // 3. Apply deletions.
        for record in &diff.deleted {
            self.apply_delete(&record.path, &mut report)?;
        }

        // 4. Target reconciliation: pick up external edits and previous
        //    failed copies, then cross-compare against origin.
        self.target.update()?;
        let compare = self.target.compare_to(&self.origin);
        report.missing = compare.missing.len();
        report.extra = compare.extra.len();

        // 5. Repair divergence. `extra` records are target-side paths and are
        //    deleted in place.
        for record in &compare.missing {
            self.apply_copy(record, &mut report)?;
        }
        for record in &compare.extra {
            match self.secure_delete(&record.path) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    report.failures += 1;
                    self.log(ActivityEvent::DeleteFailed {
                        path: record.path.display().to_string(),
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        // 6. Persist when the origin changed.
        if !diff.is_empty() {
            self.store_library();
        }

        report.duration = started.elapsed();
        Ok(report)
    }

    fn apply_copy(&self, record: &ChangeRecord, report: &mut TickReport) -> Result<()> {
        match self.copy_record(record) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                report.failures += 1;
                self.log(ActivityEvent::CopyFailed {
                    path: record.path.display().to_string(),
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
                Ok(())
            }
        }
    }

    fn apply_delete(&self, origin_path: &Path, report: &mut TickReport) -> Result<()> {
        match self.delete_from_mirror(origin_path) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                report.failures += 1;
                self.log(ActivityEvent::DeleteFailed {
                    path: origin_path.display().to_string(),
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
                Ok(())
            }
        }
    }

    // ──────────────────── library ────────────────────

    /// Cross-reference the persisted library against the freshly refreshed
    /// origin snapshot.
    ///
    /// Agreeing entries need nothing. Diverged or unknown nodes are copied to
    /// the mirror. Entries left over in the library are paths that existed
    /// last run but are gone now: their mirror-side counterparts are deleted,
    /// since those are deletions the process missed while it was down.
    fn load_library(&mut self) -> Result<()> {
        let entries = match library::load(&self.library_path) {
            Ok(entries) => entries,
            Err(e) => {
                // A broken library only costs extra copies on the compare
                // pass; never fatal.
                self.log(ActivityEvent::Error {
                    code: e.code().to_string(),
                    message: format!("library load failed: {e}"),
                });
                return Ok(());
            }
        };

        let total = entries.len();
        let mut remaining = entries;
        let mut queued: Vec<ChangeRecord> = Vec::new();

        self.origin.for_each(&mut |node| {
            match remaining.remove(node.path()) {
                Some(entry) if entry.agrees_with(node) => {}
                _ => queued.push(node.record()),
            }
        });

        let stale: Vec<PathBuf> = remaining.into_keys().collect();

        self.log(ActivityEvent::LibraryLoaded {
            entries: total,
            queued_copies: queued.len(),
            stale_deletes: stale.len(),
        });

        let mut report = TickReport::default();
        for path in &stale {
            self.apply_delete(path, &mut report)?;
        }
        for record in &queued {
            self.apply_copy(record, &mut report)?;
        }

        if !queued.is_empty() || !stale.is_empty() {
            self.store_library();
        }

        Ok(())
    }

    /// Persist the origin snapshot. Failures are logged, never fatal: the
    /// next restart re-copies more than necessary but still converges.
    fn store_library(&self) {
        match library::store(&self.library_path, &self.origin) {
            Ok(()) => {
                let mut entries = 0usize;
                self.origin.for_each(&mut |_| entries += 1);
                self.log(ActivityEvent::LibraryStored { entries });
            }
            Err(e) => {
                self.log(ActivityEvent::Error {
                    code: e.code().to_string(),
                    message: format!("library store failed: {e}"),
                });
            }
        }
    }

    // ──────────────────── copy & delete ────────────────────

    fn copy_record(&self, record: &ChangeRecord) -> Result<()> {
        // The node may have been dropped from the tree by a same-tick race;
        // the compare pass will pick anything real back up next tick.
        let Some(node) = self.origin.find(&record.path) else {
            return Ok(());
        };
        self.copy_node(node)
    }

    fn copy_node(&self, node: &Snapshot) -> Result<()> {
        // Raced away since the diff was computed.
        if fs::symlink_metadata(node.path()).is_err() {
            return Ok(());
        }
        if !node.is_directory() && node.size() > self.max_file_size {
            return Ok(());
        }

        self.guard_roots()?;

        let target_path = map_to_target(node.path(), &self.origin_root, &self.target_root)?;

        if node.is_directory() {
            // An entry of the wrong kind blocks create_dir; an existing
            // directory is left alone so its unchanged contents survive.
            if let Ok(meta) = fs::symlink_metadata(&target_path)
                && !meta.is_dir()
            {
                let _ = self.service.delete(&target_path);
            }
            self.service.create_dir(&target_path)?;

            // Copy children individually so each file is resumable on its
            // own; one bad file does not sink the subtree.
            for child in node.children() {
                match self.copy_node(child) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        self.log(ActivityEvent::CopyFailed {
                            path: child.path().display().to_string(),
                            code: e.code().to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        } else {
            if fs::symlink_metadata(&target_path).is_ok() {
                let _ = self.service.delete(&target_path);
            }
            let copy_started = Instant::now();
            self.service
                .copy(node.path(), &target_path, self.buffer_kib)?;
            self.log(ActivityEvent::FileCopied {
                path: node.path().display().to_string(),
                size: node.size(),
                duration_ms: u64::try_from(copy_started.elapsed().as_millis())
                    .unwrap_or(u64::MAX),
            });
        }

        Ok(())
    }

    fn delete_from_mirror(&self, origin_path: &Path) -> Result<()> {
        let target_path = map_to_target(origin_path, &self.origin_root, &self.target_root)?;
        self.secure_delete(&target_path)
    }

    fn secure_delete(&self, target_path: &Path) -> Result<()> {
        self.guard_roots()?;
        self.service.delete(target_path)?;
        self.log(ActivityEvent::EntryDeleted {
            path: target_path.display().to_string(),
        });
        Ok(())
    }

    /// The security gate: both roots must still exist before anything
    /// destructive happens.
    fn guard_roots(&self) -> Result<()> {
        if !self.origin_root.exists() {
            return Err(MirrorError::RootUnreachable {
                path: self.origin_root.clone(),
            });
        }
        if !self.target_root.exists() {
            return Err(MirrorError::RootUnreachable {
                path: self.target_root.clone(),
            });
        }
        Ok(())
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

// ──────────────────── tests ────────────────────
