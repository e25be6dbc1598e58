//! Activity logging: a dedicated logger thread behind a bounded channel.
//!
//! The reconciliation loop sends `ActivityEvent`s via non-blocking
//! `try_send()` so a slow disk can never stall a tick; the logger thread owns
//! the `JsonlWriter` and is the only place log I/O happens.

pub mod jsonl;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{MirrorError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── event model ────────────────────

/// Events emitted by the mirror and the daemon loop.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    DaemonStarted {
        version: String,
        mirror_name: String,
    },
    DaemonStopped {
        reason: String,
        uptime_secs: u64,
    },
    TickCompleted {
        added: usize,
        updated: usize,
        deleted: usize,
        missing: usize,
        extra: usize,
        failures: usize,
        duration_ms: u64,
    },
    TickSkipped,
    TickFailed {
        code: String,
        message: String,
    },
    FileCopied {
        path: String,
        size: u64,
        duration_ms: u64,
    },
    CopyFailed {
        path: String,
        code: String,
        message: String,
    },
    EntryDeleted {
        path: String,
    },
    DeleteFailed {
        path: String,
        code: String,
        message: String,
    },
    LibraryLoaded {
        entries: usize,
        queued_copies: usize,
        stale_deletes: usize,
    },
    LibraryStored {
        entries: usize,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Thread-safe, cheaply-cloneable handle for sending log events.
///
/// Wraps a bounded crossbeam `Sender`; `send()` uses `try_send()` so callers
/// are never blocked by logging back-pressure.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking; a full channel drops
    /// the event and bumps the counter. Disconnected is fine during shutdown.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of events dropped due to channel back-pressure.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown of the logger thread.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── logger thread ────────────────────

/// Spawn the logger thread. Returns the send handle and the join handle.
pub fn spawn_logger(config: JsonlConfig) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(CHANNEL_CAPACITY);
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::new(AtomicU64::new(0)),
    };

    let join = thread::Builder::new()
        .name("dirmirror-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config))
        .map_err(|e| MirrorError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig) {
    let mut writer = JsonlWriter::open(config);

    while let Ok(event) = rx.recv() {
        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        writer.write_entry(&entry_for(event));
        writer.flush();
    }

    writer.flush();
}

fn entry_for(event: ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::DaemonStarted {
            version,
            mirror_name,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStart, Severity::Info);
            e.details = Some(format!("dirmirror {version} mirror={mirror_name}"));
            e
        }
        ActivityEvent::DaemonStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStop, Severity::Info);
            e.duration_ms = Some(uptime_secs.saturating_mul(1_000));
            e.details = Some(reason);
            e
        }
        ActivityEvent::TickCompleted {
            added,
            updated,
            deleted,
            missing,
            extra,
            failures,
            duration_ms,
        } => {
            let severity = if failures > 0 {
                Severity::Warning
            } else {
                Severity::Info
            };
            let mut e = LogEntry::new(EventType::TickComplete, severity);
            e.added = Some(added);
            e.updated = Some(updated);
            e.deleted = Some(deleted);
            e.missing = Some(missing);
            e.extra = Some(extra);
            e.failures = Some(failures);
            e.duration_ms = Some(duration_ms);
            e
        }
        ActivityEvent::TickSkipped => LogEntry::new(EventType::TickSkip, Severity::Warning),
        ActivityEvent::TickFailed { code, message } => {
            let mut e = LogEntry::new(EventType::TickFail, Severity::Warning);
            e.error_code = Some(code);
            e.error_message = Some(message);
            e
        }
        ActivityEvent::FileCopied {
            path,
            size,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::FileCopy, Severity::Info);
            e.path = Some(path);
            e.size = Some(size);
            e.duration_ms = Some(duration_ms);
            e
        }
        ActivityEvent::CopyFailed {
            path,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::FileCopy, Severity::Warning);
            e.path = Some(path);
            e.error_code = Some(code);
            e.error_message = Some(message);
            e
        }
        ActivityEvent::EntryDeleted { path } => {
            let mut e = LogEntry::new(EventType::EntryDelete, Severity::Info);
            e.path = Some(path);
            e
        }
        ActivityEvent::DeleteFailed {
            path,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::EntryDelete, Severity::Warning);
            e.path = Some(path);
            e.error_code = Some(code);
            e.error_message = Some(message);
            e
        }
        ActivityEvent::LibraryLoaded {
            entries,
            queued_copies,
            stale_deletes,
        } => {
            let mut e = LogEntry::new(EventType::LibraryLoad, Severity::Info);
            e.entries = Some(entries);
            e.details = Some(format!(
                "queued_copies={queued_copies} stale_deletes={stale_deletes}"
            ));
            e
        }
        ActivityEvent::LibraryStored { entries } => {
            let mut e = LogEntry::new(EventType::LibraryStore, Severity::Info);
            e.entries = Some(entries);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code);
            e.error_message = Some(message);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::DaemonStop, Severity::Info),
    }
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_write_shutdown_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let (handle, join) = spawn_logger(JsonlConfig {
            path: path.clone(),
            ..JsonlConfig::default()
        })
        .unwrap();

        handle.send(ActivityEvent::DaemonStarted {
            version: "test".to_string(),
            mirror_name: "abc".to_string(),
        });
        handle.send(ActivityEvent::TickCompleted {
            added: 5,
            updated: 0,
            deleted: 0,
            missing: 0,
            extra: 0,
            failures: 0,
            duration_ms: 12,
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let tick: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(tick["event"], "tick_complete");
        assert_eq!(tick["added"], 5);
    }

    #[test]
    fn failures_escalate_tick_severity() {
        let entry = entry_for(ActivityEvent::TickCompleted {
            added: 0,
            updated: 0,
            deleted: 0,
            missing: 0,
            extra: 1,
            failures: 2,
            duration_ms: 3,
        });
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(entry.failures, Some(2));
    }

    #[test]
    fn copy_failure_carries_code_and_path() {
        let entry = entry_for(ActivityEvent::CopyFailed {
            path: "/data/a".to_string(),
            code: "DMR-3002".to_string(),
            message: "io failure".to_string(),
        });
        assert_eq!(entry.event, EventType::FileCopy);
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(entry.error_code.as_deref(), Some("DMR-3002"));
    }

    #[test]
    fn handle_tracks_dropped_events() {
        let (tx, _rx) = bounded::<ActivityEvent>(1);
        let handle = ActivityLoggerHandle {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        };

        handle.send(ActivityEvent::TickSkipped);
        handle.send(ActivityEvent::TickSkipped); // channel full, dropped
        assert_eq!(handle.dropped_events(), 1);
    }
}
