//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use dirmirror::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{MirrorError, Result};

// Mirror engine
pub use crate::mirror::library::{self, LibraryEntry};
pub use crate::mirror::service::{FileService, OsFileService};
pub use crate::mirror::snapshot::{ChangeRecord, CompareDiff, Snapshot, TreeDiff};
pub use crate::mirror::sync::{Mirror, TickOutcome, TickReport};

// Daemon
pub use crate::daemon::loop_main::SyncDaemon;
pub use crate::daemon::signals::SignalHandler;

// Logging
pub use crate::logger::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
