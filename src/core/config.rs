//! Configuration model: TOML file + CLI overrides + validation.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{MirrorError, Result};
use crate::core::paths::resolve_absolute_path;

/// Default copy buffer size in KiB when `buffer_kib` is not given.
pub const DEFAULT_BUFFER_KIB: u64 = 4;

/// Full dirmirror configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub mirror: MirrorConfig,
    pub daemon: DaemonConfig,
    pub paths: PathsConfig,
}

/// The mirror pair and its transfer knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MirrorConfig {
    /// Source directory. Never written to.
    pub origin: PathBuf,
    /// Destination directory. Overwritten to match origin.
    pub target: PathBuf,
    /// Tick period in milliseconds.
    pub interval_ms: u64,
    /// Files larger than this many bytes are not mirrored.
    pub max_file_size: u64,
    /// Copy buffer size in KiB.
    pub buffer_kib: u64,
}

/// Daemon loop behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Run one synchronous check before the interval loop starts.
    pub initial_check: bool,
}

/// Filesystem paths used by dirmirror itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding persisted snapshot libraries.
    pub library_dir: PathBuf,
    /// JSONL activity log. `None` logs to `<library_dir>/activity.jsonl`.
    pub log_file: Option<PathBuf>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            origin: PathBuf::new(),
            target: PathBuf::new(),
            interval_ms: 0,
            max_file_size: 0,
            buffer_kib: DEFAULT_BUFFER_KIB,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            initial_check: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            library_dir: PathBuf::from("./mirrors"),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MirrorError::MissingConfig {
                    path: path.to_path_buf(),
                }
            } else {
                MirrorError::io(path, e)
            }
        })?;

        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Validate the configuration, producing a one-line diagnostic on failure.
    pub fn validate(&self) -> Result<()> {
        let m = &self.mirror;

        if m.origin.as_os_str().is_empty() {
            return Err(invalid("origin is required"));
        }
        if m.target.as_os_str().is_empty() {
            return Err(invalid("mirror is required"));
        }
        if m.interval_ms == 0 {
            return Err(invalid("interval must be a positive number of milliseconds"));
        }
        if m.max_file_size == 0 {
            return Err(invalid("maxsize must be a positive number of bytes"));
        }
        if m.buffer_kib == 0 {
            return Err(invalid("buffer multiplier must be at least 1 KiB"));
        }

        let origin = resolve_absolute_path(&m.origin);
        let target = resolve_absolute_path(&m.target);

        if !origin.is_dir() {
            return Err(invalid(&format!(
                "origin {} does not exist or is not a directory",
                m.origin.display()
            )));
        }
        if !target.is_dir() {
            return Err(invalid(&format!(
                "mirror {} does not exist or is not a directory",
                m.target.display()
            )));
        }
        // Nested roots would make the mirror feed on itself.
        if origin == target || origin.starts_with(&target) || target.starts_with(&origin) {
            return Err(invalid(&format!(
                "origin {} and mirror {} must be disjoint directories",
                origin.display(),
                target.display()
            )));
        }

        Ok(())
    }

    /// Effective activity log path.
    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.paths
            .log_file
            .clone()
            .unwrap_or_else(|| self.paths.library_dir.join("activity.jsonl"))
    }
}

fn invalid(details: &str) -> MirrorError {
    MirrorError::InvalidConfig {
        details: details.to_string(),
    }
}
