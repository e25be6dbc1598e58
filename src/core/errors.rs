//! DMR-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Top-level error type for dirmirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("[DMR-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DMR-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DMR-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DMR-2001] root directory unreachable: {path}")]
    RootUnreachable { path: PathBuf },

    #[error("[DMR-2002] snapshot refresh failure for {path}: {details}")]
    Refresh { path: PathBuf, details: String },

    #[error("[DMR-2101] library failure in {context}: {details}")]
    Library {
        context: &'static str,
        details: String,
    },

    #[error("[DMR-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[DMR-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DMR-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DMR-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl MirrorError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DMR-1001",
            Self::MissingConfig { .. } => "DMR-1002",
            Self::ConfigParse { .. } => "DMR-1003",
            Self::RootUnreachable { .. } => "DMR-2001",
            Self::Refresh { .. } => "DMR-2002",
            Self::Library { .. } => "DMR-2101",
            Self::PermissionDenied { .. } => "DMR-3001",
            Self::Io { .. } => "DMR-3002",
            Self::ChannelClosed { .. } => "DMR-3003",
            Self::Runtime { .. } => "DMR-3900",
        }
    }

    /// Whether retrying on a later tick might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Refresh { .. }
                | Self::Library { .. }
                | Self::ChannelClosed { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether the error must abort the daemon instead of the current item.
    ///
    /// A vanished root means destructive operations can no longer be trusted:
    /// the scheduler performs a single clean shutdown when it sees this.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::RootUnreachable { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(value: serde_json::Error) -> Self {
        Self::Library {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for MirrorError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
