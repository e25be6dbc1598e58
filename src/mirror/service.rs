//! FileService: the narrow capability interface for destructive filesystem
//! operations.
//!
//! Everything that writes to the mirror goes through this trait, which keeps
//! the orchestrator testable (tests substitute recording fakes) and keeps the
//! security gate the single choke point in front of real damage.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use crate::core::errors::{MirrorError, Result};

/// Base unit for the copy buffer: `buffer_kib` multiplies this.
pub const BUFFER_UNIT_BYTES: usize = 1024;

/// Primitive filesystem operations consumed by the mirror orchestrator.
pub trait FileService {
    /// Copy file bytes from `source` to `target`, creating all missing parent
    /// directories of `target`. An existing target file is overwritten.
    /// `buffer_kib` sets the transfer block size in KiB (minimum 1).
    fn copy(&self, source: &Path, target: &Path, buffer_kib: u64) -> Result<()>;

    /// Recursively remove the file or directory tree rooted at `path`,
    /// children before parent. Succeeds silently if `path` does not exist.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Create a directory and all missing parents. Idempotent.
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Create an empty file, ensuring parents exist. Idempotent.
    fn create_file(&self, path: &Path) -> Result<()>;
}

/// The real implementation: a thin adapter over the OS filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileService;

impl FileService for OsFileService {
    fn copy(&self, source: &Path, target: &Path, buffer_kib: u64) -> Result<()> {
        self.create_file(target)?;

        let mut reader = File::open(source).map_err(|e| map_io(source, e))?;
        let mut writer = File::create(target).map_err(|e| map_io(target, e))?;

        let buffer_bytes = usize::try_from(buffer_kib.max(1))
            .unwrap_or(usize::MAX / BUFFER_UNIT_BYTES)
            .saturating_mul(BUFFER_UNIT_BYTES);
        let mut buffer = vec![0u8; buffer_bytes];

        loop {
            let read = reader.read(&mut buffer).map_err(|e| map_io(source, e))?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..read])
                .map_err(|e| map_io(target, e))?;
        }

        writer.flush().map_err(|e| map_io(target, e))?;
        drop(writer);

        // Carry the source mtime over so mirror timestamps match the origin.
        // Best-effort; some filesystems reject explicit mtimes.
        if let Ok(meta) = fs::symlink_metadata(source) {
            let _ = filetime::set_file_mtime(
                target,
                filetime::FileTime::from_last_modification_time(&meta),
            );
        }

        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(map_io(path, e)),
        };

        if meta.is_dir() {
            delete_dir_contents(path)?;
            match fs::remove_dir(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(map_io(path, e)),
            }
        } else {
            match fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(map_io(path, e)),
            }
        }
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| map_io(path, e))
    }

    fn create_file(&self, path: &Path) -> Result<()> {
        ensure_parent(path)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(|_| ())
            .map_err(|e| map_io(path, e))
    }
}

/// Remove every entry under `dir`, recursing into subdirectories first.
fn delete_dir_contents(dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(map_io(dir, e)),
    };

    for entry in entries {
        let entry = entry.map_err(|e| map_io(dir, e))?;
        let path = entry.path();
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(map_io(&path, e)),
        };

        if meta.is_dir() {
            delete_dir_contents(&path)?;
            if let Err(e) = fs::remove_dir(&path)
                && e.kind() != ErrorKind::NotFound
            {
                return Err(map_io(&path, e));
            }
        } else if let Err(e) = fs::remove_file(&path)
            && e.kind() != ErrorKind::NotFound
        {
            return Err(map_io(&path, e));
        }
    }

    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| map_io(parent, e))?;
    }
    Ok(())
}

fn map_io(path: &Path, source: std::io::Error) -> MirrorError {
    if source.kind() == ErrorKind::PermissionDenied {
        MirrorError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        MirrorError::io(path, source)
    }
}
