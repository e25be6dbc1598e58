//! Path utilities: normalization, origin→target mapping, mirror naming.

use std::env;
use std::path::{Component, Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use crate::core::errors::{MirrorError, Result};

/// File extension for persisted snapshot libraries.
pub const LIBRARY_EXTENSION: &str = "cm";

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve
/// symlinks and normalize components. If it fails (e.g. path does not exist),
/// the path is made absolute relative to CWD and `..`/`.` components are
/// resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

/// Map an origin-side path to its mirror-side counterpart.
///
/// The relative path from `origin_root` is preserved under `target_root`:
/// `/origin/a/b.txt` with roots `/origin` and `/mirror` maps to
/// `/mirror/a/b.txt`. Paths outside `origin_root` are an error — they can
/// only come from a corrupt library line and must never drive a delete.
pub fn map_to_target(path: &Path, origin_root: &Path, target_root: &Path) -> Result<PathBuf> {
    let relative = path
        .strip_prefix(origin_root)
        .map_err(|_| MirrorError::Runtime {
            details: format!(
                "path {} is not under origin root {}",
                path.display(),
                origin_root.display()
            ),
        })?;
    Ok(target_root.join(relative))
}

/// Derive the stable identifier for an (origin, target) pair.
///
/// SHA-256 of `"{origin}-{target}"`, base64-encoded, with the three
/// filename-hostile base64 characters replaced by literals: `/` → `slash`,
/// `+` → `plus`, `=` → `equals`. The same pair always yields the same name,
/// so restarts find their library file.
#[must_use]
pub fn mirror_name(origin: &Path, target: &Path) -> String {
    let unhashed = format!("{}-{}", origin.display(), target.display());
    let hash = Sha256::digest(unhashed.as_bytes());
    STANDARD
        .encode(hash)
        .replace('/', "slash")
        .replace('+', "plus")
        .replace('=', "equals")
}

/// Location of the persisted library for a mirror name.
#[must_use]
pub fn library_file(library_dir: &Path, mirror_name: &str) -> PathBuf {
    library_dir.join(format!("{mirror_name}.{LIBRARY_EXTENSION}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_existing_path_canonically() {
        let cwd = env::current_dir().unwrap();
        let resolved = resolve_absolute_path(Path::new("."));
        assert_eq!(resolved, std::fs::canonicalize(&cwd).unwrap());
    }

    #[test]
    fn normalizes_nonexistent_path_syntactically() {
        let input = Path::new("/nonexistent/foo/../bar");
        assert!(std::fs::canonicalize(input).is_err());
        assert_eq!(
            resolve_absolute_path(input),
            Path::new("/nonexistent/bar")
        );
    }

    #[test]
    fn maps_relative_path_under_target_root() {
        let mapped = map_to_target(
            Path::new("/origin/d1/b.txt"),
            Path::new("/origin"),
            Path::new("/mirror"),
        )
        .unwrap();
        assert_eq!(mapped, Path::new("/mirror/d1/b.txt"));
    }

    #[test]
    fn maps_root_to_root() {
        let mapped = map_to_target(
            Path::new("/origin"),
            Path::new("/origin"),
            Path::new("/mirror"),
        )
        .unwrap();
        assert_eq!(mapped, Path::new("/mirror"));
    }

    #[test]
    fn rejects_path_outside_origin_root() {
        let result = map_to_target(
            Path::new("/elsewhere/file"),
            Path::new("/origin"),
            Path::new("/mirror"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn mirror_name_is_stable() {
        let a = mirror_name(Path::new("/data/src"), Path::new("/data/dst"));
        let b = mirror_name(Path::new("/data/src"), Path::new("/data/dst"));
        assert_eq!(a, b);
    }

    #[test]
    fn mirror_name_distinguishes_pairs() {
        let a = mirror_name(Path::new("/data/src"), Path::new("/data/dst"));
        let b = mirror_name(Path::new("/data/dst"), Path::new("/data/src"));
        assert_ne!(a, b);
    }

    #[test]
    fn mirror_name_is_filename_safe() {
        // Raw base64 of a SHA-256 digest always ends with '=' padding and may
        // contain '/' and '+'; all three must be substituted.
        let name = mirror_name(Path::new("/a"), Path::new("/b"));
        assert!(!name.contains('/'));
        assert!(!name.contains('+'));
        assert!(!name.contains('='));
        assert!(name.ends_with("equals"));
    }

    #[test]
    fn library_file_uses_cm_extension() {
        let path = library_file(Path::new("./mirrors"), "abc123");
        assert_eq!(path, Path::new("./mirrors/abc123.cm"));
    }
}
