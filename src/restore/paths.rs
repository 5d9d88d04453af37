//! Path helpers for restore targets
//!
//! Paths are first made absolute against the current directory and `.`/`..`
//! components are resolved lexically, so a live path that does not exist yet
//! can still be checked. `resolve_links` then follows whatever symlinks the
//! existing part of a path goes through.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Make a path absolute and lexically clean it
pub fn normalize_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(clean_path(&absolute))
}

/// Clean a path by resolving . and .. components without following symlinks
pub fn clean_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            _ => result.push(component),
        }
    }
    result
}

/// Canonicalize the longest existing prefix of `path` and append the rest
///
/// A path that does not exist yet still resolves through the symlinks of its
/// nearest existing ancestor.
pub fn resolve_links(path: &Path) -> io::Result<PathBuf> {
    let mut tail = Vec::new();
    let mut existing = path;
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = fs::canonicalize(existing)?;
    for name in tail.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Whether `inner` is `outer` itself or lies somewhere below it
///
/// Both paths are expected to be normalized already.
pub fn is_within(inner: &Path, outer: &Path) -> bool {
    inner.starts_with(outer)
}

/// Whether a file looks like a gzip-compressed tar archive
pub fn is_archive(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Prefix for the staging directory created next to a live resource
pub fn staging_prefix(live_name: &str) -> String {
    format!(".{}.staged-", live_name)
}

/// Pick an unused sibling path for a displaced live resource
///
/// Names look like `.<name>.previous-<timestamp>`, with a numeric suffix
/// appended if that name is already taken.
pub fn displaced_path(parent: &Path, live_name: &str, timestamp: &str) -> PathBuf {
    let base = format!(".{}.previous-{}", live_name, timestamp);
    let mut candidate = parent.join(&base);
    let mut counter = 1;
    while candidate.symlink_metadata().is_ok() {
        candidate = parent.join(format!("{}-{}", base, counter));
        counter += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path_basic() {
        let path = PathBuf::from("/home/user/app");
        assert_eq!(clean_path(&path), PathBuf::from("/home/user/app"));
    }

    #[test]
    fn test_clean_path_with_parent_dir() {
        let path = PathBuf::from("/home/user/./data/../backup");
        assert_eq!(clean_path(&path), PathBuf::from("/home/user/backup"));
    }

    #[test]
    fn test_normalize_relative_path() {
        let cwd = std::env::current_dir().unwrap();
        let normalized = normalize_path(Path::new("./a/../b")).unwrap();
        assert_eq!(normalized, clean_path(&cwd.join("b")));
    }

    #[test]
    fn test_resolve_links_missing_tail() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let resolved = resolve_links(&dir.path().join("not/yet/here")).unwrap();
        assert_eq!(resolved, root.join("not/yet/here"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_links_follows_symlinked_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("alias")).unwrap();

        let resolved = resolve_links(&root.join("alias/child")).unwrap();
        assert_eq!(resolved, root.join("real/child"));
    }

    #[test]
    fn test_is_within() {
        assert!(is_within(Path::new("/data/app/backup"), Path::new("/data/app")));
        assert!(is_within(Path::new("/data/app"), Path::new("/data/app")));
        // Component-wise, not string prefix
        assert!(!is_within(Path::new("/data/app-backup"), Path::new("/data/app")));
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive(Path::new("/backups/app.tar.gz")));
        assert!(is_archive(Path::new("/backups/APP.TGZ")));
        assert!(!is_archive(Path::new("/backups/app")));
        assert!(!is_archive(Path::new("/backups/app.zip")));
    }

    #[test]
    fn test_displaced_path_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let first = displaced_path(dir.path(), "app", "20260101000000");
        assert_eq!(first, dir.path().join(".app.previous-20260101000000"));

        std::fs::create_dir(&first).unwrap();
        let second = displaced_path(dir.path(), "app", "20260101000000");
        assert_eq!(second, dir.path().join(".app.previous-20260101000000-1"));
    }
}
