//! Writing a backup into the staging directory

use flate2::read::GzDecoder;
use fs_extra::dir::{self, CopyOptions};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path};
use tar::Archive;

use super::paths;

/// Kind of backup resource found on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    /// A plain directory tree
    Directory,
    /// A gzip-compressed tar archive holding the tree
    Archive,
}

impl BackupKind {
    /// Classify an existing backup path, `None` if it is neither kind
    pub fn detect(path: &Path) -> Option<Self> {
        if path.is_dir() {
            Some(Self::Directory)
        } else if path.is_file() && paths::is_archive(path) {
            Some(Self::Archive)
        } else {
            None
        }
    }
}

/// Fills a freshly created, empty staging directory from a backup
pub trait BackupCopier {
    fn copy_into(&self, backup: &Path, kind: BackupKind, staged: &Path) -> io::Result<()>;
}

/// Default copier: recursive copy for directories, unpack for archives
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeCopier;

impl BackupCopier for TreeCopier {
    fn copy_into(&self, backup: &Path, kind: BackupKind, staged: &Path) -> io::Result<()> {
        match kind {
            BackupKind::Directory => copy_dir_contents(backup, staged),
            BackupKind::Archive => unpack_archive(backup, staged),
        }
    }
}

/// Copy directory contents into an existing directory
fn copy_dir_contents(src: &Path, dst: &Path) -> io::Result<()> {
    let options = CopyOptions::new().content_only(true).overwrite(true);
    dir::copy(src, dst, &options).map_err(|e| {
        io::Error::other(format!(
            "failed to copy contents of {} to {}: {}",
            src.display(),
            dst.display(),
            e
        ))
    })?;
    Ok(())
}

/// Extract a .tar.gz archive into an existing directory
fn unpack_archive(archive_path: &Path, dst: &Path) -> io::Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.unpack(dst)
}

/// Mode recorded for the archive's own root (`.` or `./`), if it has one
pub fn archive_root_permissions(archive_path: &Path) -> io::Result<Option<fs::Permissions>> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive.entries()? {
        let entry = entry?;
        let is_root = entry
            .path()?
            .components()
            .all(|c| matches!(c, Component::CurDir));
        if is_root && entry.header().entry_type().is_dir() {
            return Ok(mode_permissions(entry.header().mode()?));
        }
    }
    Ok(None)
}

#[cfg(unix)]
fn mode_permissions(mode: u32) -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn mode_permissions(_mode: u32) -> Option<fs::Permissions> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    #[test]
    fn test_detect_kind() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("app.tar.gz");
        let plain = dir.path().join("notes.txt");
        fs::write(&archive, b"").unwrap();
        fs::write(&plain, b"").unwrap();

        assert_eq!(BackupKind::detect(dir.path()), Some(BackupKind::Directory));
        assert_eq!(BackupKind::detect(&archive), Some(BackupKind::Archive));
        assert_eq!(BackupKind::detect(&plain), None);
        assert_eq!(BackupKind::detect(&dir.path().join("missing")), None);
    }

    #[test]
    fn test_copy_directory_contents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("backup");
        let dst = dir.path().join("staged");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested/file.txt"), "payload").unwrap();
        fs::create_dir(&dst).unwrap();

        TreeCopier
            .copy_into(&src, BackupKind::Directory, &dst)
            .unwrap();

        assert_eq!(
            fs::read_to_string(dst.join("nested/file.txt")).unwrap(),
            "payload"
        );
        // Contents land directly in the staging dir, not under backup/
        assert!(!dst.join("backup").exists());
    }

    #[test]
    fn test_unpack_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("backup.tar.gz");
        let dst = dir.path().join("staged");
        fs::create_dir(&dst).unwrap();

        let file = File::create(&archive_path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let content = b"from archive";
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "data/entry.txt", &content[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        TreeCopier
            .copy_into(&archive_path, BackupKind::Archive, &dst)
            .unwrap();

        assert_eq!(
            fs::read_to_string(dst.join("data/entry.txt")).unwrap(),
            "from archive"
        );
    }

    #[test]
    fn test_corrupt_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("broken.tgz");
        fs::write(&archive_path, b"definitely not gzip").unwrap();
        let dst = dir.path().join("staged");
        fs::create_dir(&dst).unwrap();

        assert!(TreeCopier
            .copy_into(&archive_path, BackupKind::Archive, &dst)
            .is_err());
    }

    fn build_archive(path: &Path, root_mode: Option<u32>) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        if let Some(mode) = root_mode {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_mode(mode);
            header.set_cksum();
            builder.append_data(&mut header, "./", io::empty()).unwrap();
        }
        let mut header = tar::Header::new_gnu();
        header.set_size(1);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "a.txt", &b"a"[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_archive_root_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let with_root = dir.path().join("with-root.tar.gz");
        let without_root = dir.path().join("without-root.tar.gz");
        build_archive(&with_root, Some(0o750));
        build_archive(&without_root, None);

        let perms = archive_root_permissions(&with_root).unwrap().unwrap();
        assert_eq!(perms.mode() & 0o7777, 0o750);
        assert!(archive_root_permissions(&without_root).unwrap().is_none());
    }
}
