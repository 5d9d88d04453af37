//! Renames that move resources in and out of the live path

use std::fs;
use std::io;
use std::path::Path;

/// Moves a resource from one path to another within the same directory
///
/// Every step of the swap that touches the live path goes through this, so a
/// failing implementation can stand in for a full disk or a permission error.
pub trait ResourceMover {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Plain `fs::rename`, atomic within one filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMover;

impl ResourceMover for FsMover {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_mover_renames_directory() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from");
        let to = dir.path().join("to");
        fs::create_dir(&from).unwrap();
        fs::write(from.join("a.txt"), "a").unwrap();

        FsMover.rename(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read_to_string(to.join("a.txt")).unwrap(), "a");
    }
}
