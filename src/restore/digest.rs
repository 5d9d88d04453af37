//! Content digest of a directory tree
//!
//! Used to confirm a staged copy matches the backup before the live resource
//! is touched. The digest covers every entry's relative path, its kind and,
//! for files, an md5 of the contents. Symlinks are followed, matching how
//! the copier materializes them.

use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Summary of a directory tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeDigest {
    /// Hex md5 over the sorted entry listing
    pub hash: String,
    /// Number of regular files
    pub files: u64,
    /// Total size of regular files in bytes
    pub bytes: u64,
}

impl TreeDigest {
    /// Walk `root` and compute its digest
    pub fn compute(root: &Path) -> io::Result<Self> {
        let mut listing = String::new();
        let mut files = 0;
        let mut bytes = 0;

        let walker = WalkDir::new(root)
            .follow_links(true)
            .min_depth(1)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| io::Error::other(e.to_string()))?;
            // Forward slashes so the listing is platform independent
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if entry.file_type().is_dir() {
                listing.push_str(&format!("d\t{}\n", relative));
            } else {
                let (size, hash) = hash_file(entry.path())?;
                files += 1;
                bytes += size;
                listing.push_str(&format!("f\t{}\t{}\t{:x}\n", relative, size, hash));
            }
        }

        Ok(Self {
            hash: format!("{:x}", md5::compute(listing.as_bytes())),
            files,
            bytes,
        })
    }
}

/// Stream a file through md5, returning its size and digest
fn hash_file(path: &Path) -> io::Result<(u64, md5::Digest)> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let size = io::copy(&mut file, &mut context)?;
    Ok((size, context.finalize()))
}
