//! Recursive tree copy used to stage a build for publishing.

use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Copies the contents of `src` into `dest`, which must already exist.
///
/// Directories and regular files are recreated; symlinks are copied as the
/// file they point to only when the target lies inside `src`, and skipped
/// otherwise, so a build cannot publish files from elsewhere on the host.
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<u64> {
    let src_root = src.canonicalize()?;
    let mut copied = 0;

    for entry in WalkDir::new(&src_root).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(&src_root)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        } else if file_type.is_symlink() {
            match entry.path().canonicalize() {
                Ok(resolved) if resolved.starts_with(&src_root) && resolved.is_file() => {
                    std::fs::copy(&resolved, &target)?;
                    copied += 1;
                }
                _ => {
                    tracing::warn!(
                        path = %entry.path().display(),
                        "Skipping symlink that leaves the build output"
                    );
                }
            }
        }
    }

    Ok(copied)
}
