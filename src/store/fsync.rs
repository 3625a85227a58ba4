//! Directory fsync after renames.
//!
//! Renaming a directory only updates the parent's entries; without syncing
//! the parent, a swap may not survive a power loss even though the data did.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;

/// Syncs a directory so renames and removals inside it are durable.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}
