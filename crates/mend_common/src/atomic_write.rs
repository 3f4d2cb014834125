//! Atomic file writes (temp file + rename)
//!
//! A crash mid-write leaves either the old file or the new one, never a
//! truncated mix of both.

use std::fs;
use std::io::Write;
use std::path::Path;

/// Write `contents` to `path` through `<path>.tmp` and an atomic rename.
pub fn atomic_write<P: AsRef<Path>>(path: P, contents: &str) -> std::io::Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = Path::new(&temp_name);

    {
        let mut file = fs::File::create(temp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }

    fs::rename(temp_path, path)
}
