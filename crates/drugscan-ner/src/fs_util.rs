use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::Result;

/// Replace `path` with `contents` without ever exposing a partially written file.
///
/// The temporary file lives in the destination directory so the final rename
/// stays on one filesystem.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
