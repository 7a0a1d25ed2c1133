use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{HadesError, Result};

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("unnamed"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` to `path` via a sibling temp file and a rename, so readers
/// never observe a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| HadesError::persistence(parent, e))?;
        }
    }

    let tmp = temp_sibling(path);
    fs::write(&tmp, bytes).map_err(|e| HadesError::persistence(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        HadesError::persistence(path, e)
    })
}

/// Read a file, mapping "not found" to `None`
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HadesError::persistence(path, e)),
    }
}
