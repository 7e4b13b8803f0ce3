use std::fs::{self, File};
use std::io::{self, Write};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::constants::files::TEMP_EXTENSION;
use crate::errors::SyncError;

/// Replace `path` with `contents` via write-temp-then-rename.
///
/// Readers observe either the previous file or the complete new one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), SyncError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            SyncError::persistence(
                path,
                format!("failed creating parent dir {}: {err}", parent.display()),
            )
        })?;
    }
    let tmp_path = temp_path_for(path);
    let mut file = File::create(&tmp_path).map_err(|err| {
        SyncError::persistence(
            path,
            format!("failed creating temp {}: {err}", tmp_path.display()),
        )
    })?;
    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|err| {
            SyncError::persistence(
                path,
                format!("failed writing temp {}: {err}", tmp_path.display()),
            )
        })?;
    drop(file);
    fs::rename(&tmp_path, path).map_err(|err| {
        SyncError::persistence(
            path,
            format!("failed replacing with {}: {err}", tmp_path.display()),
        )
    })
}

/// Sibling temp path: the full file name with `.tmp` appended, so it never
/// coincides with `path` itself.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(TEMP_EXTENSION);
    path.with_file_name(name)
}

/// Read `path` as UTF-8, returning `None` when it does not exist.
pub fn read_optional(path: &Path) -> Result<Option<String>, SyncError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_creates_parents_and_leaves_no_temp() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("state.txt");
        write_atomic(&path, b"first\n").unwrap();
        write_atomic(&path, b"second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn temp_path_never_equals_a_tmp_target() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state.tmp");
        assert_eq!(temp_path_for(&path), temp.path().join("state.tmp.tmp"));

        fs::write(&path, "old\n").unwrap();
        write_atomic(&path, b"new\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn read_optional_maps_missing_to_none() {
        let temp = tempdir().unwrap();
        assert!(read_optional(&temp.path().join("absent")).unwrap().is_none());
    }
}
