//! Write-then-rename JSON files.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PersistenceError;

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Serialize `value` to `path` through a temporary sibling file. The target
/// either keeps its old content or holds the complete new document.
///
/// With `overwrite` unset an existing target is an error.
pub fn write_json<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    overwrite: bool,
) -> Result<(), PersistenceError> {
    if !overwrite && path.exists() {
        return Err(PersistenceError::AlreadyExists(path.display().to_string()));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = temp_path(path);
    {
        let mut file = fs::File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        file.write_all(&bytes).map_err(|e| io_error(&tmp, e))?;
        file.sync_all().map_err(|e| io_error(&tmp, e))?;
    }

    if overwrite {
        return fs::rename(&tmp, path).map_err(|e| io_error(path, e));
    }

    // Linking fails if the target appeared since the check above
    let linked = fs::hard_link(&tmp, path);
    let _ = fs::remove_file(&tmp);
    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            Err(PersistenceError::AlreadyExists(path.display().to_string()))
        }
        Err(e) => Err(io_error(path, e)),
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    if !path.exists() {
        return Err(PersistenceError::NotFound(path.display().to_string()));
    }
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parents_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/value.json");
        write_json(&path, &vec![1, 2, 3], false).unwrap();

        let back: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_existing_target_is_protected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("value.json");
        write_json(&path, &1, false).unwrap();

        assert!(matches!(
            write_json(&path, &2, false),
            Err(PersistenceError::AlreadyExists(_))
        ));
        assert_eq!(read_json::<i32>(&path).unwrap(), 1);
        assert!(!temp_path(&path).exists());

        write_json(&path, &3, true).unwrap();
        assert_eq!(read_json::<i32>(&path).unwrap(), 3);
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_json::<i32>(&dir.path().join("nope.json")),
            Err(PersistenceError::NotFound(_))
        ));
    }
}
