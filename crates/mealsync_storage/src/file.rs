//! File-based key-value store for persistent storage.

use crate::backend::KeyValueStore;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const VALUE_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// A directory-backed key-value store.
///
/// Each key is stored in its own file inside the store directory. Data
/// survives process restarts.
///
/// # Durability
///
/// `put` writes the value to a temporary sibling, calls
/// `File::sync_all()`, and renames it over the destination. A crash
/// mid-write leaves either the old value or the new one, never a torn mix.
///
/// # Keys
///
/// Keys are limited to ASCII letters, digits, `-`, `_` and `.` so they map
/// one-to-one onto file names on every platform.
///
/// # Example
///
/// ```no_run
/// use mealsync_storage::{KeyValueStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("client-data")).unwrap();
/// store.put("meals.cache", b"[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn value_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.{VALUE_EXTENSION}")))
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: "key is empty",
        });
    }
    if key.starts_with('.') {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: "key must not start with '.'",
        });
    }
    let valid = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: "only ASCII letters, digits, '-', '_' and '.' are allowed",
        });
    }
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.value_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.value_path(key)?;
        let temp = path.with_extension(TEMP_EXTENSION);

        let _guard = self.write_lock.lock();
        {
            let mut file = File::create(&temp)?;
            file.write_all(value)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.value_path(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_open_creates_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("store");

        let store = FileStore::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(store.path(), root);
    }

    #[test]
    fn file_put_and_get() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("meals.cache", b"[1,2,3]").unwrap();
        assert_eq!(store.get("meals.cache").unwrap(), Some(b"[1,2,3]".to_vec()));
        assert!(dir.path().join("meals.cache.json").exists());
    }

    #[test]
    fn file_missing_key() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.get("absent").unwrap().is_none());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put("sync.queue", b"persistent data").unwrap();
        }

        {
            let store = FileStore::open(dir.path()).unwrap();
            assert_eq!(
                store.get("sync.queue").unwrap(),
                Some(b"persistent data".to_vec())
            );
        }
    }

    #[test]
    fn file_overwrite_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("k", b"one").unwrap();
        store.put("k", b"two").unwrap();

        assert_eq!(store.get("k").unwrap(), Some(b"two".to_vec()));
        assert!(!dir.path().join("k.tmp").exists());
    }

    #[test]
    fn file_remove() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("k", b"v").unwrap();
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());

        // removing again is fine
        store.remove("k").unwrap();
    }

    #[test]
    fn file_rejects_bad_keys() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert!(matches!(
            store.put("../escape", b"x"),
            Err(StorageError::InvalidKey { .. })
        ));
        assert!(matches!(store.get(""), Err(StorageError::InvalidKey { .. })));
        assert!(matches!(
            store.put("auth/token", b"x"),
            Err(StorageError::InvalidKey { .. })
        ));
    }
}
