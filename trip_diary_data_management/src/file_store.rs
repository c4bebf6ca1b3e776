use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::{DataManagerError, KeyValueStore};

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DataManagerError> {
        let dir = dir.into();

        // Create dir if it doesn't exist
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .map_err(|_| DataManagerError::Store(format!("Failed to create store directory: {:?}", dir)))?;
        }

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, DataManagerError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(DataManagerError::Store(format!("Failed to read {:?}: {err}", path))),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), DataManagerError> {
        let path = self.path_for(key);
        let tmp_path = self.dir.join(format!(".{key}.json.tmp"));

        // Write next to the target, then rename over it
        std::fs::write(&tmp_path, value)
            .map_err(|err| DataManagerError::Store(format!("Failed to write {:?}: {err}", tmp_path)))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|err| DataManagerError::Store(format!("Failed to replace {:?}: {err}", path)))
    }

    fn remove(&mut self, key: &str) -> Result<(), DataManagerError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(DataManagerError::Store(format!("Failed to remove {:?}: {err}", path))),
        }
    }
}

#[test]
fn set_get_remove_roundtrip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::open(dir.path().join("nested").join("store")).unwrap();

    assert_eq!(store.get("consent").unwrap(), None);

    store.set("consent", "true").unwrap();
    assert_eq!(store.get("consent").unwrap().as_deref(), Some("true"));
    assert!(store.dir().join("consent.json").exists());

    store.set("consent", "false").unwrap();
    assert_eq!(store.get("consent").unwrap().as_deref(), Some("false"));

    store.remove("consent").unwrap();
    assert_eq!(store.get("consent").unwrap(), None);

    // Removing a missing key is fine
    store.remove("consent").unwrap();
}

#[test]
fn reopening_sees_previous_values() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = FileStore::open(dir.path()).unwrap();
        store.set("trips", "[]").unwrap();
    }
    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.get("trips").unwrap().as_deref(), Some("[]"));
}
