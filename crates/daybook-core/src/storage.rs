use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::error::StorageError;

pub const TODOS_KEY: &str = "todos";
pub const CATEGORIES_KEY: &str = "categories";
/// Written by the variant that only stored user-added categories.
pub const LEGACY_CUSTOM_CATEGORIES_KEY: &str = "customCategories";
pub const LANGUAGE_KEY: &str = "language";
pub const THEME_KEY: &str = "theme";
pub const SETTINGS_KEY: &str = "settings";

/// Key/value persistence. Values are JSON documents.
pub trait Storage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

pub type SharedStorage = Rc<dyn Storage>;

/// Reads and decodes `key`. Missing keys, read failures and corrupted
/// documents all yield `None`; the latter two are logged.
#[tracing::instrument(skip(storage))]
pub fn load<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Option<T> {
    let raw = match storage.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!(key, "no stored value");
            return None;
        }
        Err(err) => {
            error!(key, error = %err, "failed reading stored value");
            return None;
        }
    };

    match serde_json::from_str::<T>(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            error!(key, error = %err, "stored value is corrupted; ignoring it");
            None
        }
    }
}

pub fn load_or<T: DeserializeOwned>(storage: &dyn Storage, key: &str, default: T) -> T {
    load(storage, key).unwrap_or(default)
}

#[tracing::instrument(skip(storage, value))]
pub fn save<T: Serialize + ?Sized>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let serialized = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
        key: key.to_string(),
        source,
    })?;
    storage.write(key, &serialized)
}

/// Write-through helper: a failed save is logged and the in-memory state
/// stays authoritative for the session.
pub fn save_or_log<T: Serialize + ?Sized>(storage: &dyn Storage, key: &str, value: &T) -> bool {
    match save(storage, key, value) {
        Ok(()) => true,
        Err(err) => {
            error!(key, error = %err, "failed to persist; keeping in-memory state");
            false
        }
    }
}

/// One JSON file per key inside a data directory.
#[derive(Debug)]
pub struct FileStorage {
    pub data_dir: PathBuf,
}

impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|err| StorageError::io(&data_dir, err))?;

        info!(data_dir = %data_dir.display(), "opened file storage");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::io(path, err)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        debug!(file = %path.display(), bytes = value.len(), "saving atomically");

        let mut temp =
            NamedTempFile::new_in(&self.data_dir).map_err(|err| StorageError::io(&path, err))?;
        temp.write_all(value.as_bytes())
            .and_then(|()| temp.flush())
            .map_err(|err| StorageError::io(&path, err))?;
        temp.persist(&path)
            .map_err(|err| StorageError::io(&path, err.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::io(path, err)),
        }
    }
}

/// In-memory backend. Can be told to reject writes to exercise the
/// failure paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<BTreeMap<String, String>>,
    fail_writes: Cell<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::Unavailable {
                key: key.to_string(),
                reason: "quota exceeded".to_string(),
            });
        }
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
