//! Key-value persistence underneath the ledger.
//!
//! A [`Storage`] holds string values under string keys and behaves like the
//! browser's `localStorage`: reads and writes are synchronous, a write replaces
//! the whole value, and a rejected write leaves the previous value in place.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("could not read {}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("could not write {}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("storing {key:?} needs {required} bytes but the quota is {quota} bytes")]
    QuotaExceeded { key: String, required: usize, quota: usize },
    #[error("{0:?} is not a valid storage key")]
    InvalidKey(String),
}

pub trait Storage {
    /// Returns the value stored under `key`, or `None` if nothing was stored yet.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    /// Replaces the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

impl<T: Storage + ?Sized> Storage for &T {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
}

impl<T: Storage + ?Sized> Storage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
}

/// In-process storage with an optional quota on the total number of stored
/// bytes (keys plus values).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::default(),
            quota: Some(quota),
        }
    }

    /// Total bytes currently held, counted the way the quota counts them.
    pub fn used_bytes(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(quota) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let required = others + key.len() + value.len();
            if required > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    required,
                    quota,
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Directory-backed storage with one `<key>.json` file per key. Several processes
/// may open the same directory; each write replaces the file atomically.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

/// Identifies one version of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: SystemTime,
    pub len: u64,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty() && !key.starts_with('.') && !key.contains(&['/', '\\', '\0'][..]);
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    /// Modification stamp of the file behind `key`, `None` if it does not exist.
    pub fn stamp(&self, key: &str) -> Result<Option<FileStamp>, StorageError> {
        let path = self.path(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(FileStamp {
                modified: meta.modified().map_err(|source| StorageError::Read {
                    path: path.clone(),
                    source,
                })?,
                len: meta.len(),
            })),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read { path, source }),
        }
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read { path, source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path(key)?;
        let write_err = |source| StorageError::Write {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(write_err)?;

        // Rename within the same directory so readers see either the old or the new file
        let tmp = self.dir.join(format!(".{key}.json.{}", uuid::Uuid::new_v4().simple()));
        if let Err(source) = fs::write(&tmp, value) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(source));
        }
        fs::rename(&tmp, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            write_err(source)
        })?;
        log::debug!("wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }
}
