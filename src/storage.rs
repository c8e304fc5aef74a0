//! String key-value persistence for a single profile, plus JSON helpers.
//!
//! `FileStore` keeps every key in one JSON object on disk and re-reads it on each
//! access, so edits made by another process are picked up by the next read.
//! `MemoryStore` is the in-process fake used by tests.

use std::{
  collections::HashMap,
  fs,
  path::PathBuf,
  sync::{Mutex, RwLock},
};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
  #[error("storage I/O failed: {0}")]
  Io(#[from] std::io::Error),
  #[error("stored value is not valid JSON: {0}")]
  Json(#[from] serde_json::Error),
  #[error("storage lock poisoned")]
  Poisoned,
}

pub trait KvStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
  fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
  fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Missing key -> `Ok(None)`; malformed JSON -> `Err(StorageError::Json)`.
pub fn read_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>, StorageError> {
  match store.get(key)? {
    Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
    None => Ok(None),
  }
}

pub fn write_json<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) -> Result<(), StorageError> {
  let raw = serde_json::to_string(value)?;
  store.set(key, &raw)
}

#[derive(Default)]
pub struct MemoryStore {
  map: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KvStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let map = self.map.read().map_err(|_| StorageError::Poisoned)?;
    Ok(map.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    let mut map = self.map.write().map_err(|_| StorageError::Poisoned)?;
    map.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    let mut map = self.map.write().map_err(|_| StorageError::Poisoned)?;
    map.remove(key);
    Ok(())
  }
}

pub struct FileStore {
  path: PathBuf,
  write_lock: Mutex<()>,
}

impl FileStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into(), write_lock: Mutex::new(()) }
  }

  fn load(&self) -> Result<HashMap<String, String>, StorageError> {
    match fs::read_to_string(&self.path) {
      Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
      Ok(text) => Ok(serde_json::from_str(&text)?),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
      Err(e) => Err(e.into()),
    }
  }

  /// Read-modify-write under the process lock; the file is replaced via rename.
  fn update(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<(), StorageError> {
    let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
    let mut map = match self.load() {
      Ok(map) => map,
      Err(StorageError::Json(e)) => {
        warn!(target: "progress", path = %self.path.display(), error = %e, "Store file is corrupt; starting from an empty profile");
        HashMap::new()
      }
      Err(e) => return Err(e),
    };
    f(&mut map);
    if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
      fs::create_dir_all(dir)?;
    }
    let tmp = self.path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(&map)?)?;
    fs::rename(&tmp, &self.path)?;
    debug!(target: "progress", path = %self.path.display(), keys = map.len(), "Store file written");
    Ok(())
  }
}

impl KvStore for FileStore {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    Ok(self.load()?.remove(key))
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self.update(|map| {
      map.insert(key.to_string(), value.to_string());
    })
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    self.update(|map| {
      map.remove(key);
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn temp_path() -> PathBuf {
    std::env::temp_dir().join(format!("quizchain-store-{}", uuid::Uuid::new_v4())).join("profile.json")
  }

  #[test]
  fn memory_store_round_trips_and_removes() {
    let store = MemoryStore::new();
    assert_eq!(store.get("k").unwrap(), None);
    store.set("k", "v").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    store.remove("k").unwrap();
    assert_eq!(store.get("k").unwrap(), None);
  }

  #[test]
  fn json_helpers_surface_malformed_values() {
    let store = MemoryStore::new();
    store.set("list", "not json").unwrap();
    assert!(matches!(read_json::<Vec<u32>>(&store, "list"), Err(StorageError::Json(_))));
    write_json(&store, "list", &vec![1u32, 2]).unwrap();
    assert_eq!(read_json::<Vec<u32>>(&store, "list").unwrap(), Some(vec![1, 2]));
    assert_eq!(read_json::<Vec<u32>>(&store, "missing").unwrap(), None);
  }

  #[test]
  fn file_store_persists_across_instances() {
    let path = temp_path();
    FileStore::new(&path).set("streakDays", "3").unwrap();
    let reopened = FileStore::new(&path);
    assert_eq!(reopened.get("streakDays").unwrap().as_deref(), Some("3"));
    assert_eq!(reopened.get("missing").unwrap(), None);
    let _ = fs::remove_dir_all(path.parent().unwrap());
  }

  #[test]
  fn file_store_sees_external_edits_and_recovers_from_garbage() {
    let path = temp_path();
    let store = FileStore::new(&path);
    store.set("a", "1").unwrap();

    fs::write(&path, r#"{"a":"2"}"#).unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));

    fs::write(&path, "garbage").unwrap();
    assert!(store.get("a").is_err());
    store.set("b", "x").unwrap();
    assert_eq!(store.get("b").unwrap().as_deref(), Some("x"));
    assert_eq!(store.get("a").unwrap(), None);
    let _ = fs::remove_dir_all(path.parent().unwrap());
  }
}
