use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use jobdeck_logging::{jobdeck_info, jobdeck_warn};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::lock;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("cache directory missing or not writable: {0}")]
    CacheDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("cache encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Small durable key-value store, the counterpart of browser local storage.
pub trait KeyValueCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value) -> Result<(), PersistError>;

    fn clear(&self, key: &str) -> Result<(), PersistError>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: Value) -> Self {
        let cache = Self::new();
        lock(&cache.entries).insert(key.to_string(), value);
        cache
    }
}

impl KeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), PersistError> {
        lock(&self.entries).insert(key.to_string(), value);
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), PersistError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// Ensure the cache directory exists and is writable; create if missing.
pub fn ensure_cache_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::CacheDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::CacheDir(format!("{} is not a directory", dir.display())));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::CacheDir(e.to_string()))?;
    }
    NamedTempFile::new_in(dir).map_err(|e| PersistError::CacheDir(e.to_string()))?;
    Ok(())
}

/// JSON file holding every key, rewritten atomically on each change.
#[derive(Debug)]
pub struct FileCache {
    dir: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl FileCache {
    pub const FILENAME: &'static str = "jobdeck_cache.json";

    /// Opens (or starts) the cache in `dir`. An unreadable or corrupt file is
    /// logged and treated as empty rather than failing startup.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        ensure_cache_dir(&dir)?;
        let path = dir.join(Self::FILENAME);
        let entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, Value>>(&text) {
                Ok(entries) => {
                    jobdeck_info!("Loaded cache from {:?}", path);
                    entries
                }
                Err(err) => {
                    jobdeck_warn!("Ignoring corrupt cache at {:?}: {}", path, err);
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                jobdeck_warn!("Failed to read cache from {:?}: {}", path, err);
                BTreeMap::new()
            }
        };
        Ok(Self {
            dir,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(Self::FILENAME)
    }

    fn write(&self, entries: &BTreeMap<String, Value>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(entries)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(self.path()).map_err(|e| PersistError::Io(e.error))?;
        Ok(())
    }
}

impl KeyValueCache for FileCache {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), PersistError> {
        let mut entries = lock(&self.entries);
        entries.insert(key.to_string(), value);
        self.write(&entries)
    }

    fn clear(&self, key: &str) -> Result<(), PersistError> {
        let mut entries = lock(&self.entries);
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write(&entries)
    }
}
