//! Small persisted key/value state (expanded library folders and the like).
//!
//! Values are JSON-encoded per key. Reads go through an in-memory cache and
//! fall back to the caller's default on any miss or decode failure; writes
//! are best-effort.

use crate::error::ClientError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

pub trait StoreBackend {
    fn read(&self, key: &str) -> Result<Option<String>, ClientError>;
    fn write(&mut self, key: &str, value: String) -> Result<(), ClientError>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: HashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: String) -> Result<(), ClientError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// All keys in one JSON object file; each value is the encoded string.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Map<String, Value>, ClientError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Map::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl StoreBackend for JsonFileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, ClientError> {
        let map = self.load()?;
        Ok(map.get(key).and_then(Value::as_str).map(str::to_owned))
    }

    fn write(&mut self, key: &str, value: String) -> Result<(), ClientError> {
        let mut map = self.load().unwrap_or_default();
        map.insert(key.to_string(), Value::String(value));
        let text = serde_json::to_string_pretty(&map)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

pub struct Store<B> {
    backend: B,
    cache: HashMap<String, Value>,
}

impl<B: StoreBackend> Store<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: HashMap::new(),
        }
    }

    pub fn get<T: DeserializeOwned>(&mut self, key: &str, fallback: T) -> T {
        if let Some(value) = self.cache.get(key) {
            return serde_json::from_value(value.clone()).unwrap_or(fallback);
        }

        let raw = match self.backend.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return fallback,
            Err(e) => {
                debug!(key, error = %e, "store read failed");
                return fallback;
            }
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                debug!(key, error = %e, "stored value is not json");
                return fallback;
            }
        };
        match serde_json::from_value(value.clone()) {
            Ok(decoded) => {
                self.cache.insert(key.to_string(), value);
                decoded
            }
            Err(e) => {
                debug!(key, error = %e, "stored value has unexpected shape");
                fallback
            }
        }
    }

    /// Updates the cache, then writes through. A failed write is logged
    /// and otherwise ignored.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                debug!(key, error = %e, "value not serializable; not stored");
                return;
            }
        };
        let raw = value.to_string();
        self.cache.insert(key.to_string(), value);
        if let Err(e) = self.backend.write(key, raw) {
            debug!(key, error = %e, "store write failed");
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
