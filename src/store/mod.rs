//! Key-value storage for persisted user data: chat history, chat
//! config, model provider settings and avatar credentials.
//!
//! Backends only deal in raw JSON text. `Store` layers the typed
//! `get`/`set`/`delete` calls on top so callers never touch the
//! encoding.
pub mod file;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Error, Result, anyhow};
use serde::{Serialize, de::DeserializeOwned};

pub use file::FileBackend;

pub trait StoreBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, Error>;
    fn write(&self, key: &str, value: String) -> Result<(), Error>;
    /// Returns `true` if the key existed.
    fn remove(&self, key: &str) -> Result<bool, Error>;
}

#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StoreBackend>,
}

impl Store {
    pub fn new(backend: impl StoreBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        match self.backend.read(key)? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .map_err(|e| anyhow!("Stored value for {} is malformed: {}", key, e))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), Error> {
        let raw = serde_json::to_string(value)?;
        self.backend.write(key, raw)
    }

    pub fn delete(&self, key: &str) -> Result<bool, Error> {
        self.backend.remove(key)
    }

    /// Writes raw text under a key, bypassing serialization. Useful for
    /// simulating corrupted entries.
    pub fn set_raw(&self, key: &str, raw: &str) -> Result<(), Error> {
        self.backend.write(key, raw.to_string())
    }
}

#[derive(Default)]
pub struct MemoryBackend(Mutex<HashMap<String, String>>);

impl StoreBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, Error> {
        let map = self.0.lock().map_err(|_| anyhow!("Memory store lock poisoned"))?;
        Ok(map.get(key).cloned())
    }

    fn write(&self, key: &str, value: String) -> Result<(), Error> {
        let mut map = self.0.lock().map_err(|_| anyhow!("Memory store lock poisoned"))?;
        map.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, Error> {
        let mut map = self.0.lock().map_err(|_| anyhow!("Memory store lock poisoned"))?;
        Ok(map.remove(key).is_some())
    }
}
