use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aes_gcm::aead::Aead;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::{Aes256Gcm, KeyInit};
use anyhow::{Error, Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::StoreBackend;

pub const STORE_FILE_NAME: &str = "app-config.dat";
pub const KEY_FILE_NAME: &str = "store.key";
const STORE_VERSION: u32 = 1;
const NONCE_LEN: usize = 12;

#[derive(Serialize, Deserialize, Debug, Clone)]
struct Entry {
    encrypted: String,
    version: u32,
}

/// Encrypted on-disk map. Every value is sealed with AES-256-GCM using a
/// key that lives next to the store file, then base64 encoded.
pub struct FileBackend {
    path: PathBuf,
    key: [u8; 32],
    entries: Mutex<HashMap<String, Entry>>,
}

impl FileBackend {
    pub fn open(dir: &Path) -> Result<Self, Error> {
        fs::create_dir_all(dir)?;
        let key = load_or_create_key(&dir.join(KEY_FILE_NAME))?;
        let path = dir.join(STORE_FILE_NAME);
        let entries = load_entries(&path);

        Ok(Self {
            path,
            key,
            entries: Mutex::new(entries),
        })
    }

    // Blocking write on the caller's thread. The file is a few KB and is
    // written once per user action, and every caller is synchronous.
    fn persist(&self, entries: &HashMap<String, Entry>) -> Result<(), Error> {
        let data = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, data)?;
        Ok(())
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<String, Error> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = GenericArray::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    fn decrypt(&self, encoded: &str) -> Result<String, Error> {
        let sealed = BASE64.decode(encoded)?;
        if sealed.len() < NONCE_LEN {
            bail!("Encrypted value too short");
        }
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));
        let nonce = GenericArray::from_slice(&sealed[..NONCE_LEN]);
        let plaintext = cipher
            .decrypt(nonce, &sealed[NONCE_LEN..])
            .map_err(|e| anyhow!("Decryption failed: {}", e))?;
        Ok(String::from_utf8(plaintext)?)
    }
}

impl StoreBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, Error> {
        let entries = self.entries.lock().map_err(|_| anyhow!("Store lock poisoned"))?;
        match entries.get(key) {
            Some(entry) => Ok(Some(self.decrypt(&entry.encrypted)?)),
            None => Ok(None),
        }
    }

    // Changes are staged on a copy and only replace `entries` once they
    // are on disk, so a failed write leaves nothing behind.
    fn write(&self, key: &str, value: String) -> Result<(), Error> {
        let encrypted = self.encrypt(value.as_bytes())?;
        let mut entries = self.entries.lock().map_err(|_| anyhow!("Store lock poisoned"))?;
        let mut staged = entries.clone();
        staged.insert(
            key.to_string(),
            Entry {
                encrypted,
                version: STORE_VERSION,
            },
        );
        self.persist(&staged)?;
        *entries = staged;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, Error> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("Store lock poisoned"))?;
        if !entries.contains_key(key) {
            return Ok(false);
        }
        let mut staged = entries.clone();
        staged.remove(key);
        self.persist(&staged)?;
        *entries = staged;
        Ok(true)
    }
}

fn load_entries(path: &Path) -> HashMap<String, Entry> {
    if !path.exists() {
        return HashMap::new();
    }
    let parsed = fs::read_to_string(path)
        .map_err(Error::from)
        .and_then(|data| serde_json::from_str(&data).map_err(Error::from));
    match parsed {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("Failed to load store file {}: {}", path.display(), e);
            HashMap::new()
        }
    }
}

fn load_or_create_key(path: &Path) -> Result<[u8; 32], Error> {
    if path.exists() {
        let encoded = fs::read_to_string(path)?;
        let bytes = BASE64.decode(encoded.trim())?;
        return bytes
            .try_into()
            .map_err(|_| anyhow!("Store key must be exactly 32 bytes"));
    }

    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    fs::write(path, BASE64.encode(key))?;
    tracing::debug!("Created new store key at {}", path.display());
    Ok(key)
}
