use std::sync::Mutex;

use super::models::{ChatConfig, ChatConfigPatch};
use crate::store::Store;

pub const CHAT_CONFIG_KEY: &str = "chat_config";

/// Persisted chat settings with an in-memory cache. Invalid configs are
/// rejected before anything is written so a bad save never partially
/// applies.
pub struct ChatConfigManager {
    store: Store,
    cached: Mutex<Option<ChatConfig>>,
}

impl ChatConfigManager {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    /// Loads from the store, filling in defaults for missing fields.
    pub fn load(&self) -> ChatConfig {
        let config = match self.store.get::<ChatConfig>(CHAT_CONFIG_KEY) {
            Ok(Some(config)) => config,
            Ok(None) => ChatConfig::default(),
            Err(e) => {
                tracing::error!("Failed to load chat config: {}", e);
                ChatConfig::default()
            }
        };
        self.set_cached(Some(config));
        config
    }

    pub fn get(&self) -> ChatConfig {
        let cached = self.cached.lock().ok().and_then(|c| *c);
        cached.unwrap_or_else(|| self.load())
    }

    pub fn save(&self, config: ChatConfig) -> bool {
        if !config.is_valid() {
            tracing::warn!(
                "Rejected chat config with historyMessageCount={}",
                config.history_message_count
            );
            return false;
        }
        match self.store.set(CHAT_CONFIG_KEY, &config) {
            Ok(()) => {
                self.set_cached(Some(config));
                true
            }
            Err(e) => {
                tracing::error!("Failed to save chat config: {}", e);
                false
            }
        }
    }

    pub fn update(&self, patch: ChatConfigPatch) -> bool {
        let mut config = self.get();
        if let Some(count) = patch.history_message_count {
            config.history_message_count = count;
        }
        self.save(config)
    }

    pub fn reset(&self) -> bool {
        self.save(ChatConfig::default())
    }

    pub fn delete(&self) -> bool {
        match self.store.delete(CHAT_CONFIG_KEY) {
            Ok(_) => {
                self.set_cached(None);
                true
            }
            Err(e) => {
                tracing::error!("Failed to delete chat config: {}", e);
                false
            }
        }
    }

    pub fn history_message_count(&self) -> i64 {
        self.get().history_message_count
    }

    pub fn set_history_message_count(&self, count: i64) -> bool {
        self.update(ChatConfigPatch {
            history_message_count: Some(count),
        })
    }

    fn set_cached(&self, config: Option<ChatConfig>) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = config;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let manager = ChatConfigManager::new(Store::in_memory());
        assert_eq!(manager.get(), ChatConfig::default());
        assert_eq!(manager.history_message_count(), 20);
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let store = Store::in_memory();
        let manager = ChatConfigManager::new(store.clone());
        let config = ChatConfig {
            history_message_count: 42,
        };
        assert!(manager.save(config));

        // A fresh manager over the same store sees the saved value
        let reloaded = ChatConfigManager::new(store).load();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_out_of_range_is_rejected_and_prior_kept() {
        let store = Store::in_memory();
        let manager = ChatConfigManager::new(store.clone());
        assert!(manager.save(ChatConfig {
            history_message_count: 10
        }));

        assert!(!manager.save(ChatConfig {
            history_message_count: 150
        }));
        assert!(!manager.set_history_message_count(-3));

        assert_eq!(manager.history_message_count(), 10);
        assert_eq!(ChatConfigManager::new(store).load().history_message_count, 10);
    }

    #[test]
    fn test_update_and_reset() {
        let manager = ChatConfigManager::new(Store::in_memory());
        assert!(manager.set_history_message_count(5));
        assert_eq!(manager.history_message_count(), 5);

        // An empty patch keeps the current value
        assert!(manager.update(ChatConfigPatch::default()));
        assert_eq!(manager.history_message_count(), 5);

        assert!(manager.reset());
        assert_eq!(manager.history_message_count(), 20);
    }

    #[test]
    fn test_corrupt_config_falls_back_to_default() {
        let store = Store::in_memory();
        store.set_raw(CHAT_CONFIG_KEY, "\"nope\"").unwrap();
        let manager = ChatConfigManager::new(store);
        assert_eq!(manager.load(), ChatConfig::default());
    }

    #[test]
    fn test_delete_clears_cache() {
        let manager = ChatConfigManager::new(Store::in_memory());
        manager.set_history_message_count(3);
        assert!(manager.delete());
        assert_eq!(manager.get(), ChatConfig::default());
    }
}
