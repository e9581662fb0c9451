//! Remote model provider settings: endpoint credentials, the known model
//! list and the model picked by the user.
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::chat::models::now_millis;
use crate::store::Store;

pub const PROVIDER_CONFIG_KEY: &str = "openai";
pub const PROVIDER_MODELS_KEY: &str = "openai_models";

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

impl ProviderConfig {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub owned_by: String,
    #[serde(rename = "isCustom", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_custom: bool,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelCatalog {
    pub config: ProviderConfig,
    pub models: Vec<ModelInfo>,
    pub last_updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,
}

pub struct ProviderConfigManager {
    store: Store,
    cached: Mutex<Option<ProviderConfig>>,
}

impl ProviderConfigManager {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<ProviderConfig> {
        if let Some(config) = self.cached.lock().ok().and_then(|c| c.clone()) {
            return Some(config);
        }
        let config = match self.store.get::<ProviderConfig>(PROVIDER_CONFIG_KEY) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load provider config: {}", e);
                None
            }
        };
        self.set_cached(config.clone());
        config
    }

    pub fn save(&self, config: ProviderConfig) -> bool {
        match self.store.set(PROVIDER_CONFIG_KEY, &config) {
            Ok(()) => {
                self.set_cached(Some(config));
                true
            }
            Err(e) => {
                tracing::error!("Failed to save provider config: {}", e);
                false
            }
        }
    }

    pub fn clear(&self) -> bool {
        match self.store.delete(PROVIDER_CONFIG_KEY) {
            Ok(_) => {
                self.set_cached(None);
                true
            }
            Err(e) => {
                tracing::error!("Failed to clear provider config: {}", e);
                false
            }
        }
    }

    /// The saved config if it has both an endpoint and a key.
    pub fn valid_config(&self) -> Option<ProviderConfig> {
        self.get().filter(ProviderConfig::is_valid)
    }

    pub fn catalog(&self) -> Option<ModelCatalog> {
        match self.store.get::<ModelCatalog>(PROVIDER_MODELS_KEY) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!("Failed to load model catalog: {}", e);
                None
            }
        }
    }

    pub fn models(&self) -> Vec<ModelInfo> {
        self.catalog().map(|c| c.models).unwrap_or_default()
    }

    /// Replaces the model list, keeping the current selection. Requires
    /// a saved provider config.
    pub fn save_models(&self, models: Vec<ModelInfo>) -> bool {
        let Some(config) = self.get() else {
            tracing::error!("Cannot save models without a provider config");
            return false;
        };
        let catalog = ModelCatalog {
            config,
            models,
            last_updated: now_millis(),
            selected_model: self.catalog().and_then(|c| c.selected_model),
        };
        self.write_catalog(&catalog)
    }

    pub fn add_custom_model(&self, model_id: &str, display_name: &str) -> bool {
        let mut models = self.models();
        if models.iter().any(|m| m.id == model_id) {
            return false;
        }
        models.push(ModelInfo {
            id: model_id.to_string(),
            object: "model".to_string(),
            created: now_millis(),
            owned_by: "custom".to_string(),
            is_custom: true,
            display_name: Some(display_name.to_string()),
        });
        self.save_models(models)
    }

    pub fn delete_custom_model(&self, model_id: &str) -> bool {
        let models = self.models();
        let remaining: Vec<ModelInfo> = models.iter().filter(|m| m.id != model_id).cloned().collect();
        if remaining.len() == models.len() {
            return false;
        }
        self.save_models(remaining)
    }

    pub fn select_model(&self, model_id: &str) -> bool {
        let Some(mut catalog) = self.catalog() else {
            return false;
        };
        catalog.selected_model = Some(model_id.to_string());
        self.write_catalog(&catalog)
    }

    pub fn selected_model(&self) -> Option<String> {
        self.catalog().and_then(|c| c.selected_model)
    }

    fn write_catalog(&self, catalog: &ModelCatalog) -> bool {
        match self.store.set(PROVIDER_MODELS_KEY, catalog) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save model catalog: {}", e);
                false
            }
        }
    }

    fn set_cached(&self, config: Option<ProviderConfig>) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = config;
        }
    }
}
