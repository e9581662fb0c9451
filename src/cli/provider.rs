use anyhow::{Result, bail};

use crate::core::AppConfig;
use crate::openai::{ProviderConfig, ProviderConfigManager};
use crate::store::{FileBackend, Store};

pub fn run(base_url: &str, api_key: &str, model: Option<&str>, config: AppConfig) -> Result<()> {
    let store = Store::new(FileBackend::open(&config.storage_path)?);
    let providers = ProviderConfigManager::new(store);

    let provider = ProviderConfig::new(base_url, api_key);
    if !provider.is_valid() {
        bail!("Both --base-url and --api-key are required");
    }
    if !providers.save(provider) {
        bail!("Failed to save provider config");
    }
    println!("Saved provider {}", base_url);

    if let Some(model) = model {
        // Selecting needs a catalog, so register the model if it's new
        if !providers.models().iter().any(|m| m.id == model) {
            providers.add_custom_model(model, model);
        }
        if !providers.select_model(model) {
            bail!("Failed to select model {}", model);
        }
        println!("Selected model {}", model);
    }
    Ok(())
}
