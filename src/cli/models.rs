use anyhow::{Result, anyhow, bail};

use crate::core::AppConfig;
use crate::openai::{ProviderConfigManager, list_models};
use crate::store::{FileBackend, Store};

pub async fn run(config: AppConfig) -> Result<()> {
    let store = Store::new(FileBackend::open(&config.storage_path)?);
    let providers = ProviderConfigManager::new(store);

    let provider = providers
        .valid_config()
        .ok_or_else(|| anyhow!("Configure the model provider first with `provider`"))?;
    let models = list_models(&provider.base_url, &provider.api_key).await?;
    if !providers.save_models(models) {
        bail!("Failed to save model list");
    }

    let selected = providers.selected_model();
    for model in providers.models() {
        let marker = if selected.as_deref() == Some(model.id.as_str()) {
            "*"
        } else {
            " "
        };
        let custom = if model.is_custom { " (custom)" } else { "" };
        println!("{} {}{}", marker, model.id, custom);
    }
    Ok(())
}
