use anyhow::{Result, bail};

use crate::chat::config::ChatConfigManager;
use crate::core::AppConfig;
use crate::store::{FileBackend, Store};

pub fn run(history_count: Option<i64>, config: AppConfig) -> Result<()> {
    let store = Store::new(FileBackend::open(&config.storage_path)?);
    let manager = ChatConfigManager::new(store);

    if let Some(count) = history_count
        && !manager.set_history_message_count(count)
    {
        bail!("History count must be between 0 and 100, got {}", count);
    }

    println!("{}", serde_json::to_string_pretty(&manager.get())?);
    Ok(())
}
