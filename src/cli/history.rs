use anyhow::{Result, bail};

use crate::chat::history::HistoryManager;
use crate::core::AppConfig;
use crate::store::{FileBackend, Store};

pub fn run(clear: bool, config: AppConfig) -> Result<()> {
    let store = Store::new(FileBackend::open(&config.storage_path)?);
    let history = HistoryManager::new(store);

    if clear {
        if !history.clear() {
            bail!("Failed to clear history");
        }
        println!("History cleared");
        return Ok(());
    }

    for message in history.read() {
        println!("[{}] {}", message.role, message.content);
    }
    Ok(())
}
