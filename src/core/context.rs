//! Wires the services together once per process. Everything that would
//! otherwise be a global lives here and is handed out by reference.
use std::sync::Arc;

use anyhow::{Error, Result};

use super::config::AppConfig;
use crate::avatar::{AvatarService, AvatarTransport};
use crate::chat::config::ChatConfigManager;
use crate::chat::history::HistoryManager;
use crate::chat::narration::NarrationSink;
use crate::chat::orchestrator::StreamOrchestrator;
use crate::chat::prompt::SystemPreamble;
use crate::chat::service::ChatService;
use crate::notify::Notifier;
use crate::openai::{CompletionClient, OpenAiClient, ProviderConfigManager};
use crate::store::{FileBackend, Store};

pub struct AppContext {
    pub config: AppConfig,
    pub store: Store,
    pub notifier: Notifier,
    pub history: Arc<HistoryManager>,
    pub chat_config: Arc<ChatConfigManager>,
    pub providers: Arc<ProviderConfigManager>,
    pub avatar: Arc<AvatarService>,
    pub chat: Arc<ChatService>,
}

impl AppContext {
    /// Opens the encrypted store under the configured storage path and
    /// talks to the real completion API.
    pub fn open(config: AppConfig) -> Result<Self, Error> {
        let store = Store::new(FileBackend::open(&config.storage_path)?);
        Self::build(config, store, Arc::new(OpenAiClient))
    }

    pub fn build(
        config: AppConfig,
        store: Store,
        client: Arc<dyn CompletionClient>,
    ) -> Result<Self, Error> {
        let notifier = Notifier::new();
        let history = Arc::new(HistoryManager::new(store.clone()));
        let chat_config = Arc::new(ChatConfigManager::new(store.clone()));
        let providers = Arc::new(ProviderConfigManager::new(store.clone()));

        let transport = AvatarTransport::new(notifier.clone());
        let avatar = Arc::new(AvatarService::new(
            transport,
            store.clone(),
            config.avatar_enabled,
        ));
        let narration: Option<Arc<dyn NarrationSink>> = if config.avatar_enabled {
            Some(avatar.clone())
        } else {
            None
        };

        let orchestrator = Arc::new(StreamOrchestrator::new(
            client,
            notifier.clone(),
            history.clone(),
            SystemPreamble::new(&config.system_message)?,
            narration,
        ));
        let chat = Arc::new(ChatService::new(
            history.clone(),
            chat_config.clone(),
            providers.clone(),
            orchestrator,
            notifier.clone(),
        ));

        Ok(Self {
            config,
            store,
            notifier,
            history,
            chat_config,
            providers,
            avatar,
            chat,
        })
    }

    /// Starts the avatar transport and connects the avatar in the
    /// background. A failure here only disables the avatar.
    pub async fn start_avatar(&self) {
        if !self.config.avatar_enabled {
            return;
        }
        let transport = self.avatar.transport();
        match transport
            .start(self.config.avatar_port_start, self.config.avatar_port_end)
            .await
        {
            Ok(port) => {
                tracing::info!("Waiting for the avatar surface on port {}", port);
                let avatar = Arc::clone(&self.avatar);
                tokio::spawn(async move {
                    if let Err(e) = avatar.initialize().await {
                        tracing::error!("Failed to initialize avatar: {}", e);
                    }
                });
            }
            Err(e) => tracing::error!("Avatar transport unavailable: {}", e),
        }
    }

    pub fn shutdown(&self) {
        self.avatar.disconnect_avatar();
        self.avatar.transport().stop();
    }
}
