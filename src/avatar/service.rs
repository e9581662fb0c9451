use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use serde_json::json;
use uuid::Uuid;

use super::models::{AvatarCommand, AvatarCredentials, AvatarStatus};
use super::transport::{AvatarTransport, TransportError};
use crate::chat::narration::{NarrationSink, Segment};
use crate::store::Store;

pub const AVATAR_CONFIG_KEY: &str = "avatar";
const PEER_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives the talking avatar through the transport and tracks whether
/// the SDK is loaded and the avatar session is live.
pub struct AvatarService {
    transport: AvatarTransport,
    store: Store,
    enabled: bool,
    container_id: String,
    sdk_loaded: AtomicBool,
    connected: AtomicBool,
}

impl AvatarService {
    pub fn new(transport: AvatarTransport, store: Store, enabled: bool) -> Self {
        Self {
            transport,
            store,
            enabled,
            container_id: format!("avatar_container_{}", Uuid::new_v4().simple()),
            sdk_loaded: AtomicBool::new(false),
            connected: AtomicBool::new(false),
        }
    }

    pub fn transport(&self) -> &AvatarTransport {
        &self.transport
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn is_avatar_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> AvatarStatus {
        AvatarStatus {
            enabled: self.enabled,
            peer_connected: self.transport.is_connected(),
            sdk_loaded: self.sdk_loaded.load(Ordering::SeqCst),
            avatar_connected: self.is_avatar_connected(),
            port: self.transport.port(),
            container_id: self.container_id.clone(),
        }
    }

    pub fn credentials(&self) -> Option<AvatarCredentials> {
        match self.store.get::<AvatarCredentials>(AVATAR_CONFIG_KEY) {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::error!("Failed to load avatar credentials: {}", e);
                None
            }
        }
    }

    pub fn save_credentials(&self, credentials: &AvatarCredentials) -> bool {
        match self.store.set(AVATAR_CONFIG_KEY, credentials) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save avatar credentials: {}", e);
                false
            }
        }
    }

    pub fn clear_credentials(&self) -> bool {
        match self.store.delete(AVATAR_CONFIG_KEY) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Failed to clear avatar credentials: {}", e);
                false
            }
        }
    }

    /// Waits for the render surface, loads the SDK and connects the
    /// avatar if credentials are saved. Does nothing when disabled.
    pub async fn initialize(&self) -> Result<(), Error> {
        if !self.enabled {
            tracing::debug!("Avatar disabled, skipping initialization");
            return Ok(());
        }

        self.transport.wait_for_connection(PEER_CONNECT_TIMEOUT).await?;
        self.transport
            .send_message(AvatarCommand::LoadSdk, None)
            .await
            .map_err(|e| anyhow!("Failed to load avatar SDK: {}", e))?;
        self.sdk_loaded.store(true, Ordering::SeqCst);

        if let Some(credentials) = self.credentials().filter(AvatarCredentials::is_valid) {
            self.connect_avatar(&credentials).await;
        }
        Ok(())
    }

    pub async fn connect_avatar(&self, credentials: &AvatarCredentials) -> bool {
        if self.is_avatar_connected() {
            return true;
        }

        let connect = async {
            self.transport
                .send_message(
                    AvatarCommand::CreateContainer,
                    Some(json!({ "containerId": self.container_id })),
                )
                .await?;
            self.transport
                .send_message(
                    AvatarCommand::ConnectAvatar,
                    Some(json!({
                        "containerId": self.container_id,
                        "appId": credentials.app_id,
                        "appSecret": credentials.app_secret,
                    })),
                )
                .await
        };

        match connect.await {
            Ok(_) => {
                self.connected.store(true, Ordering::SeqCst);
                tracing::info!("Avatar connected");
                true
            }
            Err(e) => {
                tracing::error!("Failed to connect avatar: {}", e);
                false
            }
        }
    }

    /// Marks the avatar disconnected immediately. The disconnect request
    /// itself is not awaited.
    pub fn disconnect_avatar(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        if !self.transport.is_connected() {
            return;
        }
        self.dispatch_detached(AvatarCommand::DisconnectAvatar, None);
    }

    pub async fn speak(&self, text: &str) -> bool {
        if !self.is_avatar_connected() {
            tracing::error!("Avatar is not connected");
            return false;
        }
        self.command(AvatarCommand::Speak, Some(json!({ "text": text })))
            .await
            .map_err(|e| tracing::error!("Avatar speak failed: {}", e))
            .is_ok()
    }

    /// Interrupts any narration in progress and returns the avatar to
    /// its idle state.
    pub async fn interactive_idle(&self) -> bool {
        if !self.is_avatar_connected() {
            return false;
        }
        self.command(AvatarCommand::InteractiveIdle, None)
            .await
            .map_err(|e| tracing::error!("Avatar idle failed: {}", e))
            .is_ok()
    }

    /// Writes the frame now and waits for the reply in the background,
    /// so frames reach the peer in call order.
    fn dispatch_detached(&self, command: AvatarCommand, data: Option<serde_json::Value>) {
        match self.transport.dispatch(command, data) {
            Ok(reply) => {
                tokio::spawn(async move {
                    if let Err(e) = reply.wait().await {
                        tracing::error!("Avatar {} failed: {}", command, e);
                    }
                });
            }
            Err(e) => tracing::error!("Avatar {} failed: {}", command, e),
        }
    }

    async fn command(
        &self,
        command: AvatarCommand,
        data: Option<serde_json::Value>,
    ) -> Result<(), TransportError> {
        self.transport.send_message(command, data).await.map(|_| ())
    }
}

impl NarrationSink for AvatarService {
    fn is_active(&self) -> bool {
        self.is_avatar_connected() && self.transport.is_connected()
    }

    fn narrate(&self, segment: Segment) {
        let data = match serde_json::to_value(&segment) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Failed to encode narration segment: {}", e);
                return;
            }
        };
        self.dispatch_detached(AvatarCommand::SpeakStream, Some(data));
    }

    fn interrupt(&self) {
        if !self.is_avatar_connected() {
            return;
        }
        self.dispatch_detached(AvatarCommand::InteractiveIdle, None);
    }
}
