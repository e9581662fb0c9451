use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame on the avatar connection. Requests carry `id` and `data`,
/// responses echo the `id` with a `result`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarCommand {
    LoadSdk,
    CreateContainer,
    ConnectAvatar,
    DisconnectAvatar,
    Speak,
    SpeakStream,
    InteractiveIdle,
}

impl AvatarCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvatarCommand::LoadSdk => "loadSDK",
            AvatarCommand::CreateContainer => "createContainer",
            AvatarCommand::ConnectAvatar => "connectAvatar",
            AvatarCommand::DisconnectAvatar => "disconnectAvatar",
            AvatarCommand::Speak => "speak",
            AvatarCommand::SpeakStream => "speakStream",
            AvatarCommand::InteractiveIdle => "interactiveIdle",
        }
    }
}

impl std::fmt::Display for AvatarCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials for the hosted avatar, stored under `avatar`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AvatarCredentials {
    pub app_id: String,
    pub app_secret: String,
}

impl AvatarCredentials {
    pub fn is_valid(&self) -> bool {
        !self.app_id.is_empty() && !self.app_secret.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvatarStatus {
    pub enabled: bool,
    pub peer_connected: bool,
    pub sdk_loaded: bool,
    pub avatar_connected: bool,
    pub port: u16,
    pub container_id: String,
}
