//! Public types for the chat API
use serde::{Deserialize, Serialize};

use crate::chat::models::{ChatConfig, ChatMessage};
use crate::chat::orchestrator::StreamSnapshot;
use crate::notify::WindowId;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamRequest {
    pub user_message: String,
    pub request_id: String,
    // The `/api/events` window that started the turn, if any
    pub window_id: Option<WindowId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopStreamRequest {
    pub request_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowQuery {
    pub window_id: WindowId,
}

#[derive(Serialize, Deserialize)]
pub struct HistoryPayload {
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
pub struct ActiveStreamsResponse {
    pub success: bool,
    pub streams: Vec<StreamSnapshot>,
}

#[derive(Serialize)]
pub struct ChatConfigResponse {
    pub success: bool,
    pub config: ChatConfig,
}
