use serde::Serialize;

use crate::chat::models::ChatMessage;

/// Events pushed to UI surfaces. Every chat event carries the request
/// id of the turn it belongs to so listeners can demultiplex concurrent
/// streams.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum UiEvent {
    #[serde(rename = "chat:message:added")]
    MessageAdded {
        request_id: String,
        message: ChatMessage,
    },
    #[serde(rename = "chat:stream:started")]
    StreamStarted {
        request_id: String,
        user_message: String,
    },
    #[serde(rename = "chat:stream:data")]
    StreamData { request_id: String, content: String },
    #[serde(rename = "chat:stream:end")]
    StreamEnd { request_id: String },
    #[serde(rename = "chat:stream:error")]
    StreamError { request_id: String, error: String },
    #[serde(rename = "chat:stream:stopped")]
    StreamStopped { request_id: String },
    #[serde(rename = "chat:message:completed")]
    MessageCompleted {
        request_id: String,
        message: ChatMessage,
    },
    #[serde(rename = "subtitle:on")]
    SubtitleOn { text: String },
    #[serde(rename = "subtitle:off")]
    SubtitleOff,
}

impl UiEvent {
    pub fn name(&self) -> &'static str {
        match self {
            UiEvent::MessageAdded { .. } => "chat:message:added",
            UiEvent::StreamStarted { .. } => "chat:stream:started",
            UiEvent::StreamData { .. } => "chat:stream:data",
            UiEvent::StreamEnd { .. } => "chat:stream:end",
            UiEvent::StreamError { .. } => "chat:stream:error",
            UiEvent::StreamStopped { .. } => "chat:stream:stopped",
            UiEvent::MessageCompleted { .. } => "chat:message:completed",
            UiEvent::SubtitleOn { .. } => "subtitle:on",
            UiEvent::SubtitleOff => "subtitle:off",
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            UiEvent::MessageAdded { request_id, .. }
            | UiEvent::StreamStarted { request_id, .. }
            | UiEvent::StreamData { request_id, .. }
            | UiEvent::StreamEnd { request_id }
            | UiEvent::StreamError { request_id, .. }
            | UiEvent::StreamStopped { request_id }
            | UiEvent::MessageCompleted { request_id, .. } => Some(request_id),
            UiEvent::SubtitleOn { .. } | UiEvent::SubtitleOff => None,
        }
    }
}
