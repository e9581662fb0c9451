//! The core models for a persisted conversation with the assistant.
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::openai::{Message, Role};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum ChatRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single entry in the conversation log. Position in the log is its
/// identity; entries are never edited after being appended.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

impl From<&ChatMessage> for Message {
    fn from(msg: &ChatMessage) -> Self {
        let role = match msg.role {
            ChatRole::User => Role::User,
            ChatRole::Assistant => Role::Assistant,
        };
        Message::new(role, &msg.content)
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryLog {
    pub messages: Vec<ChatMessage>,
    pub last_updated: i64,
}

pub const DEFAULT_HISTORY_MESSAGE_COUNT: i64 = 20;
pub const MAX_HISTORY_MESSAGE_COUNT: i64 = 100;

/// User facing chat settings. `history_message_count` is the number of
/// rounds sent to the model as context, not the persisted cap.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatConfig {
    pub history_message_count: i64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_message_count: DEFAULT_HISTORY_MESSAGE_COUNT,
        }
    }
}

impl ChatConfig {
    pub fn is_valid(&self) -> bool {
        (0..=MAX_HISTORY_MESSAGE_COUNT).contains(&self.history_message_count)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfigPatch {
    pub history_message_count: Option<i64>,
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = ChatMessage {
            role: ChatRole::User,
            content: "hi".to_string(),
            timestamp: 42,
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"role":"user","content":"hi","timestamp":42}"#
        );
    }

    #[test]
    fn test_history_log_uses_camel_case() {
        let log = HistoryLog {
            messages: vec![],
            last_updated: 7,
        };
        assert_eq!(
            serde_json::to_string(&log).unwrap(),
            r#"{"messages":[],"lastUpdated":7}"#
        );
    }

    #[test]
    fn test_chat_config_fills_missing_fields() {
        let config: ChatConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn test_chat_config_range() {
        assert!(ChatConfig { history_message_count: 0 }.is_valid());
        assert!(ChatConfig { history_message_count: 100 }.is_valid());
        assert!(!ChatConfig { history_message_count: 101 }.is_valid());
        assert!(!ChatConfig { history_message_count: -1 }.is_valid());
    }
}
