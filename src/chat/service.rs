//! The chat control surface used by the HTTP API and the CLI. Every
//! operation reports failure through its return value; nothing here
//! returns an error.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::config::ChatConfigManager;
use super::history::HistoryManager;
use super::models::{ChatConfig, ChatConfigPatch, ChatMessage};
use super::orchestrator::{StreamOrchestrator, StreamOutcome, StreamRequest, StreamSnapshot};
use super::window::build_window;
use crate::notify::{Notifier, UiEvent, WindowId};
use crate::openai::{Message, ProviderConfigManager};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSubmission {
    pub user_message: String,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }

    fn from_bool(success: bool, error: &str) -> Self {
        if success {
            Self::ok()
        } else {
            Self::failed(error)
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accumulated_content: Option<String>,
}

pub struct ChatService {
    history: Arc<HistoryManager>,
    chat_config: Arc<ChatConfigManager>,
    providers: Arc<ProviderConfigManager>,
    orchestrator: Arc<StreamOrchestrator>,
    notifier: Notifier,
}

impl ChatService {
    pub fn new(
        history: Arc<HistoryManager>,
        chat_config: Arc<ChatConfigManager>,
        providers: Arc<ProviderConfigManager>,
        orchestrator: Arc<StreamOrchestrator>,
        notifier: Notifier,
    ) -> Self {
        Self {
            history,
            chat_config,
            providers,
            orchestrator,
            notifier,
        }
    }

    pub fn orchestrator(&self) -> &Arc<StreamOrchestrator> {
        &self.orchestrator
    }

    /// Runs one chat turn to completion: records the user message, opens
    /// the stream over the windowed history and drains it. Resolves once
    /// the stream has ended, stopped or failed.
    pub async fn submit(
        &self,
        submission: &StreamSubmission,
        window_id: Option<WindowId>,
    ) -> OperationResult {
        let Some(provider) = self.providers.valid_config() else {
            return OperationResult::failed("Configure the model provider API first");
        };
        let Some(model) = self.providers.selected_model() else {
            return OperationResult::failed("Select a model first");
        };
        let request_id = submission.request_id.as_str();

        let user_message = ChatMessage::user(&submission.user_message);
        if !self.history.append(user_message.clone()) {
            tracing::error!("Failed to persist user message for {}", request_id);
        }
        self.notifier.broadcast(UiEvent::MessageAdded {
            request_id: request_id.to_string(),
            message: user_message,
        });

        // One extra round since the new user message takes one
        let rounds = self.chat_config.history_message_count().max(0) as usize + 1;
        let messages: Vec<Message> = build_window(&self.history.read(), rounds)
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(Message::from)
            .collect();

        // Queued ahead of any narration for this turn
        let narration = self.orchestrator.active_narration();
        if let Some(sink) = &narration {
            sink.interrupt();
        }

        let request = StreamRequest {
            provider: &provider,
            model: &model,
            messages,
            request_id,
            user_message: &submission.user_message,
            window_id,
        };
        let stream = match self.orchestrator.open(request).await {
            Ok(stream) => stream,
            Err(e) if e.is_cancelled() => {
                self.notifier.broadcast(UiEvent::StreamStopped {
                    request_id: request_id.to_string(),
                });
                return OperationResult::ok();
            }
            Err(e) => {
                let error = e.to_string();
                self.orchestrator.fail(request_id, &error);
                return OperationResult::failed(error);
            }
        };

        self.notifier.broadcast(UiEvent::StreamStarted {
            request_id: request_id.to_string(),
            user_message: submission.user_message.clone(),
        });

        match self.orchestrator.consume(request_id, stream, narration).await {
            StreamOutcome::Completed { .. } | StreamOutcome::Stopped => OperationResult::ok(),
            StreamOutcome::Failed { error } => OperationResult::failed(error),
        }
    }

    pub fn stop(&self, request_id: &str) -> OperationResult {
        if request_id.trim().is_empty() {
            return OperationResult::failed("Request id must not be empty");
        }
        OperationResult::from_bool(
            self.orchestrator.cancel(request_id),
            "No active stream for that request",
        )
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.read()
    }

    pub fn save_history(&self, messages: Vec<ChatMessage>) -> OperationResult {
        OperationResult::from_bool(self.history.save(messages), "Failed to save history")
    }

    pub fn add_message(&self, message: ChatMessage) -> OperationResult {
        OperationResult::from_bool(self.history.append(message), "Failed to add message")
    }

    pub fn clear_history(&self) -> OperationResult {
        OperationResult::from_bool(self.history.clear(), "Failed to clear history")
    }

    /// Unfinished streams, now bound to `window_id`.
    pub fn active_streams(&self, window_id: WindowId) -> Vec<StreamSnapshot> {
        self.orchestrator.rebind(window_id)
    }

    /// Lets a window pick up a stream it lost track of. A finished
    /// stream gets its end event resent to that window only.
    pub fn reconnect(&self, request_id: &str, window_id: WindowId) -> ReconnectResult {
        match self.orchestrator.snapshot(request_id) {
            None => ReconnectResult {
                success: false,
                error: Some("Stream does not exist or has already finished".to_string()),
                message: None,
                accumulated_content: None,
            },
            Some(snapshot) if snapshot.is_completed => {
                self.notifier.send_to(
                    window_id,
                    UiEvent::StreamEnd {
                        request_id: request_id.to_string(),
                    },
                );
                ReconnectResult {
                    success: true,
                    error: None,
                    message: Some("Stream already completed".to_string()),
                    accumulated_content: None,
                }
            }
            Some(_) => {
                let accumulated = self
                    .orchestrator
                    .rebind_one(request_id, window_id)
                    .map(|s| s.accumulated_content);
                ReconnectResult {
                    success: true,
                    error: None,
                    message: Some("Reconnected".to_string()),
                    accumulated_content: accumulated,
                }
            }
        }
    }

    pub fn config(&self) -> ChatConfig {
        self.chat_config.get()
    }

    pub fn save_config(&self, config: ChatConfig) -> OperationResult {
        OperationResult::from_bool(self.chat_config.save(config), "Failed to save config")
    }

    pub fn update_config(&self, patch: ChatConfigPatch) -> OperationResult {
        OperationResult::from_bool(self.chat_config.update(patch), "Failed to update config")
    }

    pub fn reset_config(&self) -> OperationResult {
        OperationResult::from_bool(self.chat_config.reset(), "Failed to reset config")
    }

    pub fn sweep_expired(&self) -> usize {
        self.orchestrator.sweep_expired()
    }
}
