//! Lifecycle of streaming completions, one per user turn.
//!
//! Each request id gets a cancellation handle and a state entry when it
//! is opened. The state moves `Created -> Streaming` and ends in one of
//! `Completed`, `Aborted` or `Errored`, after which the terminal event
//! is broadcast and the entry is released. Entries that outlive
//! `STREAM_EXPIRY` are reaped by `sweep_expired` whatever their phase.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::history::HistoryManager;
use super::models::{ChatMessage, now_millis};
use super::narration::{NarrationSegmenter, NarrationSink};
use super::prompt::SystemPreamble;
use crate::notify::{Notifier, UiEvent, WindowId};
use crate::openai::{CompletionClient, ContentStream, Message, ProviderConfig, Role, StreamError};

pub const STREAM_EXPIRY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamPhase {
    Created,
    Streaming,
    Completed,
    Aborted,
    Errored,
}

struct StreamState {
    user_message: String,
    model: String,
    accumulated: String,
    phase: StreamPhase,
    window_id: Option<WindowId>,
    created_at: Instant,
    start_time: i64,
}

/// Point-in-time view of a stream handed to UI surfaces.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamSnapshot {
    pub request_id: String,
    pub user_message: String,
    pub model: String,
    pub accumulated_content: String,
    pub start_time: i64,
    pub is_completed: bool,
    pub phase: StreamPhase,
    pub window_id: Option<WindowId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Completed { content: String },
    Stopped,
    Failed { error: String },
}

/// Everything needed to open a stream for one turn.
pub struct StreamRequest<'a> {
    pub provider: &'a ProviderConfig,
    pub model: &'a str,
    pub messages: Vec<Message>,
    pub request_id: &'a str,
    pub user_message: &'a str,
    pub window_id: Option<WindowId>,
}

#[derive(Default)]
struct Registry {
    handles: HashMap<String, CancellationToken>,
    states: HashMap<String, StreamState>,
}

pub struct StreamOrchestrator {
    registry: Mutex<Registry>,
    client: Arc<dyn CompletionClient>,
    notifier: Notifier,
    history: Arc<HistoryManager>,
    preamble: SystemPreamble,
    narration: Option<Arc<dyn NarrationSink>>,
}

impl StreamOrchestrator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        notifier: Notifier,
        history: Arc<HistoryManager>,
        preamble: SystemPreamble,
        narration: Option<Arc<dyn NarrationSink>>,
    ) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            client,
            notifier,
            history,
            preamble,
            narration,
        }
    }

    /// The narration sink if one is configured and currently able to
    /// speak.
    pub fn active_narration(&self) -> Option<Arc<dyn NarrationSink>> {
        self.narration.as_ref().filter(|s| s.is_active()).cloned()
    }

    /// Registers the request and opens the remote stream with the system
    /// preamble in front of `messages`. On failure the request is
    /// released before returning.
    pub async fn open(&self, request: StreamRequest<'_>) -> Result<ContentStream, StreamError> {
        let StreamRequest {
            provider,
            model,
            messages,
            request_id,
            user_message,
            window_id,
        } = request;

        let cancel = CancellationToken::new();
        {
            let mut registry = self.lock();
            registry
                .handles
                .insert(request_id.to_string(), cancel.clone());
            registry.states.insert(
                request_id.to_string(),
                StreamState {
                    user_message: user_message.to_string(),
                    model: model.to_string(),
                    accumulated: String::new(),
                    phase: StreamPhase::Created,
                    window_id,
                    created_at: Instant::now(),
                    start_time: now_millis(),
                },
            );
        }

        let preamble = match self.preamble.render() {
            Ok(preamble) => preamble,
            Err(e) => {
                self.cleanup(request_id);
                return Err(StreamError::Other(e));
            }
        };
        let mut full = Vec::with_capacity(messages.len() + 1);
        full.push(Message::new(Role::System, &preamble));
        full.extend(messages);

        match self.client.stream(provider, model, full, cancel).await {
            Ok(stream) => {
                self.set_phase(request_id, StreamPhase::Streaming);
                tracing::debug!("Stream {} opened with model {}", request_id, model);
                Ok(stream)
            }
            Err(e) => {
                tracing::error!("Failed to open stream {}: {}", request_id, e);
                self.cleanup(request_id);
                Err(e)
            }
        }
    }

    /// Drains the stream, broadcasting each delta and feeding narration,
    /// then broadcasts the terminal event and releases the request.
    pub async fn consume(
        &self,
        request_id: &str,
        mut stream: ContentStream,
        narration: Option<Arc<dyn NarrationSink>>,
    ) -> StreamOutcome {
        let mut segmenter = NarrationSegmenter::new();
        let mut reply = String::new();

        while let Some(chunk) = stream.next().await {
            let content = match chunk {
                Ok(content) => content,
                Err(e) if e.is_cancelled() => {
                    self.set_phase(request_id, StreamPhase::Aborted);
                    self.notifier.broadcast(UiEvent::StreamStopped {
                        request_id: request_id.to_string(),
                    });
                    self.cleanup(request_id);
                    tracing::debug!("Stream {} stopped", request_id);
                    return StreamOutcome::Stopped;
                }
                Err(e) => return self.fail(request_id, &e.to_string()),
            };
            if content.is_empty() {
                continue;
            }

            reply.push_str(&content);
            self.append_content(request_id, &content);
            self.notifier.broadcast(UiEvent::StreamData {
                request_id: request_id.to_string(),
                content: content.clone(),
            });

            if let Some(sink) = &narration
                && let Some(segment) = segmenter.push(&content)
            {
                sink.narrate(segment);
            }
        }

        if let Some(sink) = &narration
            && let Some(segment) = segmenter.finish()
        {
            sink.narrate(segment);
        }

        if !reply.trim().is_empty() {
            let message = ChatMessage::assistant(&reply);
            if !self.history.append(message.clone()) {
                tracing::error!("Failed to persist reply for {}", request_id);
            }
            self.notifier.broadcast(UiEvent::MessageCompleted {
                request_id: request_id.to_string(),
                message,
            });
        }

        self.set_phase(request_id, StreamPhase::Completed);
        self.notifier.broadcast(UiEvent::StreamEnd {
            request_id: request_id.to_string(),
        });
        self.cleanup(request_id);
        tracing::debug!("Stream {} completed", request_id);
        StreamOutcome::Completed { content: reply }
    }

    /// Marks the request errored, tells the UI and releases it.
    pub fn fail(&self, request_id: &str, error: &str) -> StreamOutcome {
        tracing::error!("Stream {} failed: {}", request_id, error);
        self.set_phase(request_id, StreamPhase::Errored);
        self.notifier.broadcast(UiEvent::StreamError {
            request_id: request_id.to_string(),
            error: error.to_string(),
        });
        self.cleanup(request_id);
        StreamOutcome::Failed {
            error: error.to_string(),
        }
    }

    /// Signals cancellation. The state entry stays until the consuming
    /// loop or the sweep releases it.
    pub fn cancel(&self, request_id: &str) -> bool {
        match self.lock().handles.remove(request_id) {
            Some(token) => {
                token.cancel();
                tracing::debug!("Cancelled stream {}", request_id);
                true
            }
            None => false,
        }
    }

    /// Points every unfinished stream at `window_id` and returns them.
    pub fn rebind(&self, window_id: WindowId) -> Vec<StreamSnapshot> {
        let mut registry = self.lock();
        let mut rebound: Vec<StreamSnapshot> = registry
            .states
            .iter_mut()
            .filter(|(_, state)| state.phase != StreamPhase::Completed)
            .map(|(request_id, state)| {
                state.window_id = Some(window_id);
                snapshot(request_id, state)
            })
            .collect();
        rebound.sort_by_key(|s| s.start_time);
        rebound
    }

    /// Rebinds a single unfinished stream.
    pub fn rebind_one(&self, request_id: &str, window_id: WindowId) -> Option<StreamSnapshot> {
        let mut registry = self.lock();
        let state = registry.states.get_mut(request_id)?;
        if state.phase != StreamPhase::Completed {
            state.window_id = Some(window_id);
        }
        Some(snapshot(request_id, state))
    }

    pub fn snapshot(&self, request_id: &str) -> Option<StreamSnapshot> {
        let registry = self.lock();
        registry
            .states
            .get(request_id)
            .map(|state| snapshot(request_id, state))
    }

    pub fn active_count(&self) -> usize {
        self.lock().states.len()
    }

    pub fn cleanup(&self, request_id: &str) {
        let mut registry = self.lock();
        registry.handles.remove(request_id);
        registry.states.remove(request_id);
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// Removes every entry created more than `STREAM_EXPIRY` before
    /// `now`, completed or not.
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut registry = self.lock();
        let expired: Vec<String> = registry
            .states
            .iter()
            .filter(|(_, state)| now.saturating_duration_since(state.created_at) > STREAM_EXPIRY)
            .map(|(request_id, _)| request_id.clone())
            .collect();
        for request_id in &expired {
            registry.handles.remove(request_id);
            registry.states.remove(request_id);
            tracing::debug!("Swept expired stream {}", request_id);
        }
        expired.len()
    }

    fn append_content(&self, request_id: &str, content: &str) {
        if let Some(state) = self.lock().states.get_mut(request_id) {
            state.accumulated.push_str(content);
        }
    }

    fn set_phase(&self, request_id: &str, phase: StreamPhase) {
        if let Some(state) = self.lock().states.get_mut(request_id) {
            state.phase = phase;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn snapshot(request_id: &str, state: &StreamState) -> StreamSnapshot {
    StreamSnapshot {
        request_id: request_id.to_string(),
        user_message: state.user_message.clone(),
        model: state.model.clone(),
        accumulated_content: state.accumulated.clone(),
        start_time: state.start_time,
        is_completed: state.phase == StreamPhase::Completed,
        phase: state.phase,
        window_id: state.window_id,
    }
}
