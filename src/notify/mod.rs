//! Fan-out of UI events to every open surface.
//!
//! A surface (a browser tab on `/api/events`, the CLI REPL) calls
//! `subscribe` and holds the returned `Subscription` for as long as it
//! is open. Dropping the subscription deregisters it.
pub mod models;
pub use models::*;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

pub type WindowId = u64;

#[derive(Default)]
struct Registry {
    next_id: WindowId,
    windows: HashMap<WindowId, UnboundedSender<UiEvent>>,
}

#[derive(Clone, Default)]
pub struct Notifier {
    registry: Arc<Mutex<Registry>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = unbounded_channel();
        let id = match self.registry.lock() {
            Ok(mut registry) => {
                registry.next_id += 1;
                let id = registry.next_id;
                registry.windows.insert(id, tx);
                id
            }
            Err(e) => {
                tracing::error!("Notifier registry poisoned: {}", e);
                0
            }
        };
        tracing::debug!("Window {} subscribed", id);
        Subscription {
            id,
            rx,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Sends the event to every live surface, dropping any whose
    /// receiver has gone away.
    pub fn broadcast(&self, event: UiEvent) {
        let Ok(mut registry) = self.registry.lock() else {
            tracing::error!("Notifier registry poisoned, dropping {}", event.name());
            return;
        };
        registry
            .windows
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Sends the event to a single surface. Returns `false` if that
    /// surface is gone.
    pub fn send_to(&self, window_id: WindowId, event: UiEvent) -> bool {
        let Ok(mut registry) = self.registry.lock() else {
            return false;
        };
        let delivered = registry
            .windows
            .get(&window_id)
            .is_some_and(|tx| tx.send(event).is_ok());
        if !delivered {
            registry.windows.remove(&window_id);
        }
        delivered
    }

    pub fn window_count(&self) -> usize {
        self.registry
            .lock()
            .map(|registry| registry.windows.len())
            .unwrap_or(0)
    }
}

pub struct Subscription {
    id: WindowId,
    rx: UnboundedReceiver<UiEvent>,
    registry: Arc<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<UiEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<UiEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = UiEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.windows.remove(&self.id);
        }
        tracing::debug!("Window {} unsubscribed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(request_id: &str, delta: &str) -> UiEvent {
        UiEvent::StreamData {
            request_id: request_id.to_string(),
            content: delta.to_string(),
        }
    }

    #[test]
    fn test_event_serialization() {
        let value = serde_json::to_value(data("req-1", "Hi")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"event": "chat:stream:data", "requestId": "req-1", "content": "Hi"})
        );
        let value = serde_json::to_value(UiEvent::SubtitleOff).unwrap();
        assert_eq!(value, serde_json::json!({"event": "subtitle:off"}));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_windows() {
        let notifier = Notifier::new();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        assert_ne!(a.id(), b.id());

        notifier.broadcast(data("r", "x"));
        assert_eq!(a.recv().await, Some(data("r", "x")));
        assert_eq!(b.recv().await, Some(data("r", "x")));
    }

    #[tokio::test]
    async fn test_send_to_single_window() {
        let notifier = Notifier::new();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        assert!(notifier.send_to(b.id(), data("r", "only b")));
        assert_eq!(b.recv().await, Some(data("r", "only b")));
        assert_eq!(a.try_recv(), None);
        assert!(!notifier.send_to(999, data("r", "nobody")));
    }

    #[test]
    fn test_drop_deregisters() {
        let notifier = Notifier::new();
        let a = notifier.subscribe();
        let _b = notifier.subscribe();
        assert_eq!(notifier.window_count(), 2);
        drop(a);
        assert_eq!(notifier.window_count(), 1);
        notifier.broadcast(data("r", "x"));
        assert_eq!(notifier.window_count(), 1);
    }
}
