//! Request/response channel to the avatar render surface.
//!
//! The render surface connects to a local WebSocket server. Only one
//! peer is tracked at a time: a new connection replaces the previous
//! one. Requests get a `msg_N` id and wait for a `response` frame with
//! the same id. Subtitle frames from the peer are not correlated and go
//! straight to the UI.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Error, Result, bail};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use super::models::{AvatarCommand, WireMessage};
use crate::notify::{Notifier, UiEvent};

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECTION_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("avatar peer is not connected")]
    NotConnected,
    #[error("timed out waiting for the avatar peer")]
    Timeout,
    #[error("avatar peer rejected the request: {0}")]
    Rejected(String),
    #[error("avatar connection closed before a response arrived")]
    Closed,
    #[error("failed to encode request: {0}")]
    Send(#[from] serde_json::Error),
}

struct Peer {
    id: u64,
    tx: UnboundedSender<WsMessage>,
}

struct Inner {
    next_message_id: AtomicU64,
    next_peer_id: AtomicU64,
    peer: Mutex<Option<Peer>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    port: AtomicU16,
    shutdown: Mutex<Option<CancellationToken>>,
    notifier: Notifier,
    timeout: Duration,
}

#[derive(Clone)]
pub struct AvatarTransport {
    inner: Arc<Inner>,
}

impl AvatarTransport {
    pub fn new(notifier: Notifier) -> Self {
        Self::with_timeout(notifier, DEFAULT_RESPONSE_TIMEOUT)
    }

    pub fn with_timeout(notifier: Notifier, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_message_id: AtomicU64::new(0),
                next_peer_id: AtomicU64::new(0),
                peer: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                port: AtomicU16::new(0),
                shutdown: Mutex::new(None),
                notifier,
                timeout,
            }),
        }
    }

    /// Binds the first free port in `start_port..=end_port` and starts
    /// accepting connections. Calling it again while running returns the
    /// bound port.
    pub async fn start(&self, start_port: u16, end_port: u16) -> Result<u16, Error> {
        if self.is_running() {
            return Ok(self.port());
        }

        for port in start_port..=end_port {
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => {
                    let shutdown = CancellationToken::new();
                    if let Ok(mut current) = self.inner.shutdown.lock() {
                        *current = Some(shutdown.clone());
                    }
                    self.inner.port.store(port, Ordering::SeqCst);
                    tokio::spawn(accept_loop(Arc::clone(&self.inner), listener, shutdown));
                    tracing::info!("Avatar transport listening on 127.0.0.1:{}", port);
                    return Ok(port);
                }
                Err(e) => {
                    tracing::debug!("Port {} unavailable: {}", port, e);
                }
            }
        }

        bail!(
            "Unable to start avatar transport in port range {}-{}",
            start_port,
            end_port
        )
    }

    /// Closes the peer, stops accepting connections and fails every
    /// request still waiting for a response.
    pub fn stop(&self) {
        if let Some(token) = self.inner.shutdown.lock().ok().and_then(|mut s| s.take()) {
            token.cancel();
        }
        if let Ok(mut peer) = self.inner.peer.lock()
            && let Some(old) = peer.take()
        {
            let _ = old.tx.send(WsMessage::Close(None));
        }
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.clear();
        }
        self.inner.port.store(0, Ordering::SeqCst);
    }

    pub fn port(&self) -> u16 {
        self.inner.port.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .shutdown
            .lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .peer
            .lock()
            .map(|peer| peer.as_ref().is_some_and(|p| !p.tx.is_closed()))
            .unwrap_or(false)
    }

    /// Polls until a peer is connected or `timeout` elapses.
    pub async fn wait_for_connection(&self, timeout: Duration) -> Result<(), TransportError> {
        let started = tokio::time::Instant::now();
        loop {
            if self.is_connected() {
                return Ok(());
            }
            if started.elapsed() > timeout {
                return Err(TransportError::Timeout);
            }
            tokio::time::sleep(CONNECTION_POLL_INTERVAL).await;
        }
    }

    /// Queues a request to the peer and returns a handle for its
    /// response. The frame is enqueued before this returns so calls
    /// made in sequence go out in the same order.
    pub fn dispatch(
        &self,
        command: AvatarCommand,
        data: Option<Value>,
    ) -> Result<PendingReply, TransportError> {
        let tx = self
            .inner
            .peer
            .lock()
            .ok()
            .and_then(|peer| peer.as_ref().map(|p| p.tx.clone()))
            .ok_or(TransportError::NotConnected)?;

        let id = format!(
            "msg_{}",
            self.inner.next_message_id.fetch_add(1, Ordering::SeqCst) + 1
        );
        let frame = serde_json::to_string(&WireMessage {
            kind: command.as_str().to_string(),
            id: Some(id.clone()),
            data,
            result: None,
        })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner.insert_pending(&id, reply_tx);

        if tx.send(WsMessage::Text(frame)).is_err() {
            self.inner.remove_pending(&id);
            return Err(TransportError::NotConnected);
        }
        tracing::debug!("Sent {} as {}", command, id);

        Ok(PendingReply {
            id,
            rx: reply_rx,
            inner: Arc::clone(&self.inner),
        })
    }

    pub async fn send_message(
        &self,
        command: AvatarCommand,
        data: Option<Value>,
    ) -> Result<Value, TransportError> {
        self.dispatch(command, data)?.wait().await
    }
}

/// A request that has been sent and is waiting on its response.
pub struct PendingReply {
    id: String,
    rx: oneshot::Receiver<Value>,
    inner: Arc<Inner>,
}

impl PendingReply {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn wait(self) -> Result<Value, TransportError> {
        let result = match tokio::time::timeout(self.inner.timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => return Err(TransportError::Closed),
            Err(_) => {
                self.inner.remove_pending(&self.id);
                return Err(TransportError::Timeout);
            }
        };

        let success = result
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if success {
            Ok(result)
        } else {
            let reason = result
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("operation failed");
            Err(TransportError::Rejected(reason.to_string()))
        }
    }
}

impl Inner {
    fn insert_pending(&self, id: &str, tx: oneshot::Sender<Value>) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id.to_string(), tx);
        }
    }

    fn remove_pending(&self, id: &str) -> Option<oneshot::Sender<Value>> {
        self.pending.lock().ok().and_then(|mut p| p.remove(id))
    }

    fn replace_peer(&self, tx: UnboundedSender<WsMessage>) -> u64 {
        let id = self.next_peer_id.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut peer) = self.peer.lock() {
            if peer.is_some() {
                tracing::info!("Avatar peer replaced by a new connection");
            }
            *peer = Some(Peer { id, tx });
        }
        id
    }

    fn release_peer(&self, peer_id: u64) {
        if let Ok(mut peer) = self.peer.lock()
            && peer.as_ref().is_some_and(|p| p.id == peer_id)
        {
            *peer = None;
        }
    }

    fn handle_frame(&self, text: &str) {
        let message: WireMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Ignoring malformed avatar frame: {}", e);
                return;
            }
        };

        match message.kind.as_str() {
            "response" => {
                let Some(id) = message.id else {
                    tracing::warn!("Avatar response without an id");
                    return;
                };
                match self.remove_pending(&id) {
                    Some(tx) => {
                        if tx.send(message.result.unwrap_or(Value::Null)).is_err() {
                            tracing::debug!("Response for {} arrived after its waiter left", id);
                        }
                    }
                    None => tracing::warn!("No pending avatar request for {}", id),
                }
            }
            "subtitle_on" => {
                let text = message
                    .data
                    .as_ref()
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.notifier.broadcast(UiEvent::SubtitleOn { text });
            }
            "subtitle_off" => self.notifier.broadcast(UiEvent::SubtitleOff),
            other => tracing::debug!("Ignoring avatar frame of type {}", other),
        }
    }
}

async fn accept_loop(inner: Arc<Inner>, listener: TcpListener, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tracing::debug!("Avatar peer connecting from {}", addr);
                    tokio::spawn(handle_connection(Arc::clone(&inner), stream, shutdown.clone()));
                }
                Err(e) => tracing::warn!("Failed to accept avatar connection: {}", e),
            }
        }
    }
    tracing::debug!("Avatar transport stopped accepting connections");
}

async fn handle_connection(inner: Arc<Inner>, stream: TcpStream, shutdown: CancellationToken) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::warn!("Avatar WebSocket handshake failed: {}", e);
            return;
        }
    };
    let (mut sink, mut source) = socket.split();
    let (tx, mut rx) = unbounded_channel::<WsMessage>();
    let peer_id = inner.replace_peer(tx);

    // Writes end once the peer is released or replaced and the sender
    // is dropped.
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, WsMessage::Close(_));
            if let Err(e) = sink.send(message).await {
                tracing::warn!("Failed to write to avatar peer: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = source.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => inner.handle_frame(&text),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Avatar connection error: {}", e);
                    break;
                }
            }
        }
    }

    inner.release_peer(peer_id);
    tracing::debug!("Avatar peer {} disconnected", peer_id);
}
