//! Server-sent event stream of UI events

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    response::{IntoResponse, sse::Event, sse::KeepAlive, sse::Sse},
    routing::get,
};
use serde_json::json;
use tokio_stream::StreamExt as _;

use crate::api::state::{SharedState, context};

/// Each connection is a window. The first event names its id so the
/// client can pass it back when it starts or reconnects to a stream.
async fn events_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let subscription = context(&state).notifier.subscribe();
    let window_id = subscription.id();

    let hello = Event::default()
        .event("window")
        .data(json!({ "windowId": window_id }).to_string());
    let events = subscription.filter_map(|event| {
        match Event::default().event(event.name()).json_data(&event) {
            Ok(sse_event) => Some(sse_event),
            Err(e) => {
                tracing::error!("Failed to encode {}: {}", event.name(), e);
                None
            }
        }
    });
    let stream = tokio_stream::once(hello)
        .chain(events)
        .map(Ok::<Event, Infallible>);

    Sse::new(stream).keep_alive(
        KeepAlive::default()
            .text("keep-alive")
            .interval(Duration::from_secs(15)),
    )
}

pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(events_handler))
}
