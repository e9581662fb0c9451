//! Router for the chat API

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};

use super::public;
use crate::api::public::ApiError;
use crate::api::state::{SharedState, context};
use crate::chat::models::{ChatConfig, ChatConfigPatch, ChatMessage};
use crate::chat::service::{OperationResult, ReconnectResult, StreamSubmission};

/// Run one chat turn. Deltas go out on `/api/events`; this resolves
/// once the stream has finished.
async fn chat_stream(
    State(state): State<SharedState>,
    Json(payload): Json<public::ChatStreamRequest>,
) -> Result<Json<OperationResult>, ApiError> {
    let chat = context(&state).chat.clone();
    let submission = StreamSubmission {
        user_message: payload.user_message,
        request_id: payload.request_id,
    };
    let window_id = payload.window_id;

    // The turn runs in its own task so a client hanging up does not
    // abandon the stream halfway
    let result = tokio::spawn(async move { chat.submit(&submission, window_id).await }).await?;
    Ok(Json(result))
}

async fn chat_stop(
    State(state): State<SharedState>,
    Json(payload): Json<public::StopStreamRequest>,
) -> Json<OperationResult> {
    Json(context(&state).chat.stop(&payload.request_id))
}

async fn history_get(State(state): State<SharedState>) -> Json<public::HistoryResponse> {
    Json(public::HistoryResponse {
        success: true,
        messages: context(&state).chat.history(),
    })
}

async fn history_save(
    State(state): State<SharedState>,
    Json(payload): Json<public::HistoryPayload>,
) -> Json<OperationResult> {
    Json(context(&state).chat.save_history(payload.messages))
}

async fn history_clear(State(state): State<SharedState>) -> Json<OperationResult> {
    Json(context(&state).chat.clear_history())
}

async fn history_add_message(
    State(state): State<SharedState>,
    Json(message): Json<ChatMessage>,
) -> Json<OperationResult> {
    Json(context(&state).chat.add_message(message))
}

async fn active_streams(
    State(state): State<SharedState>,
    Query(params): Query<public::WindowQuery>,
) -> Json<public::ActiveStreamsResponse> {
    Json(public::ActiveStreamsResponse {
        success: true,
        streams: context(&state).chat.active_streams(params.window_id),
    })
}

async fn reconnect_stream(
    State(state): State<SharedState>,
    Path(request_id): Path<String>,
    Query(params): Query<public::WindowQuery>,
) -> Json<ReconnectResult> {
    Json(context(&state).chat.reconnect(&request_id, params.window_id))
}

async fn config_get(State(state): State<SharedState>) -> Json<public::ChatConfigResponse> {
    Json(public::ChatConfigResponse {
        success: true,
        config: context(&state).chat.config(),
    })
}

async fn config_save(
    State(state): State<SharedState>,
    Json(config): Json<ChatConfig>,
) -> Json<OperationResult> {
    Json(context(&state).chat.save_config(config))
}

async fn config_update(
    State(state): State<SharedState>,
    Json(patch): Json<ChatConfigPatch>,
) -> Json<OperationResult> {
    Json(context(&state).chat.update_config(patch))
}

async fn config_reset(State(state): State<SharedState>) -> Json<OperationResult> {
    Json(context(&state).chat.reset_config())
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/stream", post(chat_stream))
        .route("/stop", post(chat_stop))
        .route(
            "/history",
            get(history_get).put(history_save).delete(history_clear),
        )
        .route("/history/messages", post(history_add_message))
        .route("/streams", get(active_streams))
        .route("/streams/{request_id}/reconnect", post(reconnect_stream))
        .route(
            "/config",
            get(config_get).put(config_save).patch(config_update),
        )
        .route("/config/reset", post(config_reset))
}
