//! Router for the avatar API

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use super::public;
use crate::api::state::{SharedState, context};
use crate::avatar::AvatarStatus;

async fn avatar_status(State(state): State<SharedState>) -> Json<AvatarStatus> {
    Json(context(&state).avatar.status())
}

async fn avatar_speak(
    State(state): State<SharedState>,
    Json(payload): Json<public::SpeakRequest>,
) -> Json<public::AvatarActionResponse> {
    let success = context(&state).avatar.speak(&payload.text).await;
    Json(public::AvatarActionResponse { success })
}

/// Connect using the stored credentials
async fn avatar_connect(State(state): State<SharedState>) -> Json<public::AvatarActionResponse> {
    let avatar = context(&state).avatar.clone();
    let success = match avatar.credentials().filter(|c| c.is_valid()) {
        Some(credentials) => avatar.connect_avatar(&credentials).await,
        None => {
            tracing::warn!("No avatar credentials configured");
            false
        }
    };
    Json(public::AvatarActionResponse { success })
}

async fn avatar_disconnect(State(state): State<SharedState>) -> Json<public::AvatarActionResponse> {
    context(&state).avatar.disconnect_avatar();
    Json(public::AvatarActionResponse { success: true })
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/status", get(avatar_status))
        .route("/speak", post(avatar_speak))
        .route("/connect", post(avatar_connect))
        .route("/disconnect", post(avatar_disconnect))
}
