//! API routes module

pub mod avatar;
pub mod chat;
mod events;

use axum::Router;

use crate::api::state::SharedState;

/// Create the combined API router
pub fn router() -> Router<SharedState> {
    Router::new()
        // Chat routes
        .nest("/chat", chat::router())
        // UI event stream
        .nest("/events", events::router())
        // Avatar routes
        .nest("/avatar", avatar::router())
}
