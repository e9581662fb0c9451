//! Test utilities for integration tests
#![allow(dead_code)]
use std::env;
use std::sync::{Arc, RwLock};

use axum::{Router, body::Body};
use serde_json::json;

use faydesk::api::AppState;
use faydesk::api::app;
use faydesk::core::{AppConfig, AppContext};
use faydesk::openai::{OpenAiClient, ProviderConfig};
use faydesk::store::Store;

/// Creates a context backed by an in-memory store with the avatar
/// disabled. Nothing is written to disk.
pub fn test_context() -> Arc<AppContext> {
    let app_config = AppConfig {
        storage_path: env::temp_dir().join("faydesk-test"),
        system_message: String::from("You are a helpful assistant."),
        avatar_enabled: false,
        avatar_port_start: 9300,
        avatar_port_end: 9400,
    };
    let context = AppContext::build(app_config, Store::in_memory(), Arc::new(OpenAiClient))
        .expect("Failed to build app context");
    Arc::new(context)
}

/// Points the context at `base_url` and selects `model`.
pub fn configure_provider(context: &AppContext, base_url: &str, model: &str) {
    assert!(
        context
            .providers
            .save(ProviderConfig::new(base_url, "test-api-key"))
    );
    assert!(context.providers.add_custom_model(model, model));
    assert!(context.providers.select_model(model));
}

pub fn test_app_for(context: Arc<AppContext>) -> Router {
    let app_state = AppState::new(context);
    app(Arc::new(RwLock::new(app_state)))
}

/// Creates a test application router over a fresh context.
pub fn test_app() -> Router {
    test_app_for(test_context())
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not utf-8")
}

/// An OpenAI style streaming body that emits `deltas` in order.
pub fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for (i, delta) in deltas.iter().enumerate() {
        let chunk = json!({
            "id": format!("chunk{}", i),
            "choices": [{"index": 0, "delta": {"content": delta}, "finish_reason": null}]
        });
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");
    body
}
