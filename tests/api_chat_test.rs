//! Integration tests for the chat API endpoints

mod test_utils;

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use serial_test::serial;
    use tower::util::ServiceExt;

    use faydesk::notify::UiEvent;

    use crate::test_utils::{
        body_to_string, configure_provider, sse_body, test_app, test_app_for, test_context,
    };

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method(method)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = body_to_string(response.into_body()).await;
        serde_json::from_str(&body).unwrap()
    }

    #[tokio::test]
    #[serial]
    async fn it_returns_empty_history() {
        let app = test_app();

        let response = app.oneshot(get("/api/chat/history")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["messages"], json!([]));
    }

    #[tokio::test]
    #[serial]
    async fn it_adds_and_clears_history() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/chat/history/messages",
                json!({"role": "user", "content": "Hello", "timestamp": 1}),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["success"], json!(true));

        let response = app.clone().oneshot(get("/api/chat/history")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["messages"][0]["content"], json!("Hello"));
        assert_eq!(body["messages"][0]["role"], json!("user"));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/chat/history")
                    .method("DELETE")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json_body(response).await["success"], json!(true));

        let response = app.oneshot(get("/api/chat/history")).await.unwrap();
        assert_eq!(json_body(response).await["messages"], json!([]));
    }

    #[tokio::test]
    #[serial]
    async fn it_rejects_out_of_range_config() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/chat/config",
                json!({"historyMessageCount": 150}),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["success"], json!(false));

        // The stored config is untouched
        let response = app.oneshot(get("/api/chat/config")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["config"]["historyMessageCount"], json!(20));
    }

    #[tokio::test]
    #[serial]
    async fn it_patches_and_resets_config() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                "/api/chat/config",
                json!({"historyMessageCount": 5}),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["success"], json!(true));

        let response = app.clone().oneshot(get("/api/chat/config")).await.unwrap();
        assert_eq!(
            json_body(response).await["config"]["historyMessageCount"],
            json!(5)
        );

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/chat/config/reset", json!({})))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["success"], json!(true));

        let response = app.oneshot(get("/api/chat/config")).await.unwrap();
        assert_eq!(
            json_body(response).await["config"]["historyMessageCount"],
            json!(20)
        );
    }

    #[tokio::test]
    #[serial]
    async fn it_requires_a_provider_before_streaming() {
        let context = test_context();
        let mut events = context.notifier.subscribe();
        let app = test_app_for(context.clone());

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/chat/stream",
                json!({"userMessage": "Hi", "requestId": "req-1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Configure the model provider API first"));

        // Nothing was recorded or broadcast
        assert!(context.chat.history().is_empty());
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    #[serial]
    async fn it_streams_a_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-api-key")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(&["Hello", " World"]))
            .create_async()
            .await;

        let context = test_context();
        configure_provider(&context, &server.url(), "test-model");
        let mut events = context.notifier.subscribe();
        let app = test_app_for(context.clone());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/chat/stream",
                json!({"userMessage": "Say hello", "requestId": "req-1"}),
            ))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(json_body(response).await["success"], json!(true));

        let mut received = Vec::new();
        while let Some(event) = events.try_recv() {
            received.push(event);
        }
        assert!(matches!(received.first(), Some(UiEvent::MessageAdded { .. })));
        assert!(matches!(received.last(), Some(UiEvent::StreamEnd { .. })));
        let streamed: String = received
            .iter()
            .filter_map(|e| match e {
                UiEvent::StreamData { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(streamed, "Hello World");
        assert!(
            received
                .iter()
                .all(|e| e.request_id().is_none_or(|id| id == "req-1"))
        );

        let response = app.oneshot(get("/api/chat/history")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["messages"][0]["content"], json!("Say hello"));
        assert_eq!(body["messages"][1]["role"], json!("assistant"));
        assert_eq!(body["messages"][1]["content"], json!("Hello World"));
    }

    #[tokio::test]
    #[serial]
    async fn it_reports_remote_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let context = test_context();
        configure_provider(&context, &server.url(), "test-model");
        let mut events = context.notifier.subscribe();
        let app = test_app_for(context.clone());

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/chat/stream",
                json!({"userMessage": "Hi", "requestId": "req-err"}),
            ))
            .await
            .unwrap();

        assert_eq!(json_body(response).await["success"], json!(false));
        let mut saw_error = false;
        while let Some(event) = events.try_recv() {
            if let UiEvent::StreamError { request_id, .. } = event {
                assert_eq!(request_id, "req-err");
                saw_error = true;
            }
        }
        assert!(saw_error);
        assert_eq!(context.chat.orchestrator().active_count(), 0);
    }

    #[tokio::test]
    #[serial]
    async fn it_fails_to_stop_unknown_stream() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/chat/stop",
                json!({"requestId": "missing"}),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["success"], json!(false));

        let response = app
            .oneshot(json_request("POST", "/api/chat/stop", json!({"requestId": ""})))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["error"], json!("Request id must not be empty"));
    }

    #[tokio::test]
    #[serial]
    async fn it_lists_no_active_streams() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(get("/api/chat/streams?windowId=1"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["streams"], json!([]));

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/chat/streams/missing/reconnect?windowId=1",
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["success"], json!(false));
    }
}
