use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::config::{ModelInfo, ProviderConfig};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

/// Failure modes of a streaming completion. `Cancelled` is not a
/// failure from the user's point of view and callers branch on it.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream cancelled")]
    Cancelled,
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed completion chunk: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }
}

/// Lazily yields content deltas in the order the API sends them.
pub type ContentStream = BoxStream<'static, Result<String, StreamError>>;

/// Opens streaming completions. The seam exists so the orchestrator can
/// be driven by something other than a live HTTP endpoint.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn stream(
        &self,
        provider: &ProviderConfig,
        model: &str,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<ContentStream, StreamError>;
}

/// Talks to any OpenAI compatible `/v1/chat/completions` endpoint.
#[derive(Debug, Default, Clone)]
pub struct OpenAiClient;

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn stream(
        &self,
        provider: &ProviderConfig,
        model: &str,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<ContentStream, StreamError> {
        completion_stream(
            &messages,
            &provider.base_url,
            &provider.api_key,
            model,
            cancel,
        )
        .await
    }
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChunkChoice>,
}

/// Starts a streaming completion and returns the content deltas.
///
/// Cancelling `cancel` makes the pending request, or the next read from
/// the returned stream, fail with `StreamError::Cancelled`.
pub async fn completion_stream(
    messages: &[Message],
    api_hostname: &str,
    api_key: &str,
    model: &str,
    cancel: CancellationToken,
) -> Result<ContentStream, StreamError> {
    let payload = json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });
    let url = format!("{}/v1/chat/completions", api_hostname.trim_end_matches("/"));
    let request = reqwest::Client::new()
        .post(url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(60 * 5))
        .json(&payload)
        .send();

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(StreamError::Cancelled),
        response = request => response?,
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StreamError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(Box::pin(content_stream(response.bytes_stream(), cancel)))
}

/// Turns the raw SSE body into content deltas.
fn content_stream<S, B>(
    bytes: S,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<String, StreamError>> + Send + 'static
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    async_stream::try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer: Vec<u8> = Vec::new();

        'outer: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(StreamError::Cancelled),
                next = bytes.next() => Ok(next),
            };
            let Some(chunk) = next? else {
                break;
            };

            // Events can be split across network frames so buffer until
            // a complete one is available
            buffer.extend_from_slice(chunk?.as_ref());

            while let Some(event) = split_event(&mut buffer) {
                for data in event_data(&event) {
                    if data == "[DONE]" {
                        break 'outer;
                    }

                    let chunk = serde_json::from_str::<CompletionChunk>(&data).inspect_err(|e| {
                        tracing::error!("Parsing completion chunk failed for {}\nError:{}", data, e)
                    })?;
                    let Some(choice) = chunk.choices.into_iter().next() else {
                        continue;
                    };

                    if let Some(content) = choice.delta.content
                        && !content.is_empty()
                    {
                        yield content;
                    }
                    if choice.finish_reason.is_some() {
                        break 'outer;
                    }
                }
            }
        }
    }
}

/// Removes the next complete server-sent event from the buffer.
fn split_event(buffer: &mut Vec<u8>) -> Option<String> {
    let lf = find(buffer, b"\n\n").map(|i| (i, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|i| (i, 4));
    let (end, sep_len) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (a, b) => a.or(b)?,
    };
    let event = String::from_utf8_lossy(&buffer[..end]).to_string();
    buffer.drain(..end + sep_len);
    Some(event)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// The payloads of every `data:` line in an event.
fn event_data(event: &str) -> Vec<String> {
    event
        .lines()
        .filter_map(|line| line.trim_end_matches('\r').strip_prefix("data:"))
        .map(|data| data.trim().to_string())
        .filter(|data| !data.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelInfo>,
}

/// Lists the models available from an OpenAI compatible API.
pub async fn list_models(api_hostname: &str, api_key: &str) -> Result<Vec<ModelInfo>, StreamError> {
    let url = format!("{}/v1/models", api_hostname.trim_end_matches("/"));
    let response = reqwest::Client::new()
        .get(url)
        .bearer_auth(api_key)
        .timeout(Duration::from_secs(60))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StreamError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let models: ModelList = response.json().await?;
    Ok(models.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    fn sse_body(deltas: &[&str]) -> String {
        let mut body = String::new();
        for (i, delta) in deltas.iter().enumerate() {
            let finish = if i + 1 == deltas.len() {
                json!("stop")
            } else {
                json!(null)
            };
            let chunk = json!({
                "id": format!("chunk{}", i),
                "choices": [{"index": 0, "delta": {"content": delta}, "finish_reason": finish}]
            });
            body.push_str(&format!("data: {}\n\n", chunk));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), r#""system""#);
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            r#""assistant""#
        );
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
    }

    #[test]
    fn test_message_new() {
        let msg = Message::new(Role::User, "Hello world");
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"role":"user","content":"Hello world"}"#
        );
    }

    #[test]
    fn test_split_event_handles_partial_frames() {
        let mut buffer = b"data: one\n\ndata: tw".to_vec();
        assert_eq!(split_event(&mut buffer), Some("data: one".to_string()));
        assert_eq!(split_event(&mut buffer), None);
        buffer.extend_from_slice(b"o\r\n\r\n");
        assert_eq!(split_event(&mut buffer), Some("data: two".to_string()));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_event_data_skips_other_fields() {
        let event = ": keep-alive\nevent: message\ndata: {\"a\":1}";
        assert_eq!(event_data(event), vec![r#"{"a":1}"#.to_string()]);
    }

    #[test]
    fn test_chunk_tolerates_role_only_and_null_content() {
        let chunk: CompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"role":"assistant","content":null},"finish_reason":null}]}"#)
                .unwrap();
        assert_eq!(chunk.choices[0].delta.content, None);

        let chunk: CompletionChunk = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(chunk.choices.is_empty());
    }

    #[tokio::test]
    async fn test_completion_stream_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(&["Hello", " World", "!"]))
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Say hello")];
        let stream = completion_stream(
            &messages,
            &server.url(),
            "test-key",
            "gpt-4",
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let deltas: Vec<String> = stream.try_collect().await.unwrap();

        mock.assert_async().await;
        // Content on the chunk carrying the finish reason is kept
        assert_eq!(deltas, vec!["Hello", " World", "!"]);
    }

    #[tokio::test]
    async fn test_completion_stream_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":"bad key"}"#)
            .create_async()
            .await;

        let result = completion_stream(
            &[Message::new(Role::User, "hi")],
            &server.url(),
            "nope",
            "gpt-4",
            CancellationToken::new(),
        )
        .await;

        match result {
            Err(StreamError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            Err(e) => panic!("Expected status error, got {}", e),
            Ok(_) => panic!("Expected status error, got a stream"),
        }
    }

    #[tokio::test]
    async fn test_completion_stream_cancelled_before_send() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        // Nothing listens on this port; cancellation wins the select
        let result = completion_stream(
            &[Message::new(Role::User, "hi")],
            "http://127.0.0.1:9",
            "key",
            "gpt-4",
            cancel,
        )
        .await;

        assert!(matches!(result, Err(StreamError::Cancelled)));
    }

    #[tokio::test]
    async fn test_completion_stream_cancelled_mid_stream() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(&["one", "two"]))
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let mut stream = completion_stream(
            &[Message::new(Role::User, "hi")],
            &server.url(),
            "key",
            "gpt-4",
            cancel.clone(),
        )
        .await
        .unwrap();

        cancel.cancel();
        let next = stream.next().await.unwrap();
        assert!(next.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_list_models() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"object":"list","data":[{"id":"gpt-4o","object":"model","created":1,"owned_by":"openai"}]}"#,
            )
            .create_async()
            .await;

        let models = list_models(&server.url(), "key").await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "gpt-4o");
        assert!(!models[0].is_custom);
    }
}
