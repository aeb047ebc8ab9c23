use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use memchr::memchr;
use thiserror::Error;

use crate::api::{ChatMessage, ChatRequest, ChatResponse};
use crate::core::routes::{split_routed_model, RouteTable};

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("no route configured for '{0}'")]
    UnknownRoute(String),
    #[error("{0}")]
    Connect(String),
    #[error("{0}")]
    Request(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Api(String),
    #[error("{0}")]
    Stream(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// One streamed completion call.
#[derive(Clone)]
pub struct CompletionRequest {
    /// Routed model identifier, `"<prefix>/<model>"`.
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub api_key: String,
}

impl std::fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Incremental text deltas. An `Err` item ends the stream.
pub type DeltaStream = BoxStream<'static, Result<String, TransportError>>;

#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Open a streaming completion. Setup failures are returned directly;
    /// failures after the first byte arrive as an `Err` item.
    async fn stream(&self, request: CompletionRequest) -> Result<DeltaStream, TransportError>;
}

#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Delta(String),
    Error(String),
    Done,
    Skip,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn parse_data_payload(payload: &str) -> SseEvent {
    if payload == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .map(SseEvent::Delta)
            .unwrap_or(SseEvent::Skip),
        Err(_) => {
            if payload.trim().is_empty() {
                return SseEvent::Skip;
            }
            SseEvent::Error(format_api_error(payload))
        }
    }
}

fn parse_sse_line(line: &str) -> SseEvent {
    extract_data_payload(line)
        .map(parse_data_payload)
        .unwrap_or(SseEvent::Skip)
}

/// Split a raw SSE byte stream into content deltas. A final line that lacks
/// a trailing newline is still parsed once the bytes run out.
fn sse_deltas<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, TransportError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut bytes = std::pin::pin!(bytes);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(TransportError::Stream(err.to_string()));
                    return;
                }
            };
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(newline_pos) = memchr(b'\n', &buffer) {
                let line = String::from_utf8_lossy(&buffer[..newline_pos])
                    .trim()
                    .to_string();
                buffer.drain(..=newline_pos);

                match parse_sse_line(&line) {
                    SseEvent::Delta(text) => yield Ok(text),
                    SseEvent::Error(message) => {
                        yield Err(TransportError::Api(message));
                        return;
                    }
                    SseEvent::Done => return,
                    SseEvent::Skip => {}
                }
            }
        }

        let line = String::from_utf8_lossy(&buffer).trim().to_string();
        match parse_sse_line(&line) {
            SseEvent::Delta(text) => yield Ok(text),
            SseEvent::Error(message) => yield Err(TransportError::Api(message)),
            SseEvent::Done | SseEvent::Skip => {}
        }
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Render a provider error body as readable text, keeping the raw payload.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error: <empty>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value).filter(|s| !s.is_empty()) {
                return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
            }
            return format!("API Error:\n```json\n{}\n```", pretty_json);
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error: {}", trimmed)
    }
}

/// OpenAI-compatible `chat/completions` streaming over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    routes: RouteTable,
}

impl HttpTransport {
    pub fn new(routes: RouteTable) -> Self {
        Self {
            client: reqwest::Client::new(),
            routes,
        }
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn stream(&self, request: CompletionRequest) -> Result<DeltaStream, TransportError> {
        let (prefix, model) = split_routed_model(&request.model)
            .ok_or_else(|| TransportError::UnknownRoute(request.model.clone()))?;
        let route = self
            .routes
            .find(prefix)
            .ok_or_else(|| TransportError::UnknownRoute(prefix.to_string()))?;

        let body = ChatRequest {
            model: model.to_string(),
            messages: request.messages,
            stream: true,
        };

        let http_request = self
            .client
            .post(route.endpoint("chat/completions"))
            .header("Content-Type", "application/json");
        let response = route
            .authorize(http_request, &request.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(TransportError::Status {
                status,
                body: format_api_error(&error_text),
            });
        }

        Ok(sse_deltas(response.bytes_stream()).boxed())
    }
}
