//! Semantic inference service client
//!
//! Both pipeline stages talk to the service through [`InferenceService`]:
//! one system prompt, one user message, one JSON object back. The
//! production implementation targets an OpenAI-compatible
//! `/chat/completions` endpoint with `response_format = json_object`.

use super::retry_policy::{RetryPolicy, Retryable};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 5;

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 500;

/// Inference call errors
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference API key is missing")]
    MissingCredentials,

    #[error("Inference request timed out: {0}")]
    Timeout(String),

    #[error("Inference service rate limit hit: {0}")]
    RateLimited(String),

    #[error("Connection to inference service failed: {0}")]
    Connection(String),

    #[error("Inference service error {0}: {1}")]
    Server(u16, String),

    #[error("Inference API error {0}: {1}")]
    Api(u16, String),

    #[error("Inference response violates contract: {0}")]
    Contract(String),
}

impl Retryable for InferenceError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            InferenceError::Timeout(_)
                | InferenceError::RateLimited(_)
                | InferenceError::Connection(_)
                | InferenceError::Server(..)
        )
    }
}

impl InferenceError {
    pub fn is_retryable(&self) -> bool {
        Retryable::is_retryable(self)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = truncate(body, MAX_ERROR_BODY);
        match status {
            408 => InferenceError::Timeout(format!("HTTP 408: {}", body)),
            429 => InferenceError::RateLimited(body),
            500..=599 => InferenceError::Server(status, body),
            _ => InferenceError::Api(status, body),
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            InferenceError::Timeout(e.to_string())
        } else if let Some(status) = e.status() {
            InferenceError::from_status(status.as_u16(), &e.to_string())
        } else {
            InferenceError::Connection(e.to_string())
        }
    }
}

/// One structured-output request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
}

/// Parsed JSON reply plus the model that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ChatJson {
    pub value: serde_json::Value,
    pub model: String,
}

/// External semantic inference service
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Send one request and return the reply parsed as a JSON object or array
    async fn chat_json(&self, request: &ChatRequest) -> Result<ChatJson, InferenceError>;
}

/// Parse reply text strictly: must be a JSON object or array
pub fn parse_json_reply(text: &str) -> Result<serde_json::Value, InferenceError> {
    let value: serde_json::Value = serde_json::from_str(text.trim())
        .map_err(|e| InferenceError::Contract(format!("reply is not valid JSON: {}", e)))?;
    if !(value.is_object() || value.is_array()) {
        return Err(InferenceError::Contract(
            "reply must be a JSON object or array".to_string(),
        ));
    }
    Ok(value)
}

/// Connection settings for [`OpenAiClient`]
#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub requests_per_second: u32,
    pub retry: RetryPolicy,
}

impl InferenceSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl OpenAiClient {
    pub fn new(settings: InferenceSettings) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .user_agent(mealtax_common::config::get_user_agent())
            .timeout(settings.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| InferenceError::Connection(e.to_string()))?;

        let per_second = NonZeroU32::new(settings.requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key: settings.api_key,
            retry: settings.retry,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<ChatJson, InferenceError> {
        self.rate_limiter.until_ready().await;

        let body = CompletionBody {
            model: &request.model,
            messages: [
                Message {
                    role: "system",
                    content: &request.system,
                },
                Message {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: 1.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        tracing::debug!(model = %request.model, "Sending inference request");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(InferenceError::from_status(status.as_u16(), &text));
        }

        // Body read failures are transport errors; only decoding is contract
        let raw = response.text().await?;
        let completion: CompletionResponse = serde_json::from_str(&raw)
            .map_err(|e| InferenceError::Contract(format!("unreadable completion body: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(ChatJson {
            value: parse_json_reply(&content)?,
            model: completion.model.unwrap_or_else(|| request.model.clone()),
        })
    }
}

#[async_trait]
impl InferenceService for OpenAiClient {
    async fn chat_json(&self, request: &ChatRequest) -> Result<ChatJson, InferenceError> {
        if self.api_key.trim().is_empty() {
            return Err(InferenceError::MissingCredentials);
        }
        self.retry
            .run("chat completion", || self.send_once(request))
            .await
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_status_classification() {
        assert!(matches!(InferenceError::from_status(429, ""), InferenceError::RateLimited(_)));
        assert!(matches!(InferenceError::from_status(408, ""), InferenceError::Timeout(_)));
        assert!(matches!(InferenceError::from_status(503, "x"), InferenceError::Server(503, _)));
        assert!(matches!(InferenceError::from_status(401, "x"), InferenceError::Api(401, _)));
    }

    #[test]
    fn test_only_transport_errors_are_retryable() {
        assert!(InferenceError::Timeout("t".into()).is_retryable());
        assert!(InferenceError::RateLimited("r".into()).is_retryable());
        assert!(InferenceError::Connection("c".into()).is_retryable());
        assert!(InferenceError::Server(502, "bad gateway".into()).is_retryable());
        assert!(!InferenceError::Api(400, "bad request".into()).is_retryable());
        assert!(!InferenceError::Contract("shape".into()).is_retryable());
        assert!(!InferenceError::MissingCredentials.is_retryable());
    }

    #[test]
    fn test_parse_json_reply() {
        assert!(parse_json_reply(" {\"items\": []} ").unwrap().is_object());
        assert!(parse_json_reply("[1]").unwrap().is_array());
        assert!(matches!(parse_json_reply("42"), Err(InferenceError::Contract(_))));
        assert!(matches!(parse_json_reply("not json"), Err(InferenceError::Contract(_))));
        assert!(matches!(parse_json_reply(""), Err(InferenceError::Contract(_))));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("чайник", 3), "чай...");
        assert_eq!(truncate("tea", 10), "tea");
    }

    /// Local server answering every connection with `response`, then
    /// holding the socket open. Returns the endpoint base URL and a
    /// connection counter.
    async fn local_server(response: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);

        tokio::spawn(async move {
            let mut open = Vec::new();
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                read_request(&mut socket).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.flush().await;
                open.push(socket);
            }
        });

        (format!("http://{}/v1", addr), connections)
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let body_len = text[..end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .and_then(|v| v.trim().parse::<usize>().ok())
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    fn local_client(base_url: String) -> OpenAiClient {
        let mut settings = InferenceSettings::new("sk-test");
        settings.base_url = base_url;
        settings.timeout = Duration::from_millis(500);
        settings.requests_per_second = 100;
        settings.retry = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            jitter_min: 1.0,
            jitter_max: 1.0,
        };
        OpenAiClient::new(settings).unwrap()
    }

    fn test_request() -> ChatRequest {
        ChatRequest {
            model: DEFAULT_MODEL.to_string(),
            system: "s".to_string(),
            user: "u".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stalled_body_is_retried_as_timeout() {
        let (base_url, connections) = local_server(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 200\r\n\r\n{\"choices\":",
        )
        .await;
        let client = local_client(base_url);

        let err = client.chat_json(&test_request()).await.unwrap_err();
        assert!(matches!(err, InferenceError::Timeout(_)), "got {:?}", err);
        assert!(err.is_retryable());
        assert_eq!(connections.load(AtomicOrdering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_malformed_body_is_contract_error_without_retry() {
        let (base_url, connections) = local_server(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 8\r\n\r\nnot json",
        )
        .await;
        let client = local_client(base_url);

        let err = client.chat_json(&test_request()).await.unwrap_err();
        assert!(matches!(err, InferenceError::Contract(_)), "got {:?}", err);
        assert_eq!(connections.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completion_reply_is_parsed() {
        let (base_url, _) = local_server(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 68\r\n\r\n{\"model\":\"m-1\",\"choices\":[{\"message\":{\"content\":\"{\\\"items\\\":[]}\"}}]}",
        )
        .await;
        let client = local_client(base_url);

        let reply = client.chat_json(&test_request()).await.unwrap();
        assert_eq!(reply.model, "m-1");
        assert_eq!(reply.value, serde_json::json!({ "items": [] }));
    }

    #[tokio::test]
    async fn test_blank_key_is_missing_credentials() {
        let client = OpenAiClient::new(InferenceSettings::new("  ")).unwrap();
        let request = ChatRequest {
            model: DEFAULT_MODEL.to_string(),
            system: "s".to_string(),
            user: "u".to_string(),
        };
        assert!(matches!(
            client.chat_json(&request).await,
            Err(InferenceError::MissingCredentials)
        ));
    }
}
