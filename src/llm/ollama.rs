use super::{ChatBackend, ChatError, ChatRequest, Message};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct OllamaChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

#[derive(Deserialize)]
struct OllamaChunk {
    message: Option<Message>,
    error: Option<String>,
}

/// Chat client for an Ollama server's `/api/chat` endpoint
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
}

impl OllamaClient {
    /// Creates a client; an empty `base_url` means the local default server
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ChatError> {
        let base_url = if base_url.trim().is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url.trim()
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Request(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

/// Extracts the assistant text from a response body.
///
/// A non-streamed body is one JSON object; a streamed body is one object per
/// line whose `message.content` pieces are concatenated.
pub(crate) fn decode_body(body: &str) -> Result<String, ChatError> {
    let mut reply = String::new();
    let mut chunks = 0;

    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        let chunk: OllamaChunk = serde_json::from_str(line)
            .map_err(|e| ChatError::Decode(format!("{}: {}", e, line)))?;
        if let Some(error) = chunk.error {
            return Err(ChatError::Decode(error));
        }
        if let Some(message) = chunk.message {
            reply.push_str(&message.content);
        }
        chunks += 1;
    }

    if chunks == 0 {
        return Err(ChatError::Decode("empty response body".to_string()));
    }
    Ok(reply)
}

impl ChatBackend for OllamaClient {
    async fn chat(&self, request: &ChatRequest) -> Result<String, ChatError> {
        let body = OllamaChatBody {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            format: request.json.then_some("json"),
        };

        let response = self
            .http
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;

        if !status.is_success() {
            return Err(ChatError::Status {
                code: status.as_u16(),
                body: text,
            });
        }

        decode_body(&text)
    }
}
