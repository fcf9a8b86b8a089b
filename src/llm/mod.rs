//! Seam between the edit session and the text-generation backend.

mod ollama;

pub use ollama::{OllamaClient, DEFAULT_BASE_URL};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Errors that can occur while talking to a backend
#[derive(Debug)]
pub enum ChatError {
    /// The request could not be built or sent
    Request(String),
    /// The backend answered with a non-success status
    Status { code: u16, body: String },
    /// The response body was not understood
    Decode(String),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChatError::Request(details) => write!(f, "Failed to send chat request: {}", details),
            ChatError::Status { code, body } => {
                write!(f, "Backend returned status code {}: {}", code, body)
            }
            ChatError::Decode(details) => write!(f, "Failed to decode chat response: {}", details),
        }
    }
}

impl std::error::Error for ChatError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// One chat completion call: the whole conversation so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// Ask the backend to constrain its output to JSON
    pub json: bool,
}

/// A text-generation backend
pub trait ChatBackend {
    /// Sends the conversation and returns the assistant's reply text
    fn chat(&self, request: &ChatRequest) -> impl Future<Output = Result<String, ChatError>> + Send;
}

impl<T: ChatBackend + Sync + ?Sized> ChatBackend for &T {
    fn chat(&self, request: &ChatRequest) -> impl Future<Output = Result<String, ChatError>> + Send {
        (**self).chat(request)
    }
}
