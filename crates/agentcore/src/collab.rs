//! Interfaces to the outside world that node bodies call into.

use crate::{NodeError, SinkFormat, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// One call to a text or vision model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// Opaque model identifier taken from the workflow's `llm`/`vlm`
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Image references; non-empty only for vision calls
    pub images: Vec<String>,
    pub format: Option<SinkFormat>,
    /// Fields a structured reply is split across; more than one means the
    /// reply must hold one value per field.
    pub sink: Vec<String>,
}

/// Model-calling backend. Retries and provider selection live behind it.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<String, NodeError>;
}

/// Chat front end used by the interactive built-in nodes
#[async_trait]
pub trait ChatInterface: Send + Sync {
    async fn send_message(&self, content: &str) -> Result<(), NodeError>;

    /// Free-form question. `None` means the user gave no answer.
    async fn ask_input(&self, prompt: &str) -> Result<Option<String>, NodeError>;

    /// Multiple-choice question; returns the chosen option.
    async fn ask_choice(&self, prompt: &str, options: &[String]) -> Result<Option<String>, NodeError>;

    /// Show structured data. Defaults to sending it as a message.
    async fn display(&self, title: &str, data: &Value) -> Result<(), NodeError> {
        self.send_message(&format!("{}\n{}", title, data)).await
    }
}
