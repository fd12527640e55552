//! Deterministic collaborators for tests and dry runs.

use agentcore::{ChatInterface, ModelClient, ModelRequest, NodeError, SinkFormat, Value};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Model that answers from a queue of canned replies
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ModelRequest>>,
    echo: bool,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
            echo: false,
        }
    }

    /// Once the queue is empty, reply with the prompt itself, shaped to the
    /// requested format and sink.
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::new(Vec::<String>::new())
        }
    }

    /// Every request received so far
    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: ModelRequest) -> Result<String, NodeError> {
        let reply = self.replies.lock().await.pop_front();
        let reply = match reply {
            Some(reply) => reply,
            None if self.echo => echo_reply(&request),
            None => return Err(NodeError::Model("no scripted reply left".to_string())),
        };
        self.requests.lock().await.push(request);
        Ok(reply)
    }
}

/// The prompt itself for text; for structured formats, an empty structure,
/// or one prompt copy per field when the sink has several fields.
fn echo_reply(request: &ModelRequest) -> String {
    let prompt = request
        .messages
        .last()
        .map(|m| m.content.clone())
        .unwrap_or_default();
    let fields: &[String] = if request.sink.len() > 1 {
        request.sink.as_slice()
    } else {
        &[]
    };
    let reply = match request.format {
        Some(SinkFormat::Json) => serde_json::Value::Object(
            fields
                .iter()
                .map(|f| (f.clone(), serde_json::Value::String(prompt.clone())))
                .collect(),
        ),
        Some(SinkFormat::List) => serde_json::Value::Array(
            fields
                .iter()
                .map(|_| serde_json::Value::String(prompt.clone()))
                .collect(),
        ),
        _ => return prompt,
    };
    reply.to_string()
}

/// One exchange seen by a [`ScriptedChat`]
#[derive(Debug, Clone, PartialEq)]
pub enum Transcript {
    Message(String),
    Question(String),
    Display { title: String, data: Value },
}

/// Chat that answers questions from a queue and records everything shown
pub struct ScriptedChat {
    answers: Mutex<VecDeque<String>>,
    transcript: Mutex<Vec<Transcript>>,
}

impl ScriptedChat {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            transcript: Mutex::new(Vec::new()),
        }
    }

    pub async fn transcript(&self) -> Vec<Transcript> {
        self.transcript.lock().await.clone()
    }

    async fn answer(&self, prompt: &str) -> Option<String> {
        self.transcript
            .lock()
            .await
            .push(Transcript::Question(prompt.to_string()));
        self.answers.lock().await.pop_front()
    }
}

#[async_trait]
impl ChatInterface for ScriptedChat {
    async fn send_message(&self, content: &str) -> Result<(), NodeError> {
        self.transcript
            .lock()
            .await
            .push(Transcript::Message(content.to_string()));
        Ok(())
    }

    async fn ask_input(&self, prompt: &str) -> Result<Option<String>, NodeError> {
        Ok(self.answer(prompt).await)
    }

    async fn ask_choice(&self, prompt: &str, _options: &[String]) -> Result<Option<String>, NodeError> {
        Ok(self.answer(prompt).await)
    }

    async fn display(&self, title: &str, data: &Value) -> Result<(), NodeError> {
        self.transcript.lock().await.push(Transcript::Display {
            title: title.to_string(),
            data: data.clone(),
        });
        Ok(())
    }
}
