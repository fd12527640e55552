//! Model client for OpenAI-compatible `/chat/completions` endpoints.

use agentcore::{ModelClient, ModelRequest, NodeError, SinkFormat};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub struct HttpModelClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct CompletionBody {
    model: String,
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpModelClient {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", base_url.as_ref().trim_end_matches('/')),
            api_key,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body(request: &ModelRequest) -> CompletionBody {
        let last = request.messages.len().saturating_sub(1);
        let messages = request
            .messages
            .iter()
            .enumerate()
            .map(|(i, message)| {
                // Images ride along with the final user message.
                if i == last && !request.images.is_empty() {
                    let mut parts = vec![json!({"type": "text", "text": message.content})];
                    parts.extend(
                        request
                            .images
                            .iter()
                            .map(|url| json!({"type": "image_url", "image_url": {"url": url}})),
                    );
                    json!({"role": message.role, "content": parts})
                } else {
                    json!({"role": message.role, "content": message.content})
                }
            })
            .collect();

        let response_format = match request.format {
            Some(SinkFormat::Json) => Some(json!({"type": "json_object"})),
            _ => None,
        };

        CompletionBody {
            model: request.model.clone(),
            messages,
            response_format,
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, request: ModelRequest) -> Result<String, NodeError> {
        tracing::debug!(
            "POST {} model={} images={}",
            self.endpoint,
            request.model,
            request.images.len()
        );

        let mut builder = self.client.post(&self.endpoint).json(&Self::body(&request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NodeError::Model(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NodeError::Model(format!("{} returned {}: {}", self.endpoint, status, text)));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| NodeError::Model(format!("invalid response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| NodeError::Model("response has no message content".to_string()))
    }
}
