use agentcore::{
    ChatMessage, ModelRequest, Node, NodeContext, NodeError, NodeOutput, NodeSpec, SinkFormat,
    SpecError, Template, Value,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Template-driven model call, built from a `type: prompt` declaration
#[derive(Debug, Clone)]
pub struct PromptNode {
    template: Template,
    sink: Vec<String>,
    sink_format: Option<SinkFormat>,
    image_keys: Vec<String>,
    source: BTreeMap<String, String>,
}

impl PromptNode {
    pub fn from_spec(spec: &NodeSpec) -> Result<Self, SpecError> {
        let key = format!("nodes.{}.template", spec.name);
        let source = spec
            .template
            .as_deref()
            .ok_or_else(|| SpecError::malformed(&key, "prompt nodes require a template"))?;
        let template =
            Template::parse(source).map_err(|e| SpecError::malformed(&key, e.to_string()))?;

        Ok(Self {
            template,
            sink: spec.sink.clone(),
            sink_format: spec.sink_format,
            image_keys: spec.image_keys.clone(),
            source: spec.source.clone(),
        })
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    fn collect_images(&self, ctx: &NodeContext) -> Vec<String> {
        let mut images = Vec::new();
        for key in &self.image_keys {
            match ctx.state.get(key) {
                Some(Value::String(path)) if !path.is_empty() => images.push(path.clone()),
                Some(Value::List(items)) => images.extend(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string),
                ),
                _ => {}
            }
        }
        images
    }

    /// Text replies lose their fenced blocks; structured replies are read
    /// from the first fenced block when there is one.
    fn decode(&self, reply: &str) -> Result<Value, NodeError> {
        let format = match self.sink_format {
            None | Some(SinkFormat::Text) => {
                return Ok(Value::String(strip_code_fences(reply).trim().to_string()))
            }
            Some(format) => format,
        };

        let payload = fenced_payload(reply);
        let parsed: serde_json::Value =
            serde_json::from_str(payload.trim()).map_err(|e| NodeError::OutputFormat {
                format: format.as_str().to_string(),
                reason: e.to_string(),
            })?;
        if format == SinkFormat::List && !parsed.is_array() {
            return Err(NodeError::OutputFormat {
                format: format.as_str().to_string(),
                reason: "reply is not a JSON array".to_string(),
            });
        }
        Ok(Value::from(parsed))
    }

    /// Split a decoded reply across a multi-field sink.
    fn into_output(&self, node: &str, value: Value) -> Result<NodeOutput, NodeError> {
        if self.sink.len() <= 1 {
            return Ok(NodeOutput::single(value));
        }
        match value {
            Value::List(items) => Ok(NodeOutput::tuple(items)),
            Value::Map(mut map) if self.sink.iter().all(|f| map.contains_key(f)) => {
                let values = self
                    .sink
                    .iter()
                    .filter_map(|f| map.remove(f))
                    .collect();
                Ok(NodeOutput::tuple(values))
            }
            _ => Err(NodeError::SinkArity {
                node: node.to_string(),
                expected: self.sink.len(),
                actual: 1,
            }),
        }
    }
}

#[async_trait]
impl Node for PromptNode {
    fn node_type(&self) -> &str {
        "prompt"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let message = self.template.render_mapped(&ctx.state, &self.source)?;
        ctx.events.prompt(message.clone());

        let images = self.collect_images(&ctx);
        if !self.image_keys.is_empty() && images.is_empty() {
            return Err(NodeError::MissingInput(format!(
                "at least one image in {}",
                self.image_keys.join(", ")
            )));
        }

        let model = if images.is_empty() {
            ctx.llm.clone()
        } else {
            ctx.vlm.clone()
        }
        .unwrap_or_default();

        let reply = ctx
            .model
            .complete(ModelRequest {
                model,
                messages: vec![ChatMessage::user(message)],
                images,
                format: self.sink_format,
                sink: self.sink.clone(),
            })
            .await?;

        let value = self.decode(&reply)?;
        self.into_output(&ctx.node, value)
    }
}

/// Drop markdown code blocks, fences and body alike. An unclosed fence
/// drops everything after it.
pub fn strip_code_fences(text: &str) -> String {
    let mut in_block = false;
    text.split('\n')
        .filter(|line| {
            if line.trim().starts_with("```") {
                in_block = !in_block;
                return false;
            }
            !in_block
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Body of the first fenced block, or the whole text when there is none.
pub fn fenced_payload(text: &str) -> String {
    let mut lines = text.split('\n').skip_while(|line| !line.trim().starts_with("```"));
    if lines.next().is_none() {
        return text.to_string();
    }
    lines
        .take_while(|line| !line.trim().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        let reply = "Normal text\n```python\ndef test():\n    pass\n```\nMore text";
        assert_eq!(strip_code_fences(reply), "Normal text\nMore text");
        assert_eq!(strip_code_fences("plain"), "plain");
        assert_eq!(strip_code_fences("keep\n```\nunclosed"), "keep");
    }

    #[test]
    fn test_fenced_payload() {
        let reply = "Here you go:\n```json\n{\"ok\": true}\n```\nanything else?";
        assert_eq!(fenced_payload(reply), "{\"ok\": true}");
        assert_eq!(fenced_payload("[1, 2]"), "[1, 2]");
    }

    #[test]
    fn test_decode_formats() {
        let spec = NodeSpec::new("n", "prompt").with_template("x").with_sink(["out"]);
        let mut node = PromptNode::from_spec(&spec).unwrap();
        assert_eq!(node.decode("  hi \n").unwrap(), Value::from("hi"));

        assert_eq!(
            node.decode("Result:\n```\nignored\n```\ndone").unwrap(),
            Value::from("Result:\ndone")
        );

        node.sink_format = Some(SinkFormat::Json);
        let value = node.decode("```json\n{\"score\": 3}\n```").unwrap();
        assert_eq!(value.lookup(["score"]), Some(&Value::Int(3)));
        assert!(matches!(node.decode("not json"), Err(NodeError::OutputFormat { .. })));

        node.sink_format = Some(SinkFormat::List);
        assert!(matches!(node.decode("{\"a\": 1}"), Err(NodeError::OutputFormat { .. })));
    }

    #[test]
    fn test_requires_template() {
        let spec = NodeSpec::new("n", "prompt").with_sink(["out"]);
        assert!(matches!(
            PromptNode::from_spec(&spec),
            Err(SpecError::Malformed { .. })
        ));
    }
}
