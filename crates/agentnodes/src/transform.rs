use agentcore::{Node, NodeContext, NodeError, NodeOutput, NodeSpec, StateSchema, Value};
use agentruntime::{NodeFactory, NodeMetadata};
use async_trait::async_trait;

fn source_field(spec: &NodeSpec) -> Result<String, NodeError> {
    spec.source
        .get("source")
        .cloned()
        .ok_or_else(|| NodeError::Configuration("'source' must name a state field".to_string()))
}

fn check_source(source: &str, schema: &StateSchema) -> Result<(), NodeError> {
    if schema.contains(source) {
        Ok(())
    } else {
        Err(NodeError::Configuration(format!(
            "source '{}' is not a declared state field",
            source
        )))
    }
}

/// Parse the JSON text held in `source` into a structured value
pub struct JsonParseNode {
    source: String,
}

#[async_trait]
impl Node for JsonParseNode {
    fn node_type(&self) -> &str {
        "transform.json_parse"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let input = ctx
            .require_state(&self.source)?
            .as_str()
            .ok_or_else(|| NodeError::ExecutionFailed(format!("'{}' does not hold text", self.source)))?;

        let parsed: serde_json::Value = serde_json::from_str(input).map_err(|e| NodeError::OutputFormat {
            format: "json".to_string(),
            reason: e.to_string(),
        })?;

        Ok(NodeOutput::single(parsed))
    }

    fn validate(&self, _spec: &NodeSpec, schema: &StateSchema) -> Result<(), NodeError> {
        check_source(&self.source, schema)
    }
}

pub struct JsonParseNodeFactory;

impl NodeFactory for JsonParseNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(JsonParseNode {
            source: source_field(spec)?,
        }))
    }

    fn node_type(&self) -> &str {
        "transform.json_parse"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Parse JSON text from a state field".to_string(),
            category: "transform".to_string(),
            produces_output: true,
        }
    }
}

/// Serialize the value held in `source` to JSON text
pub struct JsonStringifyNode {
    source: String,
    pretty: bool,
}

#[async_trait]
impl Node for JsonStringifyNode {
    fn node_type(&self) -> &str {
        "transform.json_stringify"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let value = ctx.require_state(&self.source)?;

        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(NodeOutput::single(json))
    }

    fn validate(&self, _spec: &NodeSpec, schema: &StateSchema) -> Result<(), NodeError> {
        check_source(&self.source, schema)
    }
}

pub struct JsonStringifyNodeFactory;

impl NodeFactory for JsonStringifyNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        let pretty = spec
            .config
            .get("pretty")
            .map(Value::is_truthy)
            .unwrap_or(false);
        Ok(Box::new(JsonStringifyNode {
            source: source_field(spec)?,
            pretty,
        }))
    }

    fn node_type(&self) -> &str {
        "transform.json_stringify"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Convert a state field to a JSON string".to_string(),
            category: "transform".to_string(),
            produces_output: true,
        }
    }
}
