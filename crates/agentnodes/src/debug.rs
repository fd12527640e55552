use agentcore::{Node, NodeContext, NodeError, NodeOutput, NodeSpec, Template};
use agentruntime::{NodeFactory, NodeMetadata};
use async_trait::async_trait;

/// Logs a message, or the whole state when no message is configured
pub struct DebugNode {
    message: Option<Template>,
}

#[async_trait]
impl Node for DebugNode {
    fn node_type(&self) -> &str {
        "debug.log"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        match &self.message {
            Some(template) => {
                let message = template.render(&ctx.state)?;
                tracing::debug!("[{}] {}", ctx.node, message);
                ctx.events.info(format!("DEBUG: {}", message));
            }
            None => {
                let mut fields: Vec<_> = ctx.state.iter().collect();
                fields.sort_by(|a, b| a.0.cmp(b.0));
                for (key, value) in fields {
                    tracing::debug!("[{}] {} = {}", ctx.node, key, value);
                    ctx.events.info(format!("  {}: {}", key, value));
                }
            }
        }

        Ok(NodeOutput::new())
    }
}

pub struct DebugNodeFactory;

impl NodeFactory for DebugNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        let message = spec
            .config_str("message")
            .map(Template::parse)
            .transpose()?;
        Ok(Box::new(DebugNode { message }))
    }

    fn node_type(&self) -> &str {
        "debug.log"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Logs state values for debugging".to_string(),
            category: "debug".to_string(),
            produces_output: false,
        }
    }
}
