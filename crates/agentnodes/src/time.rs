use agentcore::{Node, NodeContext, NodeError, NodeOutput, NodeSpec};
use agentruntime::{NodeFactory, NodeMetadata};
use async_trait::async_trait;
use tokio::time::{sleep, Duration};

const DEFAULT_DELAY_MS: u64 = 1000;

/// Pause the run for `delay_ms` milliseconds
pub struct DelayNode {
    delay: Duration,
}

#[async_trait]
impl Node for DelayNode {
    fn node_type(&self) -> &str {
        "time.delay"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        ctx.events
            .info(format!("Delaying for {}ms", self.delay.as_millis()));

        tokio::select! {
            _ = sleep(self.delay) => Ok(NodeOutput::new()),
            _ = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
        }
    }
}

pub struct DelayNodeFactory;

impl NodeFactory for DelayNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        let delay_ms = match spec.config.get("delay_ms") {
            None => DEFAULT_DELAY_MS,
            Some(value) => match value.as_f64() {
                Some(ms) if ms >= 0.0 => ms as u64,
                _ => {
                    return Err(NodeError::Configuration(format!(
                        "delay_ms must be a non-negative number, got {}",
                        value
                    )))
                }
            },
        };
        Ok(Box::new(DelayNode {
            delay: Duration::from_millis(delay_ms),
        }))
    }

    fn node_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
            produces_output: false,
        }
    }
}
