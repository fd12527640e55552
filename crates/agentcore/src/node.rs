use crate::{
    matches_exit_command, ChatInterface, EventEmitter, ModelClient, NodeError, NodeSpec,
    RuntimeState, StateSchema, Value,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Core trait that all executable nodes implement
#[async_trait]
pub trait Node: Send + Sync {
    /// Type tag the node was registered under (e.g. "json_parse")
    fn node_type(&self) -> &str;

    /// Execute against a snapshot of the current state
    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError>;

    /// Optional: check the declaration at workflow load time
    fn validate(&self, _spec: &NodeSpec, _schema: &StateSchema) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    /// Name of the node being executed
    pub node: String,

    /// State as it was when the node started
    pub state: RuntimeState,

    pub model: Arc<dyn ModelClient>,
    pub chat: Arc<dyn ChatInterface>,

    /// Text model identifier from the workflow
    pub llm: Option<String>,
    /// Vision model identifier from the workflow
    pub vlm: Option<String>,

    /// Phrases that end the run when typed by the user
    pub exit_commands: Vec<String>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancellation token for graceful shutdown
    pub cancellation: tokio_util::sync::CancellationToken,
}

impl NodeContext {
    /// Get a state field or return error
    pub fn require_state(&self, name: &str) -> Result<&Value, NodeError> {
        self.state
            .get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    pub fn is_exit_command(&self, input: &str) -> bool {
        matches_exit_command(&self.exit_commands, input)
    }
}

/// Output from node execution: one value per sink field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeOutput {
    pub values: Vec<Value>,
    /// Writes to fixed fields, applied after the sink
    #[serde(default)]
    pub updates: Vec<(String, Value)>,
    /// Raw answer the user typed, if the node asked for one
    #[serde(default)]
    pub human_input: Option<String>,
    pub metadata: NodeMetadata,
}

impl NodeOutput {
    /// Output of a node that writes nothing
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(value: impl Into<Value>) -> Self {
        Self::tuple(vec![value.into()])
    }

    pub fn tuple(values: Vec<Value>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    pub fn with_update(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updates.push((field.into(), value.into()));
        self
    }

    pub fn with_human_input(mut self, input: impl Into<String>) -> Self {
        self.human_input = Some(input.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Write the values into `sink`, in order, then apply the fixed-field
    /// updates. Returns what was written.
    pub fn write_to(
        self,
        node: &str,
        sink: &[String],
        state: &mut RuntimeState,
    ) -> Result<HashMap<String, Value>, NodeError> {
        let mut written = HashMap::with_capacity(sink.len() + self.updates.len());
        if sink.is_empty() {
            if !self.values.is_empty() {
                tracing::warn!("Node '{}' has no sink; discarding its output", node);
            }
        } else if self.values.len() != sink.len() {
            return Err(NodeError::SinkArity {
                node: node.to_string(),
                expected: sink.len(),
                actual: self.values.len(),
            });
        } else {
            for (field, value) in sink.iter().zip(self.values) {
                state.set(field, value.clone())?;
                written.insert(field.clone(), value);
            }
        }

        for (field, value) in self.updates {
            state.set(&field, value.clone())?;
            written.insert(field, value);
        }
        Ok(written)
    }
}

/// Metadata about node execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub execution_time_ms: u64,
    pub custom: HashMap<String, Value>,
}
