use crate::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    WorkflowStarted {
        execution_id: ExecutionId,
        workflow: String,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        execution_id: ExecutionId,
        success: bool,
        steps: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        execution_id: ExecutionId,
        node: String,
        node_type: String,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        execution_id: ExecutionId,
        node: String,
        /// Sink fields written by the node
        written: HashMap<String, Value>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        execution_id: ExecutionId,
        node: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        execution_id: ExecutionId,
        node: String,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events specific to node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
    Prompt { text: String },
}

/// Handle nodes use to report progress
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    node: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        node: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            node: node.into(),
            sender,
        }
    }

    pub fn emit(&self, event: NodeEvent) {
        let _ = self.sender.send(ExecutionEvent::NodeEvent {
            execution_id: self.execution_id,
            node: self.node.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }

    /// Report the rendered prompt sent to a model
    pub fn prompt(&self, text: impl Into<String>) {
        self.emit(NodeEvent::Prompt { text: text.into() });
    }
}

/// Broadcast bus shared by a runtime
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    /// Capacity is clamped to at least one event.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: ExecutionId, node: &str) -> EventEmitter {
        EventEmitter::new(execution_id, node, self.sender.clone())
    }
}
