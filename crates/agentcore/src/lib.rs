//! Core abstractions for agentflow
//!
//! This crate provides the workflow document model, state handling, prompt
//! templates and the traits every other component depends on. It does not
//! execute anything itself.

mod collab;
mod condition;
mod error;
pub mod events;
mod node;
pub mod state;
pub mod template;
mod value;
mod workflow;

pub use collab::{ChatInterface, ChatMessage, ModelClient, ModelRequest};
pub use condition::{CompareOp, Condition};
pub use error::{FlowError, NodeError, SpecError, StateError, TemplateError};
pub use events::*;
pub use node::{Node, NodeContext, NodeMetadata, NodeOutput};
pub use state::{RuntimeState, StateField, StateSchema, StateType};
pub use template::{render, Template};
pub use value::Value;
pub use workflow::{
    matches_exit_command, ConditionalEdge, Next, NodeSpec, SinkFormat, Target, WorkflowSpec, END,
};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
