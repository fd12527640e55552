//! Standard node library and collaborators
//!
//! Custom node types for common operations, plus chat and model
//! implementations the runtime can be wired to.

mod console;
mod debug;
mod openai;
mod scripted;
mod time;
mod transform;

pub use console::{pick_option, ConsoleChat};
pub use debug::DebugNode;
pub use openai::HttpModelClient;
pub use scripted::{ScriptedChat, ScriptedModel, Transcript};
pub use time::DelayNode;
pub use transform::{JsonParseNode, JsonStringifyNode};

use agentruntime::NodeRegistry;
use std::sync::Arc;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register(Arc::new(debug::DebugNodeFactory));
    registry.register(Arc::new(transform::JsonParseNodeFactory));
    registry.register(Arc::new(transform::JsonStringifyNodeFactory));
    registry.register(Arc::new(time::DelayNodeFactory));
}
