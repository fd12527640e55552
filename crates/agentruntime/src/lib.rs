//! Workflow compilation and execution runtime
//!
//! This crate resolves node declarations against the registry and the
//! built-in kinds, builds the flow graph, and runs compiled workflows one
//! node at a time.

mod builtin;
mod compiled;
mod conversation;
mod executor;
mod graph;
mod prompt;
mod registry;
mod resolve;
mod runtime;

pub use builtin::{BuiltinKind, BuiltinNode};
pub use compiled::CompiledWorkflow;
pub use conversation::{SUMMARY_TEMPLATE, SURVEY_COMPLETE, SURVEY_TEMPLATE};
pub use executor::{Collaborators, ExecutionResult, RunOutcome, WorkflowExecutor};
pub use graph::{EdgeLabel, FlowGraph, GraphNode};
pub use prompt::{fenced_payload, strip_code_fences, PromptNode};
pub use registry::{NodeFactory, NodeMetadata, NodeRegistry};
pub use resolve::{resolve, NodeKind, ResolvedNode};
pub use runtime::{FlowRuntime, RuntimeConfig};
