use crate::{
    registry::NodeRegistry, Collaborators, CompiledWorkflow, ExecutionResult, WorkflowExecutor,
};
use agentcore::{EventBus, ExecutionEvent, FlowError, Value, WorkflowSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Main runtime for loading and executing workflows
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
    collaborators: Collaborators,
    workflows: Arc<RwLock<HashMap<String, Arc<CompiledWorkflow>>>>,
    shutdown: CancellationToken,
}

impl FlowRuntime {
    /// Create a new runtime with default settings and no custom node types
    pub fn new(collaborators: Collaborators) -> Self {
        Self::with_config(collaborators, RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(collaborators: Collaborators, config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(NodeRegistry::new()), collaborators, config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(
        registry: Arc<NodeRegistry>,
        collaborators: Collaborators,
        config: RuntimeConfig,
    ) -> Self {
        let executor = WorkflowExecutor::new(config.max_steps)
            .with_node_timeout(config.node_timeout_ms.map(Duration::from_millis))
            .with_default_models(config.default_llm.clone(), config.default_vlm.clone());
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            executor: Arc::new(executor),
            event_bus,
            collaborators,
            workflows: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Parse and compile a YAML document against this runtime's registry
    pub fn load(&self, yaml: &str) -> Result<CompiledWorkflow, FlowError> {
        let spec = WorkflowSpec::from_yaml_str(yaml)?;
        self.compile(spec)
    }

    /// Read, parse and compile a workflow file
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<CompiledWorkflow, FlowError> {
        let spec = WorkflowSpec::load_path(path)?;
        self.compile(spec)
    }

    pub fn compile(&self, spec: WorkflowSpec) -> Result<CompiledWorkflow, FlowError> {
        Ok(CompiledWorkflow::compile(spec, &self.registry)?)
    }

    /// Keep a compiled workflow under its name. Replaces any previous one.
    pub async fn register_workflow(&self, workflow: CompiledWorkflow) {
        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(workflow.name()) {
            tracing::warn!("Replacing registered workflow '{}'", workflow.name());
        }
        workflows.insert(workflow.name().to_string(), Arc::new(workflow));
    }

    /// Execute a registered workflow by name
    pub async fn execute_workflow(
        &self,
        name: &str,
        inputs: HashMap<String, Value>,
    ) -> Result<ExecutionResult, FlowError> {
        let workflow = {
            let workflows = self.workflows.read().await;
            workflows
                .get(name)
                .cloned()
                .ok_or_else(|| FlowError::Execution(format!("Workflow '{}' is not registered", name)))?
        };
        self.execute(&workflow, inputs).await
    }

    /// Execute a workflow directly (without registration)
    pub async fn execute(
        &self,
        workflow: &CompiledWorkflow,
        inputs: HashMap<String, Value>,
    ) -> Result<ExecutionResult, FlowError> {
        self.executor
            .execute(
                workflow,
                &self.collaborators,
                &self.event_bus,
                inputs,
                self.shutdown.child_token(),
            )
            .await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Cancel every run in flight. Runs stop before their next node.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down runtime");
        self.shutdown.cancel();
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on node executions per run
    pub max_steps: usize,
    pub node_timeout_ms: Option<u64>,
    pub event_buffer_size: usize,
    /// Used when a workflow has no `llm`
    pub default_llm: String,
    /// Used when a workflow has no `vlm`
    pub default_vlm: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            node_timeout_ms: None,
            event_buffer_size: 1000,
            default_llm: "gpt-4o".to_string(),
            default_vlm: "gpt-4o".to_string(),
        }
    }
}
