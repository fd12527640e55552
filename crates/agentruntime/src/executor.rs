use crate::compiled::CompiledWorkflow;
use agentcore::{
    ChatInterface, EventBus, ExecutionEvent, ExecutionId, FlowError, ModelClient, NodeContext,
    NodeError, RuntimeState, Target, Value,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

/// Outside collaborators node bodies talk to
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn ModelClient>,
    pub chat: Arc<dyn ChatInterface>,
}

impl Collaborators {
    pub fn new(model: Arc<dyn ModelClient>, chat: Arc<dyn ChatInterface>) -> Self {
        Self { model, chat }
    }
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Reached END
    Completed,
    /// The user typed one of the workflow's exit commands
    ExitCommand { input: String },
    Cancelled,
}

/// Result of workflow execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub state: RuntimeState,
    pub outcome: RunOutcome,
    /// Nodes in the order they ran
    pub path: Vec<String>,
}

impl ExecutionResult {
    pub fn steps(&self) -> usize {
        self.path.len()
    }
}

/// Walks a compiled workflow one node at a time
pub struct WorkflowExecutor {
    max_steps: usize,
    node_timeout: Option<Duration>,
    default_llm: String,
    default_vlm: String,
}

impl WorkflowExecutor {
    pub fn new(max_steps: usize) -> Self {
        Self {
            max_steps,
            node_timeout: None,
            default_llm: String::new(),
            default_vlm: String::new(),
        }
    }

    pub fn with_node_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.node_timeout = timeout;
        self
    }

    /// Models used when the workflow names none
    pub fn with_default_models(mut self, llm: impl Into<String>, vlm: impl Into<String>) -> Self {
        self.default_llm = llm.into();
        self.default_vlm = vlm.into();
        self
    }

    /// Execute a workflow and return the final state
    pub async fn execute(
        &self,
        workflow: &CompiledWorkflow,
        collaborators: &Collaborators,
        event_bus: &EventBus,
        initial: HashMap<String, Value>,
        cancellation: CancellationToken,
    ) -> Result<ExecutionResult, FlowError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        event_bus.emit(ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow: workflow.name().to_string(),
            timestamp: Utc::now(),
        });

        tracing::info!("Starting workflow '{}' ({})", workflow.name(), execution_id);

        let mut path = Vec::new();
        let result = self
            .run_loop(
                workflow,
                collaborators,
                event_bus,
                execution_id,
                initial,
                &cancellation,
                &mut path,
            )
            .await;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        event_bus.emit(ExecutionEvent::WorkflowCompleted {
            execution_id,
            success: result.is_ok(),
            steps: path.len(),
            duration_ms,
            timestamp: Utc::now(),
        });

        let (state, outcome) = result?;
        tracing::info!(
            "Workflow '{}' finished after {} steps: {:?}",
            workflow.name(),
            path.len(),
            outcome
        );
        Ok(ExecutionResult {
            execution_id,
            state,
            outcome,
            path,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        &self,
        workflow: &CompiledWorkflow,
        collaborators: &Collaborators,
        event_bus: &EventBus,
        execution_id: ExecutionId,
        initial: HashMap<String, Value>,
        cancellation: &CancellationToken,
        path: &mut Vec<String>,
    ) -> Result<(RuntimeState, RunOutcome), FlowError> {
        let spec = workflow.spec();
        let mut state = workflow.initial_state(initial)?;
        let mut current = Target::Node(workflow.graph().entry().to_string());

        loop {
            let name = match &current {
                Target::End => return Ok((state, RunOutcome::Completed)),
                Target::Node(name) => name.clone(),
            };
            if cancellation.is_cancelled() {
                return Ok((state, RunOutcome::Cancelled));
            }
            if path.len() >= self.max_steps {
                return Err(FlowError::StepLimit {
                    limit: self.max_steps,
                });
            }

            let node = workflow
                .node(&name)
                .ok_or_else(|| FlowError::Execution(format!("Node '{}' is not compiled", name)))?;
            path.push(name.clone());

            let previous = state.get("current_node_type").cloned().unwrap_or_default();
            state.set("previous_node_type", previous)?;
            state.set("current_node_type", name.as_str())?;
            state.record_message("assistant", format!("{} started.", name));

            event_bus.emit(ExecutionEvent::NodeStarted {
                execution_id,
                node: name.clone(),
                node_type: node.spec.node_type.clone(),
                timestamp: Utc::now(),
            });

            let ctx = NodeContext {
                node: name.clone(),
                state: state.clone(),
                model: collaborators.model.clone(),
                chat: collaborators.chat.clone(),
                llm: Some(spec.llm.clone().unwrap_or_else(|| self.default_llm.clone())),
                vlm: Some(spec.vlm.clone().unwrap_or_else(|| self.default_vlm.clone())),
                exit_commands: spec.exit_commands.clone(),
                events: event_bus.create_emitter(execution_id, &name),
                cancellation: cancellation.child_token(),
            };

            let start = Instant::now();
            let task = node.execute(ctx);
            let result = tokio::select! {
                result = async {
                    match self.node_timeout {
                        Some(limit) => timeout(limit, task).await.unwrap_or(Err(NodeError::Timeout {
                            millis: limit.as_millis() as u64,
                        })),
                        None => task.await,
                    }
                } => result,
                _ = cancellation.cancelled() => Err(NodeError::Cancelled),
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            // An exit phrase ends the run before anything is written.
            let written = result.and_then(|output| {
                let human_input = output.human_input.clone();
                let exiting = human_input
                    .as_deref()
                    .is_some_and(|input| spec.is_exit_command(input));
                let written = if exiting {
                    HashMap::new()
                } else {
                    output.write_to(&name, &node.spec.sink, &mut state)?
                };
                Ok((written, human_input, exiting))
            });
            let (written, human_input, exiting) = match written {
                Ok(written) => written,
                Err(NodeError::Cancelled) => {
                    tracing::info!("Node '{}' cancelled", name);
                    return Ok((state, RunOutcome::Cancelled));
                }
                Err(e) => {
                    tracing::error!("Node '{}' failed: {}", name, e);
                    event_bus.emit(ExecutionEvent::NodeFailed {
                        execution_id,
                        node: name.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(FlowError::Node(e));
                }
            };

            tracing::info!("Node '{}' completed in {}ms", name, duration_ms);
            event_bus.emit(ExecutionEvent::NodeCompleted {
                execution_id,
                node: name.clone(),
                written,
                duration_ms,
                timestamp: Utc::now(),
            });

            if let Some(input) = human_input {
                state.set("human_input", input.as_str())?;
                state.record_message("user", input.clone());
                if exiting {
                    tracing::info!("Exit command '{}' received at '{}'", input, name);
                    return Ok((state, RunOutcome::ExitCommand { input }));
                }
            }

            current = workflow.graph().route(&name, &state).ok_or_else(|| {
                FlowError::Execution(format!("Node '{}' has no outgoing edge", name))
            })?;
        }
    }
}
