// crates/agentcli/src/main.rs

use agentcore::{ChatInterface, ExecutionEvent, ModelClient, NodeEvent, Value, WorkflowSpec};
use agentnodes::{ConsoleChat, HttpModelClient, ScriptedModel};
use agentruntime::{
    BuiltinKind, Collaborators, CompiledWorkflow, FlowRuntime, NodeRegistry, RunOutcome,
    RuntimeConfig,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agentflow")]
#[command(about = "Declarative agent workflow runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow YAML file
        #[arg(short, long)]
        file: PathBuf,

        /// Initial state as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Base URL of an OpenAI-compatible API
        #[arg(long, env = "AGENTFLOW_MODEL_ENDPOINT")]
        endpoint: Option<String>,

        #[arg(long, env = "AGENTFLOW_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Override the workflow's text model
        #[arg(long)]
        llm: Option<String>,

        /// Override the workflow's vision model
        #[arg(long)]
        vlm: Option<String>,

        /// Maximum node executions before giving up
        #[arg(long, default_value_t = 25)]
        max_steps: usize,

        /// Per-node timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Answer prompts by echoing them instead of calling a model
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow YAML file
        file: PathBuf,
    },

    /// Print the flow graph of a workflow
    Graph {
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = GraphFormat::Mermaid)]
        format: GraphFormat,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.yaml")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphFormat {
    Dot,
    Mermaid,
}

const EXAMPLE_WORKFLOW: &str = r#"name: text_enhancement
state_defs:
  - text: str
  - analysis: dict
  - continue_improving: bool
nodes:
  analyze:
    type: prompt
    template: |
      Analyze this text and reply with a JSON object holding
      "clarity", "tone" and "suggestions":
      {text}
    sink: analysis
    sink_format: json
    next: improve
  improve:
    type: prompt
    template: |
      Rewrite the text using the analysis.
      Text: {text}
      Analysis: {analysis}
    sink: text
    next: show
  show:
    type: display
    prompt: Current draft
    fields: [text]
    next: ask_continue
  ask_continue:
    type: ask_yes_no
    prompt: Would you like to further improve the text?
    sink: continue_improving
    next:
      condition: continue_improving
      then: analyze
      otherwise: END
entry_point: analyze
exit_commands: [stop workflow, quit workflow, terminate workflow]
llm: gpt-4o
"#;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    agentnodes::register_all(&mut registry);
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            verbose,
            endpoint,
            api_key,
            llm,
            vlm,
            max_steps,
            timeout_ms,
            dry_run,
        } => {
            init_logging(verbose);
            let config = RuntimeConfig {
                max_steps,
                node_timeout_ms: timeout_ms,
                ..RuntimeConfig::default()
            };
            let model: Arc<dyn ModelClient> = match (endpoint, dry_run) {
                (_, true) => Arc::new(ScriptedModel::echo()),
                (Some(endpoint), false) => Arc::new(HttpModelClient::new(endpoint, api_key)),
                (None, false) => Arc::new(MissingModel),
            };
            run_workflow(&file, input, llm, vlm, model, config).await?;
        }

        Commands::Validate { file } => {
            init_logging(false);
            validate_workflow(&file)?;
        }

        Commands::Graph { file, format } => {
            init_logging(false);
            let workflow = compile_file(&file)?;
            match format {
                GraphFormat::Dot => println!("{}", workflow.graph().to_dot()),
                GraphFormat::Mermaid => println!("{}", workflow.graph().to_mermaid()),
            }
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }
    }

    Ok(())
}

/// Stand-in used when no endpoint is configured; fails on first use.
struct MissingModel;

#[async_trait::async_trait]
impl ModelClient for MissingModel {
    async fn complete(
        &self,
        _request: agentcore::ModelRequest,
    ) -> std::result::Result<String, agentcore::NodeError> {
        Err(agentcore::NodeError::Model(
            "no model endpoint configured; pass --endpoint or set AGENTFLOW_MODEL_ENDPOINT"
                .to_string(),
        ))
    }
}

fn compile_file(file: &Path) -> Result<CompiledWorkflow> {
    let spec = WorkflowSpec::load_path(file)
        .with_context(|| format!("failed to load {}", file.display()))?;
    let workflow = CompiledWorkflow::compile(spec, &registry())
        .with_context(|| format!("invalid workflow {}", file.display()))?;
    Ok(workflow)
}

fn parse_inputs(input: Option<String>) -> Result<HashMap<String, Value>> {
    let Some(input) = input else {
        return Ok(HashMap::new());
    };
    let json: serde_json::Value = serde_json::from_str(&input).context("input is not valid JSON")?;
    match json {
        serde_json::Value::Object(obj) => Ok(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        _ => bail!("Input must be a JSON object"),
    }
}

async fn run_workflow(
    file: &Path,
    input: Option<String>,
    llm: Option<String>,
    vlm: Option<String>,
    model: Arc<dyn ModelClient>,
    config: RuntimeConfig,
) -> Result<()> {
    println!("Loading workflow from: {}", file.display());

    let mut spec = WorkflowSpec::load_path(file)
        .with_context(|| format!("failed to load {}", file.display()))?;
    if llm.is_some() {
        spec.llm = llm;
    }
    if vlm.is_some() {
        spec.vlm = vlm;
    }
    let inputs = parse_inputs(input)?;

    let chat: Arc<dyn ChatInterface> =
        Arc::new(ConsoleChat::new().with_exit_commands(spec.exit_commands.clone()));
    let runtime = Arc::new(FlowRuntime::with_registry(
        Arc::new(registry()),
        Collaborators::new(model, chat),
        config,
    ));
    let workflow = runtime.compile(spec)?;

    println!("Workflow: {}", workflow.name());
    println!("   Nodes: {}", workflow.graph().node_count());
    println!("   Edges: {}", workflow.graph().edge_count());
    println!();

    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::NodeStarted { node, node_type, .. } => {
                    tracing::info!("Starting node: {} ({})", node, node_type);
                }
                ExecutionEvent::NodeFailed { node, error, .. } => {
                    tracing::error!("Node {} failed: {}", node, error);
                }
                ExecutionEvent::NodeEvent { node, event, .. } => match event {
                    NodeEvent::Info { message } => tracing::info!("[{}] {}", node, message),
                    NodeEvent::Warning { message } => tracing::warn!("[{}] {}", node, message),
                    NodeEvent::Prompt { text } => tracing::debug!("[{}] prompt:\n{}", node, text),
                },
                _ => {}
            }
        }
    });

    let shutdown = {
        let runtime = runtime.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                runtime.shutdown();
            }
        })
    };

    let result = runtime.execute(&workflow, inputs).await;
    shutdown.abort();
    event_task.abort();
    let result = result?;

    println!();
    match &result.outcome {
        RunOutcome::Completed => println!("Workflow completed in {} steps", result.steps()),
        RunOutcome::ExitCommand { input } => {
            println!("Workflow stopped by '{}' after {} steps", input.trim(), result.steps())
        }
        RunOutcome::Cancelled => println!("Workflow cancelled after {} steps", result.steps()),
    }
    println!("   Execution ID: {}", result.execution_id);
    println!("   Path: {}", result.path.join(" -> "));

    println!();
    println!("Final state:");
    for field in workflow.spec().state.declared() {
        if let Some(value) = result.state.get(&field.name) {
            println!("   {}: {}", field.name, value);
        }
    }

    Ok(())
}

fn validate_workflow(file: &Path) -> Result<()> {
    println!("Validating workflow: {}", file.display());

    let workflow = compile_file(file)?;
    let spec = workflow.spec();

    println!("Workflow is valid:");
    println!("   Name: {}", workflow.name());
    println!("   Entry point: {}", spec.entry_point);
    println!("   State fields: {}", spec.state.declared().count());
    println!("   Nodes: {}", workflow.graph().node_count());
    println!("   Edges: {}", workflow.graph().edge_count());

    for node in workflow.nodes() {
        let Some(template) = node.template() else {
            continue;
        };
        let placeholders = template.placeholders();
        let undeclared: Vec<_> = placeholders
            .iter()
            .map(|p| node.source().get(*p).map(String::as_str).unwrap_or(*p))
            .filter(|field| !spec.state.contains(field))
            .collect();
        println!("   {} reads: {}", node.name(), placeholders.join(", "));
        for name in undeclared {
            println!("   warning: {} reads undeclared field '{}'", node.name(), name);
        }
    }

    for name in workflow.graph().unreachable() {
        println!("   warning: {} is unreachable from {}", name, spec.entry_point);
    }

    Ok(())
}

fn list_nodes() {
    println!("Available Node Types:");
    println!();

    println!("  prompt (model)");
    println!("    Render a template and call the configured model");
    for kind in BuiltinKind::ALL {
        println!("  {} (builtin)", kind.tag());
        println!("    {}", kind.description());
    }

    let registry = registry();
    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  {}", node_type);
        }
    }
}

fn create_example_workflow(output: &Path) -> Result<()> {
    if output.exists() {
        bail!("{} already exists", output.display());
    }
    std::fs::write(output, EXAMPLE_WORKFLOW)?;

    println!("Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  agentflow run --file {} --input '{{\"text\": \"Your draft here\"}}'",
        output.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_workflow_compiles() {
        let spec = WorkflowSpec::from_yaml_str(EXAMPLE_WORKFLOW).unwrap();
        let workflow = CompiledWorkflow::compile(spec, &registry()).unwrap();
        assert_eq!(workflow.name(), "text_enhancement");
        assert!(workflow.graph().unreachable().is_empty());
    }

    #[test]
    fn test_parse_inputs() {
        let inputs = parse_inputs(Some(r#"{"text": "hi", "n": 2}"#.to_string())).unwrap();
        assert_eq!(inputs.get("text"), Some(&Value::from("hi")));
        assert_eq!(inputs.get("n"), Some(&Value::Int(2)));

        assert!(parse_inputs(Some("[1, 2]".to_string())).is_err());
        assert!(parse_inputs(None).unwrap().is_empty());
    }
}
