use crate::graph::FlowGraph;
use crate::registry::NodeRegistry;
use crate::resolve::{resolve, ResolvedNode};
use agentcore::{RuntimeState, SpecError, StateError, TemplateError, Value, WorkflowSpec};
use std::collections::HashMap;
use std::sync::Arc;

/// A workflow whose nodes are resolved and whose graph is built. Nothing
/// partially valid ever gets this far.
pub struct CompiledWorkflow {
    spec: Arc<WorkflowSpec>,
    nodes: HashMap<String, ResolvedNode>,
    graph: FlowGraph,
}

impl CompiledWorkflow {
    /// Resolve node types, then build the graph.
    pub fn compile(spec: WorkflowSpec, registry: &NodeRegistry) -> Result<Self, SpecError> {
        let resolved = resolve(&spec, registry)?;
        let graph = FlowGraph::build(&spec)?;
        tracing::info!(
            "Compiled workflow '{}': {} nodes, {} edges",
            spec.name,
            graph.node_count(),
            graph.edge_count()
        );

        let nodes = resolved
            .into_iter()
            .map(|node| (node.spec.name.clone(), node))
            .collect();

        Ok(Self {
            spec: Arc::new(spec),
            nodes,
            graph,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &Arc<WorkflowSpec> {
        &self.spec
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn node(&self, name: &str) -> Option<&ResolvedNode> {
        self.nodes.get(name)
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &ResolvedNode> {
        self.spec.nodes.iter().filter_map(|n| self.nodes.get(&n.name))
    }

    /// State for a new run: schema defaults overlaid with `initial`.
    pub fn initial_state(&self, initial: HashMap<String, Value>) -> Result<RuntimeState, StateError> {
        RuntimeState::new(&self.spec.state, initial)
    }

    /// Render the template of `node` against `state`. `Ok(None)` when the
    /// node has no template.
    pub fn render(&self, node: &str, state: &RuntimeState) -> Result<Option<String>, TemplateError> {
        let Some(node) = self.nodes.get(node) else {
            return Ok(None);
        };
        match node.template() {
            Some(template) => template.render_mapped(state, node.source()).map(Some),
            None => Ok(None),
        }
    }
}
