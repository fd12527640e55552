use crate::builtin::{BuiltinKind, BuiltinNode};
use crate::prompt::PromptNode;
use crate::registry::NodeRegistry;
use agentcore::{Node, NodeContext, NodeError, NodeOutput, NodeSpec, SpecError, Template, WorkflowSpec};
use std::collections::BTreeMap;

/// Executable behavior attached to a declaration
pub enum NodeKind {
    /// Created by a registered factory
    Custom {
        node: Box<dyn Node>,
        produces_output: bool,
    },
    Builtin(BuiltinNode),
    Prompt(PromptNode),
}

impl NodeKind {
    pub fn produces_output(&self) -> bool {
        match self {
            NodeKind::Custom {
                produces_output, ..
            } => *produces_output,
            NodeKind::Builtin(node) => node.kind().produces_output(),
            NodeKind::Prompt(_) => true,
        }
    }

    fn as_node(&self) -> &dyn Node {
        match self {
            NodeKind::Custom { node, .. } => node.as_ref(),
            NodeKind::Builtin(node) => node,
            NodeKind::Prompt(node) => node,
        }
    }
}

/// A declaration paired with its behavior
pub struct ResolvedNode {
    pub spec: NodeSpec,
    pub kind: NodeKind,
}

impl ResolvedNode {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn node_type(&self) -> &str {
        self.kind.as_node().node_type()
    }

    /// Placeholder to state field map the template renders through
    pub fn source(&self) -> &BTreeMap<String, String> {
        match &self.kind {
            NodeKind::Builtin(node) => node.source(),
            _ => &self.spec.source,
        }
    }

    /// Template the node renders, if any
    pub fn template(&self) -> Option<&Template> {
        match &self.kind {
            NodeKind::Prompt(node) => Some(node.template()),
            NodeKind::Builtin(node) => node.prompt(),
            NodeKind::Custom { .. } => None,
        }
    }

    pub async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        self.kind.as_node().execute(ctx).await
    }
}

/// Attach behavior to every node: custom factories first, then the built-in
/// kinds, then `prompt`.
pub fn resolve(spec: &WorkflowSpec, registry: &NodeRegistry) -> Result<Vec<ResolvedNode>, SpecError> {
    spec.nodes
        .iter()
        .map(|node| {
            let kind = resolve_kind(node, spec, registry)?;
            if kind.produces_output() && node.sink.is_empty() {
                return Err(SpecError::MissingSink {
                    node: node.name.clone(),
                });
            }
            tracing::debug!("Resolved node '{}' as '{}'", node.name, node.node_type);
            Ok(ResolvedNode {
                spec: node.clone(),
                kind,
            })
        })
        .collect()
}

fn resolve_kind(
    node: &NodeSpec,
    spec: &WorkflowSpec,
    registry: &NodeRegistry,
) -> Result<NodeKind, SpecError> {
    let key = format!("nodes.{}", node.name);

    if let Some(factory) = registry.get(&node.node_type) {
        let instance = factory
            .create(node)
            .map_err(|e| SpecError::malformed(&key, e.to_string()))?;
        instance
            .validate(node, &spec.state)
            .map_err(|e| SpecError::malformed(&key, e.to_string()))?;
        return Ok(NodeKind::Custom {
            node: instance,
            produces_output: factory.metadata().produces_output,
        });
    }

    if let Some(kind) = BuiltinKind::from_tag(&node.node_type) {
        return Ok(NodeKind::Builtin(BuiltinNode::from_spec(kind, node, &spec.state)?));
    }

    if node.node_type == "prompt" {
        return Ok(NodeKind::Prompt(PromptNode::from_spec(node)?));
    }

    Err(SpecError::UnknownNodeType {
        node: node.name.clone(),
        type_tag: node.node_type.clone(),
    })
}
