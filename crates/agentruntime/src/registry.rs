use agentcore::{Node, NodeError, NodeSpec};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for caller-supplied node types
pub trait NodeFactory: Send + Sync {
    /// Create a node instance for one declaration in a workflow
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError>;

    /// Get node type identifier
    fn node_type(&self) -> &str;

    /// Optional: Get node metadata (description, whether it writes a sink)
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

/// Metadata about a node type
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub description: String,
    pub category: String,
    /// Nodes that produce output must declare a sink
    pub produces_output: bool,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            produces_output: true,
        }
    }
}

/// Registry of caller-supplied node types. Consulted before the built-ins,
/// so a registered tag shadows a built-in of the same name.
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        tracing::info!("Registering node type: {}", node_type);
        self.factories.insert(node_type, factory);
    }

    pub fn get(&self, node_type: &str) -> Option<&Arc<dyn NodeFactory>> {
        self.factories.get(node_type)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        self.factories.get(node_type).map(|f| f.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
