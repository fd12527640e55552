use agentcore::{ConditionalEdge, Next, RuntimeState, SpecError, Target, WorkflowSpec, END};
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Vertex of the flow graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphNode {
    Node(String),
    End,
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphNode::Node(name) => f.write_str(name),
            GraphNode::End => f.write_str(END),
        }
    }
}

/// Edge label: plain `next`, or one side of a conditional branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeLabel {
    Next,
    Then,
    Otherwise,
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeLabel::Next => f.write_str(""),
            EdgeLabel::Then => f.write_str("true"),
            EdgeLabel::Otherwise => f.write_str("false"),
        }
    }
}

/// Directed topology of a workflow. Cycles are allowed.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    graph: DiGraph<GraphNode, EdgeLabel>,
    index: HashMap<String, NodeIndex>,
    routes: HashMap<String, Next>,
    entry: String,
    unreachable: Vec<String>,
}

impl FlowGraph {
    /// Build the graph, rejecting targets that are neither declared nodes
    /// nor END, and conditions on undeclared fields.
    pub fn build(spec: &WorkflowSpec) -> Result<Self, SpecError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in &spec.nodes {
            let idx = graph.add_node(GraphNode::Node(node.name.clone()));
            index.insert(node.name.clone(), idx);
        }
        let end = graph.add_node(GraphNode::End);

        let lookup = |node: &str, key: &str, target: &Target| -> Result<NodeIndex, SpecError> {
            match target {
                Target::End => Ok(end),
                Target::Node(name) => index.get(name).copied().ok_or_else(|| SpecError::DanglingEdge {
                    node: node.to_string(),
                    key: key.to_string(),
                    target: name.clone(),
                }),
            }
        };

        let mut edges = Vec::new();
        for node in &spec.nodes {
            let from = index[&node.name];
            match &node.next {
                Next::Direct(target) => {
                    edges.push((from, lookup(&node.name, "next", target)?, EdgeLabel::Next));
                }
                Next::Conditional(ConditionalEdge {
                    condition,
                    then,
                    otherwise,
                }) => {
                    if !spec.state.contains(condition.field_name()) {
                        return Err(SpecError::DanglingEdge {
                            node: node.name.clone(),
                            key: "condition".to_string(),
                            target: condition.field_name().to_string(),
                        });
                    }
                    edges.push((from, lookup(&node.name, "then", then)?, EdgeLabel::Then));
                    edges.push((from, lookup(&node.name, "otherwise", otherwise)?, EdgeLabel::Otherwise));
                }
            }
        }
        for (from, to, label) in edges {
            graph.add_edge(from, to, label);
        }

        let entry_idx = *index.get(&spec.entry_point).ok_or_else(|| {
            SpecError::malformed(
                "entry_point",
                format!("'{}' is not a declared node", spec.entry_point),
            )
        })?;

        let mut reached = HashSet::new();
        let mut bfs = Bfs::new(&graph, entry_idx);
        while let Some(idx) = bfs.next(&graph) {
            reached.insert(idx);
        }
        let unreachable: Vec<String> = spec
            .nodes
            .iter()
            .filter(|n| !reached.contains(&index[&n.name]))
            .map(|n| n.name.clone())
            .collect();
        for name in &unreachable {
            tracing::warn!("Node '{}' is unreachable from entry point '{}'", name, spec.entry_point);
        }

        let routes = spec
            .nodes
            .iter()
            .map(|n| (n.name.clone(), n.next.clone()))
            .collect();

        Ok(Self {
            graph,
            index,
            routes,
            entry: spec.entry_point.clone(),
            unreachable,
        })
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Nodes that cannot be reached from the entry point
    pub fn unreachable(&self) -> &[String] {
        &self.unreachable
    }

    /// Number of declared nodes (END excluded)
    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Outgoing edges of a node as (label, target) pairs
    pub fn successors(&self, node: &str) -> Vec<(EdgeLabel, Target)> {
        let Some(&idx) = self.index.get(node) else {
            return Vec::new();
        };
        let mut out: Vec<(EdgeLabel, Target)> = self
            .graph
            .edges(idx)
            .map(|edge| {
                let target = match &self.graph[edge.target()] {
                    GraphNode::Node(name) => Target::Node(name.clone()),
                    GraphNode::End => Target::End,
                };
                (*edge.weight(), target)
            })
            .collect();
        // petgraph walks edges newest first
        out.reverse();
        out
    }

    /// Pick the next target after `node` ran against `state`.
    pub fn route(&self, node: &str, state: &RuntimeState) -> Option<Target> {
        match self.routes.get(node)? {
            Next::Direct(target) => Some(target.clone()),
            Next::Conditional(edge) => {
                let taken = edge.condition.evaluate(state);
                tracing::debug!("Condition '{}' on '{}' evaluated to {}", edge.condition, node, taken);
                Some(if taken {
                    edge.then.clone()
                } else {
                    edge.otherwise.clone()
                })
            }
        }
    }

    /// Graphviz DOT rendering
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.graph))
    }

    /// Mermaid flowchart rendering
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        out.push_str(&format!("    __start__([start]) --> {}\n", self.entry));
        for edge in self.graph.edge_references() {
            let from = &self.graph[edge.source()];
            let to = match &self.graph[edge.target()] {
                GraphNode::End => "__end__([end])".to_string(),
                node => node.to_string(),
            };
            match edge.weight() {
                EdgeLabel::Next => out.push_str(&format!("    {} --> {}\n", from, to)),
                label => out.push_str(&format!("    {} -->|{}| {}\n", from, label, to)),
            }
        }
        out
    }
}
