// crates/agentruntime/tests/compile_test.rs

use agentcore::{
    Node, NodeContext, NodeError, NodeOutput, NodeSpec, SpecError, StateSchema, Target, Value,
    WorkflowSpec,
};
use agentruntime::{
    BuiltinKind, CompiledWorkflow, EdgeLabel, NodeFactory, NodeKind, NodeMetadata, NodeRegistry,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

fn compile(yaml: &str) -> Result<CompiledWorkflow, SpecError> {
    compile_with(yaml, &NodeRegistry::new())
}

fn compile_with(yaml: &str, registry: &NodeRegistry) -> Result<CompiledWorkflow, SpecError> {
    let spec = WorkflowSpec::from_yaml_str(yaml)?;
    CompiledWorkflow::compile(spec, registry)
}

struct Doubler;

#[async_trait]
impl Node for Doubler {
    fn node_type(&self) -> &str {
        "double"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let value = ctx
            .require_state("mass")?
            .as_f64()
            .ok_or_else(|| NodeError::MissingInput("mass".into()))?;
        Ok(NodeOutput::single(value * 2.0))
    }
}

struct DoublerFactory {
    produces_output: bool,
}

impl NodeFactory for DoublerFactory {
    fn create(&self, _spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(Doubler))
    }

    fn node_type(&self) -> &str {
        "double"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Double the mass".into(),
            category: "math".into(),
            produces_output: self.produces_output,
        }
    }
}

/// Claims the `display` tag to check that custom types win.
struct ShadowFactory;

impl NodeFactory for ShadowFactory {
    fn create(&self, _spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(Doubler))
    }

    fn node_type(&self) -> &str {
        "display"
    }
}

struct PickyFactory;

struct Picky;

#[async_trait]
impl Node for Picky {
    fn node_type(&self) -> &str {
        "picky"
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new())
    }

    fn validate(&self, spec: &NodeSpec, _schema: &StateSchema) -> Result<(), NodeError> {
        spec.config_str("mode")
            .map(|_| ())
            .ok_or_else(|| NodeError::Configuration("'mode' is required".into()))
    }
}

impl NodeFactory for PickyFactory {
    fn create(&self, _spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(Picky))
    }

    fn node_type(&self) -> &str {
        "picky"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            produces_output: false,
            ..NodeMetadata::default()
        }
    }
}

#[test]
fn test_missing_sink_fails_at_load() {
    let yaml = r#"
name: physics
state_defs:
  - mass: float
nodes:
  calculate:
    type: prompt
    template: "mass: {mass}"
    next: END
entry_point: calculate
"#;
    match compile(yaml) {
        Err(SpecError::MissingSink { node }) => assert_eq!(node, "calculate"),
        other => panic!("expected MissingSink, got {:?}", other.err()),
    }
}

#[test]
fn test_custom_node_without_output_needs_no_sink() {
    let yaml = r#"
name: physics
state_defs:
  - mass: float
nodes:
  calculate:
    type: double
    next: END
entry_point: calculate
"#;
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(DoublerFactory {
        produces_output: false,
    }));
    assert!(compile_with(yaml, &registry).is_ok());

    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(DoublerFactory {
        produces_output: true,
    }));
    assert!(matches!(
        compile_with(yaml, &registry),
        Err(SpecError::MissingSink { .. })
    ));
}

#[test]
fn test_conditional_branch_has_two_outcomes() {
    let yaml = r#"
name: loop
state_defs:
  - ok: bool
nodes:
  a:
    type: ask_yes_no
    sink: ok
    next:
      condition: ok
      then: b
      otherwise: a
  b:
    type: message
    template: done
    next: END
entry_point: a
"#;
    let workflow = compile(yaml).unwrap();
    let graph = workflow.graph();

    assert_eq!(graph.entry(), "a");
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 3);
    assert_eq!(
        graph.successors("a"),
        vec![
            (EdgeLabel::Then, Target::Node("b".into())),
            (EdgeLabel::Otherwise, Target::Node("a".into())),
        ]
    );
    assert_eq!(graph.successors("b"), vec![(EdgeLabel::Next, Target::End)]);
    assert!(graph.unreachable().is_empty());
}

#[test]
fn test_route_follows_condition() {
    let yaml = r#"
name: threshold
state_defs:
  - score: int
nodes:
  grade:
    type: ask_input
    sink: score_text
    next:
      condition: score >= 7
      then: END
      otherwise: grade
entry_point: grade
"#;
    // sink names an undeclared field
    assert!(matches!(compile(yaml), Err(SpecError::Malformed { .. })));

    let yaml = yaml.replace("  - score: int", "  - score: int\n  - score_text: str");
    let workflow = compile(&yaml).unwrap();
    let mut state = workflow.initial_state(HashMap::new()).unwrap();

    state.set("score", 3i64).unwrap();
    assert_eq!(
        workflow.graph().route("grade", &state),
        Some(Target::Node("grade".into()))
    );
    state.set("score", 9i64).unwrap();
    assert_eq!(workflow.graph().route("grade", &state), Some(Target::End));
    assert_eq!(workflow.graph().route("missing", &state), None);
}

#[test]
fn test_dangling_edges() {
    let yaml = r#"
name: broken
state_defs:
  - ok: bool
nodes:
  a:
    type: message
    template: hi
    next: nowhere
entry_point: a
"#;
    match compile(yaml) {
        Err(SpecError::DanglingEdge { node, key, target }) => {
            assert_eq!(node, "a");
            assert_eq!(key, "next");
            assert_eq!(target, "nowhere");
        }
        other => panic!("expected DanglingEdge, got {:?}", other.err()),
    }

    let yaml = r#"
name: broken
state_defs:
  - ok: bool
nodes:
  a:
    type: ask_yes_no
    sink: ok
    next:
      condition: ok
      then: END
      otherwise: ghost
entry_point: a
"#;
    match compile(yaml) {
        Err(SpecError::DanglingEdge { key, target, .. }) => {
            assert_eq!(key, "otherwise");
            assert_eq!(target, "ghost");
        }
        other => panic!("expected DanglingEdge, got {:?}", other.err()),
    }
}

#[test]
fn test_condition_on_undeclared_field() {
    let yaml = r#"
name: broken
state_defs:
  - ok: bool
nodes:
  a:
    type: ask_yes_no
    sink: ok
    next:
      condition: approved
      then: END
      otherwise: a
entry_point: a
"#;
    match compile(yaml) {
        Err(SpecError::DanglingEdge { node, key, target }) => {
            assert_eq!(node, "a");
            assert_eq!(key, "condition");
            assert_eq!(target, "approved");
        }
        other => panic!("expected DanglingEdge, got {:?}", other.err()),
    }
}

#[test]
fn test_unknown_node_type() {
    let yaml = r#"
name: broken
nodes:
  a:
    type: teleport
    next: END
entry_point: a
"#;
    match compile(yaml) {
        Err(SpecError::UnknownNodeType { node, type_tag }) => {
            assert_eq!(node, "a");
            assert_eq!(type_tag, "teleport");
        }
        other => panic!("expected UnknownNodeType, got {:?}", other.err()),
    }
}

#[test]
fn test_unreachable_nodes_are_reported() {
    let yaml = r#"
name: islands
nodes:
  a:
    type: message
    template: hi
    next: END
  orphan:
    type: message
    template: nobody calls me
    next: a
entry_point: a
"#;
    let workflow = compile(yaml).unwrap();
    assert_eq!(workflow.graph().unreachable(), ["orphan".to_string()]);
}

#[test]
fn test_resolution_order() {
    let yaml = r#"
name: order
state_defs:
  - mass: float
  - doubled: float
  - doubled_text: str
nodes:
  show:
    type: display
    sink: doubled
    next: ask
  ask:
    type: ask_input
    sink: doubled_text
    next: END
entry_point: show
"#;
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(ShadowFactory));
    let workflow = compile_with(yaml, &registry).unwrap();

    let show = workflow.node("show").unwrap();
    assert!(matches!(show.kind, NodeKind::Custom { .. }));
    assert_eq!(show.node_type(), "double");

    let ask = workflow.node("ask").unwrap();
    assert!(matches!(&ask.kind, NodeKind::Builtin(b) if b.kind() == BuiltinKind::AskInput));

    let names: Vec<_> = workflow.nodes().map(|n| n.name()).collect();
    assert_eq!(names, vec!["show", "ask"]);
}

#[test]
fn test_factory_validation_errors_are_malformed() {
    let yaml = r#"
name: picky
nodes:
  p:
    type: picky
    next: END
entry_point: p
"#;
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(PickyFactory));
    match compile_with(yaml, &registry) {
        Err(SpecError::Malformed { key, reason }) => {
            assert_eq!(key, "nodes.p");
            assert!(reason.contains("mode"));
        }
        other => panic!("expected Malformed, got {:?}", other.err()),
    }

    let fixed = yaml.replace("type: picky", "type: picky\n    mode: strict");
    assert!(compile_with(&fixed, &registry).is_ok());
}

#[test]
fn test_builtin_declaration_checks() {
    let choice_without_options = r#"
name: choose
state_defs:
  - pick: str
nodes:
  c:
    type: ask_choice
    sink: pick
    next: END
entry_point: c
"#;
    assert!(matches!(
        compile(choice_without_options),
        Err(SpecError::Malformed { .. })
    ));

    let message_without_template = r#"
name: hello
nodes:
  m:
    type: message
    next: END
entry_point: m
"#;
    assert!(matches!(
        compile(message_without_template),
        Err(SpecError::Malformed { .. })
    ));
}

#[test]
fn test_conversation_kinds_need_hilp_fields() {
    let without_group = r#"
name: interview
state_defs:
  - questions: str
nodes:
  ask:
    type: survey
    questions: questions
entry_point: ask
"#;
    match compile(without_group) {
        Err(SpecError::Malformed { key, reason }) => {
            assert_eq!(key, "nodes.ask");
            assert!(reason.contains("HilpState"));
        }
        other => panic!("expected Malformed, got {:?}", other.err()),
    }

    let without_questions = r#"
name: interview
state_defs:
  - HilpState
nodes:
  ask:
    type: survey
    next: wrap
  wrap:
    type: summarize
entry_point: ask
"#;
    match compile(without_questions) {
        Err(SpecError::Malformed { key, .. }) => assert_eq!(key, "nodes.ask.questions"),
        other => panic!("expected Malformed, got {:?}", other.err()),
    }

    let fixed = without_questions.replace(
        "HilpState\n",
        "HilpState\n  - questions: str\n",
    );
    let fixed = fixed.replace("type: survey\n", "type: survey\n    questions: questions\n");
    let workflow = compile(&fixed).unwrap();
    let ask = workflow.node("ask").unwrap();
    assert!(matches!(&ask.kind, NodeKind::Builtin(b) if b.kind() == BuiltinKind::Survey));
    assert!(!ask.kind.produces_output());
}

#[test]
fn test_source_mapping_is_checked_and_rendered() {
    let yaml = r#"
name: mapped
state_defs:
  - params_desc: str
  - code: str
nodes:
  rewrite:
    type: prompt
    template: "Context: {context}"
    source: {context: params_desc}
    sink: code
entry_point: rewrite
"#;
    let workflow = compile(yaml).unwrap();
    let rewrite = workflow.node("rewrite").unwrap();
    assert_eq!(rewrite.spec.source_field("context"), "params_desc");
    assert_eq!(rewrite.spec.source_field("other"), "other");

    let state = workflow
        .initial_state(HashMap::from([(
            "params_desc".to_string(),
            Value::from("step size"),
        )]))
        .unwrap();
    assert_eq!(
        workflow.render("rewrite", &state).unwrap().as_deref(),
        Some("Context: step size")
    );

    let bad = yaml.replace("context: params_desc", "context: missing_key");
    match compile(&bad) {
        Err(SpecError::Malformed { key, reason }) => {
            assert_eq!(key, "nodes.rewrite.source");
            assert!(reason.contains("missing_key"));
        }
        other => panic!("expected Malformed, got {:?}", other.err()),
    }

    let nested = yaml.replace("{context: params_desc}", "{context: [params_desc]}");
    assert!(matches!(compile(&nested), Err(SpecError::Malformed { .. })));
}

#[test]
fn test_cycles_and_render() {
    let yaml = r#"
name: physics
state_defs:
  - mass: float
  - report: str
nodes:
  calculate:
    type: prompt
    template: "mass: {mass}"
    sink: report
    next: calculate
entry_point: calculate
"#;
    let workflow = compile(yaml).unwrap();
    assert_eq!(
        workflow.graph().successors("calculate"),
        vec![(EdgeLabel::Next, Target::Node("calculate".into()))]
    );

    let state = workflow
        .initial_state(HashMap::from([("mass".to_string(), Value::Float(2.5))]))
        .unwrap();
    assert_eq!(
        workflow.render("calculate", &state).unwrap().as_deref(),
        Some("mass: 2.5")
    );
}

#[test]
fn test_graph_renderings() {
    let yaml = r#"
name: loop
state_defs:
  - ok: bool
nodes:
  a:
    type: ask_yes_no
    sink: ok
    next:
      condition: ok
      then: END
      otherwise: a
entry_point: a
"#;
    let workflow = compile(yaml).unwrap();

    let mermaid = workflow.graph().to_mermaid();
    assert!(mermaid.starts_with("graph TD\n"));
    assert!(mermaid.contains("a -->|true| __end__([end])"));
    assert!(mermaid.contains("a -->|false| a"));

    let dot = workflow.graph().to_dot();
    assert!(dot.contains("digraph"));
    assert!(dot.contains("END"));
}
