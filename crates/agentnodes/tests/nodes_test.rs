// crates/agentnodes/tests/nodes_test.rs

use agentcore::{FlowError, NodeError, SinkFormat, SpecError, Value};
use agentnodes::{pick_option, register_all, ScriptedChat, ScriptedModel, Transcript};
use agentruntime::{Collaborators, FlowRuntime, NodeRegistry, RunOutcome, RuntimeConfig};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

fn runtime(model: Arc<ScriptedModel>, chat: Arc<ScriptedChat>) -> FlowRuntime {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry);
    FlowRuntime::with_registry(
        Arc::new(registry),
        Collaborators::new(model, chat),
        RuntimeConfig::default(),
    )
}

/// Runtime whose collaborators have nothing scripted
fn idle_runtime() -> FlowRuntime {
    runtime(
        Arc::new(ScriptedModel::new(Vec::<String>::new())),
        Arc::new(ScriptedChat::new(Vec::<String>::new())),
    )
}

fn inputs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_register_all() {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry);

    assert_eq!(
        registry.list_node_types(),
        vec![
            "debug.log",
            "time.delay",
            "transform.json_parse",
            "transform.json_stringify"
        ]
    );
    assert!(!registry.get_metadata("debug.log").unwrap().produces_output);
    assert!(registry.get_metadata("transform.json_parse").unwrap().produces_output);
}

#[tokio::test]
async fn test_json_round_trip_through_state() {
    let yaml = r#"
name: json
state_defs:
  - raw: str
  - parsed: dict
  - again: str
nodes:
  parse:
    type: transform.json_parse
    source: raw
    sink: parsed
    next: log
  log:
    type: debug.log
    message: "parsed {parsed}"
    next: stringify
  stringify:
    type: transform.json_stringify
    source: parsed
    sink: again
entry_point: parse
"#;
    let runtime = idle_runtime();
    let workflow = runtime.load(yaml).unwrap();

    let result = runtime
        .execute(&workflow, inputs(&[("raw", Value::from("{\"b\": 2, \"a\": [1, 2.5]}"))]))
        .await
        .unwrap();

    let parsed = result.state.get("parsed").unwrap();
    assert_eq!(parsed.lookup(["b"]), Some(&Value::Int(2)));
    assert_eq!(
        result.state.get("again"),
        Some(&Value::from("{\"a\":[1,2.5],\"b\":2}"))
    );
}

#[tokio::test]
async fn test_transform_source_must_be_declared() {
    let yaml = r#"
name: json
state_defs:
  - parsed: dict
nodes:
  parse:
    type: transform.json_parse
    source: raw
    sink: parsed
entry_point: parse
"#;
    let runtime = idle_runtime();
    match runtime.load(yaml) {
        Err(FlowError::Spec(SpecError::Malformed { key, reason })) => {
            assert_eq!(key, "nodes.parse.source");
            assert!(reason.contains("raw"));
        }
        Err(other) => panic!("expected Malformed, got {}", other),
        Ok(_) => panic!("expected Malformed"),
    }
}

#[tokio::test]
async fn test_invalid_json_fails_the_run() {
    let yaml = r#"
name: json
state_defs:
  - raw: str
  - parsed: dict
nodes:
  parse:
    type: transform.json_parse
    source: raw
    sink: parsed
entry_point: parse
"#;
    let runtime = idle_runtime();
    let workflow = runtime.load(yaml).unwrap();

    let err = runtime
        .execute(&workflow, inputs(&[("raw", Value::from("{oops"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Node(NodeError::OutputFormat { .. })));
}

#[tokio::test]
async fn test_delay_node() {
    let yaml = r#"
name: wait
nodes:
  pause:
    type: time.delay
    delay_ms: 5
entry_point: pause
"#;
    let runtime = idle_runtime();
    let workflow = runtime.load(yaml).unwrap();
    let result = runtime.execute(&workflow, HashMap::new()).await.unwrap();
    assert_eq!(result.outcome, RunOutcome::Completed);

    let bad = yaml.replace("delay_ms: 5", "delay_ms: soon");
    assert!(matches!(
        runtime.load(&bad),
        Err(FlowError::Spec(SpecError::Malformed { .. }))
    ));
}

#[tokio::test]
async fn test_interactive_builtins_with_scripted_chat() {
    let yaml = r#"
name: survey
state_defs:
  - color: str
  - name: str
  - happy: bool
nodes:
  ask_name:
    type: ask_input
    prompt: "Your name?"
    sink: name
    next: pick
  pick:
    type: ask_choice
    prompt: "{name}, pick a color"
    options: [red, green]
    sink: color
    next: mood
  mood:
    type: ask_yes_no
    sink: happy
    next: show
  show:
    type: display
    prompt: Summary
    fields: [name, color, happy]
    next: bye
  bye:
    type: message
    template: "Thanks {name}!"
entry_point: ask_name
"#;
    let chat = Arc::new(ScriptedChat::new(["Ada", "green", "yes"]));
    let runtime = runtime(Arc::new(ScriptedModel::echo()), chat.clone());
    let workflow = runtime.load(yaml).unwrap();

    let result = runtime.execute(&workflow, HashMap::new()).await.unwrap();
    assert_eq!(result.state.get("color"), Some(&Value::from("green")));
    assert_eq!(result.state.get("happy"), Some(&Value::Bool(true)));
    assert_eq!(result.state.get("human_input"), Some(&Value::from("yes")));

    let transcript = chat.transcript().await;
    assert_eq!(transcript[0], Transcript::Question("Your name?".into()));
    assert_eq!(transcript[1], Transcript::Question("Ada, pick a color".into()));
    assert_eq!(
        transcript[3],
        Transcript::Display {
            title: "Summary".into(),
            data: Value::Map(BTreeMap::from([
                ("color".to_string(), Value::from("green")),
                ("happy".to_string(), Value::Bool(true)),
                ("name".to_string(), Value::from("Ada")),
            ])),
        }
    );
    assert_eq!(transcript[4], Transcript::Message("Thanks Ada!".into()));
}

#[tokio::test]
async fn test_choice_outside_options_fails() {
    let yaml = r#"
name: choose
state_defs:
  - color: str
nodes:
  pick:
    type: ask_choice
    options: [red, green]
    sink: color
entry_point: pick
"#;
    let chat = Arc::new(ScriptedChat::new(["blue"]));
    let runtime = runtime(Arc::new(ScriptedModel::echo()), chat);
    let workflow = runtime.load(yaml).unwrap();

    let err = runtime.execute(&workflow, HashMap::new()).await.unwrap_err();
    assert!(matches!(err, FlowError::Node(NodeError::Interaction(_))));
}

#[tokio::test]
async fn test_echo_model() {
    let model = Arc::new(ScriptedModel::echo());
    let yaml = r#"
name: echo
state_defs:
  - topic: str
  - reply: str
  - facts: list
nodes:
  talk:
    type: prompt
    template: "Tell me about {topic}"
    sink: reply
    next: list
  list:
    type: prompt
    template: "List facts about {topic}"
    sink: facts
    sink_format: list
entry_point: talk
"#;
    let runtime = runtime(model.clone(), Arc::new(ScriptedChat::new(Vec::<String>::new())));
    let workflow = runtime.load(yaml).unwrap();

    let result = runtime
        .execute(&workflow, inputs(&[("topic", Value::from("owls"))]))
        .await
        .unwrap();
    assert_eq!(result.state.get("reply"), Some(&Value::from("Tell me about owls")));
    assert_eq!(result.state.get("facts"), Some(&Value::List(Vec::new())));

    let requests = model.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].format, Some(SinkFormat::List));
}

#[tokio::test]
async fn test_echo_model_fills_multi_field_sinks() {
    let yaml = r#"
name: split
state_defs:
  - title: str
  - summary: str
  - tags: list
  - notes: list
nodes:
  describe:
    type: prompt
    template: "Describe it"
    sink: [title, summary]
    sink_format: json
    next: label
  label:
    type: prompt
    template: "Label it"
    sink: [tags, notes]
    sink_format: list
entry_point: describe
"#;
    let runtime = runtime(
        Arc::new(ScriptedModel::echo()),
        Arc::new(ScriptedChat::new(Vec::<String>::new())),
    );
    let workflow = runtime.load(yaml).unwrap();

    let result = runtime.execute(&workflow, HashMap::new()).await.unwrap();
    assert_eq!(result.state.get("title"), Some(&Value::from("Describe it")));
    assert_eq!(result.state.get("summary"), Some(&Value::from("Describe it")));
    assert_eq!(result.state.get("notes"), Some(&Value::from("Label it")));
}

#[test]
fn test_pick_option() {
    let options = vec!["Yes".to_string(), "No".to_string()];
    assert_eq!(pick_option("1", &options), Some("Yes".into()));
    assert_eq!(pick_option(" no ", &options), Some("No".into()));
    assert_eq!(pick_option("3", &options), None);
    assert_eq!(pick_option("maybe", &options), None);
}
