// crates/agentcore/tests/state_template_test.rs

use agentcore::{
    render, Condition, NodeError, NodeOutput, RuntimeState, StateError, StateField, StateSchema,
    StateType, Template, TemplateError, Value,
};
use std::collections::{BTreeMap, HashMap};

fn schema(fields: &[(&str, &str)]) -> StateSchema {
    let mut schema = StateSchema::base();
    for (name, tag) in fields {
        schema
            .push(StateField::new(*name, StateType::parse(tag).unwrap()))
            .unwrap();
    }
    schema
}

fn state(fields: &[(&str, &str)], initial: Vec<(&str, Value)>) -> RuntimeState {
    let initial: HashMap<String, Value> = initial
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    RuntimeState::new(&schema(fields), initial).unwrap()
}

#[test]
fn test_render_float() {
    let state = state(&[("mass", "float")], vec![("mass", Value::Float(2.5))]);
    assert_eq!(render("mass: {mass}", &state).unwrap(), "mass: 2.5");
}

#[test]
fn test_render_literal_forms() {
    let mut analysis = BTreeMap::new();
    analysis.insert("score".to_string(), Value::Int(7));
    analysis.insert("tone".to_string(), Value::from("formal"));

    let state = state(
        &[
            ("count", "int"),
            ("whole", "float"),
            ("tiny", "float"),
            ("velocity", "ndarray"),
            ("tags", "List[str]"),
            ("analysis", "dict"),
            ("ok", "bool"),
        ],
        vec![
            ("count", Value::Int(3)),
            ("whole", Value::Float(1.0)),
            ("tiny", Value::Float(9.1093837015e-31)),
            ("velocity", Value::from(vec![1e6, 0.5, 0.0])),
            ("tags", Value::from(vec!["a", "b"])),
            ("analysis", Value::Map(analysis)),
            ("ok", Value::Bool(true)),
        ],
    );

    assert_eq!(render("{count}", &state).unwrap(), "3");
    assert_eq!(render("{whole}", &state).unwrap(), "1.0");
    assert_eq!(render("{tiny}", &state).unwrap(), "9.1093837015e-31");
    assert_eq!(render("{velocity}", &state).unwrap(), "[1000000.0, 0.5, 0.0]");
    assert_eq!(render("{tags}", &state).unwrap(), r#"["a", "b"]"#);
    assert_eq!(
        render("{analysis}", &state).unwrap(),
        r#"{"score": 7, "tone": "formal"}"#
    );
    assert_eq!(render("{ok}", &state).unwrap(), "true");
}

#[test]
fn test_render_escaped_braces() {
    let state = state(&[("x", "int")], vec![("x", Value::Int(1))]);
    assert_eq!(
        render(r#"{{"value": {x}}}"#, &state).unwrap(),
        r#"{"value": 1}"#
    );
}

#[test]
fn test_render_unknown_placeholder() {
    let state = state(&[("mass", "float")], vec![]);
    assert_eq!(
        render("charge: {charge}", &state),
        Err(TemplateError::UnknownPlaceholder {
            placeholder: "charge".into()
        })
    );
}

#[test]
fn test_render_is_idempotent_and_pure() {
    let state = state(&[("text", "str")], vec![("text", Value::from("hello"))]);
    let template = Template::parse("Say: {text} / {text}").unwrap();
    let before = state.clone();

    let first = template.render(&state).unwrap();
    let second = template.render(&state).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, "Say: hello / hello");
    assert_eq!(state, before);
    assert_eq!(template.placeholders(), vec!["text"]);
}

#[test]
fn test_malformed_templates() {
    for bad in ["{unclosed", "stray }", "{}", "{not valid}", "{1abc}"] {
        assert!(
            matches!(Template::parse(bad), Err(TemplateError::MalformedTemplate { .. })),
            "{} should be rejected",
            bad
        );
    }
}

#[test]
fn test_state_defaults_and_overrides() {
    let state = state(
        &[("mass", "float"), ("name", "str"), ("ok", "bool"), ("pick", "Union[int, str]")],
        vec![("mass", Value::Int(2))],
    );
    assert_eq!(state.get("mass"), Some(&Value::Int(2)));
    assert_eq!(state.get("name"), Some(&Value::from("")));
    assert_eq!(state.get("ok"), Some(&Value::Bool(false)));
    assert_eq!(state.get("pick"), Some(&Value::Int(0)));
    assert_eq!(state.get("messages"), Some(&Value::List(vec![])));
}

#[test]
fn test_state_rejects_undeclared_and_mistyped() {
    let schema = schema(&[("mass", "float")]);

    let undeclared = HashMap::from([("charge".to_string(), Value::Float(1.0))]);
    assert_eq!(
        RuntimeState::new(&schema, undeclared),
        Err(StateError::UndeclaredField("charge".into()))
    );

    let mistyped = HashMap::from([("mass".to_string(), Value::from("heavy"))]);
    assert!(matches!(
        RuntimeState::new(&schema, mistyped),
        Err(StateError::TypeMismatch { .. })
    ));
}

#[test]
fn test_sink_writes_in_order() {
    let mut state = state(&[("mean", "float"), ("std", "float")], vec![]);
    let sink = vec!["mean".to_string(), "std".to_string()];

    let written = NodeOutput::tuple(vec![Value::Float(1.5), Value::Float(0.25)])
        .write_to("stats", &sink, &mut state)
        .unwrap();

    assert_eq!(written.len(), 2);
    assert_eq!(state.get("mean"), Some(&Value::Float(1.5)));
    assert_eq!(state.get("std"), Some(&Value::Float(0.25)));
}

#[test]
fn test_updates_follow_the_sink() {
    let mut state = state(&[("mean", "float"), ("done", "bool")], vec![]);
    let sink = vec!["mean".to_string()];

    let written = NodeOutput::single(Value::Float(1.5))
        .with_update("done", true)
        .with_human_input("ok")
        .write_to("stats", &sink, &mut state)
        .unwrap();

    assert_eq!(written.len(), 2);
    assert_eq!(state.get("done"), Some(&Value::Bool(true)));

    let err = NodeOutput::new()
        .with_update("nope", 1i64)
        .write_to("stats", &[], &mut state)
        .unwrap_err();
    assert!(matches!(err, NodeError::State(StateError::UndeclaredField(_))));
}

#[test]
fn test_sink_arity_mismatch() {
    let mut state = state(&[("mean", "float"), ("std", "float")], vec![]);
    let sink = vec!["mean".to_string(), "std".to_string()];

    let err = NodeOutput::single(Value::Float(1.5))
        .write_to("stats", &sink, &mut state)
        .unwrap_err();
    assert!(matches!(
        err,
        NodeError::SinkArity {
            expected: 2,
            actual: 1,
            ..
        }
    ));
}

#[test]
fn test_conditions() {
    let mut response = BTreeMap::new();
    response.insert("validation_passed".to_string(), Value::Bool(true));
    let state = state(
        &[("score", "float"), ("verdict", "str"), ("response", "dict"), ("done", "bool")],
        vec![
            ("score", Value::Float(0.85)),
            ("verdict", Value::from("accept")),
            ("response", Value::Map(response)),
        ],
    );

    let check = |text: &str| Condition::parse(text).unwrap().evaluate(&state);
    assert!(check("score"));
    assert!(check("score >= 0.8"));
    assert!(!check("score < 0.8"));
    assert!(check("verdict == \"accept\""));
    assert!(check("verdict != 'reject'"));
    assert!(check("response.validation_passed"));
    assert!(!check("done"));
    assert!(check("not done"));
    assert!(!check("response.missing"));

    assert!(Condition::parse("score >=").is_err());
    assert!(Condition::parse("a b").is_err());
    assert_eq!(Condition::parse("score >= 0.8").unwrap().field_name(), "score");
}
