//! Declarative workflow documents.
//!
//! A document is parsed into an immutable [`WorkflowSpec`]; resolving node
//! types and building the graph happen afterwards in the runtime crate.

use crate::state::prebuilt_group;
use crate::{Condition, FlowError, SpecError, StateField, StateSchema, StateType, Value};
use serde_yaml::{Mapping, Value as Yaml};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// Name of the terminal sentinel in documents.
pub const END: &str = "END";

const TOP_LEVEL_KEYS: &[&str] = &[
    "name",
    "state_defs",
    "nodes",
    "entry_point",
    "exit_commands",
    "llm",
    "vlm",
];

const NODE_KEYS: &[&str] = &[
    "type",
    "template",
    "prompt_template",
    "sink",
    "sink_format",
    "image_keys",
    "source",
    "next",
];

/// Where an edge leads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Node(String),
    End,
}

impl Target {
    pub fn parse(name: &str) -> Self {
        match name {
            "END" | "__end__" => Target::End,
            other => Target::Node(other.to_string()),
        }
    }

    pub fn node_name(&self) -> Option<&str> {
        match self {
            Target::Node(name) => Some(name),
            Target::End => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Target::End)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Node(name) => f.write_str(name),
            Target::End => f.write_str(END),
        }
    }
}

/// Two-way branch evaluated after the node runs
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalEdge {
    pub condition: Condition,
    pub then: Target,
    pub otherwise: Target,
}

/// Outgoing edge descriptor of a node
#[derive(Debug, Clone, PartialEq)]
pub enum Next {
    Direct(Target),
    Conditional(ConditionalEdge),
}

/// How a prompt node decodes the model reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFormat {
    Text,
    Json,
    List,
}

impl SinkFormat {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "text" | "str" => Some(SinkFormat::Text),
            "json" | "dict" => Some(SinkFormat::Json),
            "list" => Some(SinkFormat::List),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SinkFormat::Text => "text",
            SinkFormat::Json => "json",
            SinkFormat::List => "list",
        }
    }
}

/// Node declaration as written in the document
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub name: String,
    pub node_type: String,
    pub template: Option<String>,
    /// Fields the node output is written to, in order. Empty when absent.
    pub sink: Vec<String>,
    pub sink_format: Option<SinkFormat>,
    pub image_keys: Vec<String>,
    /// Placeholder name to state field. Placeholders not listed read the
    /// field of the same name.
    pub source: BTreeMap<String, String>,
    pub next: Next,
    /// Any other keys, handed to built-in and custom nodes.
    pub config: BTreeMap<String, Value>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            template: None,
            sink: Vec::new(),
            sink_format: None,
            image_keys: Vec::new(),
            source: BTreeMap::new(),
            next: Next::Direct(Target::End),
            config: BTreeMap::new(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_sink<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sink = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source(mut self, placeholder: impl Into<String>, field: impl Into<String>) -> Self {
        self.source.insert(placeholder.into(), field.into());
        self
    }

    /// State field a placeholder reads
    pub fn source_field<'a>(&'a self, placeholder: &'a str) -> &'a str {
        self.source
            .get(placeholder)
            .map(String::as_str)
            .unwrap_or(placeholder)
    }

    pub fn with_next(mut self, next: Next) -> Self {
        self.next = next;
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// Immutable, validated workflow definition
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSpec {
    pub name: String,
    pub state: StateSchema,
    /// Nodes in declaration order.
    pub nodes: Vec<NodeSpec>,
    pub entry_point: String,
    pub exit_commands: Vec<String>,
    pub llm: Option<String>,
    pub vlm: Option<String>,
}

impl WorkflowSpec {
    /// Read and parse a workflow file.
    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_yaml_str(&text)?)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, SpecError> {
        let doc: Yaml = serde_yaml::from_str(text)
            .map_err(|e| SpecError::malformed("<document>", e.to_string()))?;
        Self::from_document(&doc)
    }

    /// Parse an already-decoded document.
    pub fn from_document(doc: &Yaml) -> Result<Self, SpecError> {
        let root = doc
            .as_mapping()
            .ok_or_else(|| SpecError::malformed("<document>", "expected a mapping"))?;

        for key in root.keys() {
            match key.as_str() {
                Some(k) if TOP_LEVEL_KEYS.contains(&k) => {}
                _ => tracing::warn!("Ignoring unknown workflow key: {:?}", key),
            }
        }

        let name = required_str(root, "name", "name")?;

        let state = match root.get("state_defs") {
            Some(defs) => parse_state_defs(defs)?,
            None => StateSchema::base(),
        };

        let nodes_map = root
            .get("nodes")
            .ok_or_else(|| SpecError::malformed("nodes", "missing required key"))?
            .as_mapping()
            .ok_or_else(|| SpecError::malformed("nodes", "expected a mapping of node name to node"))?;
        if nodes_map.is_empty() {
            return Err(SpecError::malformed("nodes", "at least one node is required"));
        }

        let mut nodes = Vec::with_capacity(nodes_map.len());
        for (key, body) in nodes_map {
            let node_name = key
                .as_str()
                .ok_or_else(|| SpecError::malformed("nodes", format!("node name {:?} is not a string", key)))?;
            if node_name == END || node_name == "__end__" {
                return Err(SpecError::malformed(
                    format!("nodes.{}", node_name),
                    "the terminal sentinel cannot be declared as a node",
                ));
            }
            nodes.push(parse_node(node_name, body, &state)?);
        }

        let entry_point = required_str(root, "entry_point", "entry_point")?;
        if !nodes.iter().any(|n| n.name == entry_point) {
            return Err(SpecError::malformed(
                "entry_point",
                format!("'{}' is not a declared node", entry_point),
            ));
        }

        let exit_commands = match root.get("exit_commands") {
            Some(value) => string_list(value, "exit_commands")?,
            None => Vec::new(),
        };

        Ok(Self {
            name,
            state,
            nodes,
            entry_point,
            exit_commands,
            llm: optional_str(root, "llm", "llm")?,
            vlm: optional_str(root, "vlm", "vlm")?,
        })
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Whether a piece of human input asks to terminate the run.
    pub fn is_exit_command(&self, input: &str) -> bool {
        matches_exit_command(&self.exit_commands, input)
    }

    /// Canonical document form. Base state fields are omitted.
    pub fn to_document(&self) -> Yaml {
        let mut root = Mapping::new();
        root.insert("name".into(), self.name.clone().into());

        let defs: Vec<Yaml> = self
            .state
            .declared()
            .map(|field| {
                let mut entry = Mapping::new();
                entry.insert(field.name.clone().into(), field.ty.to_string().into());
                Yaml::Mapping(entry)
            })
            .collect();
        root.insert("state_defs".into(), Yaml::Sequence(defs));

        let mut nodes = Mapping::new();
        for node in &self.nodes {
            nodes.insert(node.name.clone().into(), node_document(node));
        }
        root.insert("nodes".into(), Yaml::Mapping(nodes));
        root.insert("entry_point".into(), self.entry_point.clone().into());

        if !self.exit_commands.is_empty() {
            root.insert(
                "exit_commands".into(),
                Yaml::Sequence(self.exit_commands.iter().cloned().map(Yaml::from).collect()),
            );
        }
        if let Some(llm) = &self.llm {
            root.insert("llm".into(), llm.clone().into());
        }
        if let Some(vlm) = &self.vlm {
            root.insert("vlm".into(), vlm.clone().into());
        }
        Yaml::Mapping(root)
    }

    pub fn to_yaml_string(&self) -> Result<String, FlowError> {
        Ok(serde_yaml::to_string(&self.to_document())?)
    }
}

/// Case-insensitive match of `input` against `commands`, ignoring
/// surrounding whitespace.
pub fn matches_exit_command(commands: &[String], input: &str) -> bool {
    let input = input.trim();
    commands
        .iter()
        .any(|cmd| cmd.trim().eq_ignore_ascii_case(input))
}

fn node_document(node: &NodeSpec) -> Yaml {
    let mut map = Mapping::new();
    map.insert("type".into(), node.node_type.clone().into());
    if let Some(template) = &node.template {
        map.insert("template".into(), template.clone().into());
    }
    match node.sink.as_slice() {
        [] => {}
        [single] => {
            map.insert("sink".into(), single.clone().into());
        }
        many => {
            map.insert(
                "sink".into(),
                Yaml::Sequence(many.iter().cloned().map(Yaml::from).collect()),
            );
        }
    }
    if let Some(format) = node.sink_format {
        map.insert("sink_format".into(), format.as_str().into());
    }
    if !node.image_keys.is_empty() {
        map.insert(
            "image_keys".into(),
            Yaml::Sequence(node.image_keys.iter().cloned().map(Yaml::from).collect()),
        );
    }
    if !node.source.is_empty() {
        let source: Mapping = node
            .source
            .iter()
            .map(|(k, v)| (Yaml::from(k.clone()), Yaml::from(v.clone())))
            .collect();
        map.insert("source".into(), Yaml::Mapping(source));
    }
    for (key, value) in &node.config {
        if let Ok(yaml) = serde_yaml::to_value(value) {
            map.insert(key.clone().into(), yaml);
        }
    }
    let next = match &node.next {
        Next::Direct(target) => target.to_string().into(),
        Next::Conditional(edge) => {
            let mut cond = Mapping::new();
            cond.insert("condition".into(), edge.condition.to_string().into());
            cond.insert("then".into(), edge.then.to_string().into());
            cond.insert("otherwise".into(), edge.otherwise.to_string().into());
            Yaml::Mapping(cond)
        }
    };
    map.insert("next".into(), next);
    Yaml::Mapping(map)
}

fn required_str(map: &Mapping, field: &str, key: &str) -> Result<String, SpecError> {
    optional_str(map, field, key)?
        .ok_or_else(|| SpecError::malformed(key, "missing required key"))
}

fn optional_str(map: &Mapping, field: &str, key: &str) -> Result<Option<String>, SpecError> {
    match map.get(field) {
        None | Some(Yaml::Null) => Ok(None),
        Some(Yaml::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(SpecError::malformed(
            key,
            format!("expected a string, got {:?}", other),
        )),
    }
}

fn string_list(value: &Yaml, key: &str) -> Result<Vec<String>, SpecError> {
    match value {
        Yaml::Null => Ok(Vec::new()),
        Yaml::String(s) => Ok(vec![s.clone()]),
        Yaml::Sequence(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| SpecError::malformed(key, format!("{:?} is not a string", item)))
            })
            .collect(),
        other => Err(SpecError::malformed(
            key,
            format!("expected a string or list of strings, got {:?}", other),
        )),
    }
}

fn parse_type(field: &str, tag: &str) -> Result<StateField, SpecError> {
    StateType::parse(tag)
        .map(|ty| StateField::new(field, ty))
        .ok_or_else(|| SpecError::UnknownType {
            field: field.to_string(),
            tag: tag.to_string(),
        })
}

/// Normalize the accepted declaration shorthands into `(name, type)` pairs.
fn state_entry(entry: &Yaml, key: &str) -> Result<Vec<StateField>, SpecError> {
    match entry {
        Yaml::String(text) => match text.split_once(':') {
            Some((name, tag)) => Ok(vec![parse_type(name.trim(), tag.trim())?]),
            None => prebuilt_group(text.trim()).ok_or_else(|| SpecError::UnknownType {
                field: text.clone(),
                tag: text.clone(),
            }),
        },
        Yaml::Mapping(map) if map.contains_key("name") && map.contains_key("type") => {
            let name = required_str(map, "name", key)?;
            let tag = required_str(map, "type", key)?;
            Ok(vec![parse_type(&name, &tag)?])
        }
        Yaml::Mapping(map) if map.len() == 1 => {
            let (name, tag) = map
                .iter()
                .next()
                .ok_or_else(|| SpecError::malformed(key, "empty declaration"))?;
            match (name.as_str(), tag.as_str()) {
                (Some(name), Some(tag)) => Ok(vec![parse_type(name, tag)?]),
                _ => Err(SpecError::malformed(
                    key,
                    "expected '<field>: <type>' with string name and type",
                )),
            }
        }
        Yaml::Sequence(items) => match items.as_slice() {
            [Yaml::String(name), Yaml::String(tag)] => Ok(vec![parse_type(name, tag)?]),
            _ => {
                let mut fields = Vec::new();
                for item in items {
                    fields.extend(state_entry(item, key)?);
                }
                Ok(fields)
            }
        },
        other => Err(SpecError::malformed(
            key,
            format!("unsupported state declaration {:?}", other),
        )),
    }
}

fn parse_state_defs(defs: &Yaml) -> Result<StateSchema, SpecError> {
    let entries = match defs {
        Yaml::Null => return Ok(StateSchema::base()),
        Yaml::Sequence(items) => items,
        _ => return Err(SpecError::malformed("state_defs", "expected a list")),
    };

    let mut schema = StateSchema::base();
    let mut declared = HashSet::new();
    for (index, entry) in entries.iter().enumerate() {
        let key = format!("state_defs[{}]", index);
        for field in state_entry(entry, &key)? {
            let name = field.name.clone();
            let from_group = matches!(entry, Yaml::String(s) if !s.contains(':'));
            if !from_group && !StateSchema::is_base_field(&name) && !declared.insert(name.clone()) {
                return Err(SpecError::malformed(key, format!("field '{}' declared twice", name)));
            }
            schema.push(field).map_err(|existing| {
                SpecError::malformed(
                    key.clone(),
                    format!("field '{}' is already declared as {}", name, existing.ty),
                )
            })?;
        }
    }
    Ok(schema)
}

fn parse_target(value: &Yaml, key: &str) -> Result<Target, SpecError> {
    value
        .as_str()
        .map(Target::parse)
        .ok_or_else(|| SpecError::malformed(key, format!("expected a node name, got {:?}", value)))
}

fn parse_next(value: Option<&Yaml>, node: &str) -> Result<Next, SpecError> {
    let key = format!("nodes.{}.next", node);
    let value = match value {
        None | Some(Yaml::Null) => {
            tracing::debug!("Node '{}' has no next; routing to {}", node, END);
            return Ok(Next::Direct(Target::End));
        }
        Some(v) => v,
    };

    let map = match value {
        Yaml::String(name) => return Ok(Next::Direct(Target::parse(name))),
        Yaml::Mapping(map) => map,
        other => {
            return Err(SpecError::malformed(
                key,
                format!("expected a node name or a condition mapping, got {:?}", other),
            ))
        }
    };

    let condition_text = required_str(map, "condition", &format!("{}.condition", key))?;
    let condition = Condition::parse(&condition_text)
        .map_err(|reason| SpecError::malformed(format!("{}.condition", key), reason))?;

    let then = map
        .get("then")
        .ok_or_else(|| SpecError::malformed(format!("{}.then", key), "missing required key"))?;
    let otherwise = match (map.get("otherwise"), map.get("else")) {
        (Some(v), None) => v,
        (None, Some(v)) => {
            tracing::warn!("Node '{}' uses deprecated 'else'; use 'otherwise'", node);
            v
        }
        (Some(_), Some(_)) => {
            return Err(SpecError::malformed(
                format!("{}.else", key),
                "both 'otherwise' and its alias 'else' are set",
            ))
        }
        (None, None) => {
            return Err(SpecError::malformed(
                format!("{}.otherwise", key),
                "missing required key",
            ))
        }
    };

    Ok(Next::Conditional(ConditionalEdge {
        condition,
        then: parse_target(then, &format!("{}.then", key))?,
        otherwise: parse_target(otherwise, &format!("{}.otherwise", key))?,
    }))
}

fn declared_fields(
    value: Option<&Yaml>,
    key: &str,
    state: &StateSchema,
) -> Result<Vec<String>, SpecError> {
    let fields = match value {
        Some(v) => string_list(v, key)?,
        None => Vec::new(),
    };
    if let Some(unknown) = fields.iter().find(|f| !state.contains(f)) {
        return Err(SpecError::malformed(
            key,
            format!("'{}' is not a declared state field", unknown),
        ));
    }
    Ok(fields)
}

/// `source: field` is shorthand for `source: {source: field}`.
fn parse_source(
    value: Option<&Yaml>,
    key: &str,
    state: &StateSchema,
) -> Result<BTreeMap<String, String>, SpecError> {
    let source: BTreeMap<String, String> = match value {
        None | Some(Yaml::Null) => return Ok(BTreeMap::new()),
        Some(Yaml::String(field)) => BTreeMap::from([("source".to_string(), field.clone())]),
        Some(Yaml::Mapping(map)) => map
            .iter()
            .map(|(k, v)| match (k.as_str(), v.as_str()) {
                (Some(k), Some(v)) => Ok((k.to_string(), v.to_string())),
                _ => Err(SpecError::malformed(
                    key,
                    format!("expected placeholder: field pairs, got {:?}: {:?}", k, v),
                )),
            })
            .collect::<Result<_, _>>()?,
        Some(other) => {
            return Err(SpecError::malformed(
                key,
                format!("expected a field name or a mapping, got {:?}", other),
            ))
        }
    };
    if let Some(field) = source.values().find(|f| !state.contains(f)) {
        return Err(SpecError::malformed(
            key,
            format!("'{}' is not a declared state field", field),
        ));
    }
    Ok(source)
}

fn parse_node(name: &str, body: &Yaml, state: &StateSchema) -> Result<NodeSpec, SpecError> {
    let key = format!("nodes.{}", name);
    let map = body
        .as_mapping()
        .ok_or_else(|| SpecError::malformed(&key, "expected a mapping"))?;

    let node_type = required_str(map, "type", &format!("{}.type", key))?;

    let template = match optional_str(map, "template", &format!("{}.template", key))? {
        Some(t) => Some(t),
        None => optional_str(map, "prompt_template", &format!("{}.prompt_template", key))?,
    };

    let sink = declared_fields(map.get("sink"), &format!("{}.sink", key), state)?;
    let image_keys = declared_fields(map.get("image_keys"), &format!("{}.image_keys", key), state)?;
    let source = parse_source(map.get("source"), &format!("{}.source", key), state)?;

    let sink_format = match optional_str(map, "sink_format", &format!("{}.sink_format", key))? {
        Some(tag) => Some(SinkFormat::parse(&tag).ok_or_else(|| {
            SpecError::malformed(
                format!("{}.sink_format", key),
                format!("unknown format '{}'", tag),
            )
        })?),
        None => None,
    };

    let config = map
        .iter()
        .filter_map(|(k, v)| match k.as_str() {
            Some(k) if !NODE_KEYS.contains(&k) => Some((k.to_string(), Value::from(v.clone()))),
            _ => None,
        })
        .collect();

    Ok(NodeSpec {
        name: name.to_string(),
        node_type,
        template,
        sink,
        sink_format,
        image_keys,
        source,
        next: parse_next(map.get("next"), name)?,
        config,
    })
}
