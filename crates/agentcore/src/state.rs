//! State schema and the per-run mutable state map.
//!
//! A workflow declares its fields with short type tags (`str`, `float`,
//! `List[int]`, `Dict[str, List[float]]`, ...). Every schema begins with the
//! base fields the executor itself reads and writes.

use crate::{StateError, Value};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Field names every workflow state carries.
pub const BASE_FIELDS: &[(&str, &str)] = &[
    ("current_node_type", "str"),
    ("previous_node_type", "str"),
    ("human_input", "str"),
    ("input", "str"),
    ("output", "str"),
    ("messages", "List[Dict[str, str]]"),
];

/// Semantic type tag of a state field
#[derive(Debug, Clone, PartialEq)]
pub enum StateType {
    Str,
    Int,
    Float,
    Bool,
    List(Box<StateType>),
    Dict(Box<StateType>, Box<StateType>),
    /// Numeric array (vectors, fields, coordinates)
    Array,
    Union(Vec<StateType>),
    Any,
}

impl StateType {
    /// Parse a type tag. Returns `None` for unknown or malformed tags.
    pub fn parse(tag: &str) -> Option<StateType> {
        let tag = tag.trim();
        match tag {
            "str" | "string" => return Some(StateType::Str),
            "int" | "integer" => return Some(StateType::Int),
            "float" => return Some(StateType::Float),
            "bool" | "boolean" => return Some(StateType::Bool),
            "ndarray" | "array" => return Some(StateType::Array),
            "Any" | "any" => return Some(StateType::Any),
            "list" => return Some(StateType::List(Box::new(StateType::Any))),
            "dict" => {
                return Some(StateType::Dict(
                    Box::new(StateType::Str),
                    Box::new(StateType::Any),
                ))
            }
            _ => {}
        }

        let open = tag.find('[')?;
        let inner = tag.get(open + 1..)?.strip_suffix(']')?;
        let args = split_top_level(inner)?;

        match &tag[..open] {
            "List" | "list" => match args.as_slice() {
                [item] => Some(StateType::List(Box::new(StateType::parse(item)?))),
                _ => None,
            },
            "Dict" | "dict" => match args.as_slice() {
                [key, value] => Some(StateType::Dict(
                    Box::new(StateType::parse(key)?),
                    Box::new(StateType::parse(value)?),
                )),
                _ => None,
            },
            "Union" => {
                if args.len() < 2 {
                    return None;
                }
                let members = args
                    .iter()
                    .map(|a| StateType::parse(a))
                    .collect::<Option<Vec<_>>>()?;
                Some(StateType::Union(members))
            }
            _ => None,
        }
    }

    /// Value a field of this type starts with when the caller supplies none.
    pub fn default_value(&self) -> Value {
        match self {
            StateType::Str => Value::String(String::new()),
            StateType::Int => Value::Int(0),
            StateType::Float => Value::Float(0.0),
            StateType::Bool => Value::Bool(false),
            StateType::List(_) | StateType::Array => Value::List(Vec::new()),
            StateType::Dict(_, _) => Value::Map(BTreeMap::new()),
            StateType::Union(members) => members
                .first()
                .map(StateType::default_value)
                .unwrap_or_default(),
            StateType::Any => Value::Null,
        }
    }

    /// Whether `value` is acceptable for a field of this type. Null is
    /// accepted everywhere; ints widen to floats.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (StateType::Any, _) => true,
            (StateType::Str, Value::String(_)) => true,
            (StateType::Int, Value::Int(_)) => true,
            (StateType::Float, Value::Float(_) | Value::Int(_)) => true,
            (StateType::Bool, Value::Bool(_)) => true,
            (StateType::List(item), Value::List(items)) => items.iter().all(|v| item.accepts(v)),
            (StateType::Array, Value::List(items)) => items
                .iter()
                .all(|v| v.as_f64().is_some() || StateType::Array.accepts(v)),
            (StateType::Dict(_, item), Value::Map(map)) => map.values().all(|v| item.accepts(v)),
            (StateType::Union(members), v) => members.iter().any(|m| m.accepts(v)),
            _ => false,
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateType::Str => f.write_str("str"),
            StateType::Int => f.write_str("int"),
            StateType::Float => f.write_str("float"),
            StateType::Bool => f.write_str("bool"),
            StateType::Array => f.write_str("ndarray"),
            StateType::Any => f.write_str("Any"),
            StateType::List(item) => write!(f, "List[{}]", item),
            StateType::Dict(key, value) => write!(f, "Dict[{}, {}]", key, value),
            StateType::Union(members) => {
                f.write_str("Union[")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", m)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl Serialize for StateType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Split `a, B[c, d], e` on commas that are not nested inside brackets.
/// Rejects empty arguments and unbalanced brackets.
fn split_top_level(inner: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in inner.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                parts.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(inner[start..].trim());
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(parts)
}

/// A single declared state field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: StateType,
}

impl StateField {
    pub fn new(name: impl Into<String>, ty: StateType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Named groups of fields that `state_defs` may reference by name.
pub fn prebuilt_group(name: &str) -> Option<Vec<StateField>> {
    let fields: &[(&str, &str)] = match name {
        "HilpState" => &[
            ("begin_conversation", "bool"),
            ("end_conversation", "bool"),
            ("conversation", "List[Dict[str, str]]"),
            ("conversation_summary", "str"),
        ],
        _ => return None,
    };
    fields
        .iter()
        .map(|(n, t)| StateType::parse(t).map(|ty| StateField::new(*n, ty)))
        .collect()
}

/// Ordered set of declared fields, base fields first
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StateSchema {
    fields: Vec<StateField>,
}

impl StateSchema {
    /// Schema holding only the base fields.
    pub fn base() -> Self {
        let fields = BASE_FIELDS
            .iter()
            .filter_map(|(n, t)| StateType::parse(t).map(|ty| StateField::new(*n, ty)))
            .collect();
        Self { fields }
    }

    pub fn is_base_field(name: &str) -> bool {
        BASE_FIELDS.iter().any(|(n, _)| *n == name)
    }

    pub fn fields(&self) -> &[StateField] {
        &self.fields
    }

    /// Fields declared by the workflow itself.
    pub fn declared(&self) -> impl Iterator<Item = &StateField> {
        self.fields.iter().filter(|f| !Self::is_base_field(&f.name))
    }

    pub fn get(&self, name: &str) -> Option<&StateField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append a field. Re-declaring an existing field with the same type is
    /// a no-op; with a different type it returns the previous declaration.
    pub fn push(&mut self, field: StateField) -> Result<(), StateField> {
        match self.get(&field.name) {
            Some(existing) if existing.ty == field.ty => Ok(()),
            Some(existing) => Err(existing.clone()),
            None => {
                self.fields.push(field);
                Ok(())
            }
        }
    }
}

impl Default for StateSchema {
    fn default() -> Self {
        Self::base()
    }
}

/// Mutable field map threaded through one workflow run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RuntimeState {
    values: HashMap<String, Value>,
}

impl RuntimeState {
    /// Merge caller-supplied initial values over the schema defaults.
    pub fn new(schema: &StateSchema, initial: HashMap<String, Value>) -> Result<Self, StateError> {
        let mut values: HashMap<String, Value> = schema
            .fields()
            .iter()
            .map(|f| (f.name.clone(), f.ty.default_value()))
            .collect();

        for (name, value) in initial {
            let field = schema
                .get(&name)
                .ok_or_else(|| StateError::UndeclaredField(name.clone()))?;
            if !field.ty.accepts(&value) {
                return Err(StateError::TypeMismatch {
                    field: name,
                    expected: field.ty.to_string(),
                    actual: value.type_name().to_string(),
                });
            }
            values.insert(name, value);
        }

        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Resolve `field` or `field.key.key`.
    pub fn lookup(&self, path: &[String]) -> Option<&Value> {
        let (head, rest) = path.split_first()?;
        self.values.get(head)?.lookup(rest.iter().map(String::as_str))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Write a declared field.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), StateError> {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(StateError::UndeclaredField(name.to_string())),
        }
    }

    /// Append a `{role, content}` entry to `messages`.
    pub fn record_message(&mut self, role: &str, content: impl Into<String>) {
        let entry = Value::Map(BTreeMap::from([
            ("role".to_string(), Value::from(role)),
            ("content".to_string(), Value::String(content.into())),
        ]));
        match self.values.get_mut("messages") {
            Some(Value::List(messages)) => messages.push(entry),
            _ => {
                self.values
                    .insert("messages".to_string(), Value::List(vec![entry]));
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn into_values(self) -> HashMap<String, Value> {
        self.values
    }
}
