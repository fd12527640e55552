use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Spec error: {0}")]
    Spec(#[from] SpecError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Step limit of {limit} reached without hitting END")]
    StepLimit { limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Load-time errors. Raised before any node executes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    #[error("Malformed spec at '{key}': {reason}")]
    Malformed { key: String, reason: String },

    #[error("Unknown type '{tag}' for state field '{field}'")]
    UnknownType { field: String, tag: String },

    #[error("Unknown node type '{type_tag}' for node '{node}'")]
    UnknownNodeType { node: String, type_tag: String },

    #[error("Node '{node}' produces output but declares no sink")]
    MissingSink { node: String },

    #[error("Node '{node}' has dangling '{key}' reference to '{target}'")]
    DanglingEdge {
        node: String,
        key: String,
        target: String,
    },
}

impl SpecError {
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        SpecError::Malformed {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Template references unknown field '{placeholder}'")]
    UnknownPlaceholder { placeholder: String },

    #[error("Malformed template at offset {offset}: {reason}")]
    MalformedTemplate { offset: usize, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("Field '{0}' is not declared in the state schema")]
    UndeclaredField(String),

    #[error("Invalid value for '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Model call failed: {0}")]
    Model(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Could not decode output as {format}: {reason}")]
    OutputFormat { format: String, reason: String },

    #[error("Node '{node}' produced {actual} value(s) for {expected} sink field(s)")]
    SinkArity {
        node: String,
        expected: usize,
        actual: usize,
    },

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}
