//! Interactive and control node kinds every workflow can use without
//! registering anything.

use crate::conversation::{self, SUMMARY_TEMPLATE, SURVEY_TEMPLATE};
use agentcore::{
    Node, NodeContext, NodeError, NodeOutput, NodeSpec, SpecError, StateSchema, Template, Value,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

const DEFAULT_MAX_TURNS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// Yes/no question; sinks a bool
    AskYesNo,
    /// Free-form question; sinks the text
    AskInput,
    /// Multiple-choice question; sinks the chosen option
    AskChoice,
    /// Show state fields to the user
    Display,
    /// Render `template` and send it as a chat message
    Message,
    /// Model-led question and answer session over the conversation fields
    Survey,
    /// Condense the conversation into `conversation_summary`
    Summarize,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 7] = [
        BuiltinKind::AskYesNo,
        BuiltinKind::AskInput,
        BuiltinKind::AskChoice,
        BuiltinKind::Display,
        BuiltinKind::Message,
        BuiltinKind::Survey,
        BuiltinKind::Summarize,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            BuiltinKind::AskYesNo => "ask_yes_no",
            BuiltinKind::AskInput => "ask_input",
            BuiltinKind::AskChoice => "ask_choice",
            BuiltinKind::Display => "display",
            BuiltinKind::Message => "message",
            BuiltinKind::Survey => "survey",
            BuiltinKind::Summarize => "summarize",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BuiltinKind::AskYesNo => "Ask the user a yes/no question",
            BuiltinKind::AskInput => "Ask the user for free-form input",
            BuiltinKind::AskChoice => "Ask the user to pick one of several options",
            BuiltinKind::Display => "Display state fields",
            BuiltinKind::Message => "Send a rendered chat message",
            BuiltinKind::Survey => "Let the model ask a list of questions one at a time",
            BuiltinKind::Summarize => "Summarize the conversation into bullet points",
        }
    }

    pub fn produces_output(&self) -> bool {
        matches!(
            self,
            BuiltinKind::AskYesNo | BuiltinKind::AskInput | BuiltinKind::AskChoice
        )
    }

    /// State fields the kind reads and writes on its own
    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            BuiltinKind::Survey => &["conversation", "begin_conversation", "end_conversation"],
            BuiltinKind::Summarize => &["conversation", "conversation_summary"],
            _ => &[],
        }
    }
}

/// A built-in node with its declaration-time settings
#[derive(Debug, Clone)]
pub struct BuiltinNode {
    kind: BuiltinKind,
    prompt: Option<Template>,
    source: BTreeMap<String, String>,
    options: Vec<String>,
    fields: Vec<String>,
    max_turns: usize,
}

impl BuiltinNode {
    pub fn from_spec(
        kind: BuiltinKind,
        spec: &NodeSpec,
        schema: &StateSchema,
    ) -> Result<Self, SpecError> {
        let key = format!("nodes.{}", spec.name);

        if kind.produces_output() && spec.sink.len() > 1 {
            return Err(SpecError::malformed(
                format!("{}.sink", key),
                format!("'{}' writes exactly one field", kind.tag()),
            ));
        }
        if let Some(missing) = kind.required_fields().iter().find(|f| !schema.contains(f)) {
            return Err(SpecError::malformed(
                &key,
                format!(
                    "'{}' needs '{}' declared; add HilpState to state_defs",
                    kind.tag(),
                    missing
                ),
            ));
        }

        let mut source = spec.source.clone();
        if kind == BuiltinKind::Survey {
            let questions = spec
                .config_str("questions")
                .filter(|field| schema.contains(field))
                .ok_or_else(|| {
                    SpecError::malformed(
                        format!("{}.questions", key),
                        "survey requires 'questions' naming a declared state field",
                    )
                })?;
            source
                .entry("questions".to_string())
                .or_insert_with(|| questions.to_string());
        }

        // `message` reads `template`; the ask kinds read `prompt`.
        let prompt_source = match kind {
            BuiltinKind::Message => spec.template.as_deref().or(spec.config_str("prompt")),
            BuiltinKind::Survey => spec.template.as_deref().or(Some(SURVEY_TEMPLATE)),
            BuiltinKind::Summarize => spec.template.as_deref().or(Some(SUMMARY_TEMPLATE)),
            _ => spec.config_str("prompt").or(spec.template.as_deref()),
        };
        let prompt = match prompt_source {
            Some(text) => Some(
                Template::parse(text)
                    .map_err(|e| SpecError::malformed(format!("{}.prompt", key), e.to_string()))?,
            ),
            None if kind == BuiltinKind::Message => {
                return Err(SpecError::malformed(
                    format!("{}.template", key),
                    "message nodes require a template",
                ))
            }
            None => None,
        };

        let options = match spec.config.get("options") {
            Some(Value::List(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(other) => {
                return Err(SpecError::malformed(
                    format!("{}.options", key),
                    format!("expected a list, got {}", other.type_name()),
                ))
            }
            None => Vec::new(),
        };
        if kind == BuiltinKind::AskChoice && options.is_empty() {
            return Err(SpecError::malformed(
                format!("{}.options", key),
                "ask_choice requires at least one option",
            ));
        }

        let fields = match spec.config.get("fields") {
            Some(Value::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .filter(|name| schema.contains(name))
                        .map(str::to_string)
                        .ok_or_else(|| {
                            SpecError::malformed(
                                format!("{}.fields", key),
                                format!("{} is not a declared state field", item),
                            )
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(SpecError::malformed(
                    format!("{}.fields", key),
                    format!("expected a list, got {}", other.type_name()),
                ))
            }
            None => schema.declared().map(|f| f.name.clone()).collect(),
        };

        let max_turns = match spec.config.get("max_turns") {
            None => DEFAULT_MAX_TURNS,
            Some(Value::Int(n)) if *n > 0 => *n as usize,
            Some(other) => {
                return Err(SpecError::malformed(
                    format!("{}.max_turns", key),
                    format!("expected a positive integer, got {}", other),
                ))
            }
        };

        Ok(Self {
            kind,
            prompt,
            source,
            options,
            fields,
            max_turns,
        })
    }

    pub fn kind(&self) -> BuiltinKind {
        self.kind
    }

    pub fn prompt(&self) -> Option<&Template> {
        self.prompt.as_ref()
    }

    /// Placeholder renames, including the `questions` field of a survey
    pub fn source(&self) -> &BTreeMap<String, String> {
        &self.source
    }

    fn prompt_text(&self, ctx: &NodeContext, fallback: &str) -> Result<String, NodeError> {
        match &self.prompt {
            Some(template) => Ok(template.render_mapped(&ctx.state, &self.source)?),
            None => Ok(fallback.to_string()),
        }
    }
}

#[async_trait]
impl Node for BuiltinNode {
    fn node_type(&self) -> &str {
        self.kind.tag()
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        match self.kind {
            BuiltinKind::AskYesNo => {
                let question = self.prompt_text(&ctx, "Continue?")?;
                let options = if self.options.len() == 2 {
                    self.options.clone()
                } else {
                    vec!["Yes".to_string(), "No".to_string()]
                };
                let Some(answer) = ctx.chat.ask_choice(&question, &options).await? else {
                    return Ok(NodeOutput::single(false));
                };
                let yes = answer.trim().eq_ignore_ascii_case(&options[0]);
                Ok(NodeOutput::single(yes).with_human_input(answer))
            }
            BuiltinKind::AskInput => {
                let question = self.prompt_text(&ctx, "Please enter your input.")?;
                let answer = ctx.chat.ask_input(&question).await?.unwrap_or_default();
                Ok(NodeOutput::single(answer.clone()).with_human_input(answer))
            }
            BuiltinKind::AskChoice => {
                let question = self.prompt_text(&ctx, "Please choose an option.")?;
                match ctx.chat.ask_choice(&question, &self.options).await? {
                    Some(choice) if self.options.contains(&choice) => {
                        Ok(NodeOutput::single(choice.clone()).with_human_input(choice))
                    }
                    Some(choice) if ctx.is_exit_command(&choice) => {
                        Ok(NodeOutput::new().with_human_input(choice))
                    }
                    Some(choice) => Err(NodeError::Interaction(format!(
                        "'{}' is not one of the offered options",
                        choice
                    ))),
                    None => Ok(NodeOutput::single(Value::Null)),
                }
            }
            BuiltinKind::Display => {
                let data: BTreeMap<String, Value> = self
                    .fields
                    .iter()
                    .filter_map(|name| ctx.state.get(name).map(|v| (name.clone(), v.clone())))
                    .collect();
                let title = self.prompt_text(&ctx, &ctx.node)?;
                ctx.chat.display(&title, &Value::Map(data)).await?;
                Ok(NodeOutput::new())
            }
            BuiltinKind::Message => {
                let text = self.prompt_text(&ctx, "")?;
                ctx.chat.send_message(&text).await?;
                Ok(NodeOutput::new())
            }
            BuiltinKind::Survey => {
                let instructions = self.prompt_text(&ctx, SURVEY_TEMPLATE)?;
                conversation::survey(&ctx, &instructions, self.max_turns).await
            }
            BuiltinKind::Summarize => {
                let instructions = self.prompt_text(&ctx, SUMMARY_TEMPLATE)?;
                conversation::summarize(&ctx, &instructions).await
            }
        }
    }
}
