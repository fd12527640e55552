//! Bodies of the `survey` and `summarize` kinds, which work on the
//! `HilpState` conversation fields.

use crate::prompt::strip_code_fences;
use agentcore::{ChatMessage, ModelRequest, NodeContext, NodeError, NodeOutput, Value};
use std::collections::BTreeMap;

/// Reply that ends a survey
pub const SURVEY_COMPLETE: &str = "COLLECT_COMPLETE";

pub const SURVEY_TEMPLATE: &str = "# QUESTIONS:
{questions}

# Instructions:
Ask ALL questions from pre-defined QUESTIONS one by one.
Ask ONLY ONE question at a time following the pre-defined order.
Do not skip questions, change their order or rewrite them.
If all questions have been asked, output exactly \"COLLECT_COMPLETE\".";

pub const SUMMARY_TEMPLATE: &str = "# Instructions:
Summarize the previous conversation and output a summary of key points in bullet points.
Each bullet point should be a complete sentence and contain only one key point.
Do not add new information. Do not make up information. Do not change the order of information.
For numbers, use the exact values from the conversation. Do not make up numbers.
Output MUST be bullet points ONLY, do not add explanation before or after.";

const SURVEY_THANKS: &str = "Thank you for your answers!";

fn conversation_messages(ctx: &NodeContext) -> Vec<ChatMessage> {
    ctx.state
        .get("conversation")
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| {
            let role = entry.lookup(["role"])?.as_str()?;
            let content = entry.lookup(["content"])?.as_str()?;
            Some(ChatMessage::new(role, content))
        })
        .collect()
}

fn conversation_value(messages: &[ChatMessage]) -> Value {
    Value::List(
        messages
            .iter()
            .map(|m| {
                Value::Map(BTreeMap::from([
                    ("role".to_string(), Value::from(m.role.as_str())),
                    ("content".to_string(), Value::from(m.content.as_str())),
                ]))
            })
            .collect(),
    )
}

async fn ask_model(ctx: &NodeContext, messages: Vec<ChatMessage>) -> Result<String, NodeError> {
    ctx.model
        .complete(ModelRequest {
            model: ctx.llm.clone().unwrap_or_default(),
            messages,
            images: Vec::new(),
            format: None,
            sink: Vec::new(),
        })
        .await
}

/// The model asks one question per turn; each answer is appended to the
/// conversation until the model replies with [`SURVEY_COMPLETE`].
pub async fn survey(
    ctx: &NodeContext,
    instructions: &str,
    max_turns: usize,
) -> Result<NodeOutput, NodeError> {
    let mut conversation = conversation_messages(ctx);
    if conversation.is_empty() {
        ctx.chat.send_message("I'd like to ask some questions.").await?;
        if let Some(exit) = ctx.exit_commands.first() {
            ctx.chat
                .send_message(&format!(
                    "You can say \"{}\" to end the workflow at any time.",
                    exit
                ))
                .await?;
        }
    }

    let mut last_answer = None;
    let mut complete = false;
    for _ in 0..max_turns {
        let mut messages = vec![ChatMessage::user(instructions)];
        messages.extend(conversation.iter().cloned());
        let reply = ask_model(ctx, messages).await?;

        if reply.contains(SURVEY_COMPLETE) {
            ctx.chat.send_message(SURVEY_THANKS).await?;
            conversation.push(ChatMessage::assistant(SURVEY_THANKS));
            complete = true;
            break;
        }

        let question = strip_code_fences(&reply).trim().to_string();
        conversation.push(ChatMessage::assistant(question.as_str()));
        let Some(answer) = ctx.chat.ask_input(&question).await? else {
            break;
        };
        if ctx.is_exit_command(&answer) {
            return Ok(NodeOutput::new().with_human_input(answer));
        }
        conversation.push(ChatMessage::user(answer.as_str()));
        last_answer = Some(answer);
    }

    if !complete {
        tracing::warn!("Survey in '{}' ended before all questions were asked", ctx.node);
    }

    let mut output = NodeOutput::new()
        .with_update("conversation", conversation_value(&conversation))
        .with_update("begin_conversation", false)
        .with_update("end_conversation", complete);
    output.human_input = last_answer;
    Ok(output)
}

/// Ask the model for a bullet summary of the conversation, show it, and
/// clear the conversation.
pub async fn summarize(ctx: &NodeContext, instructions: &str) -> Result<NodeOutput, NodeError> {
    ctx.chat
        .send_message("I will summarize the previous conversation.")
        .await?;

    let mut messages = conversation_messages(ctx);
    messages.push(ChatMessage::user(instructions));
    let reply = ask_model(ctx, messages).await?;
    let summary = strip_code_fences(&reply).trim().to_string();
    ctx.chat.send_message(&summary).await?;

    Ok(NodeOutput::new()
        .with_update("conversation_summary", summary)
        .with_update("conversation", Value::List(Vec::new())))
}
