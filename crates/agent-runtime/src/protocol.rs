//! Text Tool-Call Protocol
//!
//! For chat backends without native tool calling. Tools are described in the
//! system prompt and the model asks for one by replying with a fenced block:
//!
//! ````text
//! ```tool
//! {"tool": "get_current_time", "arguments": {}}
//! ```
//! ````
//!
//! A bare JSON object with a `"tool"` key is accepted too. Anything else is
//! the final answer.

use agent_core::error::{AgentError, Result};
use agent_core::provider::{ModelResponse, RawModelOutput};
use agent_core::tool::{render_tool_section, ToolCall, ToolSpec};
use agent_core::turn::{Turn, TurnContent};
use serde_json::Value;

/// Instruction the agent runs with unless configured otherwise
pub const DEFAULT_INSTRUCTION: &str = "You are a helpful assistant. When the user asks for the \
time, use the 'get_current_time' tool. You yourself do NOT know what time it is - you MUST use \
the tool! Respond in the same language as the user's question. Be friendly and precise.";

const TOOL_FENCE: &str = "```tool";
const FENCE_END: &str = "```";

/// Who a transcript line is attributed to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// Instruction followed by the tool section
pub fn system_prompt(instruction: &str, tools: &[ToolSpec]) -> String {
    if tools.is_empty() {
        return instruction.to_string();
    }
    format!(
        "{instruction}\n\n{}When you have what you need, answer in plain text without a tool block.",
        render_tool_section(tools)
    )
}

/// Flatten the history into chat lines. Tool results are fed back as user
/// context.
pub fn transcript(history: &[Turn]) -> Vec<(Speaker, String)> {
    history
        .iter()
        .map(|turn| {
            let speaker = match turn.content {
                TurnContent::User { .. } | TurnContent::ToolResult { .. } => Speaker::User,
                TurnContent::Model { .. } | TurnContent::ToolCall { .. } => Speaker::Assistant,
            };
            (speaker, turn.render())
        })
        .collect()
}

/// Turn a raw reply into a response.
///
/// Text around a tool block is dropped. A tool block that does not parse or
/// names a tool outside `tools` is a protocol error, as is an empty reply.
pub fn parse_reply(content: &str, tools: &[ToolSpec]) -> Result<ModelResponse> {
    let raw = match find_tool_call(content)? {
        Some(call) => {
            if !tools.iter().any(|t| t.name == call.name) {
                return Err(AgentError::ModelProtocol(format!(
                    "model requested unavailable tool '{}'",
                    call.name
                )));
            }
            RawModelOutput {
                text: None,
                tool_call: Some(call),
            }
        }
        None => RawModelOutput {
            text: Some(content.trim().to_string()),
            tool_call: None,
        },
    };

    raw.into_response()
}

fn find_tool_call(content: &str) -> Result<Option<ToolCall>> {
    if let Some(start) = content.find(TOOL_FENCE) {
        let after = &content[start + TOOL_FENCE.len()..];
        let end = after
            .find(FENCE_END)
            .ok_or_else(|| AgentError::ModelProtocol("unterminated tool block".into()))?;
        let call = serde_json::from_str::<ToolCall>(after[..end].trim())
            .map_err(|e| AgentError::ModelProtocol(format!("malformed tool call: {e}")))?;
        return Ok(Some(call));
    }

    Ok(find_inline_call(content))
}

/// Bare `{"tool": ...}` object somewhere in the reply. Text that merely
/// mentions braces stays text.
fn find_inline_call(content: &str) -> Option<ToolCall> {
    if !content.contains(r#""tool""#) {
        return None;
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }

    let value: Value = serde_json::from_str(&content[start..=end]).ok()?;
    if value.get("tool").is_none() {
        return None;
    }
    serde_json::from_value(value).ok()
}
