//! Chat Completions wire format for the plan request.

use crate::agent::history::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(in crate::llm) struct ChatRequest {
    pub(in crate::llm) model: String,
    pub(in crate::llm) messages: Vec<Message>,
    pub(in crate::llm) tools: Vec<OpenAiTool>,
    pub(in crate::llm) tool_choice: ToolChoice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in crate::llm) temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(in crate::llm) struct Message {
    pub(in crate::llm) role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in crate::llm) content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in crate::llm) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in crate::llm) tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in crate::llm) tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Clone, Serialize)]
pub(in crate::llm) struct OpenAiTool {
    pub(in crate::llm) r#type: &'static str,
    pub(in crate::llm) function: OpenAiToolDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub(in crate::llm) struct OpenAiToolDefinition {
    pub(in crate::llm) name: String,
    pub(in crate::llm) description: String,
    pub(in crate::llm) parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub(in crate::llm) struct ToolChoice {
    pub(in crate::llm) r#type: &'static str,
    pub(in crate::llm) function: ToolChoiceFunction,
}

#[derive(Debug, Clone, Serialize)]
pub(in crate::llm) struct ToolChoiceFunction {
    pub(in crate::llm) name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(in crate::llm) struct OpenAiToolCall {
    pub(in crate::llm) id: String,
    #[serde(default = "function_type")]
    pub(in crate::llm) r#type: String,
    pub(in crate::llm) function: OpenAiToolCallFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(in crate::llm) struct OpenAiToolCallFunction {
    pub(in crate::llm) name: String,
    #[serde(default)]
    pub(in crate::llm) arguments: String,
}

#[derive(Debug, Deserialize)]
pub(in crate::llm) struct ChatResponse {
    #[serde(default)]
    pub(in crate::llm) choices: Vec<Choice>,
    pub(in crate::llm) model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(in crate::llm) struct Choice {
    pub(in crate::llm) message: ResponseMessage,
    pub(in crate::llm) finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(in crate::llm) struct ResponseMessage {
    pub(in crate::llm) tool_calls: Option<Vec<OpenAiToolCall>>,
}
