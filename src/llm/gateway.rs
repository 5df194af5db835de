use super::http_client::build_client;
use super::scrub::{sanitize_error_body, scrub_secret_patterns};
use super::types::{
    ChatRequest, ChatResponse, Message, OpenAiTool, OpenAiToolCall, OpenAiToolCallFunction,
    OpenAiToolDefinition, ToolChoice, ToolChoiceFunction,
};
use crate::agent::history::{ChatMessage, Role, ToolCall};
use crate::error::GatewayError;
use crate::planner::{PlanResponse, PlanSchema, TOOL_NAME};
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_MODEL: &str = "gpt-4.1";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// One structured model turn: the parsed reply plus the call it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTurn {
    pub response: PlanResponse,
    pub tool_call: ToolCall,
}

/// Backend that turns the conversation so far into the next plan.
pub trait ModelGateway: Send + Sync {
    fn request_plan<'a>(
        &'a self,
        history: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = Result<PlanTurn, GatewayError>> + Send + 'a>>;
}

/// Connection settings for [`OpenAiGateway`].
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature: Option<f64>,
}

/// Chat Completions client that forces a single call to the plan tool.
pub struct OpenAiGateway {
    /// Pre-computed `"Bearer <key>"` header value.
    auth_header: String,
    model: String,
    base_url: String,
    temperature: Option<f64>,
    client: Client,
    schema: Arc<PlanSchema>,
}

impl OpenAiGateway {
    pub fn new(settings: GatewaySettings, schema: Arc<PlanSchema>) -> Self {
        Self {
            auth_header: format!("Bearer {}", settings.api_key),
            model: settings.model,
            base_url: settings.base_url,
            temperature: settings.temperature,
            client: build_client(settings.timeout_secs),
            schema,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, history: &[ChatMessage]) -> ChatRequest {
        let tool = self.schema.tool_definition();
        ChatRequest {
            model: self.model.clone(),
            messages: history.iter().map(to_wire_message).collect(),
            tool_choice: ToolChoice {
                r#type: "function",
                function: ToolChoiceFunction {
                    name: tool.name.clone(),
                },
            },
            tools: vec![OpenAiTool {
                r#type: "function",
                function: OpenAiToolDefinition {
                    name: tool.name,
                    description: tool.description,
                    parameters: tool.parameters,
                },
            }],
            temperature: self.temperature,
        }
    }

    async fn send(&self, history: &[ChatMessage]) -> Result<PlanTurn, GatewayError> {
        let request = self.build_request(history);
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            "gateway.request"
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", &self.auth_header)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            warn!(status = status.as_u16(), "gateway.status_error");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: sanitize_error_body(&body),
            });
        }

        let body = response.text().await?;
        let completion: ChatResponse = serde_json::from_str(&body)
            .map_err(|err| GatewayError::Decode(scrub_secret_patterns(&err.to_string()).into()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(GatewayError::NoChoices)?;
        let call = choice
            .message
            .tool_calls
            .and_then(|calls| calls.into_iter().next())
            .ok_or_else(|| GatewayError::MissingToolCall {
                tool: TOOL_NAME.to_string(),
            })?;

        let response = self.parse_arguments(&call.function.arguments)?;
        info!(
            model = completion.model.as_deref().unwrap_or(&self.model),
            finish_reason = choice.finish_reason.as_deref().unwrap_or(""),
            steps = response.plan.len(),
            "gateway.response"
        );

        Ok(PlanTurn {
            response,
            tool_call: ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            },
        })
    }

    /// Validate raw tool arguments against the plan schema, then decode them.
    fn parse_arguments(&self, arguments: &str) -> Result<PlanResponse, GatewayError> {
        let value: Value =
            serde_json::from_str(arguments).map_err(GatewayError::InvalidArguments)?;
        let violations = self.schema.violations(&value);
        if !violations.is_empty() {
            return Err(GatewayError::SchemaViolation(violations));
        }
        serde_json::from_value(value).map_err(GatewayError::InvalidArguments)
    }
}

impl ModelGateway for OpenAiGateway {
    fn request_plan<'a>(
        &'a self,
        history: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = Result<PlanTurn, GatewayError>> + Send + 'a>> {
        Box::pin(self.send(history))
    }
}

fn to_wire_message(message: &ChatMessage) -> Message {
    let is_tool = message.role == Role::Tool;
    let tool_calls = (!message.tool_calls.is_empty()).then(|| {
        message
            .tool_calls
            .iter()
            .map(|call| OpenAiToolCall {
                id: call.id.clone(),
                r#type: "function".to_string(),
                function: OpenAiToolCallFunction {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect()
    });
    Message {
        role: message.role,
        content: (!message.content.is_empty()).then(|| message.content.clone()),
        name: is_tool.then(|| TOOL_NAME.to_string()),
        tool_call_id: if is_tool {
            message.tool_call_id.clone()
        } else {
            None
        },
        tool_calls,
    }
}
