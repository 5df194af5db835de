use crate::error::SchemaError;
use jsonschema::{Draft, Validator};
use serde_json::Value;

/// Canonical name of the single function the model must call.
pub const TOOL_NAME: &str = "open-agent";

const TOOL_DESCRIPTION: &str = "Return the response envelope that matches the OpenAgent protocol (message, plan, and command fields).";

/// Draft-07 schema for the model's structured reply, version 1.
const PLAN_RESPONSE_SCHEMA_V1: &str = include_str!("../../schemas/plan_response.v1.schema.json");

/// Function definition advertised to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The embedded plan schema, parsed and compiled once at startup.
pub struct PlanSchema {
    document: Value,
    validator: Validator,
}

impl PlanSchema {
    pub fn load() -> Result<Self, SchemaError> {
        let document: Value = serde_json::from_str(PLAN_RESPONSE_SCHEMA_V1)?;
        let validator = jsonschema::options()
            .with_draft(Draft::Draft7)
            .build(&document)
            .map_err(|err| SchemaError::Compile(err.to_string()))?;
        Ok(Self {
            document,
            validator,
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: TOOL_DESCRIPTION.to_string(),
            parameters: self.document.clone(),
        }
    }

    /// Every violation of `instance` against the schema; empty when valid.
    pub fn violations(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_reply() -> Value {
        json!({
            "message": "ok",
            "plan": [{
                "id": "a",
                "title": "list",
                "status": "pending",
                "waitingForId": [],
                "command": {
                    "reason": "look around",
                    "shell": "bash",
                    "run": "ls",
                    "cwd": "",
                    "timeout_sec": 60,
                    "filter_regex": "",
                    "tail_lines": 200,
                    "max_bytes": 16384
                }
            }]
        })
    }

    #[test]
    fn embedded_schema_compiles() {
        let schema = PlanSchema::load().unwrap();
        assert_eq!(
            schema.document()["$schema"],
            "http://json-schema.org/draft-07/schema#"
        );
        assert_eq!(schema.document()["required"], json!(["message", "plan"]));
    }

    #[test]
    fn tool_definition_carries_schema_as_parameters() {
        let schema = PlanSchema::load().unwrap();
        let tool = schema.tool_definition();
        assert_eq!(tool.name, "open-agent");
        assert!(!tool.description.is_empty());
        assert_eq!(&tool.parameters, schema.document());
    }

    #[test]
    fn valid_reply_has_no_violations() {
        let schema = PlanSchema::load().unwrap();
        assert!(schema.violations(&valid_reply()).is_empty());
    }

    #[test]
    fn unknown_status_is_a_violation() {
        let schema = PlanSchema::load().unwrap();
        let mut reply = valid_reply();
        reply["plan"][0]["status"] = json!("running");
        let violations = schema.violations(&reply);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("running"));
    }

    #[test]
    fn zero_timeout_is_a_violation() {
        let schema = PlanSchema::load().unwrap();
        let mut reply = valid_reply();
        reply["plan"][0]["command"]["timeout_sec"] = json!(0);
        assert!(!schema.violations(&reply).is_empty());
    }

    #[test]
    fn missing_message_is_a_violation() {
        let schema = PlanSchema::load().unwrap();
        let violations = schema.violations(&json!({"plan": []}));
        assert!(violations.iter().any(|v| v.contains("message")));
    }
}
