#![allow(dead_code)]

use serde_json::{Value, json};

/// A schema-complete plan step running `run` under `sh`.
pub fn step(id: &str, run: &str, status: &str, waiting_for: &[&str]) -> Value {
    json!({
        "id": id,
        "title": format!("step {id}"),
        "status": status,
        "waitingForId": waiting_for,
        "command": {
            "reason": "integration test",
            "shell": "sh",
            "run": run,
            "cwd": "",
            "timeout_sec": 10,
            "filter_regex": "",
            "tail_lines": 200,
            "max_bytes": 16384
        }
    })
}

/// Tool-call arguments as the model would encode them.
pub fn arguments(message: &str, plan: Vec<Value>) -> String {
    json!({ "message": message, "plan": plan }).to_string()
}

/// Chat Completions body carrying one `open-agent` tool call.
pub fn completion(call_id: &str, arguments: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "gpt-4.1",
        "choices": [{
            "index": 0,
            "finish_reason": "tool_calls",
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": call_id,
                    "type": "function",
                    "function": { "name": "open-agent", "arguments": arguments }
                }]
            }
        }]
    })
}
