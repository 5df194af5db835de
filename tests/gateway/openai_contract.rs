use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use openagent::agent::ChatMessage;
use openagent::error::GatewayError;
use openagent::llm::{GatewaySettings, ModelGateway, OpenAiGateway};
use openagent::planner::{PlanSchema, PlanStatus};

use super::plan_harness;

fn gateway(server: &MockServer) -> OpenAiGateway {
    let settings = GatewaySettings {
        api_key: "test-key".into(),
        model: "gpt-4.1".into(),
        base_url: format!("{}/v1/chat/completions", server.uri()),
        timeout_secs: 5,
        temperature: None,
    };
    OpenAiGateway::new(settings, Arc::new(PlanSchema::load().unwrap()))
}

fn history() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are a test agent."),
        ChatMessage::user("list the files"),
    ]
}

async fn mount(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn request_forces_the_plan_tool_and_decodes_the_reply() {
    let server = MockServer::start().await;
    let arguments = plan_harness::arguments(
        "Listing files.",
        vec![
            plan_harness::step("a", "ls", "pending", &[]),
            plan_harness::step("b", "wc -l *", "pending", &["a"]),
        ],
    );

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(plan_harness::completion("call_1", &arguments)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let turn = gateway(&server).request_plan(&history()).await.unwrap();
    assert_eq!(turn.response.message, "Listing files.");
    assert_eq!(turn.response.plan.len(), 2);
    assert_eq!(turn.response.plan[1].waiting_for_id, vec!["a".to_string()]);
    assert_eq!(turn.response.plan[0].status, PlanStatus::Pending);
    assert_eq!(turn.tool_call.id, "call_1");
    assert_eq!(turn.tool_call.name, "open-agent");
    assert_eq!(turn.tool_call.arguments, arguments);

    let received = server
        .received_requests()
        .await
        .expect("mock server should record received requests");
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["model"], "gpt-4.1");
    assert_eq!(
        body["tool_choice"],
        json!({"type": "function", "function": {"name": "open-agent"}})
    );
    assert_eq!(body["tools"][0]["function"]["name"], "open-agent");
    assert_eq!(body["tools"][0]["function"]["parameters"]["type"], "object");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "list the files");
    assert!(body.get("temperature").is_none());
    server.verify().await;
}

#[tokio::test]
async fn error_status_is_reported_with_a_scrubbed_body() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(401).set_body_string("invalid key sk-abcdefghijklmnop"),
    )
    .await;

    let err = gateway(&server).request_plan(&history()).await.unwrap_err();
    match err {
        GatewayError::Status { status, body } => {
            assert_eq!(status, 401);
            assert!(!body.contains("sk-abcdefghijklmnop"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn empty_choices_are_rejected() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"model": "gpt-4.1", "choices": []})),
    )
    .await;

    let err = gateway(&server).request_plan(&history()).await.unwrap_err();
    assert!(matches!(err, GatewayError::NoChoices));
}

#[tokio::test]
async fn plain_text_answer_is_a_missing_tool_call() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "finish_reason": "stop",
                "message": {"role": "assistant", "content": "Sure, here you go."}
            }]
        })),
    )
    .await;

    let err = gateway(&server).request_plan(&history()).await.unwrap_err();
    assert!(matches!(err, GatewayError::MissingToolCall { .. }));
}

#[tokio::test]
async fn malformed_arguments_are_rejected() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(plan_harness::completion("call_1", "{not json")),
    )
    .await;

    let err = gateway(&server).request_plan(&history()).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidArguments(_)));
}

#[tokio::test]
async fn schema_violations_are_listed() {
    let server = MockServer::start().await;
    let arguments = json!({
        "message": "bad plan",
        "plan": [{"id": "a", "title": "missing command", "status": "running", "waitingForId": []}]
    })
    .to_string();
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(plan_harness::completion("call_1", &arguments)),
    )
    .await;

    let err = gateway(&server).request_plan(&history()).await.unwrap_err();
    match err {
        GatewayError::SchemaViolation(violations) => assert!(!violations.is_empty()),
        other => panic!("unexpected error: {other}"),
    }
}
