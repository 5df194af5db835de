use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use openagent::agent::{Orchestrator, OrchestratorOptions, ScriptedConsole, SessionEnd};
use openagent::llm::{GatewaySettings, OpenAiGateway};
use openagent::planner::{PlanSchema, PlanStatus};

use super::plan_harness;

async fn mount_turn(server: &MockServer, call_id: &str, arguments: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(plan_harness::completion(call_id, arguments)),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
}

fn gateway(server: &MockServer) -> Arc<OpenAiGateway> {
    Arc::new(OpenAiGateway::new(
        GatewaySettings {
            api_key: "test-key".into(),
            model: "gpt-4.1".into(),
            base_url: format!("{}/v1/chat/completions", server.uri()),
            timeout_secs: 5,
            temperature: Some(0.0),
        },
        Arc::new(PlanSchema::load().unwrap()),
    ))
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .expect("mock server should record received requests")
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn approved_step_output_reaches_the_model_as_a_tool_reply() {
    let server = MockServer::start().await;
    mount_turn(
        &server,
        "call_1",
        &plan_harness::arguments(
            "I will greet you.",
            vec![plan_harness::step("greet", "echo hello-from-step", "pending", &[])],
        ),
    )
    .await;
    mount_turn(
        &server,
        "call_2",
        &plan_harness::arguments(
            "Greeting printed.",
            vec![plan_harness::step("greet", "echo hello-from-step", "completed", &[])],
        ),
    )
    .await;

    let console = ScriptedConsole::new(["say hello", "y", "/exit"]);
    let transcript = console.transcript();
    let mut orchestrator = Orchestrator::new(
        OrchestratorOptions::default(),
        gateway(&server),
        Box::new(console),
        CancellationToken::new(),
    );

    let end = orchestrator.run().await.unwrap();
    assert_eq!(end, SessionEnd::Exit);
    assert!(orchestrator.plan().completed());

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["temperature"], 0.0);

    let messages = bodies[1]["messages"].as_array().unwrap();
    let assistant = &messages[messages.len() - 2];
    assert_eq!(assistant["role"], "assistant");
    assert_eq!(assistant["tool_calls"][0]["id"], "call_1");

    let tool = &messages[messages.len() - 1];
    assert_eq!(tool["role"], "tool");
    assert_eq!(tool["tool_call_id"], "call_1");
    assert_eq!(tool["name"], "open-agent");
    assert!(tool["content"].as_str().unwrap().contains("hello-from-step"));

    let output = transcript.contents();
    assert!(output.contains("I will greet you."));
    assert!(output.contains("echo hello-from-step"));
    assert!(output.contains("Execute? [y]es"));
    assert!(output.contains("Greeting printed."));
}

#[tokio::test]
async fn no_human_session_runs_dependencies_in_order_and_stops_on_done() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("order.log");
    let log_path = log.display().to_string();

    mount_turn(
        &server,
        "call_1",
        &plan_harness::arguments(
            "Two steps.",
            vec![
                plan_harness::step("second", &format!("echo second >> {log_path}"), "pending", &["first"]),
                plan_harness::step("first", &format!("echo first >> {log_path}"), "pending", &[]),
            ],
        ),
    )
    .await;
    mount_turn(
        &server,
        "call_2",
        &plan_harness::arguments(
            "First done.",
            vec![
                plan_harness::step("second", &format!("echo second >> {log_path}"), "pending", &["first"]),
                plan_harness::step("first", &format!("echo first >> {log_path}"), "completed", &[]),
            ],
        ),
    )
    .await;
    mount_turn(
        &server,
        "call_3",
        &plan_harness::arguments(
            "done",
            vec![
                plan_harness::step("second", &format!("echo second >> {log_path}"), "completed", &["first"]),
                plan_harness::step("first", &format!("echo first >> {log_path}"), "completed", &[]),
            ],
        ),
    )
    .await;

    let options = OrchestratorOptions {
        auto_approve: true,
        no_human: true,
        ..OrchestratorOptions::default()
    };
    let console = ScriptedConsole::new(["/exit"]);
    let mut orchestrator = Orchestrator::new(
        options,
        gateway(&server),
        Box::new(console),
        CancellationToken::new(),
    );

    // "done" hands control back to the console.
    let end = orchestrator.run().await.unwrap();
    assert_eq!(end, SessionEnd::Exit);
    assert!(!orchestrator.no_human());

    let recorded = std::fs::read_to_string(&log).unwrap();
    assert_eq!(recorded.lines().collect::<Vec<_>>(), vec!["first", "second"]);

    let snapshot = orchestrator.plan().snapshot();
    assert!(snapshot.iter().all(|step| step.status == PlanStatus::Completed));
    assert_eq!(request_bodies(&server).await.len(), 3);
}

#[tokio::test]
async fn gateway_failure_surfaces_as_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let mut orchestrator = Orchestrator::new(
        OrchestratorOptions::default(),
        gateway(&server),
        Box::new(ScriptedConsole::new(["hello"])),
        CancellationToken::new(),
    );

    let err = orchestrator.run().await.unwrap_err();
    assert!(err.to_string().contains("500"));
}
