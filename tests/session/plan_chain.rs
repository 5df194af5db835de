use tokio_util::sync::CancellationToken;

use openagent::exec::CommandRunner;
use openagent::planner::{
    CommandDraft, DependencyPolicy, PlanObservation, PlanResponse, PlanStatus, PlanStep, PlanStore,
};

use super::plan_harness;

fn decode(arguments: &str) -> PlanResponse {
    serde_json::from_str(arguments).unwrap()
}

/// Run ready steps until none is left, returning the ids in execution order.
async fn drain(store: &PlanStore, runner: &CommandRunner) -> Vec<String> {
    let cancel = CancellationToken::new();
    let mut order = Vec::new();
    while let Some(step) = store.ready() {
        let run = runner.execute(&step, &cancel).await;
        store
            .update_status(&step.id, run.status(), Some(PlanObservation::new(run.observation)))
            .unwrap();
        order.push(step.id);
    }
    order
}

#[tokio::test]
async fn diamond_plan_executes_in_dependency_order() {
    let response = decode(&plan_harness::arguments(
        "diamond",
        vec![
            plan_harness::step("join", "echo join", "pending", &["left", "right"]),
            plan_harness::step("left", "echo left", "pending", &["root"]),
            plan_harness::step("right", "echo right", "pending", &["root"]),
            plan_harness::step("root", "echo root", "pending", &[]),
        ],
    ));
    let store = PlanStore::new();
    store.replace(response.plan);

    let order = drain(&store, &CommandRunner::new()).await;
    assert_eq!(order, vec!["root", "left", "right", "join"]);
    assert!(store.completed());

    let join = store
        .snapshot()
        .into_iter()
        .find(|step| step.id == "join")
        .unwrap();
    let payload = join.observation.unwrap().observation_for_llm.unwrap();
    assert_eq!(payload.stdout.trim(), "join");
    assert_eq!(payload.exit_code, Some(0));
}

#[tokio::test]
async fn failed_dependency_blocks_its_dependents() {
    let store = PlanStore::new();
    store.replace(vec![
        PlanStep::new("build", "build", CommandDraft::shell("sh", "exit 3")),
        PlanStep::new("test", "test", CommandDraft::shell("sh", "echo unreachable")).waiting_for(["build"]),
    ]);

    let order = drain(&store, &CommandRunner::new()).await;
    assert_eq!(order, vec!["build"]);
    assert!(store.has_pending());
    assert!(!store.completed());

    let progress = store.progress();
    assert_eq!((progress.failed, progress.pending), (1, 1));

    // The model abandons the failure and reroutes the dependent.
    store.replace(vec![
        PlanStep::new("build", "build", CommandDraft::shell("sh", "exit 3")),
        PlanStep::new("build-2", "retry", CommandDraft::shell("sh", "true")),
        PlanStep::new("test", "test", CommandDraft::shell("sh", "echo ok")).waiting_for(["build-2"]),
    ]);
    store
        .update_status("build", PlanStatus::Abandoned, None)
        .unwrap();

    let order = drain(&store, &CommandRunner::new()).await;
    assert_eq!(order, vec!["build-2", "test"]);
    assert!(!store.has_pending());
}

#[tokio::test]
async fn unknown_dependency_depends_on_policy() {
    let steps = || {
        vec![PlanStep::new("lonely", "lonely", CommandDraft::shell("sh", "true")).waiting_for(["ghost"])]
    };

    let permissive = PlanStore::new();
    permissive.replace(steps());
    assert_eq!(drain(&permissive, &CommandRunner::new()).await, vec!["lonely"]);

    let strict = PlanStore::with_policy(DependencyPolicy::Strict);
    strict.replace(steps());
    assert!(drain(&strict, &CommandRunner::new()).await.is_empty());
    assert!(strict.has_pending());
}
