use super::approval::{AllowlistEntry, ApprovalManager, HumanDecision};
use super::console::Console;
use super::history::{ChatMessage, History, ToolCall};
use crate::error::AgentError;
use crate::exec::CommandRunner;
use crate::llm::ModelGateway;
use crate::planner::{
    DependencyPolicy, PlanObservation, PlanObservationPayload, PlanStatus, PlanStep, PlanStore,
};
use crate::ui::style;
use crate::utils::text::{single_line, truncate_with_ellipsis};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ── Constants ────────────────────────────────────────────────────────────────

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are OpenAgent running inside a console application. \
Answer by calling the open-agent tool. Break work into a plan of shell command steps linked by \
waitingForId; steps run one at a time after approval and their output is returned to you.";

pub const DEFAULT_PLAN_REMINDER: &str = "There are open tasks in the plan. Do you need help or \
more info? If not, please continue working.";

pub const DEFAULT_NO_HUMAN_AUTO_MESSAGE: &str = "continue or say 'done'";

const BANNER: &str = "OpenAgent ready. Type /exit to quit, /plan to inspect the current plan.";
const USER_PROMPT: &str = "\n▷ ";
const HELP: &str = "Commands:\n  /plan  show the current plan\n  /auto  toggle auto-approve\n  \
/exit  end the session\n  /help  show this list";

/// Longest title shown in plan listings.
const TITLE_DISPLAY_CHARS: usize = 80;

// ── Public types ─────────────────────────────────────────────────────────────

/// Session behavior, resolved from config and CLI flags.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub system_prompt: String,
    /// Appended to the system prompt after a blank line when non-empty.
    pub prompt_augmentation: String,
    pub auto_approve: bool,
    pub no_human: bool,
    pub plan_reminder_message: String,
    pub no_human_auto_message: String,
    pub dependency_policy: DependencyPolicy,
    pub allowlist: Vec<AllowlistEntry>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt_augmentation: String::new(),
            auto_approve: false,
            no_human: false,
            plan_reminder_message: DEFAULT_PLAN_REMINDER.to_string(),
            no_human_auto_message: DEFAULT_NO_HUMAN_AUTO_MESSAGE.to_string(),
            dependency_policy: DependencyPolicy::default(),
            allowlist: Vec::new(),
        }
    }
}

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionEnd {
    /// The human typed `/exit`.
    Exit,
    /// Input closed.
    EndOfInput,
    /// The cancellation token fired.
    Canceled,
}

// ── Internal types ───────────────────────────────────────────────────────────

enum Tick {
    Continue,
    End(SessionEnd),
}

enum Authorization {
    Approved,
    /// No approval and nobody to ask.
    Deferred,
    Declined,
    End(SessionEnd),
}

/// Fallback user message when an observation cannot be sent as a tool reply.
#[derive(Serialize)]
struct ObservationSummary<'a> {
    step: &'a str,
    stdout: &'a str,
    stderr: &'a str,
    truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding_error: Option<String>,
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

/// Drives one conversation: asks the model for plans, executes ready steps
/// one at a time, and feeds every observation back.
///
/// The orchestrator owns the plan store and the history; each loop iteration
/// either runs a step, requests a model turn, or waits for the human.
pub struct Orchestrator {
    options: OrchestratorOptions,
    gateway: Arc<dyn ModelGateway>,
    console: Box<dyn Console>,
    runner: CommandRunner,
    plan: PlanStore,
    history: History,
    approvals: ApprovalManager,
    last_tool_call: Option<ToolCall>,
    /// Last no-human message sent; cleared once a tool reply or human
    /// message goes out.
    last_nudge: Option<String>,
    no_human: bool,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        options: OrchestratorOptions,
        gateway: Arc<dyn ModelGateway>,
        console: Box<dyn Console>,
        cancel: CancellationToken,
    ) -> Self {
        let approvals = ApprovalManager::new(options.allowlist.clone(), options.auto_approve);
        Self {
            plan: PlanStore::with_policy(options.dependency_policy),
            no_human: options.no_human,
            options,
            gateway,
            console,
            runner: CommandRunner::new(),
            history: History::new(),
            approvals,
            last_tool_call: None,
            last_nudge: None,
            cancel,
        }
    }

    pub fn plan(&self) -> &PlanStore {
        &self.plan
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn auto_approve(&self) -> bool {
        self.approvals.auto_approve()
    }

    pub fn no_human(&self) -> bool {
        self.no_human
    }

    /// Run until `/exit`, end of input, cancellation, or an error.
    ///
    /// Backend and store errors end the session; command failures do not,
    /// they are reported to the model as observations.
    pub async fn run(&mut self) -> Result<SessionEnd, AgentError> {
        let system_prompt = self.system_prompt();
        self.history.push(ChatMessage::system(system_prompt));
        self.console.writeln(&style::header(BANNER))?;
        info!(
            auto_approve = self.approvals.auto_approve(),
            no_human = self.no_human,
            "session.start"
        );

        loop {
            if self.cancel.is_cancelled() {
                return self.finish(SessionEnd::Canceled);
            }
            if let Tick::End(end) = self.tick().await? {
                return self.finish(end);
            }
        }
    }

    fn finish(&mut self, end: SessionEnd) -> Result<SessionEnd, AgentError> {
        if end == SessionEnd::Canceled {
            self.console.writeln("\nCanceled.")?;
        }
        info!(end = %end, messages = self.history.len(), "session.end");
        Ok(end)
    }

    fn system_prompt(&self) -> String {
        let augmentation = self.options.prompt_augmentation.trim();
        if augmentation.is_empty() {
            self.options.system_prompt.clone()
        } else {
            format!("{}\n\n{augmentation}", self.options.system_prompt)
        }
    }

    async fn tick(&mut self) -> Result<Tick, AgentError> {
        if let Some(step) = self.plan.ready() {
            match self.authorize(&step).await? {
                Authorization::Approved => return self.execute(step).await,
                Authorization::Deferred => {
                    self.console.writeln(&format!(
                        "\nNo human available to approve step {}. Requesting updated plan.",
                        step.id
                    ))?;
                    let reminder = self.options.plan_reminder_message.clone();
                    return self.nudge(reminder).await;
                }
                Authorization::Declined => {
                    self.console
                        .writeln(&style::dim(format!("Skipped plan step {}.", step.id)))?;
                }
                Authorization::End(end) => return Ok(Tick::End(end)),
            }
        }

        if self.no_human {
            let message = if self.plan.has_pending() {
                self.options.plan_reminder_message.clone()
            } else {
                self.options.no_human_auto_message.clone()
            };
            return self.nudge(message).await;
        }

        self.human_turn().await
    }

    // ── Approval ─────────────────────────────────────────────────────────

    async fn authorize(&mut self, step: &PlanStep) -> Result<Authorization, AgentError> {
        if let Some(source) = self.approvals.check(&step.command) {
            info!(step_id = %step.id, source = %source, "approval.decision");
            return Ok(Authorization::Approved);
        }
        if self.no_human {
            debug!(step_id = %step.id, "approval.deferred");
            return Ok(Authorization::Deferred);
        }

        let mut prompt = format!(
            "\nPlan step {} is ready:\n  {}\n  Command: {}\n",
            style::accent(&step.id),
            step.title,
            style::yellow(single_line(&step.command.run)),
        );
        if !step.command.cwd.trim().is_empty() {
            prompt.push_str(&format!("  Directory: {}\n", step.command.cwd.trim()));
        }
        prompt.push_str("Execute? [y]es / [a]lways this session / [N]o: ");

        let Some(answer) = self.read_line(&prompt).await? else {
            return Ok(Authorization::End(self.input_closed()));
        };
        let decision = HumanDecision::parse(&answer);
        self.approvals.record(decision, &step.command);
        info!(step_id = %step.id, decision = ?decision, "approval.decision");
        Ok(if decision.approved() {
            Authorization::Approved
        } else {
            Authorization::Declined
        })
    }

    /// Send a no-human message to the model. The same message is never sent
    /// twice in a row; a repeat hands the turn to the human instead, which
    /// ends the session once input is closed.
    async fn nudge(&mut self, message: String) -> Result<Tick, AgentError> {
        if self.last_nudge.as_deref() == Some(message.as_str()) {
            debug!("session.nudge_suppressed");
            self.console.writeln(&style::dim(
                "No progress since the last automatic message. Waiting for input.",
            ))?;
            return self.human_turn().await;
        }
        self.last_nudge = Some(message.clone());
        self.query_model(Some(message)).await
    }

    // ── Execution ────────────────────────────────────────────────────────

    async fn execute(&mut self, step: PlanStep) -> Result<Tick, AgentError> {
        self.console.writeln(&format!(
            "\nExecuting plan step {}: {}\nCommand: {}",
            style::accent(&step.id),
            step.title,
            style::yellow(single_line(&step.command.run)),
        ))?;

        let run = self.runner.execute(&step, &self.cancel).await;
        match &run.error {
            Some(err) => self
                .console
                .writeln(&style::failure(format!("Command error: {err}")))?,
            None => self
                .console
                .writeln(&style::success("Command completed successfully."))?,
        }

        let status = run.status();
        let canceled = run.observation.operation_canceled;
        let mut payload = run.observation;
        payload.plan = self.plan_at(&step.id, status);
        let observation = PlanObservation::new(payload);
        self.plan
            .update_status(&step.id, status, Some(observation.clone()))?;
        self.record_observation(&step.id, &observation);

        if canceled {
            return Ok(Tick::End(SessionEnd::Canceled));
        }
        self.query_model(None).await
    }

    /// Copy of the plan as it stands after `step_id` took `status`. Nested
    /// observations are dropped so copies never contain copies.
    fn plan_at(&self, step_id: &str, status: PlanStatus) -> Vec<PlanStep> {
        self.plan
            .snapshot()
            .into_iter()
            .map(|mut step| {
                step.observation = None;
                if step.id == step_id {
                    step.status = status;
                }
                step
            })
            .collect()
    }

    /// Feed an observation back as a tool reply to the last call, or as a
    /// user message when no call is on record.
    fn record_observation(&mut self, step_id: &str, observation: &PlanObservation) {
        let call_id = self
            .last_tool_call
            .as_ref()
            .map(|call| call.id.clone())
            .filter(|id| !id.is_empty());

        let message = match call_id {
            Some(call_id) => match observation.to_tool_message() {
                Ok(body) => ChatMessage::tool(body, call_id),
                Err(err) => {
                    warn!(step_id, error = %err, "observation.encode_failed");
                    ChatMessage::user(summarize_observation(step_id, observation, Some(&err)))
                }
            },
            None => ChatMessage::user(summarize_observation(step_id, observation, None)),
        };
        self.history.push(message);
        self.last_nudge = None;
    }

    // ── Model turns ──────────────────────────────────────────────────────

    async fn query_model(&mut self, user_message: Option<String>) -> Result<Tick, AgentError> {
        if let Some(message) = user_message {
            self.history.push(ChatMessage::user(message));
        }

        let cancel = self.cancel.clone();
        let turn = tokio::select! {
            turn = self.gateway.request_plan(self.history.messages()) => turn?,
            () = cancel.cancelled() => return Ok(Tick::End(SessionEnd::Canceled)),
        };

        let message = turn.response.message;
        self.last_tool_call = Some(turn.tool_call.clone());
        self.history
            .push(ChatMessage::assistant(message.clone(), turn.tool_call));
        self.plan.replace(turn.response.plan);

        self.console
            .writeln(&format!("\n{}\n{message}", style::header("Assistant:")))?;
        self.print_plan("Current plan:", "Plan is empty.")?;

        if self.no_human && is_done_message(&message) && !self.plan.has_pending() {
            self.no_human = false;
            info!("session.no_human_finished");
            self.console
                .writeln(&style::dim("Assistant reported done. Returning control to you."))?;
        }
        Ok(Tick::Continue)
    }

    // ── Human input ──────────────────────────────────────────────────────

    async fn human_turn(&mut self) -> Result<Tick, AgentError> {
        let Some(line) = self.read_line(USER_PROMPT).await? else {
            return Ok(Tick::End(self.input_closed()));
        };
        let line = line.trim();
        if line.is_empty() {
            return Ok(Tick::Continue);
        }

        if line.eq_ignore_ascii_case("/exit") {
            self.console.writeln("Exiting on request.")?;
            return Ok(Tick::End(SessionEnd::Exit));
        }
        if line.eq_ignore_ascii_case("/plan") {
            self.print_plan("Plan snapshot:", "No plan available.")?;
            self.print_progress()?;
            return Ok(Tick::Continue);
        }
        if line.eq_ignore_ascii_case("/auto") {
            let enabled = self.approvals.toggle_auto_approve();
            let state = if enabled { "enabled" } else { "disabled" };
            self.console.writeln(&format!("Auto-approve {state}."))?;
            return Ok(Tick::Continue);
        }
        if line.eq_ignore_ascii_case("/help") {
            self.console.writeln(HELP)?;
            return Ok(Tick::Continue);
        }

        self.history.push(ChatMessage::user(line));
        self.last_nudge = None;
        self.query_model(None).await
    }

    /// Read one line, racing the cancellation token. `Ok(None)` is either
    /// end of input or cancellation; [`Self::input_closed`] tells them apart.
    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>, AgentError> {
        let cancel = self.cancel.clone();
        tokio::select! {
            line = self.console.read_line(prompt) => Ok(line?),
            () = cancel.cancelled() => Ok(None),
        }
    }

    fn input_closed(&mut self) -> SessionEnd {
        if self.cancel.is_cancelled() {
            return SessionEnd::Canceled;
        }
        // Best effort; the session is over either way.
        let _ = self.console.writeln("\nGoodbye.");
        SessionEnd::EndOfInput
    }

    // ── Rendering ────────────────────────────────────────────────────────

    fn print_plan(&mut self, heading: &str, empty: &str) -> Result<(), AgentError> {
        let snapshot = self.plan.snapshot();
        if snapshot.is_empty() {
            self.console.writeln(&style::dim(empty))?;
            return Ok(());
        }
        self.console.writeln(heading)?;
        for step in &snapshot {
            self.console.writeln(&format!(
                "  [{}] {} {}",
                style::accent(&step.id),
                style::status(step.status),
                truncate_with_ellipsis(&step.title, TITLE_DISPLAY_CHARS)
            ))?;
        }
        Ok(())
    }

    fn print_progress(&mut self) -> Result<(), AgentError> {
        let progress = self.plan.progress();
        if progress.total == 0 {
            return Ok(());
        }
        self.console.writeln(&style::dim(format!(
            "{}/{} completed, {} failed, {} pending, {} abandoned",
            progress.completed, progress.total, progress.failed, progress.pending, progress.abandoned
        )))?;
        Ok(())
    }
}

/// `done`, ignoring case and trailing `.`/`!`.
fn is_done_message(message: &str) -> bool {
    message
        .trim()
        .trim_end_matches(['.', '!'])
        .eq_ignore_ascii_case("done")
}

fn summarize_observation(
    step_id: &str,
    observation: &PlanObservation,
    encoding_error: Option<&serde_json::Error>,
) -> String {
    let empty = PlanObservationPayload::default();
    let payload = observation.observation_for_llm.as_ref().unwrap_or(&empty);
    let summary = ObservationSummary {
        step: step_id,
        stdout: &payload.stdout,
        stderr: &payload.stderr,
        truncated: payload.truncated,
        exit_code: payload.exit_code,
        encoding_error: encoding_error.map(ToString::to_string),
    };
    serde_json::to_string_pretty(&summary).unwrap_or_else(|_| {
        format!("step {step_id} observation: exit={:?}", payload.exit_code)
    })
}
