use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TAIL_LINES: usize = 200;
pub const DEFAULT_MAX_BYTES: usize = 16_384;

/// Execution status of a plan step.
///
/// `Completed` and `Failed` are only ever set by the orchestrator after a
/// command ran; `Abandoned` only arrives inside a replacement plan.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlanStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Abandoned,
}

/// Shell invocation embedded in every plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDraft {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub shell: String,
    #[serde(default)]
    pub run: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_sec: u64,
    #[serde(default)]
    pub filter_regex: String,
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_tail_lines() -> usize {
    DEFAULT_TAIL_LINES
}

fn default_max_bytes() -> usize {
    DEFAULT_MAX_BYTES
}

impl Default for CommandDraft {
    fn default() -> Self {
        Self {
            reason: String::new(),
            shell: String::new(),
            run: String::new(),
            cwd: String::new(),
            timeout_sec: DEFAULT_TIMEOUT_SECS,
            filter_regex: String::new(),
            tail_lines: DEFAULT_TAIL_LINES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl CommandDraft {
    /// Build a draft for `shell -c run` with every other field at its default.
    pub fn shell(shell: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            run: run.into(),
            ..Self::default()
        }
    }

    /// Identity used for "approve for this session" decisions.
    pub fn signature(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}",
            self.shell.trim(),
            self.run.trim(),
            self.cwd.trim()
        )
    }
}

/// Result of running a step's command, shaped for the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanObservationPayload {
    /// Plan at the time of the observation, kept for replay and debugging.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<PlanStep>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub canceled_by_human: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub operation_canceled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

/// Envelope attached to a step and forwarded to the model as a tool reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_for_llm: Option<PlanObservationPayload>,
}

impl PlanObservation {
    pub fn new(payload: PlanObservationPayload) -> Self {
        Self {
            observation_for_llm: Some(payload),
        }
    }

    /// Pretty JSON body for a tool-role message.
    pub fn to_tool_message(&self) -> serde_json::Result<String> {
        let encoded = serde_json::to_string_pretty(self)?;
        let trimmed = encoded.trim();
        if trimmed.is_empty() {
            return Ok("{}".to_string());
        }
        Ok(trimmed.to_string())
    }
}

/// One node of the plan DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(rename = "waitingForId", default)]
    pub waiting_for_id: Vec<String>,
    #[serde(default)]
    pub command: CommandDraft,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<PlanObservation>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, title: impl Into<String>, command: CommandDraft) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: PlanStatus::Pending,
            waiting_for_id: Vec::new(),
            command,
            observation: None,
        }
    }

    pub fn waiting_for<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.waiting_for_id = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == PlanStatus::Pending
    }
}

/// Structured reply the model returns through the `open-agent` tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResponse {
    pub message: String,
    #[serde(default)]
    pub plan: Vec<PlanStep>,
}
