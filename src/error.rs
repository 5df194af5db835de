use std::time::Duration;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `OpenAgent`.
///
/// Each subsystem defines its own error variant. Callers of the orchestrator
/// match on these to decide whether a session can continue; the binary wraps
/// them in `anyhow` for reporting.
#[derive(Debug, Error)]
pub enum AgentError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Plan schema ─────────────────────────────────────────────────────
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),

    // ── Model gateway ───────────────────────────────────────────────────
    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),

    // ── Plan store ──────────────────────────────────────────────────────
    #[error("plan: {0}")]
    Plan(#[from] PlanError),

    // ── Human I/O ───────────────────────────────────────────────────────
    #[error("console: {0}")]
    Console(#[from] std::io::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
}

// ─── Schema errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("decode plan schema: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("compile plan schema: {0}")]
    Compile(String),
}

// ─── Gateway errors ──────────────────────────────────────────────────────────

/// Backend contract failures. Each condition is reported distinctly and never
/// recovered inside the engine.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode response: {0}")]
    Decode(String),

    #[error("response contained no choices")]
    NoChoices,

    #[error("assistant did not call the {tool} tool")]
    MissingToolCall { tool: String },

    #[error("decode tool arguments: {0}")]
    InvalidArguments(#[source] serde_json::Error),

    #[error("tool arguments violate the plan schema:\n- {}", .0.join("\n- "))]
    SchemaViolation(Vec<String>),
}

// ─── Plan store errors ───────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("unknown step id: {0}")]
    UnknownStep(String),
}

// ─── Command errors ──────────────────────────────────────────────────────────

/// Why a step's command did not succeed.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command: invalid shell or run for step {step_id}")]
    InvalidCommand { step_id: String },

    #[error("command: start: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("command: timeout after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("command: exit status {0}")]
    NonZeroExit(i32),

    #[error("command: canceled")]
    Canceled,

    #[error("command: wait: {0}")]
    Io(#[source] std::io::Error),
}

impl CommandError {
    /// Whether the process ran to completion and reported an exit status.
    pub fn has_exit_status(&self) -> bool {
        matches!(self, Self::NonZeroExit(_))
    }
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, AgentError>;
