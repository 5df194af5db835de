pub mod approval;
pub mod console;
pub mod history;
pub mod orchestrator;

pub use approval::{AllowlistEntry, ApprovalManager, ApprovalSource, HumanDecision};
pub use console::{Console, ScriptedConsole, TerminalConsole, Transcript};
pub use history::{ChatMessage, History, Role, ToolCall};
pub use orchestrator::{
    DEFAULT_NO_HUMAN_AUTO_MESSAGE, DEFAULT_PLAN_REMINDER, DEFAULT_SYSTEM_PROMPT, Orchestrator,
    OrchestratorOptions, SessionEnd,
};
