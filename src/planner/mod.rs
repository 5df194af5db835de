mod schema;
mod store;
mod types;

pub use schema::{PlanSchema, TOOL_NAME, ToolDefinition};
pub use store::{DependencyPolicy, PlanProgress, PlanStore};
pub use types::{
    CommandDraft, DEFAULT_MAX_BYTES, DEFAULT_TAIL_LINES, DEFAULT_TIMEOUT_SECS, PlanObservation,
    PlanObservationPayload, PlanResponse, PlanStatus, PlanStep,
};
