pub mod schema;

pub use schema::{
    API_KEY_ENV, AgentConfig, ApprovalConfig, BASE_URL_ENV, Config, MODEL_ENV, PlannerConfig,
};
