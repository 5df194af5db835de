pub mod gateway;
pub mod http_client;
pub mod scrub;
mod types;

pub use gateway::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, GatewaySettings, ModelGateway, OpenAiGateway, PlanTurn,
};
pub use http_client::{DEFAULT_REQUEST_TIMEOUT_SECS, build_client};
pub use scrub::{sanitize_error_body, scrub_secret_patterns};
