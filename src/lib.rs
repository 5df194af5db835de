#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod llm;
pub mod planner;
pub mod ui;
pub mod utils;

pub use agent::{Orchestrator, OrchestratorOptions, SessionEnd};
pub use config::Config;
pub use error::{AgentError, Result};
