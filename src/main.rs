#![warn(clippy::all, clippy::pedantic)]

use anyhow::{Context, Result};
use clap::Parser;
use openagent::agent::{Orchestrator, SessionEnd, TerminalConsole};
use openagent::cli::Cli;
use openagent::config::Config;
use openagent::error::ConfigError;
use openagent::llm::OpenAiGateway;
use openagent::planner::PlanSchema;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; the console owns stdout.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env_overrides();
    cli.apply(&mut config);
    config.validate()?;

    let settings = match config.gateway_settings() {
        Ok(settings) => settings,
        Err(ConfigError::MissingApiKey) => {
            eprintln!("OPENAI_API_KEY is not set. Export it and try again.");
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    };

    let schema = Arc::new(PlanSchema::load().context("loading plan schema")?);
    let gateway = Arc::new(OpenAiGateway::new(settings, schema));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("session.interrupt");
            on_signal.cancel();
        }
    });

    let mut orchestrator = Orchestrator::new(
        config.orchestrator_options(),
        gateway,
        Box::new(TerminalConsole::new()),
        cancel,
    );

    let session_id = uuid::Uuid::new_v4();
    let end = orchestrator
        .run()
        .instrument(info_span!("session", id = %session_id, model = %config.model))
        .await?;

    if end == SessionEnd::Canceled {
        std::process::exit(130);
    }
    Ok(())
}
