use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

/// `OpenAgent` - plans shell commands with an LLM and runs them locally.
#[derive(Parser, Debug, Default)]
#[command(name = "openagent")]
#[command(version)]
#[command(about = "An LLM-driven console agent that executes a plan of shell commands.", long_about = None)]
pub struct Cli {
    /// Model to request plans from (overrides config and OPENAGENT_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Run every ready step without asking for approval
    #[arg(long)]
    pub auto_approve: bool,

    /// Drive the session without a human: nudge the model instead of prompting
    #[arg(long)]
    pub no_human: bool,

    /// Extra text appended to the system prompt
    #[arg(long, value_name = "TEXT")]
    pub augment: Option<String>,

    /// Message sent when the model leaves pending steps it cannot run
    #[arg(long, value_name = "TEXT")]
    pub plan_reminder: Option<String>,

    /// Message sent in no-human mode when the plan has nothing pending
    #[arg(long, value_name = "TEXT")]
    pub auto_message: Option<String>,

    /// Block steps whose dependencies name unknown ids
    #[arg(long)]
    pub strict_dependencies: bool,

    /// Config file (default: ~/.openagent/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug-level logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Flags win over the config file and the environment.
    pub fn apply(&self, config: &mut Config) {
        if let Some(model) = self.model.as_deref().filter(|m| !m.trim().is_empty()) {
            config.model = model.to_string();
        }
        if self.auto_approve {
            config.agent.auto_approve = true;
        }
        if self.no_human {
            config.agent.no_human = true;
        }
        if self.strict_dependencies {
            config.planner.strict_dependencies = true;
        }
        if let Some(text) = &self.augment {
            config.agent.prompt_augmentation = Some(text.clone());
        }
        if let Some(text) = &self.plan_reminder {
            config.agent.plan_reminder_message = Some(text.clone());
        }
        if let Some(text) = &self.auto_message {
            config.agent.no_human_auto_message = Some(text.clone());
        }
    }
}
