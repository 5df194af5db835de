use crate::agent::{
    AllowlistEntry, DEFAULT_NO_HUMAN_AUTO_MESSAGE, DEFAULT_PLAN_REMINDER, DEFAULT_SYSTEM_PROMPT,
    OrchestratorOptions,
};
use crate::error::ConfigError;
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_REQUEST_TIMEOUT_SECS, GatewaySettings};
use crate::planner::DependencyPolicy;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const MODEL_ENV: &str = "OPENAGENT_MODEL";
pub const BASE_URL_ENV: &str = "OPENAGENT_BASE_URL";

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the config was looked up; not serialized.
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Only ever read from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub temperature: Option<f64>,
    pub system_prompt: Option<String>,
    pub agent: AgentConfig,
    pub planner: PlannerConfig,
    pub approval: ApprovalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.toml"),
            api_key: None,
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            temperature: None,
            system_prompt: None,
            agent: AgentConfig::default(),
            planner: PlannerConfig::default(),
            approval: ApprovalConfig::default(),
        }
    }
}

// ── Agent ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub auto_approve: bool,
    pub no_human: bool,
    pub plan_reminder_message: Option<String>,
    pub no_human_auto_message: Option<String>,
    pub prompt_augmentation: Option<String>,
}

// ── Planner ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Block readiness on `waitingForId` entries that name no known step.
    pub strict_dependencies: bool,
}

impl PlannerConfig {
    pub fn dependency_policy(&self) -> DependencyPolicy {
        if self.strict_dependencies {
            DependencyPolicy::Strict
        } else {
            DependencyPolicy::Permissive
        }
    }
}

// ── Approval ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub allowlist: Vec<AllowlistEntry>,
}

// ── Loading ──────────────────────────────────────────────────────

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Config {
    /// `~/.openagent/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = UserDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .ok_or_else(|| ConfigError::Load("could not find home directory".into()))?;
        Ok(home.join(".openagent").join("config.toml"))
    }

    /// Load from `explicit` when given (it must exist), otherwise from the
    /// default location, falling back to defaults when that file is absent.
    /// Nothing is ever written.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::read(path)?,
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::read(&path)?
                } else {
                    debug!(path = %path.display(), "config.defaults");
                    Self {
                        config_path: path,
                        ..Self::default()
                    }
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|err| ConfigError::Load(format!("{}: {err}", path.display())))?;
        let mut config: Self = toml::from_str(&contents)
            .map_err(|err| ConfigError::Load(format!("{}: {err}", path.display())))?;
        config.config_path = path.to_path_buf();
        debug!(path = %path.display(), "config.loaded");
        Ok(config)
    }

    /// Apply environment variable overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` as the environment.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = non_empty(lookup(API_KEY_ENV).as_ref()) {
            self.api_key = Some(key);
        }
        if let Some(model) = non_empty(lookup(MODEL_ENV).as_ref()) {
            self.model = model;
        }
        if let Some(base_url) = non_empty(lookup(BASE_URL_ENV).as_ref()) {
            self.base_url = base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation("model must not be empty".into()));
        }
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(ConfigError::Validation(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be >= 1".into(),
            ));
        }
        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(ConfigError::Validation(
                "temperature must be in [0.0, 2.0]".into(),
            ));
        }
        if self.approval.allowlist.iter().any(|entry| entry.name.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "approval.allowlist entries need a name".into(),
            ));
        }
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn gateway_settings(&self) -> Result<GatewaySettings, ConfigError> {
        Ok(GatewaySettings {
            api_key: self.require_api_key()?.to_string(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            timeout_secs: self.request_timeout_secs,
            temperature: self.temperature,
        })
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            system_prompt: non_empty(self.system_prompt.as_ref())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            prompt_augmentation: self.agent.prompt_augmentation.clone().unwrap_or_default(),
            auto_approve: self.agent.auto_approve,
            no_human: self.agent.no_human,
            plan_reminder_message: non_empty(self.agent.plan_reminder_message.as_ref())
                .unwrap_or_else(|| DEFAULT_PLAN_REMINDER.to_string()),
            no_human_auto_message: non_empty(self.agent.no_human_auto_message.as_ref())
                .unwrap_or_else(|| DEFAULT_NO_HUMAN_AUTO_MESSAGE.to_string()),
            dependency_policy: self.planner.dependency_policy(),
            allowlist: self.approval.allowlist.clone(),
        }
    }
}
