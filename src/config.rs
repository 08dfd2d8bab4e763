use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{AgentError, AgentResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub decision: DecisionConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Endpoint of the remote decision service. Falls back to the
    /// MOBIPILOT_ENDPOINT env var when the config file carries none.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Click targets containing any of these markers short-circuit to the
    /// terminate path instead of clicking (persistent-permission guard).
    #[serde(default = "default_grant_markers")]
    pub grant_forever_markers: Vec<String>,
    /// Packages known to reject programmatic text entry; input against them
    /// is replaced by a manual-input notice.
    #[serde(default = "default_manual_input_packages")]
    pub manual_input_packages: Vec<String>,
}

fn default_grant_markers() -> Vec<String> {
    vec!["始终允许".into(), "Always Allow".into()]
}

fn default_manual_input_packages() -> Vec<String> {
    vec!["com.tencent.mm".into()]
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            grant_forever_markers: default_grant_markers(),
            manual_input_packages: default_manual_input_packages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Delay between iterations of a multi-step task, in milliseconds.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
}

fn default_step_delay_ms() -> u64 {
    2000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
        }
    }
}

impl AppConfig {
    /// Resolved decision endpoint, preferring the config file over the env.
    pub fn decision_endpoint(&self) -> AgentResult<String> {
        if let Some(url) = &self.decision.endpoint {
            if !url.is_empty() {
                return Ok(url.clone());
            }
        }
        std::env::var("MOBIPILOT_ENDPOINT").map_err(|_| {
            AgentError::Config(
                "decision endpoint missing: set [decision].endpoint or MOBIPILOT_ENDPOINT".into(),
            )
        })
    }
}

fn resolve_config_path() -> AgentResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(AgentError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> AgentResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "config loaded");
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> AgentResult<()> {
    let path = resolve_config_path()?;
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
