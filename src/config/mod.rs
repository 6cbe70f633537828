//! Configuration (layered: defaults < TOML file < `.env` / environment).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::ConversationLimits;
use crate::error::{HalError, Result};
use crate::gateway::GatewayKind;
use crate::orchestrator::{OrchestratorConfig, ToolDispatch, ToolMode};
use crate::registry::RegistryOptions;
use crate::session::ProviderLaunchSpec;
use crate::util::RetryPolicy;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "HAL_CONFIG";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are HAL 9000, the onboard computer of the \
spaceship Discovery One, speaking with your human companion Dave. Keep a calm, polite and \
precise tone. Answer in at most two short sentences. Your replies are read aloud by a speech \
synthesizer, so use plain text only: no markdown, lists, emojis or special characters, and \
spell out symbols as words. Use the tools available to you when a request needs live \
information, and say plainly when something is beyond your capabilities.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub kind: GatewayKind,
    /// Base URL; `/generate` or `/api/chat` is appended per backend.
    pub url: String,
    /// Model name, used by the Ollama backend.
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: GatewayKind::Http,
            url: "http://127.0.0.1:8000".into(),
            model: "qwen3:latest".into(),
            timeout_secs: 120,
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8001".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub system_prompt: String,
    pub max_conversations: usize,
    pub idle_timeout_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        let limits = ConversationLimits::default();
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_conversations: limits.max_conversations,
            idle_timeout_secs: limits.idle_timeout.as_secs(),
        }
    }
}

impl ConversationConfig {
    pub fn limits(&self) -> ConversationLimits {
        ConversationLimits {
            max_conversations: self.max_conversations,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub mode: ToolMode,
    pub dispatch: ToolDispatch,
    pub call_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mode: ToolMode::Required,
            dispatch: ToolDispatch::Sequential,
            call_timeout_secs: 30,
            connect_timeout_secs: 20,
        }
    }
}

impl ToolsConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    pub gateway: GatewayConfig,
    pub providers: Vec<ProviderLaunchSpec>,
    pub server: ServerConfig,
    pub conversation: ConversationConfig,
    pub tools: ToolsConfig,
    pub retry: RetryPolicy,
}

impl HalConfig {
    /// Resolve, read, override from the environment, and validate.
    ///
    /// An explicit path must exist. Without one, `HAL_CONFIG` is tried, then
    /// `~/.hal/config.toml`; a missing default file means built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let env_path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .filter(|path| !path.as_os_str().is_empty());

        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => match default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HalError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| HalError::Configuration(format!("invalid config: {e}")))
    }

    /// Apply `HAL_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = get("HAL_GATEWAY_URL") {
            self.gateway.url = url;
        }
        if let Some(kind) = get("HAL_GATEWAY_KIND") {
            self.gateway.kind = kind.trim().parse().map_err(|_| {
                HalError::Configuration(format!("HAL_GATEWAY_KIND: unknown gateway kind '{kind}'"))
            })?;
        }
        if let Some(model) = get("HAL_MODEL") {
            self.gateway.model = model;
        }
        if let Some(bind) = get("HAL_BIND") {
            self.server.bind = bind;
        }
        if let Some(mode) = get("HAL_TOOL_MODE") {
            self.tools.mode = mode.trim().parse().map_err(|_| {
                HalError::Configuration(format!("HAL_TOOL_MODE: unknown tool mode '{mode}'"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway.url.trim().is_empty() {
            return Err(HalError::Configuration("gateway url must not be empty".into()));
        }
        if self.conversation.max_conversations == 0 {
            return Err(HalError::Configuration(
                "conversation.max_conversations must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(HalError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            provider.validate()?;
            if !seen.insert(provider.id.trim()) {
                return Err(HalError::Configuration(format!(
                    "duplicate tool provider id '{}'",
                    provider.id
                )));
            }
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::builder()
            .tool_mode(self.tools.mode)
            .dispatch(self.tools.dispatch)
            .gateway_timeout(self.gateway.timeout())
            .gateway_retry(self.retry.clone())
            .tool_retry(self.retry.clone())
            .build()
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            call_timeout: self.tools.call_timeout(),
            ..RegistryOptions::default()
        }
    }
}

/// `~/.hal/config.toml`, when a home directory is known.
pub fn default_path() -> Option<PathBuf> {
    directories::UserDirs::new().map(|dirs| dirs.home_dir().join(".hal").join("config.toml"))
}
