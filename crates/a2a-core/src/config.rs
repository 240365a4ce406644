use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{A2aError, Result};

pub const DEFAULT_PORT: u16 = 8089;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_MAX_CONVERSATION_HISTORY: usize = 50;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;

/// Top-level config (`a2a.toml` + `A2A_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aConfig {
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub toolbox: ToolboxConfig,
}

impl Default for A2aConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            queue: QueueConfig::default(),
            agent: AgentConfig::default(),
            toolbox: ToolboxConfig::default(),
        }
    }
}

impl A2aConfig {
    /// Load config from a TOML file with `A2A_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, then `./a2a.toml`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or("a2a.toml");

        let config: A2aConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("A2A_").split("__"))
            .extract()
            .map_err(|e| A2aError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Log every request at info level (vs. the default debug).
    #[serde(default)]
    pub verbose_health_log: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            verbose_health_log: false,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Which storage backend drives the work queue / task store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueProvider {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_provider")]
    pub provider: QueueProvider,
    /// Required when `provider = "redis"`.
    pub url: Option<String>,
    /// Namespace prefix for remote KV keys (`{ns}:queue`, `{ns}:active:{id}`, ...).
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// `0` or `None` means unbounded.
    #[serde(default)]
    pub max_size: usize,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            provider: QueueProvider::Memory,
            url: None,
            namespace: default_namespace(),
            max_size: 0,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }
}

fn default_queue_provider() -> QueueProvider {
    QueueProvider::Memory
}
fn default_namespace() -> String {
    "a2a".to_string()
}
fn default_cleanup_interval() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_max_iterations")]
    pub max_chat_completion_iterations: usize,
    #[serde(default = "default_max_history")]
    pub max_conversation_history: usize,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            max_chat_completion_iterations: DEFAULT_MAX_ITERATIONS,
            max_conversation_history: DEFAULT_MAX_CONVERSATION_HISTORY,
            system_prompt: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}
fn default_max_history() -> usize {
    DEFAULT_MAX_CONVERSATION_HISTORY
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolboxConfig {
    #[serde(default)]
    pub enable_create_artifact: bool,
}

impl Default for ToolboxConfig {
    fn default() -> Self {
        Self {
            enable_create_artifact: false,
        }
    }
}
