use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::pipeline::PipelineConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration. Sessions and events share one file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("chunkwise.db")
}

/// Available LLM providers
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Ollama => "ollama",
        }
    }
}

/// Generation backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    /// Required for Anthropic
    #[serde(default)]
    pub api_key: Option<String>,
    /// Override the provider's default endpoint
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds (default: 180)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_timeout() -> u64 {
    180
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<SanitizedLlmConfig>,
}

/// Sanitized LLM config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedLlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            pipeline: config.pipeline.clone(),
            llm: config.llm.as_ref().map(|l| SanitizedLlmConfig {
                provider: l.provider.as_str().to_string(),
                model: l.model.clone(),
                api_key_configured: l.api_key.as_deref().is_some_and(|k| !k.is_empty()),
                api_base: l.api_base.clone(),
                max_tokens: l.max_tokens,
                timeout_secs: l.timeout_secs,
            }),
        }
    }
}
