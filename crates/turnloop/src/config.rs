//! Settings read from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use turnloop_openai_model::{OpenAIConfig, OpenAIConfigBuilder};

/// Errors found while reading the settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    /// A numeric variable does not hold a number.
    #[error("{name} must be a non-negative integer, got `{value}`")]
    InvalidNumber {
        /// The variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Application settings.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// `OPENAI_API_KEY`
    pub api_key: String,
    /// `OPENAI_BASE_URL`
    pub base_url: String,
    /// `OPENAI_MODEL`, the model or deployment name.
    pub model: String,
    /// `OPENAI_API_VERSION`, switches to deployment style endpoints.
    pub api_version: Option<String>,
    /// `MCP_SERVER_URL`
    pub mcp_server_url: Option<String>,
    /// `PROXY_DEPLOYMENT`, registers a deployment tool when set.
    pub proxy_deployment: Option<String>,
    /// `AGENT_MAX_TURNS`
    pub max_turns: Option<usize>,
    /// `AGENT_TOOL_TIMEOUT_SECS`
    pub tool_timeout: Option<Duration>,
    /// `AGENT_MODEL_TIMEOUT_SECS`
    pub model_timeout: Option<Duration>,
    /// `CONVERSATION_ID`, empty if unset.
    pub conversation_id: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .field("mcp_server_url", &self.mcp_server_url)
            .field("proxy_deployment", &self.proxy_deployment)
            .field("max_turns", &self.max_turns)
            .field("tool_timeout", &self.tool_timeout)
            .field("model_timeout", &self.model_timeout)
            .field("conversation_id", &self.conversation_id)
            .finish()
    }
}

impl Config {
    /// Reads the settings from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the settings through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require =
            |name: &'static str| get(name).ok_or(ConfigError::Missing(name));
        let number = |name: &'static str| -> Result<Option<u64>, ConfigError> {
            get(name)
                .map(|value| {
                    u64::from_str(value.trim()).map_err(|_| {
                        ConfigError::InvalidNumber { name, value }
                    })
                })
                .transpose()
        };

        Ok(Self {
            api_key: require("OPENAI_API_KEY")?,
            base_url: require("OPENAI_BASE_URL")?,
            model: require("OPENAI_MODEL")?,
            api_version: get("OPENAI_API_VERSION"),
            mcp_server_url: get("MCP_SERVER_URL"),
            proxy_deployment: get("PROXY_DEPLOYMENT"),
            max_turns: number("AGENT_MAX_TURNS")?.map(|n| n as usize),
            tool_timeout: number("AGENT_TOOL_TIMEOUT_SECS")?
                .map(Duration::from_secs),
            model_timeout: number("AGENT_MODEL_TIMEOUT_SECS")?
                .map(Duration::from_secs),
            conversation_id: get("CONVERSATION_ID").unwrap_or_default(),
        })
    }

    /// Builds the model provider configuration.
    pub fn openai_config(&self) -> OpenAIConfig {
        let mut builder = OpenAIConfigBuilder::with_api_key(&self.api_key)
            .with_base_url(&self.base_url)
            .with_model(&self.model);
        if let Some(api_version) = &self.api_version {
            builder = builder.with_api_version(api_version);
        }
        builder.build()
    }
}
